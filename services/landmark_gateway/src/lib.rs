pub mod configuration;
pub mod oracle;
pub mod session;
pub mod web_service;

use std::sync::Arc;

use gateway_core::dispatcher::DetectionDispatcher;

use crate::configuration::ServiceConfiguration;

/// Shared state handed to the HTTP handlers. The dispatcher is the only
/// cross-connection resource; everything else is created per session.
pub struct GatewayState {
    pub configuration: ServiceConfiguration,
    pub dispatcher: Arc<DetectionDispatcher>,
}
