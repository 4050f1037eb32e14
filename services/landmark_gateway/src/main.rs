use std::env::args;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use gateway_core::dispatcher::DetectionDispatcher;
use landmark_gateway::configuration::ServiceConfiguration;
use landmark_gateway::{oracle, web_service, GatewayState};
use log::{debug, info};

const DEFAULT_CONFIGURATION_PATH: &str = "assets/configuration.json";

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init();

    info!("┌───────────────────────────────────────────────────────┐");
    info!("│              Landmark Annotation Gateway              │");
    info!("│ This program is licensed under the APACHE 2.0 license │");
    info!("└───────────────────────────────────────────────────────┘");
    info!("Gateway core library version: {}", gateway_core::version());

    let project_dir = env!("CARGO_MANIFEST_DIR");
    let default_config_path = format!("{}/{}", project_dir, DEFAULT_CONFIGURATION_PATH);
    let conf_arg = args().nth(1).unwrap_or(default_config_path);
    info!("Configuration: {}", conf_arg);
    let conf = ServiceConfiguration::new(&conf_arg)?;
    debug!("Configuration: {:?}", conf);

    let oracle = oracle::install_from_config(&conf.oracle);
    let dispatcher = Arc::new(DetectionDispatcher::new(
        oracle,
        conf.pipeline.workers,
        conf.pipeline.detection_timeout,
    ));

    let bind_host = conf.bind.host.clone();
    let bind_port = conf.bind.port;
    info!(
        "Serving on {}:{}, frame stream endpoint at /ws",
        bind_host, bind_port
    );
    let state = web::Data::new(GatewayState {
        configuration: conf,
        dispatcher,
    });
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(web_service::index)
            .service(web_service::ping)
            .service(web_service::health)
            .service(web_service::ws_entry)
    })
    .bind((bind_host, bind_port))?
    .run()
    .await?;
    info!("Server stopped.");
    Ok(())
}
