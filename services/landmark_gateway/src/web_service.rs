use std::sync::Arc;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use actix_ws::Message;
use futures::StreamExt;
use gateway_core::protocol::ServerMessage;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::FrameSession;
use crate::GatewayState;

#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub status: &'static str,
    pub message: String,
    pub oracle_active: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthReply {
    pub status: &'static str,
    pub oracle_active: bool,
    pub oracle_detections: u64,
    pub fallback_detections: u64,
    pub timeouts: u64,
    pub oracle_errors: u64,
}

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body("Landmark annotation gateway. Connect a websocket client to /ws.")
}

#[get("/ping")]
pub async fn ping(state: web::Data<GatewayState>) -> impl Responder {
    web::Json(StatusReply {
        status: "ok",
        message: "landmark annotation gateway is running".to_string(),
        oracle_active: state.dispatcher.oracle_active(),
    })
}

#[get("/health")]
pub async fn health(state: web::Data<GatewayState>) -> impl Responder {
    let counters = state.dispatcher.counters();
    web::Json(HealthReply {
        status: "healthy",
        oracle_active: state.dispatcher.oracle_active(),
        oracle_detections: counters.oracle_detections,
        fallback_detections: counters.fallback_detections,
        timeouts: counters.timeouts,
        oracle_errors: counters.oracle_errors,
    })
}

#[get("/ws")]
pub async fn ws_entry(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<GatewayState>,
) -> actix_web::Result<HttpResponse> {
    let (response, ws, inbound) = actix_ws::handle(&req, body)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let session = FrameSession::new(&state.configuration, state.dispatcher.clone(), tx);
    let drain = session.spawn();
    info!(target: "gateway::ws", "session {}: client connected", session.id());
    actix_web::rt::spawn(run_connection(session, drain, ws, inbound, rx));
    Ok(response)
}

/// Bridges one websocket to its session: inbound text goes to the message
/// handler, outbound pipeline messages are serialized onto the socket. On
/// every close path the drain task is stopped and awaited before the
/// connection resources are released.
async fn run_connection(
    session: Arc<FrameSession>,
    drain: JoinHandle<()>,
    mut ws: actix_ws::Session,
    mut inbound: actix_ws::MessageStream,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    loop {
        tokio::select! {
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Text(text))) => session.handle_text(&text),
                Some(Ok(Message::Ping(bytes))) => {
                    if ws.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    debug!(
                        target: "gateway::ws",
                        "session {}: close frame received: {:?}",
                        session.id(),
                        reason
                    );
                    break;
                }
                // Binary and continuation frames are not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(
                        target: "gateway::ws",
                        "session {}: protocol error: {}",
                        session.id(),
                        e
                    );
                    break;
                }
                None => break,
            },
            emitted = outbound.recv() => match emitted {
                Some(message) => match serde_json::to_string(&message) {
                    Ok(json) => {
                        if ws.text(json).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(
                        target: "gateway::ws",
                        "session {}: reply serialization failed: {}",
                        session.id(),
                        e
                    ),
                },
                None => break,
            },
        }
    }
    session.stop();
    let _ = drain.await;
    let _ = ws.close(None).await;
    info!(target: "gateway::ws", "session {}: finished", session.id());
}
