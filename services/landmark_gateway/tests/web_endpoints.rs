use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use gateway_core::dispatcher::DetectionDispatcher;
use serial_test::serial;

use landmark_gateway::configuration::ServiceConfiguration;
use landmark_gateway::{web_service, GatewayState};

fn test_state() -> web::Data<GatewayState> {
    web::Data::new(GatewayState {
        configuration: ServiceConfiguration::default(),
        dispatcher: Arc::new(DetectionDispatcher::new(
            None,
            1,
            Duration::from_millis(100),
        )),
    })
}

#[actix_web::test]
#[serial]
async fn index_describes_the_service_test() {
    let app = test::init_service(App::new().service(web_service::index)).await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("/ws"));
}

#[actix_web::test]
#[serial]
async fn ping_reports_oracle_state_test() {
    let state = test_state();
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(web_service::ping),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["oracle_active"], false);
}

#[actix_web::test]
#[serial]
async fn health_exposes_dispatcher_counters_test() {
    let state = test_state();
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(web_service::health),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["oracle_active"], false);
    assert_eq!(body["fallback_detections"], 0);
    assert_eq!(body["timeouts"], 0);
}
