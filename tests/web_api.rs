use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use roti_host::config::Config;
use roti_host::device::ScriptedDevice;
use roti_host::notify::Notifier;
use roti_host::web::api::create_router;
use roti_host::{Controller, ControllerHandle};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower::ServiceExt;

fn app() -> (Router, ControllerHandle, Arc<ScriptedDevice>) {
    let device = Arc::new(ScriptedDevice::idle());
    let controller = Controller::new(&Config::default(), device.clone(), device.clone(), Notifier::new()).spawn();
    let (shutdown_tx, _) = broadcast::channel(1);
    let router = create_router(controller.sender(), controller.notifier(), shutdown_tx);
    (router, controller, device)
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_add_list_toggle_delete() {
    let (app, controller, _device) = app();

    let (status, job) = send(
        &app,
        request(
            Method::POST,
            "/api/v1/schedules",
            Some(json!({ "time": "07:30", "quantity": 6, "thickness": "thin", "temperature": 190 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["time"], "07:30");
    assert_eq!(job["thickness"], "thin");
    assert_eq!(job["active"], true);
    let id = job["id"].as_str().unwrap().to_string();

    let (status, toggled) = send(&app, request(Method::POST, &format!("/api/v1/schedules/{}/toggle", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["active"], false);

    let (status, jobs) = send(&app, request(Method::GET, "/api/v1/schedules", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 1);

    for _ in 0..2 {
        let (status, _) = send(&app, request(Method::DELETE, &format!("/api/v1/schedules/{}", id), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (_, jobs) = send(&app, request(Method::GET, "/api/v1/schedules", None)).await;
    assert!(jobs.as_array().unwrap().is_empty());

    let (status, _) = send(&app, request(Method::POST, &format!("/api/v1/schedules/{}/toggle", id), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_missing_time_is_unprocessable() {
    let (app, controller, _device) = app();
    let (status, body) = send(&app, request(Method::POST, "/api/v1/schedules", Some(json!({ "quantity": 4 })))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("time"));

    let (status, _) = send(
        &app,
        request(Method::POST, "/api/v1/schedules", Some(json!({ "time": "06:00", "quantity": 40 }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, jobs) = send(&app, request(Method::GET, "/api/v1/schedules", None)).await;
    assert!(jobs.as_array().unwrap().is_empty());
    controller.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_unknown_job_is_not_found() {
    let (app, controller, _device) = app();
    let uri = "/api/v1/schedules/6f1c2d9e-3a4b-4c5d-8e7f-0a1b2c3d4e5f/dispatch";
    let (status, _) = send(&app, request(Method::POST, uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_to_offline_device_still_succeeds() {
    let (app, controller, device) = app();
    let (_, job) = send(&app, request(Method::POST, "/api/v1/schedules", Some(json!({ "time": "12:15" })))).await;
    let id = job["id"].as_str().unwrap().to_string();

    device.set_reachable(false);
    let (status, outcome) = send(&app, request(Method::POST, &format!("/api/v1/schedules/{}/dispatch", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["jobId"], id.as_str());
    assert_eq!(outcome["delivered"], false);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_run_start_and_stop() {
    let (app, controller, _device) = app();
    let (status, started) = send(
        &app,
        request(Method::POST, "/api/v1/run/start", Some(json!({ "quantity": 8, "cookTime": 30 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["started"], true);
    assert_eq!(started["status"]["running"], true);
    assert_eq!(started["status"]["config"]["quantity"], 8);
    assert_eq!(started["status"]["estimatedSecondsRemaining"], 240);

    let (_, again) = send(&app, request(Method::POST, "/api/v1/run/start", Some(json!({})))).await;
    assert_eq!(again["started"], false);

    let (_, stopped) = send(&app, request(Method::POST, "/api/v1/run/stop", None)).await;
    assert_eq!(stopped["stopped"], true);
    assert_eq!(stopped["status"]["running"], false);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_device_connect_and_emergency_stop() {
    let (app, controller, device) = app();
    let (status, snapshot) = send(&app, request(Method::GET, "/api/v1/device", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["connected"], false);
    assert_eq!(snapshot["connectionAttempts"], 0);

    let (status, snapshot) = send(&app, request(Method::POST, "/api/v1/device/connect", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["connected"], true);
    assert_eq!(snapshot["telemetry"]["temperature"], 25.0);

    let (status, ack) = send(&app, request(Method::POST, "/api/v1/device/emergency-stop", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["acknowledged"], true);

    device.set_reachable(false);
    let (status, body) = send(&app, request(Method::POST, "/api/v1/device/emergency-stop", None)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());

    let (status, snapshot) = send(&app, request(Method::POST, "/api/v1/device/disconnect", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["connected"], false);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_requests_after_shutdown_are_unavailable() {
    let (app, controller, _device) = app();
    controller.shutdown().await;
    let (status, _) = send(&app, request(Method::GET, "/api/v1/run", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_notifications_stream_as_sse() {
    let (app, controller, _device) = app();
    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/v1/notifications", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    // Subscribed once the handler has run; trigger a notification
    send(&app, request(Method::POST, "/api/v1/schedules", Some(json!({ "time": "" })))).await;

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: notification"));
    assert!(text.contains("Time Required"));
    controller.shutdown().await;
}

#[tokio::test]
async fn test_malformed_bodies_get_json_errors() {
    let (app, controller, _device) = app();
    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/schedules", Some(json!({ "time": "07:30", "quantity": 300 }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/v1/schedules", Some(json!({ "time": "07:30", "thickness": "crispy" }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let not_json = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/run/settings")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ oil"))
        .unwrap();
    let (status, body) = send(&app, not_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, request(Method::POST, "/api/v1/run/start", None)).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].is_string());
    controller.shutdown().await;
}

#[tokio::test]
async fn test_graceful_shutdown_closes_event_streams() {
    let device = Arc::new(ScriptedDevice::idle());
    let controller = Controller::new(&Config::default(), device.clone(), device, Notifier::new()).spawn();
    let (shutdown_tx, _) = broadcast::channel(1);
    let app = create_router(controller.sender(), controller.notifier(), shutdown_tx.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut stop_rx = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.recv().await;
            })
            .await
    });

    let stream = reqwest::get(format!("http://{}/api/v1/notifications", addr)).await.unwrap();
    assert_eq!(stream.status(), reqwest::StatusCode::OK);

    shutdown_tx.send(()).unwrap();
    let served = tokio::time::timeout(Duration::from_secs(5), server).await;
    assert!(served.is_ok(), "server kept running with an open event stream");
    served.unwrap().unwrap().unwrap();
    drop(stream);
    controller.shutdown().await;
}
