//! The WebSocket worker driven over a real socket.

mod common;

use actix_web::{web, App};
use awc::error::WsProtocolError;
use awc::ws::{Frame, Message};
use futures::{SinkExt, Stream, StreamExt};
use hyper::StatusCode;
use serde_json::Value;
use std::time::Duration;

use loadforge::models::dsl_model::ScenarioConfig;
use loadforge::ws::ws_handler;

fn worker() -> actix_test::TestServer {
    // BASE_URL would take precedence over the scenario's own target.
    std::env::remove_var("BASE_URL");
    actix_test::start(|| App::new().route("/ws", web::get().to(ws_handler)))
}

fn scenario_frame(base_url: String, duration: Duration) -> String {
    let mut config = ScenarioConfig::review_service();
    config.base_url = Some(base_url);
    config.vus = 1;
    config.duration = duration;
    serde_json::to_string(&config).unwrap()
}

/// Next text frame as JSON, skipping control frames.
async fn next_message<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Frame, WsProtocolError>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(15), ws.next())
            .await
            .expect("no frame from worker")
            .expect("worker closed the socket")
            .unwrap();
        match frame {
            Frame::Text(bytes) => return serde_json::from_slice(&bytes).unwrap(),
            Frame::Ping(_) | Frame::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[actix_web::test]
async fn scenario_is_accepted_then_summarized() {
    let mock = common::spawn(common::always(StatusCode::OK));
    let mut srv = worker();
    let mut ws = srv.ws_at("/ws").await.unwrap();

    ws.send(Message::Text(
        scenario_frame(mock.base_url(), Duration::from_millis(300)).into(),
    ))
    .await
    .unwrap();

    let accepted = next_message(&mut ws).await;
    assert_eq!(accepted["type"], "accepted");
    assert_eq!(accepted["scenario"], "review-service");
    assert_eq!(accepted["target"], mock.base_url());

    let summary = next_message(&mut ws).await;
    assert_eq!(summary["type"], "summary");
    assert_eq!(summary["passed"], true);
    assert!(summary["metrics"]["total_requests"].as_u64().unwrap() > 0);
    assert_eq!(summary["metrics"]["failed_requests"], 0);
    assert!(mock.count("/health") > 0);
}

#[actix_web::test]
async fn second_scenario_during_a_run_is_refused() {
    let mock = common::spawn(common::always(StatusCode::OK));
    let mut srv = worker();
    let mut ws = srv.ws_at("/ws").await.unwrap();
    let frame = scenario_frame(mock.base_url(), Duration::from_secs(1));

    ws.send(Message::Text(frame.clone().into())).await.unwrap();
    assert_eq!(next_message(&mut ws).await["type"], "accepted");

    ws.send(Message::Text(frame.into())).await.unwrap();
    let refused = next_message(&mut ws).await;
    assert_eq!(refused["type"], "error");
    assert_eq!(refused["message"], "a scenario is already running");

    // The first run is unaffected and the session is free again afterwards.
    assert_eq!(next_message(&mut ws).await["type"], "summary");
    ws.send(Message::Text(
        scenario_frame(mock.base_url(), Duration::from_millis(200)).into(),
    ))
    .await
    .unwrap();
    assert_eq!(next_message(&mut ws).await["type"], "accepted");
}

#[actix_web::test]
async fn malformed_frames_get_an_error_reply() {
    let mut srv = worker();
    let mut ws = srv.ws_at("/ws").await.unwrap();

    ws.send(Message::Text("not json".into())).await.unwrap();
    let reply = next_message(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().starts_with("JSON error"));

    let mut config = ScenarioConfig::review_service();
    config.vus = 0;
    ws.send(Message::Text(serde_json::to_string(&config).unwrap().into()))
        .await
        .unwrap();
    let reply = next_message(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().starts_with("Invalid scenario"));
}

#[actix_web::test]
async fn closing_the_socket_stops_the_run() {
    let mock = common::spawn(common::always(StatusCode::OK));
    let mut srv = worker();
    let mut ws = srv.ws_at("/ws").await.unwrap();

    ws.send(Message::Text(
        scenario_frame(mock.base_url(), Duration::from_secs(20)).into(),
    ))
    .await
    .unwrap();
    assert_eq!(next_message(&mut ws).await["type"], "accepted");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!mock.requests().is_empty());

    ws.send(Message::Close(None)).await.unwrap();
    // Let the iteration in flight at close time finish.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let after_close = mock.requests().len();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(mock.requests().len(), after_close);
}
