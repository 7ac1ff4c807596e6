//! Remote worker mode: a scenario arrives as a JSON text frame, the summary
//! goes back on the same socket when the run ends.

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{process_env, resolve_base_url_or, validate_base_url, DEFAULT_BASE_URL};
use crate::error::LoadError;
use crate::executor::{run_load_test, RunSummary};
use crate::models::dsl_model::ScenarioConfig;
use crate::utils::hardware::{get_hardware_info, HostInfo};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Accepted {
        scenario: String,
        target: String,
        host: HostInfo,
    },
    Summary(RunSummary),
    Error {
        message: String,
    },
}

impl WorkerMessage {
    fn to_text(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"{e}"}}"#))
    }
}

/// Parses and validates a scenario frame, resolving the target the same way
/// the CLI does minus the flag.
pub fn accept_scenario(text: &str) -> Result<(ScenarioConfig, String), LoadError> {
    let config = ScenarioConfig::from_json(text)?;
    let fallback = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let base_url = resolve_base_url_or(&process_env(), fallback);
    validate_base_url(&base_url)?;
    Ok((config, base_url))
}

pub struct WsSession {
    busy: bool,
    running: Arc<AtomicBool>,
}

impl WsSession {
    pub fn new() -> Self {
        Self {
            busy: false,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    fn start_run(&mut self, config: ScenarioConfig, base_url: String, ctx: &mut ws::WebsocketContext<Self>) {
        self.busy = true;
        self.running.store(true, Ordering::Relaxed);

        ctx.text(
            WorkerMessage::Accepted {
                scenario: config.name.clone(),
                target: base_url.clone(),
                host: get_hardware_info(),
            }
            .to_text(),
        );

        let running = Arc::clone(&self.running);
        let run = async move { run_load_test(config, base_url, running).await };
        ctx.spawn(run.into_actor(self).map(|result, act, ctx| {
            act.busy = false;
            let reply = match result {
                Ok(summary) => WorkerMessage::Summary(summary),
                Err(e) => WorkerMessage::Error {
                    message: e.to_string(),
                },
            };
            ctx.text(reply.to_text());
        }));
    }
}

impl Default for WsSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("worker session started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.running.store(false, Ordering::Relaxed);
        info!("worker session closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                if self.busy {
                    ctx.text(
                        WorkerMessage::Error {
                            message: "a scenario is already running".into(),
                        }
                        .to_text(),
                    );
                    return;
                }
                match accept_scenario(&text) {
                    Ok((config, base_url)) => {
                        info!(scenario = %config.name, target = %base_url, "scenario accepted");
                        self.start_run(config, base_url, ctx);
                    }
                    Err(e) => {
                        warn!(error = %e, "rejected scenario");
                        ctx.text(
                            WorkerMessage::Error {
                                message: e.to_string(),
                            }
                            .to_text(),
                        );
                    }
                }
            }
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!(error = %e, "websocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

pub async fn ws_handler(req: HttpRequest, stream: web::Payload) -> Result<HttpResponse, Error> {
    ws::start(WsSession::new(), &req, stream)
}
