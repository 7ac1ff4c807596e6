//! Minimal HTTP server standing in for the service under load.

#![allow(dead_code)]

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Decides status and artificial latency for a request path (with query).
pub type Behavior = Arc<dyn Fn(&str) -> (StatusCode, Duration) + Send + Sync>;

pub struct MockServer {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every `path?query` received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn count(&self, path_and_query: &str) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|p| p.as_str() == path_and_query)
            .count()
    }
}

pub fn spawn(behavior: Behavior) -> MockServer {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);

    let make_svc = make_service_fn(move |_conn| {
        let behavior = Arc::clone(&behavior);
        let recorded = Arc::clone(&recorded);
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let behavior = Arc::clone(&behavior);
                let recorded = Arc::clone(&recorded);
                async move {
                    let target = req
                        .uri()
                        .path_and_query()
                        .map(|pq| pq.as_str().to_string())
                        .unwrap_or_default();
                    recorded.lock().push(target.clone());

                    let (status, delay) = behavior(&target);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }

                    let response = Response::builder()
                        .status(status)
                        .body(Body::from(r#"{"status":"ok"}"#))
                        .expect("static response");
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);

    MockServer { addr, seen }
}

pub fn always(status: StatusCode) -> Behavior {
    Arc::new(move |_: &str| (status, Duration::ZERO))
}
