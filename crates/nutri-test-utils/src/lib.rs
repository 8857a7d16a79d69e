//! Shared test utilities for nutri integration tests.
//!
//! Spins up in-process axum servers on ephemeral ports that stand in for
//! the stage services and generation providers:
//!
//! - [`stage_router`]: all five stage endpoints, echoing the request's
//!   `patient_id` into a canned artifact.
//! - [`provider_router`]: a `/generate` endpoint replying with fixed JSON.
//!
//! Individual routes can be made to fail or stall with [`failing`] and
//! [`stalling`].

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{MethodRouter, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running stub server. The server stops when this is dropped.
pub struct StubServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl StubServer {
    /// `http://127.0.0.1:<port>` without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL joined with `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve `router` on `127.0.0.1:0`.
pub async fn spawn(router: Router) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind stub listener");
    let addr = listener.local_addr().expect("failed to read stub address");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("stub server failed");
    });
    StubServer { addr, handle }
}

// ---------------------------------------------------------------------------
// Stage services
// ---------------------------------------------------------------------------

/// Stage paths in pipeline order.
pub const STAGE_PATHS: [&str; 5] = ["/diet-rules", "/gaps", "/targets", "/conflicts", "/plan"];

fn patient_id(body: &Value) -> Value {
    body.get("patient_id").cloned().unwrap_or(Value::Null)
}

/// Canned artifact for the stage at `path`, stamped with the request's
/// `patient_id`.
pub fn canned_artifact(path: &str, request: &Value) -> Value {
    let patient_id = patient_id(request);
    match path {
        "/diet-rules" => json!({
            "version": "v1",
            "patient_id": patient_id,
            "rules": {
                "allow": ["millets", "dal", "leafy vegetables"],
                "limit": ["white rice"],
                "avoid": ["sugar", "fruit juice"],
                "portions": {"rice_cups": 0.5},
                "notes": ["prefer low-GI grains"]
            }
        }),
        "/gaps" => json!({
            "version": "v1",
            "patient_id": patient_id,
            "gaps": [{"nutrient": "fiber", "deficit_g": 8}]
        }),
        "/targets" => json!({
            "version": "v1",
            "patient_id": patient_id,
            "kcal": 1800,
            "macros": {"carb_pct": 45.0, "protein_pct": 20.0, "fat_pct": 35.0},
            "micros": {"sodium_mg": 1500.0}
        }),
        "/conflicts" => json!({
            "version": "v1",
            "patient_id": patient_id,
            "items": []
        }),
        "/plan" => json!({
            "version": "v1",
            "patient_id": patient_id,
            "plan": {"day1": {"breakfast": "ragi dosa", "lunch": "millet khichdi"}},
            "shopping_list": ["ragi", "foxtail millet", "moong dal"],
            "trace": {"kcal": request.pointer("/targets/kcal").cloned().unwrap_or(Value::Null)}
        }),
        _ => json!({"patient_id": patient_id}),
    }
}

fn echo_route(path: &'static str) -> MethodRouter {
    post(move |Json(body): Json<Value>| async move { Json(canned_artifact(path, &body)) })
}

/// A route answering every POST with `status` and a short body.
pub fn failing(status: StatusCode) -> MethodRouter {
    post(move || async move { (status, "stub failure") })
}

/// A route that waits `delay` before answering like the echo stub.
pub fn stalling(path: &'static str, delay: Duration) -> MethodRouter {
    post(move |Json(body): Json<Value>| async move {
        tokio::time::sleep(delay).await;
        Json(canned_artifact(path, &body))
    })
}

/// A route answering with `reply` regardless of the request.
pub fn fixed(reply: Value) -> MethodRouter {
    post(move || {
        let reply = reply.clone();
        async move { Json(reply) }
    })
}

/// Request bodies seen by a [`capturing`] route, in arrival order.
pub type Captured = Arc<Mutex<Vec<Value>>>;

/// A route answering with `reply` that records every JSON body it receives.
pub fn capturing(reply: Value) -> (MethodRouter, Captured) {
    let seen = Captured::default();
    let sink = seen.clone();
    let route = post(move |Json(body): Json<Value>| {
        let reply = reply.clone();
        let sink = sink.clone();
        async move {
            sink.lock().expect("capture lock poisoned").push(body);
            Json(reply)
        }
    });
    (route, seen)
}

/// All five stage endpoints echoing canned artifacts, with `overrides`
/// replacing individual paths.
pub fn stage_router(overrides: Vec<(&'static str, MethodRouter)>) -> Router {
    let mut router = Router::new();
    for path in STAGE_PATHS {
        let route = match overrides.iter().position(|(p, _)| *p == path) {
            Some(i) => overrides[i].1.clone(),
            None => echo_route(path),
        };
        router = router.route(path, route);
    }
    router
}

// ---------------------------------------------------------------------------
// Generation providers
// ---------------------------------------------------------------------------

/// A provider exposing `POST /generate` that always answers `reply`.
pub fn provider_router(reply: Value) -> Router {
    Router::new().route("/generate", fixed(reply))
}
