//! Shared helpers for the integration tests: an in-process admin API and
//! builders for the Kubernetes objects the translator reads.

#![allow(dead_code)]

use apisix_ingress_controller::apisix::ApisixClient;
use apisix_ingress_controller::core::config::ApisixConfig;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Secret, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::ByteString;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Entities held by the fake admin API, per plural and id
type Store = HashMap<String, BTreeMap<String, Value>>;

#[derive(Clone, Default)]
struct AdminState {
    store: Arc<Mutex<Store>>,
    log: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<Option<String>>>,
    next_id: Arc<AtomicU64>,
}

impl AdminState {
    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    /// Whether writes to `kind` are currently rejected
    fn fails(&self, kind: &str) -> bool {
        match self.failing.lock().as_deref() {
            Some("*") => true,
            Some(failing) => failing == kind,
            None => false,
        }
    }
}

fn node(kind: &str, id: &str, value: &Value) -> Value {
    json!({"key": format!("/apisix/{}/{}", kind, id), "value": value})
}

fn unavailable() -> (StatusCode, Json<Value>) {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error_msg": "etcd unavailable"})))
}

async fn list(State(state): State<AdminState>, Path(kind): Path<String>) -> Json<Value> {
    let store = state.store.lock();
    let items: Vec<Value> = store
        .get(&kind)
        .map(|entities| entities.iter().map(|(id, value)| node(&kind, id, value)).collect())
        .unwrap_or_default();
    Json(json!({"total": items.len(), "list": items}))
}

/// `POST /<plural>`: the server picks a sequential id
async fn create(
    State(state): State<AdminState>,
    Path(kind): Path<String>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record(format!("POST /{}", kind));
    if state.fails(&kind) {
        return unavailable();
    }
    let id = format!("{:020}", state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    body["id"] = Value::String(id.clone());
    state.store.lock().entry(kind.clone()).or_default().insert(id.clone(), body.clone());
    (StatusCode::CREATED, Json(json!({"action": "create", "node": node(&kind, &id, &body)})))
}

async fn fetch(State(state): State<AdminState>, Path((kind, id)): Path<(String, String)>) -> (StatusCode, Json<Value>) {
    match state.store.lock().get(&kind).and_then(|entities| entities.get(&id)) {
        Some(value) => (StatusCode::OK, Json(json!({"action": "get", "node": node(&kind, &id, value)}))),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "Key not found"}))),
    }
}

async fn upsert(
    State(state): State<AdminState>,
    Path((kind, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record(format!("PUT /{}/{}", kind, id));
    if state.fails(&kind) {
        return unavailable();
    }
    state.store.lock().entry(kind.clone()).or_default().insert(id.clone(), body.clone());
    (StatusCode::OK, Json(node(&kind, &id, &body)))
}

async fn remove(State(state): State<AdminState>, Path((kind, id)): Path<(String, String)>) -> StatusCode {
    state.record(format!("DELETE /{}/{}", kind, id));
    if state.fails(&kind) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.store.lock().get_mut(&kind).and_then(|entities| entities.remove(&id)) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

/// In-process admin API mirroring the gateway's envelopes
///
/// Every write is logged as `METHOD /<plural>/<id>` (`POST /<plural>` for
/// creates without an id).
pub struct FakeAdmin {
    pub base_url: String,
    state: AdminState,
}

impl FakeAdmin {
    pub async fn start() -> Self {
        let state = AdminState::default();
        let app = Router::new()
            .route("/apisix/admin/:kind", get(list).post(create))
            .route("/apisix/admin/:kind/:id", get(fetch).put(upsert).delete(remove))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/apisix/admin", addr),
            state,
        }
    }

    /// A client of this server with its cache loaded
    pub async fn client(&self) -> Arc<ApisixClient> {
        let client = Arc::new(ApisixClient::new(&admin_config(&self.base_url)).unwrap());
        client.sync_cache().await.unwrap();
        client
    }

    /// Pre-load an entity, as if written by an earlier controller run
    pub fn seed(&self, kind: &str, id: &str, value: Value) {
        self.state.store.lock().entry(kind.to_string()).or_default().insert(id.to_string(), value);
    }

    /// Reject writes to one plural, `"*"` for all, `None` to recover
    pub fn fail(&self, kind: Option<&str>) {
        *self.state.failing.lock() = kind.map(str::to_string);
    }

    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.state.log.lock())
    }

    /// Ids stored for one plural, sorted
    pub fn ids(&self, kind: &str) -> Vec<String> {
        self.state
            .store
            .lock()
            .get(kind)
            .map(|entities| entities.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entity(&self, kind: &str, id: &str) -> Option<Value> {
        self.state.store.lock().get(kind).and_then(|entities| entities.get(id).cloned())
    }
}

pub fn admin_config(base_url: &str) -> ApisixConfig {
    ApisixConfig {
        admin_base_url: base_url.to_string(),
        admin_key: "edd1c9f034335f136f87ad84b625c8f1".to_string(),
        timeout: Duration::from_secs(2),
    }
}

/// A Service with one named port
pub fn service(namespace: &str, name: &str, port_name: &str, port: i32) -> Service {
    let mut svc = Service::default();
    svc.metadata.name = Some(name.to_string());
    svc.metadata.namespace = Some(namespace.to_string());
    svc.spec = Some(ServiceSpec {
        cluster_ip: Some("10.96.0.20".to_string()),
        ports: Some(vec![ServicePort {
            name: Some(port_name.to_string()),
            port,
            ..Default::default()
        }]),
        ..Default::default()
    });
    svc
}

/// Endpoints of `service` with one ready address per ip
pub fn endpoints(namespace: &str, name: &str, port_name: &str, port: i32, ips: &[&str]) -> Endpoints {
    let mut ep = Endpoints::default();
    ep.metadata.name = Some(name.to_string());
    ep.metadata.namespace = Some(namespace.to_string());
    ep.subsets = Some(vec![EndpointSubset {
        addresses: Some(
            ips.iter()
                .map(|ip| EndpointAddress {
                    ip: ip.to_string(),
                    ..Default::default()
                })
                .collect(),
        ),
        ports: Some(vec![EndpointPort {
            name: Some(port_name.to_string()),
            port,
            ..Default::default()
        }]),
        ..Default::default()
    }]);
    ep
}

/// An Opaque secret
pub fn secret(namespace: &str, name: &str, fields: &[(&str, &str)]) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(namespace.to_string());
    secret.data = Some(
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect(),
    );
    secret
}
