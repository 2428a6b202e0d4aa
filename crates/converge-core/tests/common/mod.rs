// Shared test fixtures: a scripted in-memory `RemoteApi`.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use converge_api::{Error, ListFilter, RemoteApi, ResourceKind};
use converge_core::{EngineConfig, OperationTimeouts};

/// Canned reply for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Status(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// Remote API that replays scripted replies and records every call.
///
/// `get` replies are consumed in order per path; the last one repeats.
/// Mutations reply with the same scripted value every time. Anything
/// unscripted fails with a 500.
#[derive(Default)]
pub struct ScriptedApi {
    calls: Mutex<Vec<Call>>,
    gets: Mutex<HashMap<String, VecDeque<Reply>>>,
    creates: Mutex<HashMap<String, Reply>>,
    updates: Mutex<HashMap<String, Reply>>,
    deletes: Mutex<HashMap<String, Reply>>,
    lists: Mutex<HashMap<String, Reply>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(&self, path: &str, replies: impl IntoIterator<Item = Reply>) -> &Self {
        self.gets
            .lock()
            .unwrap()
            .insert(path.to_owned(), replies.into_iter().collect());
        self
    }

    pub fn on_create(&self, collection: &str, reply: Reply) -> &Self {
        self.creates.lock().unwrap().insert(collection.to_owned(), reply);
        self
    }

    pub fn on_update(&self, path: &str, reply: Reply) -> &Self {
        self.updates.lock().unwrap().insert(path.to_owned(), reply);
        self
    }

    pub fn on_delete(&self, path: &str, reply: Reply) -> &Self {
        self.deletes.lock().unwrap().insert(path.to_owned(), reply);
        self
    }

    pub fn on_list(&self, collection: &str, reply: Reply) -> &Self {
        self.lists.lock().unwrap().insert(collection.to_owned(), reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `METHOD path` for every call, in order.
    pub fn trace(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| format!("{} {}", c.method, c.path))
            .collect()
    }

    /// Bodies of the mutation calls, in order.
    pub fn bodies(&self) -> Vec<Value> {
        self.calls().into_iter().filter_map(|c| c.body).collect()
    }

    fn record(&self, method: &'static str, path: &str, body: Option<Value>) {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_owned(),
            body,
        });
    }

    fn next_get(&self, path: &str) -> Option<Reply> {
        let mut gets = self.gets.lock().unwrap();
        let queue = gets.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn unscripted(method: &str, path: &str) -> Error {
    Error::Api {
        message: format!("unscripted {method} {path}"),
        code: None,
        status: 500,
    }
}

fn status_error(status: u16) -> Error {
    Error::Api {
        message: format!("scripted status {status}"),
        code: None,
        status,
    }
}

fn resolve<T: serde::de::DeserializeOwned>(reply: Reply) -> Result<T, Error> {
    match reply {
        Reply::Ok(value) => Ok(serde_json::from_value(value).unwrap()),
        Reply::Status(status) => Err(status_error(status)),
    }
}

#[async_trait]
impl RemoteApi for ScriptedApi {
    async fn create<K: ResourceKind>(
        &self,
        collection: &str,
        request: &K::Create,
    ) -> Result<K::Entity, Error> {
        self.record("POST", collection, Some(serde_json::to_value(request).unwrap()));
        let reply = self.creates.lock().unwrap().get(collection).cloned();
        reply.map_or_else(|| Err(unscripted("POST", collection)), resolve)
    }

    async fn get<K: ResourceKind>(&self, path: &str) -> Result<K::Entity, Error> {
        self.record("GET", path, None);
        self.next_get(path)
            .map_or_else(|| Err(unscripted("GET", path)), resolve)
    }

    async fn update<K: ResourceKind>(
        &self,
        path: &str,
        patch: &K::Patch,
    ) -> Result<K::Entity, Error> {
        self.record("PATCH", path, Some(serde_json::to_value(patch).unwrap()));
        let reply = self.updates.lock().unwrap().get(path).cloned();
        reply.map_or_else(|| Err(unscripted("PATCH", path)), resolve)
    }

    async fn delete<K: ResourceKind>(&self, path: &str) -> Result<(), Error> {
        self.record("DELETE", path, None);
        let reply = self.deletes.lock().unwrap().get(path).cloned();
        match reply {
            Some(Reply::Ok(_)) => Ok(()),
            Some(Reply::Status(status)) => Err(status_error(status)),
            None => Err(unscripted("DELETE", path)),
        }
    }

    async fn list<K: ResourceKind>(
        &self,
        collection: &str,
        _filter: &ListFilter,
    ) -> Result<Vec<K::Entity>, Error> {
        self.record("LIST", collection, None);
        let reply = self.lists.lock().unwrap().get(collection).cloned();
        reply.map_or_else(|| Err(unscripted("LIST", collection)), resolve)
    }
}

/// Fast settings for paused-clock tests.
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        timeouts: OperationTimeouts {
            create: Duration::from_secs(60),
            update: Duration::from_secs(60),
            delete: Duration::from_secs(60),
        },
        initial_delay: Duration::from_secs(1),
        min_poll_interval: Duration::from_secs(2),
    }
}

// ── Wire fixtures ───────────────────────────────────────────────────

pub fn cluster(status: &str, version: &str) -> Value {
    serde_json::json!({
        "id": "c-1",
        "name": "prod",
        "region": "fra1",
        "version": version,
        "status": status,
        "auditLog": { "enabled": false },
        "acl": { "enabled": false, "rules": [] },
        "oidc": { "enabled": false },
        "endpoint": "https://c-1.k8s.example.test"
    })
}

pub fn node_pool(status: &str, node_count: u32, zones: &[&str]) -> Value {
    serde_json::json!({
        "id": "np-1",
        "clusterId": "c-1",
        "name": "pool-a",
        "flavor": "g2-standard-4",
        "nodeCount": node_count,
        "status": status,
        "autoscaling": { "enabled": false },
        "labels": {},
        "taints": [],
        "availabilityZones": zones
    })
}
