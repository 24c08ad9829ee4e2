//! Scripted in-memory transport for tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::{ApiError, ApiResult};
use crate::transport::{ApiRequest, Method, Transport};

/// Replays queued responses per `(method, path)`
///
/// Responses are consumed in order; the last one for a route is repeated.
/// Every request is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<ApiResult<Option<Json>>>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, path: &str, response: ApiResult<Option<Json>>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    pub fn ok(&self, method: Method, path: &str, body: Json) -> &Self {
        self.on(method, path, Ok(Some(body)))
    }

    pub fn no_content(&self, method: Method, path: &str) -> &Self {
        self.on(method, path, Ok(None))
    }

    pub fn not_found(&self, method: Method, path: &str) -> &Self {
        self.on(
            method,
            path,
            Err(ApiError::from_response(
                404,
                r#"{"errors":[{"code":"not_found","message":"Not found"}],"trace":"t-404"}"#,
            )),
        )
    }

    pub fn fail(&self, method: Method, path: &str, status: u16) -> &Self {
        self.on(method, path, Err(ApiError::from_response(status, "")))
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests sent to `(method, path)`
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<Option<Json>> {
        let key = (request.method, request.path.clone());
        self.requests.lock().unwrap().push(request);

        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&key).ok_or_else(|| {
            ApiError::Transport(format!("no scripted response for {} {}", key.0, key.1))
        })?;
        if queue.len() > 1 {
            queue
                .pop_front()
                .ok_or_else(|| ApiError::Transport("empty script".to_string()))?
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| ApiError::Transport("empty script".to_string()))?
        }
    }
}
