/*
 *  rpc.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  HTTP client for the player server: slim.request JSON calls plus plain
 *  byte fetches for cover art.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },
    #[error("server response missing 'result' field")]
    MissingResult,
    #[error("server response missing 'id' field")]
    MissingId,
    #[error("server id mismatch: expected {expected}, received {received:?}")]
    IdMismatch { expected: u32, received: Option<u32> },
}

#[derive(Debug, Serialize)]
struct SlimRequest {
    id: u32,
    method: &'static str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SlimResponse {
    id: Option<u32>,
    result: Option<Value>,
    error: Option<ServerError>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: i32,
    message: String,
}

const SLIM_METHOD: &str = "slim.request";

/// Client for the server's JSON endpoint. Cheap to clone; the request id
/// counter is shared so concurrent poll workers never reuse an id.
#[derive(Debug, Clone)]
pub struct RpcClient {
    id: Arc<AtomicU32>,
    client: Client,
}

impl RpcClient {
    pub fn new() -> Self {
        const AGENT: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(AGENT));
        headers.insert("Content-Type", header::HeaderValue::from_static("application/json"));
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .http1_only()
            .connect_timeout(Duration::from_millis(500))
            .default_headers(headers)
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap(); // acceptable at client construction

        RpcClient {
            id: Arc::new(AtomicU32::new(1)),
            client,
        }
    }

    /// POST a `slim.request` for `player_mac` ("" or "-" for server-level
    /// commands) and return the `result` value. The response id must match
    /// the request id.
    pub async fn slim_request(
        &self,
        host: &str,
        port: u16,
        player_mac: &str,
        command: &str,
        inner_params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let request_id = self.id.fetch_add(1, Ordering::Relaxed);
        let url = format!("http://{}:{}/jsonrpc.js", host, port);

        // params shape: [player MAC, [command, value, value...]]
        let mut command_and_params = vec![json!(command)];
        command_and_params.extend(inner_params);
        let request = SlimRequest {
            id: request_id,
            method: SLIM_METHOD,
            params: vec![
                Value::String(player_mac.to_string()),
                Value::Array(command_and_params),
            ],
        };

        let response = self
            .client
            .post(&url)
            .body(serde_json::to_string(&request)?)
            .send()
            .await?;
        response.error_for_status_ref()?;
        let body = response.text().await?;

        let parsed: SlimResponse = serde_json::from_str(&body)?;
        if parsed.id.is_none() {
            return Err(RpcError::MissingId);
        }
        if parsed.id != Some(request_id) {
            return Err(RpcError::IdMismatch {
                expected: request_id,
                received: parsed.id,
            });
        }
        if let Some(err) = parsed.error {
            return Err(RpcError::Server {
                code: err.code,
                message: err.message,
            });
        }
        parsed.result.ok_or(RpcError::MissingResult)
    }

    /// Plain GET returning the raw body, used for artwork.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, RpcError> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}
