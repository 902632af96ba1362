//! JSON-RPC 2.0 client for the remote download engine
//!
//! Requests go out as HTTP POSTs carrying a `{jsonrpc, id, method, params}`
//! envelope. When a secret is configured it is sent as `token:<secret>` in
//! front of the positional params, which is how aria2 authenticates RPC calls.
//! This layer never retries.

use crate::error::EngineError;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use swarmcast_types::{EngineConfig, EngineFile, EngineStatus, EngineVersion, GlobalStat};
use tracing::debug;

/// Client bound to one engine endpoint
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    endpoint: url::Url,
    secret: Option<String>,
    method_prefix: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client from engine settings
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let endpoint = url::Url::parse(&config.endpoint)
            .map_err(|e| EngineError::InvalidConfig(format!("endpoint {}: {}", config.endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(EngineError::InvalidConfig(format!(
                "endpoint {} must use http or https",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("Swarmcast/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            method_prefix: config.method_prefix.clone(),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// Build the request envelope for `method` without sending it
    fn envelope(&self, method: &str, params: Vec<Value>) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let mut final_params = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            final_params.push(Value::String(format!("token:{}", secret)));
        }
        final_params.extend(params);

        json!({
            "jsonrpc": "2.0",
            "id": format!("swarmcast-{}", id),
            "method": format!("{}.{}", self.method_prefix, method),
            "params": final_params,
        })
    }

    /// Send one call and return its raw `result`
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, EngineError> {
        let payload = self.envelope(method, params);
        debug!(method = %payload["method"], id = %payload["id"], "Engine RPC call");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string());
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let mut body: Value = response.json().await?;

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(EngineError::Protocol {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown engine error")
                    .to_string(),
            });
        }

        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(EngineError::MalformedResponse(
                "response carries neither result nor error".to_string(),
            )),
        }
    }

    // ========================================================================
    // Engine Methods
    // ========================================================================

    /// Submit a URI (magnet, http, file...) and return the engine's GID
    pub async fn add_uri(
        &self,
        uri: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<String, EngineError> {
        let result = self.call("addUri", vec![json!([uri]), json!(options)]).await?;
        expect_string(result, "addUri")
    }

    pub async fn tell_status(&self, gid: &str) -> Result<EngineStatus, EngineError> {
        let result = self.call("tellStatus", vec![json!(gid)]).await?;
        let mut status = parse_status(&result)?;
        if status.gid.is_empty() {
            status.gid = gid.to_string();
        }
        Ok(status)
    }

    pub async fn remove(&self, gid: &str) -> Result<String, EngineError> {
        let result = self.call("remove", vec![json!(gid)]).await?;
        expect_string(result, "remove")
    }

    pub async fn get_version(&self) -> Result<EngineVersion, EngineError> {
        let result = self.call("getVersion", Vec::new()).await?;
        let version = result
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::MalformedResponse("getVersion: missing version".to_string()))?
            .to_string();
        let enabled_features = result
            .get("enabledFeatures")
            .and_then(Value::as_array)
            .map(|features| {
                features
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(EngineVersion {
            version,
            enabled_features,
        })
    }

    pub async fn tell_active(&self) -> Result<Vec<EngineStatus>, EngineError> {
        let result = self.call("tellActive", Vec::new()).await?;
        let entries = result
            .as_array()
            .ok_or_else(|| EngineError::MalformedResponse("tellActive: expected an array".to_string()))?;
        entries.iter().map(parse_status).collect()
    }

    pub async fn get_global_stat(&self) -> Result<GlobalStat, EngineError> {
        let result = self.call("getGlobalStat", Vec::new()).await?;
        if !result.is_object() {
            return Err(EngineError::MalformedResponse(
                "getGlobalStat: expected an object".to_string(),
            ));
        }
        Ok(GlobalStat {
            download_speed: lenient_u64(result.get("downloadSpeed")),
            upload_speed: lenient_u64(result.get("uploadSpeed")),
            num_active: lenient_u64(result.get("numActive")),
            num_waiting: lenient_u64(result.get("numWaiting")),
            num_stopped: lenient_u64(result.get("numStopped")),
        })
    }
}

fn expect_string(value: Value, method: &str) -> Result<String, EngineError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(EngineError::MalformedResponse(format!(
            "{}: expected a string, got {}",
            method, other
        ))),
    }
}

// ============================================================================
// Defensive parsing
// ============================================================================

/// Reads a byte count or speed the engine may send as a string or a number.
/// Missing, negative or non-numeric input becomes 0.
pub fn lenient_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn lenient_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Normalize a raw `tellStatus` object
pub fn parse_status(raw: &Value) -> Result<EngineStatus, EngineError> {
    if !raw.is_object() {
        return Err(EngineError::MalformedResponse(format!(
            "tellStatus: expected an object, got {}",
            raw
        )));
    }

    let files = raw
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .map(|f| EngineFile {
                    path: f.get("path").and_then(Value::as_str).unwrap_or_default().to_string(),
                    length: lenient_u64(f.get("length")),
                    completed_length: lenient_u64(f.get("completedLength")),
                    selected: lenient_bool(f.get("selected")),
                })
                .collect()
        })
        .unwrap_or_default();

    let total_length = lenient_u64(raw.get("totalLength"));
    let mut completed_length = lenient_u64(raw.get("completedLength"));
    if total_length > 0 {
        completed_length = completed_length.min(total_length);
    }

    Ok(EngineStatus {
        gid: raw.get("gid").and_then(Value::as_str).unwrap_or_default().to_string(),
        status: raw.get("status").and_then(Value::as_str).unwrap_or_default().to_string(),
        total_length,
        completed_length,
        download_speed: lenient_u64(raw.get("downloadSpeed")),
        upload_speed: lenient_u64(raw.get("uploadSpeed")),
        connections: lenient_u64(raw.get("connections")),
        files,
        error_message: raw
            .get("errorMessage")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEngine;
    use tokio_test::{assert_err, assert_ok};

    fn config_for(endpoint: String, secret: Option<&str>) -> EngineConfig {
        EngineConfig {
            endpoint,
            secret: secret.map(str::to_string),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(lenient_u64(Some(&json!("1000"))), 1000);
        assert_eq!(lenient_u64(Some(&json!(42))), 42);
        assert_eq!(lenient_u64(Some(&json!("abc"))), 0);
        assert_eq!(lenient_u64(Some(&json!(-5))), 0);
        assert_eq!(lenient_u64(Some(&json!(null))), 0);
        assert_eq!(lenient_u64(None), 0);
    }

    #[test]
    fn status_parsing_tolerates_missing_fields() {
        let status = assert_ok!(parse_status(&json!({"status": "active"})));
        assert_eq!(status.total_length, 0);
        assert_eq!(status.completed_length, 0);
        assert_eq!(status.progress(), 0.0);
        assert!(status.files.is_empty());
        assert!(status.error_message.is_none());

        let status = assert_ok!(parse_status(&json!({
            "gid": "abc",
            "status": "active",
            "totalLength": "2000",
            "completedLength": "3000",
            "files": [{"path": "/x/a.mkv", "length": "2000", "selected": "true"}]
        })));
        assert_eq!(status.completed_length, 2000);
        assert_eq!(status.progress(), 1.0);
        assert!(status.files[0].selected);

        assert_err!(parse_status(&json!("nope")));
    }

    #[test]
    fn envelope_prepends_secret_and_counts_ids() {
        let client = RpcClient::new(&config_for("http://127.0.0.1:6800/jsonrpc".into(), Some("s3cr3t"))).unwrap();
        let first = client.envelope("tellStatus", vec![json!("gid1")]);
        let second = client.envelope("tellStatus", vec![json!("gid1")]);

        assert_eq!(first["jsonrpc"], "2.0");
        assert_eq!(first["method"], "aria2.tellStatus");
        assert_eq!(first["params"], json!(["token:s3cr3t", "gid1"]));
        assert_eq!(first["id"], "swarmcast-1");
        assert_eq!(second["id"], "swarmcast-2");

        let open = RpcClient::new(&config_for("http://127.0.0.1:6800/jsonrpc".into(), Some(""))).unwrap();
        assert_eq!(open.envelope("getVersion", Vec::new())["params"], json!([]));
    }

    #[test]
    fn rejects_unusable_endpoints() {
        assert!(matches!(
            RpcClient::new(&config_for("not a url".into(), None)),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            RpcClient::new(&config_for("ftp://engine/jsonrpc".into(), None)),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn add_uri_sends_uri_and_options() {
        let engine = FakeEngine::start().await;
        engine.respond("aria2.addUri", json!({"result": "2089b05ecca3d829"}));
        let client = RpcClient::new(&config_for(engine.url(), Some("tok"))).unwrap();

        let mut options = BTreeMap::new();
        options.insert("dir".to_string(), "/downloads".to_string());
        let gid = client.add_uri("magnet:?xt=urn:btih:abc", &options).await.unwrap();

        assert_eq!(gid, "2089b05ecca3d829");
        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0]["params"],
            json!(["token:tok", ["magnet:?xt=urn:btih:abc"], {"dir": "/downloads"}])
        );
    }

    #[tokio::test]
    async fn engine_error_object_is_a_protocol_error() {
        let engine = FakeEngine::start().await;
        engine.respond(
            "aria2.tellStatus",
            json!({"error": {"code": 1, "message": "GID 0000 is not found"}}),
        );
        let client = RpcClient::new(&config_for(engine.url(), None)).unwrap();

        match client.tell_status("0000").await {
            Err(EngineError::Protocol { code, message }) => {
                assert_eq!(code, 1);
                assert_eq!(message, "GID 0000 is not found");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let engine = FakeEngine::start().await;
        engine.fail_http("aria2.getVersion", 503);
        let client = RpcClient::new(&config_for(engine.url(), None)).unwrap();

        let err = client.get_version().await.unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(err, EngineError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn unreachable_engine_is_a_transport_error() {
        let client = RpcClient::new(&config_for("http://127.0.0.1:9/jsonrpc".into(), None)).unwrap();
        let err = client.get_global_stat().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn typed_wrappers_validate_shape() {
        let engine = FakeEngine::start().await;
        engine.respond("aria2.remove", json!({"result": 17}));
        engine.respond(
            "aria2.getVersion",
            json!({"result": {"version": "1.37.0", "enabledFeatures": ["BitTorrent", "Metalink"]}}),
        );
        engine.respond(
            "aria2.tellActive",
            json!({"result": [{"gid": "a", "status": "active", "totalLength": "10", "completedLength": "5"}]}),
        );
        engine.respond(
            "aria2.getGlobalStat",
            json!({"result": {"downloadSpeed": "300", "numActive": "1", "numWaiting": "0", "numStopped": "4"}}),
        );
        let client = RpcClient::new(&config_for(engine.url(), None)).unwrap();

        assert!(matches!(
            client.remove("a").await,
            Err(EngineError::MalformedResponse(_))
        ));

        let version = client.get_version().await.unwrap();
        assert_eq!(version.version, "1.37.0");
        assert_eq!(version.enabled_features, vec!["BitTorrent", "Metalink"]);

        let active = client.tell_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].progress(), 0.5);

        let stat = client.get_global_stat().await.unwrap();
        assert_eq!(stat.download_speed, 300);
        assert_eq!(stat.num_stopped, 4);
    }
}
