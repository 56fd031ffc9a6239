//! REST implementation of [`IndexService`] over `reqwest`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use protosync_shared::{ElasticsearchConfig, ProtoSyncError, Result};

use crate::{AliasAction, AliasMap, IndexService, MappingUpdate};

/// User-Agent string for admin requests.
const USER_AGENT: &str = concat!("protosync/", env!("CARGO_PKG_VERSION"));

/// Connect timeout, independent of the per-request timeout.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP client for the Elasticsearch admin API with bounded retries.
///
/// Connect failures, timeouts, HTTP 429 and HTTP 5xx are retried with
/// exponential backoff. Every other status is handed back to the caller.
pub struct ElasticClient {
    client: Client,
    base: String,
    reindex_timeout: Duration,
    max_attempts: u32,
    base_backoff: Duration,
}

impl ElasticClient {
    /// Build a client from the `[elasticsearch]` config section.
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let base = config.base_url()?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                ProtoSyncError::network(format!("failed to build HTTP client: {e}"), false)
            })?;

        Ok(Self {
            client,
            base: base.as_str().trim_end_matches('/').to_string(),
            reindex_timeout: Duration::from_secs(config.reindex_timeout_secs),
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Send a request, retrying transient failures.
    ///
    /// `build` is called once per attempt. Returns the first response whose
    /// status is not transient, whatever that status is.
    async fn execute<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.send(operation, true, build).await
    }

    /// Like [`execute`](Self::execute). A client-side timeout is retried only
    /// when `retry_timeouts` is set, since the server may still be working on
    /// the first request.
    async fn send<F>(&self, operation: &str, retry_timeouts: bool, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 1;
        let mut backoff = self.base_backoff;

        loop {
            let err = match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        return Ok(response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    ProtoSyncError::search(status.as_u16(), error_reason(&body))
                }
                Err(e) => ProtoSyncError::network(
                    format!("{operation}: {e}"),
                    e.is_connect() || (e.is_timeout() && retry_timeouts),
                ),
            };

            if !err.is_transient() || attempt >= self.max_attempts {
                return Err(err);
            }

            warn!(
                operation,
                attempt,
                error = %err,
                "transient failure, retrying in {:?}",
                backoff
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
            backoff *= 2;
        }
    }

    /// Execute and require a 2xx status, returning the JSON body (or null).
    async fn execute_ok<F>(&self, operation: &str, build: F) -> Result<Value>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.execute(operation, build).await?;
        read_ok(operation, response).await
    }
}

/// Require a 2xx status and parse the JSON body (or null).
async fn read_ok(operation: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        ProtoSyncError::network(format!("{operation}: failed to read body: {e}"), false)
    })?;

    if !status.is_success() {
        return Err(ProtoSyncError::search(status.as_u16(), error_reason(&body)));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| ProtoSyncError::validation(format!("{operation}: invalid JSON response: {e}")))
}

/// Per-index entry of a `GET /{name}/_alias` response.
#[derive(Debug, Deserialize)]
struct IndexAliases {
    #[serde(default)]
    aliases: BTreeMap<String, Value>,
}

/// Extract a readable reason from an Elasticsearch error body.
fn error_reason(body: &str) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.chars().take(200).collect(),
    };

    match &parsed["error"] {
        Value::String(s) => s.clone(),
        Value::Object(err) => {
            let kind = err.get("type").and_then(Value::as_str).unwrap_or("error");
            match err.get("reason").and_then(Value::as_str) {
                Some(reason) => format!("{kind}: {reason}"),
                None => kind.to_string(),
            }
        }
        _ => body.chars().take(200).collect(),
    }
}

impl IndexService for ElasticClient {
    #[instrument(skip(self, body))]
    async fn create_repository(&self, repository: &str, body: &Value) -> Result<()> {
        let url = self.endpoint(&format!("_snapshot/{repository}"));
        self.execute_ok("create_repository", |c| c.put(&url).json(body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_snapshot(&self, repository: &str, snapshot: &str) -> Result<()> {
        let url = self.endpoint(&format!(
            "_snapshot/{repository}/{snapshot}?wait_for_completion=true"
        ));
        let timeout = self.reindex_timeout;
        self.execute_ok("create_snapshot", |c| c.put(&url).timeout(timeout))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn index_exists(&self, name: &str) -> Result<bool> {
        let url = self.endpoint(name);
        let response = self.execute("index_exists", |c| c.head(&url)).await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(ProtoSyncError::search(
                s.as_u16(),
                format!("unexpected status checking '{name}'"),
            )),
        }
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, name: &str, body: &Value) -> Result<()> {
        let url = self.endpoint(name);
        self.execute_ok("create_index", |c| c.put(&url).json(body))
            .await?;
        debug!(index = name, "index created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        let url = self.endpoint(&format!("{index}/_alias/{alias}"));
        self.execute_ok("put_alias", |c| c.put(&url)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_aliases_for(&self, name: &str) -> Result<AliasMap> {
        let url = self.endpoint(&format!("{name}/_alias"));
        let body = self.execute_ok("get_aliases", |c| c.get(&url)).await?;

        let parsed: BTreeMap<String, IndexAliases> = serde_json::from_value(body)
            .map_err(|e| ProtoSyncError::validation(format!("unexpected alias listing: {e}")))?;

        Ok(parsed
            .into_iter()
            .map(|(index, entry)| (index, entry.aliases.into_keys().collect()))
            .collect())
    }

    #[instrument(skip(self, body))]
    async fn put_mapping(
        &self,
        index: &str,
        doc_type: &str,
        body: &Value,
    ) -> Result<MappingUpdate> {
        let url = self.endpoint(&format!("{index}/_mapping/{doc_type}"));
        let response = match self.execute("put_mapping", |c| c.put(&url).json(body)).await {
            Ok(r) => r,
            Err(e) if e.is_transient() => return Ok(MappingUpdate::TransientFailure(e.to_string())),
            Err(e) => return Err(e),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(MappingUpdate::Applied);
        }

        let reason = error_reason(&response.text().await.unwrap_or_default());
        if status == StatusCode::BAD_REQUEST {
            debug!(index, doc_type, %reason, "mapping rejected as conflicting");
            return Ok(MappingUpdate::Conflict);
        }
        Err(ProtoSyncError::search(status.as_u16(), reason))
    }

    #[instrument(skip(self))]
    async fn reindex(&self, source: &str, dest: &str) -> Result<()> {
        let url = self.endpoint("_reindex?wait_for_completion=true&refresh=true");
        let body = json!({
            "source": { "index": source },
            "dest": { "index": dest },
        });
        let timeout = self.reindex_timeout;

        let response = self
            .send("reindex", false, |c| c.post(&url).json(&body).timeout(timeout))
            .await?;
        let result = read_ok("reindex", response).await?;

        if result["timed_out"].as_bool() == Some(true) {
            return Err(ProtoSyncError::validation(format!(
                "reindex {source} -> {dest} timed out on the server"
            )));
        }
        if let Some(failures) = result["failures"].as_array().filter(|f| !f.is_empty()) {
            return Err(ProtoSyncError::validation(format!(
                "reindex {source} -> {dest} reported {} failures",
                failures.len()
            )));
        }

        debug!(
            source,
            dest,
            copied = result["total"].as_u64().unwrap_or(0),
            "reindex complete"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, name: &str) -> Result<()> {
        let url = self.endpoint(name);
        self.execute_ok("delete_index", |c| c.delete(&url)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(actions = actions.len()))]
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()> {
        let url = self.endpoint("_aliases");
        let body = json!({ "actions": actions });
        self.execute_ok("update_aliases", |c| c.post(&url).json(&body))
            .await?;
        Ok(())
    }
}
