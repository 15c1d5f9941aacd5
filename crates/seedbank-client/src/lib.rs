//! HTTP transport for the seed store.
//!
//! Every call is one request and one response: no retries, no caching, no
//! timeout beyond what the underlying client is built with.

use reqwest::Response;
use seedbank_core::{
    AgentContext, MemoryType, Metadata, Seed, SeedQueryResult, Stats, StoreSeedResponse,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use reqwest::StatusCode;

pub const DEFAULT_API_BASE: &str = "http://localhost:9124";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Search,
    Query,
    Stats,
    StoreSeed,
    GetSeed,
    UpdateSeed,
    PatchMetadata,
    UpdateTags,
    FetchContexts,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::Query => "query",
            Operation::Stats => "stats",
            Operation::StoreSeed => "store seed",
            Operation::GetSeed => "get seed",
            Operation::UpdateSeed => "update seed",
            Operation::PatchMetadata => "patch metadata",
            Operation::UpdateTags => "update tags",
            Operation::FetchContexts => "fetch contexts",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{op} failed: {status}")]
    Status { op: Operation, status: StatusCode },
    #[error("{op} failed: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: reqwest::Error,
    },
    #[error("{op} failed: undecodable response: {source}")]
    Decode {
        op: Operation,
        #[source]
        source: reqwest::Error,
    },
    #[error("http client setup failed: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            ClientError::Status { op, .. }
            | ClientError::Transport { op, .. }
            | ClientError::Decode { op, .. } => Some(*op),
            ClientError::Build(_) => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Read side of the store as seen by the polling loops.
pub trait SeedSource: Send + Sync {
    fn search(
        &self,
        query: &str,
        limit: u32,
        threshold: f64,
    ) -> impl Future<Output = Result<Vec<Seed>, ClientError>> + Send;

    fn fetch_stats(&self) -> impl Future<Output = Result<Stats, ClientError>> + Send;

    fn fetch_health(&self) -> impl Future<Output = bool> + Send;

    fn fetch_contexts(
        &self,
        agent_id: Option<&str>,
        memory_type: Option<MemoryType>,
    ) -> impl Future<Output = Result<Vec<AgentContext>, ClientError>> + Send;
}

#[derive(Serialize)]
struct SeedBody<'a> {
    content: &'a str,
    metadata: &'a Metadata,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    limit: u32,
    threshold: f64,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<SeedQueryResult>,
}

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base: String,
}

impl StoreClient {
    pub fn new(base: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(http: reqwest::Client, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_connect_timeout(base: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::Build)?;
        Ok(Self::with_client(http, base))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `GET /search`; `threshold` is left off the request unless positive.
    pub async fn search(
        &self,
        query: &str,
        limit: u32,
        threshold: f64,
    ) -> Result<Vec<Seed>, ClientError> {
        let mut params = vec![("q", query.to_string()), ("limit", limit.to_string())];
        if threshold > 0.0 {
            params.push(("threshold", threshold.to_string()));
        }
        let req = self.http.get(self.url("/search")).query(&params);
        let resp = send(Operation::Search, req).await?;
        decode(Operation::Search, resp).await
    }

    /// `POST /seeds/query`, the reduced result shape. All fields always sent.
    pub async fn query_compat(
        &self,
        query: &str,
        limit: u32,
        threshold: f64,
    ) -> Result<Vec<SeedQueryResult>, ClientError> {
        let body = QueryBody {
            query,
            limit,
            threshold,
        };
        let req = self.http.post(self.url("/seeds/query")).json(&body);
        let resp = send(Operation::Query, req).await?;
        let parsed: QueryResponse = decode(Operation::Query, resp).await?;
        Ok(parsed.results)
    }

    pub async fn fetch_stats(&self) -> Result<Stats, ClientError> {
        let resp = send(Operation::Stats, self.http.get(self.url("/stats"))).await?;
        decode(Operation::Stats, resp).await
    }

    /// Any failure, including an unreachable host, reads as unhealthy.
    pub async fn fetch_health(&self) -> bool {
        match self.http.get(self.url("/health")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                debug!(event = "health_unreachable", error = %err);
                false
            }
        }
    }

    pub async fn create_record(
        &self,
        content: &str,
        metadata: Option<&Metadata>,
    ) -> Result<StoreSeedResponse, ClientError> {
        let empty = Metadata::new();
        let body = SeedBody {
            content,
            metadata: metadata.unwrap_or(&empty),
        };
        let req = self.http.post(self.url("/seeds")).json(&body);
        let resp = send(Operation::StoreSeed, req).await?;
        decode(Operation::StoreSeed, resp).await
    }

    pub async fn fetch_record(&self, id: i64) -> Result<Seed, ClientError> {
        let req = self.http.get(self.url(&format!("/seeds/{id}")));
        let resp = send(Operation::GetSeed, req).await?;
        decode(Operation::GetSeed, resp).await
    }

    /// Full overwrite of content and metadata.
    pub async fn replace_record(
        &self,
        id: i64,
        content: &str,
        metadata: &Metadata,
    ) -> Result<(), ClientError> {
        let body = SeedBody { content, metadata };
        let req = self.http.put(self.url(&format!("/seeds/{id}"))).json(&body);
        send(Operation::UpdateSeed, req).await.map(|_| ())
    }

    /// Server-side merge of `patch` into the existing metadata.
    pub async fn merge_metadata(&self, id: i64, patch: &Metadata) -> Result<(), ClientError> {
        let req = self
            .http
            .patch(self.url(&format!("/seeds/{id}/metadata")))
            .json(patch);
        send(Operation::PatchMetadata, req).await.map(|_| ())
    }

    /// Replaces the tag list.
    pub async fn set_tags(&self, id: i64, tags: &[String]) -> Result<(), ClientError> {
        let req = self
            .http
            .post(self.url(&format!("/seeds/{id}/tags")))
            .json(tags);
        send(Operation::UpdateTags, req).await.map(|_| ())
    }

    pub async fn fetch_contexts(
        &self,
        agent_id: Option<&str>,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<AgentContext>, ClientError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(agent_id) = agent_id.filter(|id| !id.is_empty()) {
            params.push(("agentId", agent_id.to_string()));
        }
        if let Some(memory_type) = memory_type {
            params.push(("memoryType", memory_type.as_str().to_string()));
        }
        let mut req = self.http.get(self.url("/agent-contexts"));
        if !params.is_empty() {
            req = req.query(&params);
        }
        let resp = send(Operation::FetchContexts, req).await?;
        decode(Operation::FetchContexts, resp).await
    }
}

impl SeedSource for StoreClient {
    fn search(
        &self,
        query: &str,
        limit: u32,
        threshold: f64,
    ) -> impl Future<Output = Result<Vec<Seed>, ClientError>> + Send {
        StoreClient::search(self, query, limit, threshold)
    }

    fn fetch_stats(&self) -> impl Future<Output = Result<Stats, ClientError>> + Send {
        StoreClient::fetch_stats(self)
    }

    fn fetch_health(&self) -> impl Future<Output = bool> + Send {
        StoreClient::fetch_health(self)
    }

    fn fetch_contexts(
        &self,
        agent_id: Option<&str>,
        memory_type: Option<MemoryType>,
    ) -> impl Future<Output = Result<Vec<AgentContext>, ClientError>> + Send {
        StoreClient::fetch_contexts(self, agent_id, memory_type)
    }
}

async fn send(op: Operation, req: reqwest::RequestBuilder) -> Result<Response, ClientError> {
    let resp = req
        .send()
        .await
        .map_err(|source| ClientError::Transport { op, source })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ClientError::Status { op, status });
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(op: Operation, resp: Response) -> Result<T, ClientError> {
    resp.json()
        .await
        .map_err(|source| ClientError::Decode { op, source })
}
