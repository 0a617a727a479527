//! Meta Quest store graph client.
//!
//! Two transports are supported:
//! - GraphQL: POST a `node(id:)` query to the public endpoint, no token.
//! - Graph API: GET `/{app_id}?fields=...` with an access token.
//!
//! Either way one request is made per app, bounded by the client timeout.
//! Any failure is logged and surfaces to the caller as "no data".

use super::{deserialize_lenient_string, AppMetadata, MetadataSource, VersionCode, UNKNOWN};
use crate::config::{MetaConfig, Transport};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const APP_QUERY: &str = r#"
query AppVersion($id: ID!) {
  node(id: $id) {
    ... on Application {
      id
      displayName
      latest_supported_binary {
        version
        version_code
      }
    }
  }
}
"#;

const GRAPH_API_FIELDS: &str = "id,name,version_name,version_code,release_date,updated_time";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response has no application data")]
    MissingApp,
}

// ─── GraphQL response shape ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<GraphQlData>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    #[serde(default)]
    node: Option<ApplicationNode>,
}

#[derive(Debug, Deserialize)]
struct ApplicationNode {
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
    #[serde(default)]
    latest_supported_binary: Option<BinaryInfo>,
}

#[derive(Debug, Deserialize)]
struct BinaryInfo {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    version: Option<String>,
    #[serde(default)]
    version_code: Option<VersionCode>,
}

// ─── Graph API response shape ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphApiApp {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    version_name: Option<String>,
    #[serde(default)]
    version_code: Option<VersionCode>,
}

/// Parse a GraphQL `node` response. The node must carry a display name;
/// binary fields fall back to [`UNKNOWN`].
pub fn parse_graphql(body: &str) -> Result<AppMetadata, FetchError> {
    let resp: GraphQlResponse = serde_json::from_str(body)?;
    let node = resp
        .data
        .and_then(|d| d.node)
        .ok_or(FetchError::MissingApp)?;
    let name = node.display_name.ok_or(FetchError::MissingApp)?;
    let (version, version_code) = match node.latest_supported_binary {
        Some(bin) => (bin.version, bin.version_code),
        None => (None, None),
    };

    Ok(AppMetadata {
        name,
        version: version.unwrap_or_else(|| UNKNOWN.to_string()),
        version_code: version_code.unwrap_or_default(),
    })
}

/// Parse a Graph API app object. Requires `name`.
pub fn parse_graph_api(body: &str) -> Result<AppMetadata, FetchError> {
    let app: GraphApiApp = serde_json::from_str(body)?;
    let name = app.name.ok_or(FetchError::MissingApp)?;

    Ok(AppMetadata {
        name,
        version: app.version_name.unwrap_or_else(|| UNKNOWN.to_string()),
        version_code: app.version_code.unwrap_or_default(),
    })
}

pub struct MetaClient {
    client: reqwest::Client,
    transport: Transport,
    graphql_url: String,
    graph_url: String,
    access_token: String,
}

impl MetaClient {
    pub fn new(config: &MetaConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        if config.transport == Transport::GraphApi && config.access_token.is_empty() {
            warn!("graph_api transport selected without an access token (set META_ACCESS_TOKEN)");
        }

        Ok(Self {
            client,
            transport: config.transport,
            graphql_url: config.graphql_url.clone(),
            graph_url: config.graph_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    /// Fetch metadata for one app, reporting why it failed.
    pub async fn try_fetch(&self, app_id: &str) -> Result<AppMetadata, FetchError> {
        let request = match self.transport {
            Transport::Graphql => self.client.post(&self.graphql_url).json(&json!({
                "query": APP_QUERY,
                "variables": { "id": app_id },
            })),
            Transport::GraphApi => self
                .client
                .get(format!("{}/{}", self.graph_url, app_id))
                .query(&[
                    ("access_token", self.access_token.as_str()),
                    ("fields", GRAPH_API_FIELDS),
                ]),
        };

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = resp.text().await?;
        let metadata = match self.transport {
            Transport::Graphql => parse_graphql(&body)?,
            Transport::GraphApi => parse_graph_api(&body)?,
        };

        debug!(
            app_id = app_id,
            name = %metadata.name,
            version = %metadata.version,
            "fetched app metadata"
        );

        Ok(metadata)
    }
}

impl MetadataSource for MetaClient {
    async fn fetch(&self, app_id: &str) -> Option<AppMetadata> {
        match self.try_fetch(app_id).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(app_id = app_id, error = %e, "could not fetch app info");
                None
            }
        }
    }
}
