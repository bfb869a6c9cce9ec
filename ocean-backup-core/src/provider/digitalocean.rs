/*!
DigitalOcean provider adapter.

Talks to the DigitalOcean v2 REST API with `reqwest`. Droplet snapshots are
images and can be transferred between regions; volume snapshots cannot.
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use super::{AsyncSnapshotProvider, BlockingProvider};
use crate::config::BackupConfig;
use crate::{BackupError, Resource, ResourceKind, Result, Snapshot};

/// Page size requested when listing snapshots (API maximum)
const PER_PAGE: u32 = 200;

/// Blocking DigitalOcean provider used by the backup runner
pub type DigitalOceanProvider = BlockingProvider<DigitalOceanClient>;

/// DigitalOcean API client
///
/// # Authentication
/// Requests carry the configured personal access token as a bearer token.
/// The token needs read and write scope on droplets, volumes and images.
///
/// # Example
/// ```rust,no_run
/// use ocean_backup_core::provider::{DigitalOceanClient, BlockingProvider, SnapshotProvider};
/// use ocean_backup_core::Resource;
///
/// let client = DigitalOceanClient::new("dop_v1_...", "https://api.digitalocean.com")?;
/// let provider = BlockingProvider::new(client);
/// let snapshots = provider.list_snapshots(&Resource::droplet("3164494"))?;
/// # Ok::<(), ocean_backup_core::BackupError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DigitalOceanClient {
    http: Client,
    base_url: String,
    token: String,
}

impl DigitalOceanClient {
    /// Create a client for `base_url` authenticated with `token`
    ///
    /// # Errors
    /// Returns an error if the token is empty or the HTTP client cannot be built.
    pub fn new<S1, S2>(token: S1, base_url: S2) -> Result<Self>
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(BackupError::MissingToken);
        }

        let http = Client::builder()
            .user_agent(concat!("ocean-backup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackupError::http(format!("Failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(api_url = %base_url, "Initialized DigitalOcean client");

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Create a client from a loaded configuration
    pub fn from_config(config: &BackupConfig) -> Result<Self> {
        Self::new(config.token()?, config.api_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Send a request, mapping transport failures and non-2xx statuses
    async fn send(&self, op: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            let mapped = BackupError::http(format!("DigitalOcean {op} request failed: {e}"));
            record_provider_error();
            error!(operation = op, error = %mapped, "DigitalOcean request failed");
            mapped
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(operation = op, status = status.as_u16(), "DigitalOcean request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let mapped = map_api_error(status.as_u16(), &body);
        record_provider_error();
        error!(operation = op, status = status.as_u16(), error = %mapped, "DigitalOcean API error");
        Err(mapped)
    }

    fn snapshots_path(resource: &Resource) -> String {
        match resource.kind {
            ResourceKind::Droplet => format!("droplets/{}/snapshots", resource.id),
            ResourceKind::Volume => format!("volumes/{}/snapshots", resource.id),
        }
    }
}

#[async_trait]
impl AsyncSnapshotProvider for DigitalOceanClient {
    async fn create_snapshot(&self, resource: &Resource, name: &str) -> Result<()> {
        let (url, body) = match resource.kind {
            ResourceKind::Droplet => (
                self.url(&format!("droplets/{}/actions", resource.id)),
                json!({ "type": "snapshot", "name": name }),
            ),
            ResourceKind::Volume => (
                self.url(&format!("volumes/{}/snapshots", resource.id)),
                json!({ "name": name }),
            ),
        };

        debug!(resource = %resource, name = %name, "Requesting snapshot");
        self.send("create_snapshot", self.request(Method::POST, &url).json(&body))
            .await?;
        Ok(())
    }

    async fn list_snapshots(&self, resource: &Resource) -> Result<Vec<Snapshot>> {
        let mut url = format!(
            "{}?page=1&per_page={PER_PAGE}",
            self.url(&Self::snapshots_path(resource))
        );
        let mut snapshots = Vec::new();

        loop {
            let response = self
                .send("list_snapshots", self.request(Method::GET, &url))
                .await?;
            let body = response
                .text()
                .await
                .map_err(|e| BackupError::http(format!("Failed to read snapshot list: {e}")))?;

            let (page, next) = parse_snapshot_page(&body)?;
            snapshots.extend(page);

            match next {
                Some(next) if next != url => url = next,
                _ => break,
            }
        }

        debug!(resource = %resource, count = snapshots.len(), "Listed snapshots");
        Ok(snapshots)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let url = self.url(&format!("snapshots/{snapshot_id}"));
        self.send("delete_snapshot", self.request(Method::DELETE, &url))
            .await?;
        Ok(())
    }

    async fn transfer_snapshot(&self, snapshot_id: &str, region: &str) -> Result<()> {
        let url = self.url(&format!("images/{snapshot_id}/actions"));
        let body = json!({ "type": "transfer", "region": region });
        self.send(
            "transfer_snapshot",
            self.request(Method::POST, &url).json(&body),
        )
        .await?;
        Ok(())
    }
}

/// Build the blocking DigitalOcean provider for `config`
///
/// Fails with [`BackupError::MissingToken`] when no token is configured.
pub fn create_digitalocean_provider(config: &BackupConfig) -> Result<DigitalOceanProvider> {
    Ok(BlockingProvider::new(DigitalOceanClient::from_config(
        config,
    )?))
}

#[derive(Debug, Deserialize)]
struct SnapshotPage {
    #[serde(default)]
    snapshots: Vec<ApiSnapshot>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Pages,
}

#[derive(Debug, Default, Deserialize)]
struct Pages {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSnapshot {
    id: ApiId,
    name: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default)]
    size_gigabytes: Option<f64>,
}

/// Droplet snapshots have numeric IDs, volume snapshots UUIDs
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiId {
    Int(u64),
    Str(String),
}

impl From<ApiSnapshot> for Snapshot {
    fn from(api: ApiSnapshot) -> Self {
        let id = match api.id {
            ApiId::Int(n) => n.to_string(),
            ApiId::Str(s) => s,
        };
        Snapshot {
            id,
            name: api.name,
            created_at: api.created_at,
            regions: api.regions,
            size_gigabytes: api.size_gigabytes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    id: Option<String>,
    message: Option<String>,
}

/// Parse one page of a snapshot listing, returning the next page URL if any
fn parse_snapshot_page(body: &str) -> Result<(Vec<Snapshot>, Option<String>)> {
    let page: SnapshotPage = serde_json::from_str(body)?;
    let snapshots = page.snapshots.into_iter().map(Snapshot::from).collect();
    Ok((snapshots, page.links.pages.next))
}

/// Map a non-success response to [`BackupError::Api`]
fn map_api_error(status: u16, body: &str) -> BackupError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            message: Some(message),
            id,
        }) => match id {
            Some(id) => BackupError::api(status, format!("{message} ({id})")),
            None => BackupError::api(status, message),
        },
        _ if body.trim().is_empty() => BackupError::api(status, "empty response body"),
        _ => BackupError::api(status, body.trim()),
    }
}

fn record_provider_error() {
    #[cfg(feature = "metrics")]
    crate::observability::BackupMetrics::global().record_provider_error();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_token() {
        let result = DigitalOceanClient::new("  ", "https://api.digitalocean.com");
        assert!(matches!(result, Err(BackupError::MissingToken)));
    }

    #[test]
    fn test_from_config_without_token_fails() {
        let config = BackupConfig::default();
        assert!(matches!(
            DigitalOceanClient::from_config(&config),
            Err(BackupError::MissingToken)
        ));
    }

    #[test]
    fn test_url_building() {
        let client = DigitalOceanClient::new("token", "http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url("snapshots/42"),
            "http://localhost:8080/v2/snapshots/42"
        );
        assert_eq!(
            DigitalOceanClient::snapshots_path(&Resource::droplet("7")),
            "droplets/7/snapshots"
        );
        assert_eq!(
            DigitalOceanClient::snapshots_path(&Resource::volume("abc")),
            "volumes/abc/snapshots"
        );
    }

    #[test]
    fn test_parse_droplet_snapshot_page() {
        let body = r#"{
            "snapshots": [
                {
                    "id": 7938206,
                    "name": "web-autobackup-240101000000",
                    "distribution": "Ubuntu",
                    "slug": null,
                    "public": false,
                    "regions": ["nyc3", "nyc2"],
                    "created_at": "2024-01-01T00:00:10Z",
                    "type": "snapshot",
                    "min_disk_size": 25,
                    "size_gigabytes": 2.34
                }
            ],
            "links": {
                "pages": {
                    "last": "https://api.digitalocean.com/v2/droplets/3164494/snapshots?page=2&per_page=1",
                    "next": "https://api.digitalocean.com/v2/droplets/3164494/snapshots?page=2&per_page=1"
                }
            },
            "meta": { "total": 2 }
        }"#;

        let (snapshots, next) = parse_snapshot_page(body).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, "7938206");
        assert_eq!(snapshots[0].regions, vec!["nyc3", "nyc2"]);
        assert_eq!(snapshots[0].size_gigabytes, Some(2.34));
        assert_eq!(
            next.as_deref(),
            Some("https://api.digitalocean.com/v2/droplets/3164494/snapshots?page=2&per_page=1")
        );
    }

    #[test]
    fn test_parse_volume_snapshot_page() {
        let body = r#"{
            "snapshots": [
                {
                    "id": "8eb4d51a-873f-11e6-96bf-000f53315a41",
                    "name": "db-autobackup-240102030405",
                    "regions": ["nyc1"],
                    "created_at": "2024-01-02T03:04:05Z",
                    "resource_id": "82a48a18-873f-11e6-96bf-000f53315a41",
                    "resource_type": "volume",
                    "min_disk_size": 10,
                    "size_gigabytes": 0,
                    "tags": []
                }
            ],
            "links": {},
            "meta": { "total": 1 }
        }"#;

        let (snapshots, next) = parse_snapshot_page(body).unwrap();
        assert_eq!(snapshots[0].id, "8eb4d51a-873f-11e6-96bf-000f53315a41");
        assert_eq!(snapshots[0].name, "db-autobackup-240102030405");
        assert!(next.is_none());
    }

    #[test]
    fn test_parse_invalid_page_is_json_error() {
        assert!(matches!(
            parse_snapshot_page("<html>bad gateway</html>"),
            Err(BackupError::Json(_))
        ));
    }

    #[test]
    fn test_map_api_error_uses_message() {
        let error = map_api_error(
            404,
            r#"{"id":"not_found","message":"The resource you were accessing could not be found."}"#,
        );
        match error {
            BackupError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(
                    message,
                    "The resource you were accessing could not be found. (not_found)"
                );
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_map_api_error_falls_back_to_body() {
        match map_api_error(502, "Bad Gateway\n") {
            BackupError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }

        match map_api_error(500, "") {
            BackupError::Api { message, .. } => assert_eq!(message, "empty response body"),
            other => panic!("Expected Api error, got {other:?}"),
        }
    }
}
