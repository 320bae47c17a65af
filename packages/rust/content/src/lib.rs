//! Client for the narrative content service.
//!
//! The service extracts article text from web pages (`POST /extract`) and
//! hosts previously extracted narratives as text files (`GET /txt-files`,
//! `GET /files/{name}`). Each country's narrative is looked up as
//! `taxation_{key}.txt` first; the Wikipedia article is the fallback.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use taxrates_shared::countries::display_name;
use taxrates_shared::http::{ensure_success, transport_error};
use taxrates_shared::{ContentConfig, Result, TaxRatesError};

/// User-Agent string for content service requests.
const USER_AGENT: &str = concat!("taxrates/", env!("CARGO_PKG_VERSION"));

/// Narratives shorter than this are treated as unavailable.
pub const MIN_NARRATIVE_CHARS: usize = 100;

const WIKIPEDIA_BASE: &str = "https://en.wikipedia.org/wiki/";

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Hosted narrative file name for a country key.
pub fn narrative_file_name(key: &str) -> String {
    format!("taxation_{key}.txt")
}

/// Wikipedia "Taxation in ..." article for a country key.
pub fn wikipedia_url(key: &str) -> String {
    let title = display_name(key).replace(' ', "_");
    format!("{WIKIPEDIA_BASE}Taxation_in_{title}")
}

/// Whether a narrative is long enough to be worth extracting from.
pub fn is_usable(narrative: &str) -> bool {
    narrative.trim().chars().count() >= MIN_NARRATIVE_CHARS
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ExtractBody<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ExtractReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    content: String,
    #[serde(default)]
    error: Option<String>,
}

/// Metadata the service keeps per hosted file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub created_by_app: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_details: Option<serde_json::Value>,
}

/// Listing returned by `GET /txt-files`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxtFileListing {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub txt_files: Vec<String>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub files_info: BTreeMap<String, FileInfo>,
}

impl TxtFileListing {
    /// The hosted narrative file for `key`, if listed.
    pub fn file_for(&self, key: &str) -> Option<&str> {
        let name = narrative_file_name(key);
        self.txt_files
            .iter()
            .find(|f| **f == name)
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the content service.
#[derive(Debug, Clone)]
pub struct ContentClient {
    client: Client,
    base: Url,
    extract_timeout: Duration,
    health_timeout: Duration,
}

impl ContentClient {
    /// The service may live under a path prefix (`http://host/api`);
    /// endpoints are resolved below it.
    pub fn new(config: &ContentConfig) -> Result<Self> {
        let mut base = Url::parse(&config.service_url).map_err(|e| {
            TaxRatesError::config(format!("invalid content service URL `{}`: {e}", config.service_url))
        })?;
        if !base.path().ends_with('/') {
            let prefix = format!("{}/", base.path());
            base.set_path(&prefix);
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TaxRatesError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            extract_timeout: Duration::from_secs(config.extract_timeout_secs),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }

    /// Resolve `path` relative to the base, keeping any path prefix.
    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TaxRatesError::config(format!("invalid endpoint `{path}`: {e}")))
    }

    /// `GET /health`. Never errors; an unreachable service is unhealthy.
    pub async fn health(&self) -> bool {
        let Ok(url) = self.endpoint("health") else {
            return false;
        };
        match self.client.get(url).timeout(self.health_timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "content service health check failed");
                false
            }
        }
    }

    /// `POST /extract` for a page URL. `Ok(None)` when the service reports
    /// that extraction failed.
    #[instrument(skip(self))]
    pub async fn extract(&self, page_url: &str) -> Result<Option<String>> {
        let url = self.endpoint("extract")?;
        let response = self
            .client
            .post(url.clone())
            .timeout(self.extract_timeout)
            .json(&ExtractBody { url: page_url })
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;
        let reply: ExtractReply = ensure_success(url.as_str(), response)
            .await?
            .json()
            .await
            .map_err(|e| TaxRatesError::parse(format!("{url}: invalid extract reply: {e}")))?;

        if !reply.success {
            debug!(error = ?reply.error, "service reported extraction failure");
            return Ok(None);
        }
        debug!(chars = reply.content.len(), "extracted page content");
        Ok(Some(reply.content))
    }

    /// `GET /txt-files`.
    pub async fn list_txt_files(&self) -> Result<TxtFileListing> {
        let url = self.endpoint("txt-files")?;
        let response = self
            .client
            .get(url.clone())
            .timeout(self.extract_timeout)
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;
        let listing: TxtFileListing = ensure_success(url.as_str(), response)
            .await?
            .json()
            .await
            .map_err(|e| TaxRatesError::parse(format!("{url}: invalid listing: {e}")))?;
        if !listing.success {
            return Err(TaxRatesError::parse(format!("{url}: service reported failure")));
        }
        Ok(listing)
    }

    /// `GET /files/{name}`, returning the raw text body.
    pub async fn fetch_file(&self, name: &str) -> Result<String> {
        let url = self.endpoint(&format!("files/{name}"))?;
        let response = self
            .client
            .get(url.clone())
            .timeout(self.extract_timeout)
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;
        ensure_success(url.as_str(), response)
            .await?
            .text()
            .await
            .map_err(|e| transport_error(url.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> ContentClient {
        ContentClient::new(&ContentConfig {
            service_url: server.uri(),
            ..ContentConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn naming() {
        assert_eq!(narrative_file_name("south_korea"), "taxation_south_korea.txt");
        assert_eq!(
            wikipedia_url("united_kingdom"),
            "https://en.wikipedia.org/wiki/Taxation_in_United_Kingdom"
        );
        assert!(!is_usable("short"));
        assert!(is_usable(&"x".repeat(MIN_NARRATIVE_CHARS)));
    }

    #[tokio::test]
    async fn service_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/files/taxation_ukraine.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ukraine narrative"))
            .expect(1)
            .mount(&server)
            .await;

        for service_url in [format!("{}/api", server.uri()), format!("{}/api/", server.uri())] {
            let content = ContentClient::new(&ContentConfig {
                service_url,
                ..ContentConfig::default()
            })
            .unwrap();
            assert_eq!(content.endpoint("/health").unwrap().path(), "/api/health");
            assert_eq!(content.endpoint("txt-files").unwrap().path(), "/api/txt-files");
        }

        let content = ContentClient::new(&ContentConfig {
            service_url: format!("{}/api", server.uri()),
            ..ContentConfig::default()
        })
        .unwrap();
        assert!(content.health().await);
        assert_eq!(content.fetch_file("taxation_ukraine.txt").await.unwrap(), "Ukraine narrative");
    }

    #[tokio::test]
    async fn extract_posts_page_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(body_json(json!({"url": "https://en.wikipedia.org/wiki/Taxation_in_Estonia"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "content": "Estonia has a flat income tax."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let content = client(&server)
            .extract(&wikipedia_url("estonia"))
            .await
            .unwrap();
        assert_eq!(content.as_deref(), Some("Estonia has a flat income tax."));
    }

    #[tokio::test]
    async fn reported_failure_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "page not found"
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).extract("https://x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client(&server).extract("https://x").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn lists_and_fetches_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/txt-files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "txt_files": ["taxation_estonia.txt", "notes.txt"],
                "count": 2,
                "files_info": {
                    "taxation_estonia.txt": {"file_size": 2048, "created_by_app": true}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/taxation_estonia.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Estonia narrative"))
            .mount(&server)
            .await;

        let client = client(&server);
        let listing = client.list_txt_files().await.unwrap();
        assert_eq!(listing.count, 2);
        assert_eq!(listing.file_for("estonia"), Some("taxation_estonia.txt"));
        assert_eq!(listing.file_for("latvia"), None);
        assert_eq!(listing.files_info["taxation_estonia.txt"].file_size, Some(2048));

        let text = client.fetch_file("taxation_estonia.txt").await.unwrap();
        assert_eq!(text, "Estonia narrative");
    }

    #[tokio::test]
    async fn health_reflects_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        assert!(!client(&server).health().await);

        let down = ContentClient::new(&ContentConfig {
            service_url: "http://127.0.0.1:9".into(),
            ..ContentConfig::default()
        })
        .unwrap();
        assert!(!down.health().await);
    }
}
