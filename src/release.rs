//! Release feed queries and asset selection
//!
//! The launcher treats the GitHub releases API as the source of truth for
//! "what is the latest published artifact version". Releases are picked by
//! the feed's own publish ordering (`releases/latest`), not by comparing
//! version tags.

#![allow(async_fn_in_trait)]

use crate::errors::{Error, Result};
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

const GITHUB_API: &str = "https://api.github.com";

/// The GitHub API rejects requests without a user agent.
const USER_AGENT: &str = concat!("updating-launcher/", env!("CARGO_PKG_VERSION"));

/// The most recent published release of the watched repository.
///
/// Recomputed on every poll; never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseDescriptor {
    /// Version tag of the release
    #[serde(rename = "tag_name")]
    pub tag: String,
    /// Downloadable assets, in the order the feed lists them
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// Asset filename
    pub name: String,
    /// Direct download URL
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    /// Advertised size in bytes, used to verify the download completed
    pub size: u64,
}

impl ReleaseDescriptor {
    /// Selects the first asset whose filename fully matches `pattern`.
    ///
    /// When several assets match, the first in listed order wins; that
    /// tie-break is a documented convention, not an ordering guarantee.
    pub fn matching_asset(&self, pattern: &Regex) -> Result<&ReleaseAsset> {
        self.assets
            .iter()
            .find(|asset| full_match(pattern, &asset.name))
            .ok_or_else(|| Error::NoMatchingAsset(pattern.as_str().to_owned()))
    }
}

/// Whether `pattern` matches the whole of `text`, not just a substring.
fn full_match(pattern: &Regex, text: &str) -> bool {
    pattern
        .find(text)
        .is_some_and(|m| m.start() == 0 && m.end() == text.len())
}

/// Seam over the release feed so update orchestration can be driven
/// without a network.
pub trait ReleaseSource {
    /// The most recently published release, by the feed's own ordering.
    async fn find_latest(&self) -> Result<ReleaseDescriptor>;
    /// The raw bytes of one release asset.
    async fn download(&self, asset: &ReleaseAsset) -> Result<Vec<u8>>;
}

/// [`ReleaseSource`] backed by the GitHub releases API.
pub struct ReleaseChecker {
    owner: String,
    repo: String,
    api_base: String,
    client: reqwest::Client,
}

impl ReleaseChecker {
    /// Creates a checker for `owner/repo` against the public GitHub API.
    ///
    /// # Errors
    /// Returns `Error::Network` if the HTTP client cannot be constructed.
    pub fn new(owner: &str, repo: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            api_base: GITHUB_API.to_owned(),
            client,
        })
    }
}

impl ReleaseSource for ReleaseChecker {
    async fn find_latest(&self) -> Result<ReleaseDescriptor> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, self.owner, self.repo
        );
        debug!("querying release feed at {url}");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            // 404 is the feed's way of saying "no release yet"; it is not a
            // transport failure and must stay distinguishable from one.
            StatusCode::NOT_FOUND => Err(Error::NotFound),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(Error::Network(format!(
                "release feed returned HTTP {status}"
            ))),
        }
    }

    async fn download(&self, asset: &ReleaseAsset) -> Result<Vec<u8>> {
        debug!("downloading {} from {}", asset.name, asset.download_url);
        let response = self.client.get(&asset.download_url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "download of {} returned HTTP {}",
                asset.name,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        // Stream-completed check only; the feed publishes no checksums.
        if bytes.len() as u64 != asset.size {
            return Err(Error::Network(format!(
                "short download for {}: got {} bytes, expected {}",
                asset.name,
                bytes.len(),
                asset.size
            )));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::init_test_tracing;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn release(tag: &str, names: &[&str]) -> ReleaseDescriptor {
        ReleaseDescriptor {
            tag: tag.to_owned(),
            assets: names
                .iter()
                .map(|name| ReleaseAsset {
                    name: (*name).to_owned(),
                    download_url: format!("https://example.invalid/{name}"),
                    size: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_selects_first_fully_matching_asset() {
        let descriptor = release("1.0", &["app-1.0.jar", "app-1.0.zip"]);
        let pattern = Regex::new(r"app-.*\.jar").unwrap();
        let asset = descriptor.matching_asset(&pattern).unwrap();
        assert_eq!(asset.name, "app-1.0.jar");
    }

    #[test]
    fn test_listed_order_breaks_ties() {
        let descriptor = release("1.0", &["app-b.jar", "app-a.jar"]);
        let pattern = Regex::new(r"app-.*\.jar").unwrap();
        let asset = descriptor.matching_asset(&pattern).unwrap();
        assert_eq!(
            asset.name, "app-b.jar",
            "the first asset in listed order should win"
        );
    }

    #[test]
    fn test_substring_match_is_not_enough() {
        let descriptor = release("1.0", &["prefix-app-1.0.jar-suffix"]);
        let pattern = Regex::new(r"app-.*\.jar").unwrap();
        assert!(
            matches!(
                descriptor.matching_asset(&pattern),
                Err(Error::NoMatchingAsset(_))
            ),
            "pattern must match the whole filename"
        );
    }

    #[test]
    fn test_no_matching_asset() {
        let descriptor = release("1.0", &["app-1.0.zip"]);
        let pattern = Regex::new(r"app-.*\.jar").unwrap();
        assert!(matches!(
            descriptor.matching_asset(&pattern),
            Err(Error::NoMatchingAsset(_))
        ));
    }

    #[test]
    fn test_parses_feed_json() {
        let body = r#"{
            "tag_name": "v1.2.3",
            "name": "v1.2.3",
            "prerelease": false,
            "assets": [
                {
                    "name": "bot-1.2.3.jar",
                    "browser_download_url": "https://example.invalid/bot-1.2.3.jar",
                    "size": 12345,
                    "content_type": "application/java-archive"
                }
            ]
        }"#;
        let descriptor: ReleaseDescriptor = serde_json::from_str(body).unwrap();
        assert_eq!(descriptor.tag, "v1.2.3");
        assert_eq!(descriptor.assets.len(), 1);
        assert_eq!(descriptor.assets[0].size, 12345);
    }

    /// Serves exactly one canned HTTP response on an ephemeral port.
    async fn one_shot_http(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = stream.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn checker_for(api_base: String) -> ReleaseChecker {
        ReleaseChecker {
            owner: "example".to_owned(),
            repo: "bot".to_owned(),
            api_base,
            client: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn test_http_404_is_not_found() {
        init_test_tracing();
        let base = one_shot_http("404 Not Found", "{}").await;
        let checker = checker_for(base);
        assert!(
            matches!(checker.find_latest().await, Err(Error::NotFound)),
            "a 404 means no release yet, not a network failure"
        );
    }

    #[tokio::test]
    async fn test_http_500_is_network_error() {
        init_test_tracing();
        let base = one_shot_http("500 Internal Server Error", "{}").await;
        let checker = checker_for(base);
        assert!(matches!(
            checker.find_latest().await,
            Err(Error::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_find_latest_parses_success() {
        init_test_tracing();
        let base = one_shot_http(
            "200 OK",
            r#"{"tag_name":"v2.0","assets":[{"name":"bot-2.0.jar","browser_download_url":"https://example.invalid/bot-2.0.jar","size":4}]}"#,
        )
        .await;
        let checker = checker_for(base);
        let descriptor = checker.find_latest().await.unwrap();
        assert_eq!(descriptor.tag, "v2.0");
        assert_eq!(descriptor.assets[0].name, "bot-2.0.jar");
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_network_error() {
        init_test_tracing();
        // Bind and immediately drop a listener so the port is closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let checker = checker_for(format!("http://{addr}"));
        assert!(matches!(
            checker.find_latest().await,
            Err(Error::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_download_verifies_size() {
        init_test_tracing();
        let base = one_shot_http("200 OK", "abcd").await;
        let checker = checker_for(String::new());
        let asset = ReleaseAsset {
            name: "bot.jar".to_owned(),
            download_url: format!("{base}/bot.jar"),
            size: 9999,
        };
        assert!(
            matches!(checker.download(&asset).await, Err(Error::Network(_))),
            "a byte count short of the advertised size must be rejected"
        );
    }

    #[tokio::test]
    async fn test_download_accepts_complete_payload() {
        init_test_tracing();
        let base = one_shot_http("200 OK", "abcd").await;
        let checker = checker_for(String::new());
        let asset = ReleaseAsset {
            name: "bot.jar".to_owned(),
            download_url: format!("{base}/bot.jar"),
            size: 4,
        };
        assert_eq!(checker.download(&asset).await.unwrap(), b"abcd");
    }
}
