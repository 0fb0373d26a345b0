//! Thin GitHub release API client.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const API_BASE: &str = "https://api.github.com";

/// One release of the upstream repository.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    /// Tag name (e.g. `v2.0.2`).
    pub tag_name: String,
    /// Human-facing release page URL.
    pub html_url: String,
    /// Numeric release id.
    pub id: u64,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Publication timestamp.
    pub published_at: Option<DateTime<Utc>>,
    /// Source archive URL.
    pub tarball_url: String,
    /// Downloadable assets attached to the release.
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    /// Asset filename, verbatim from the API.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

/// Build a GitHub API client with the conventional UA header and, when
/// `GITHUB_TOKEN` is set, bearer authentication.
///
/// # Errors
///
/// Fails only if the token produces an invalid header value.
pub fn build_client() -> Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static("rtlsdrlib-harvester"),
    );

    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
    }

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .build()?)
}

/// Fetch the latest published release of `owner/repo`.
///
/// # Errors
///
/// Any non-success API status or deserialization failure.
pub async fn fetch_latest_release(
    client: &reqwest::Client,
    repo_name: &str,
) -> Result<GithubRelease> {
    fetch_latest_release_at(client, API_BASE, repo_name).await
}

async fn fetch_latest_release_at(
    client: &reqwest::Client,
    api_base: &str,
    repo_name: &str,
) -> Result<GithubRelease> {
    let url = format!("{api_base}/repos/{repo_name}/releases/latest");
    let resp = client.get(&url).send().await?;

    if !resp.status().is_success() {
        anyhow::bail!("GitHub API error: {} for {}", resp.status(), url);
    }

    resp.json()
        .await
        .with_context(|| format!("failed to decode release metadata from {url}"))
}

/// Download the repository license into `dest_dir`, returning its path.
///
/// # Errors
///
/// API, network, or filesystem failures.
pub async fn fetch_license(
    client: &reqwest::Client,
    repo_name: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    fetch_license_at(client, API_BASE, repo_name, dest_dir).await
}

async fn fetch_license_at(
    client: &reqwest::Client,
    api_base: &str,
    repo_name: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let url = format!("{api_base}/repos/{repo_name}/license");
    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("GitHub API error: {} for {}", resp.status(), url);
    }

    #[derive(Deserialize)]
    struct LicenseEnvelope {
        name: String,
        download_url: String,
    }
    let envelope: LicenseEnvelope = resp.json().await?;

    let body = client
        .get(&envelope.download_url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    let dest = dest_dir.join(&envelope.name);
    tokio::fs::write(&dest, &body)
        .await
        .with_context(|| format!("failed to write license to {}", dest.display()))?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fetch_latest_release_decodes_assets() {
        let mut server = Server::new_async().await;
        let mock_url = server.url();

        let mock_body = r#"{
            "tag_name": "v2.0.2",
            "html_url": "https://github.com/librtlsdr/librtlsdr/releases/tag/v2.0.2",
            "id": 42,
            "created_at": "2023-04-01T12:00:00Z",
            "published_at": "2023-04-02T09:30:00Z",
            "tarball_url": "https://api.github.com/repos/librtlsdr/librtlsdr/tarball/v2.0.2",
            "assets": [
                {
                    "name": "librtlsdr_w64_static.zip",
                    "browser_download_url": "https://github.com/librtlsdr/librtlsdr/releases/download/v2.0.2/librtlsdr_w64_static.zip"
                }
            ]
        }"#;

        let _m = server
            .mock("GET", "/repos/librtlsdr/librtlsdr/releases/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(mock_body)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let release = fetch_latest_release_at(&client, &mock_url, "librtlsdr/librtlsdr")
            .await
            .unwrap();

        assert_eq!(release.tag_name, "v2.0.2");
        assert_eq!(release.id, 42);
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].name, "librtlsdr_w64_static.zip");
        assert!(release.created_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_license_writes_into_dest_dir() {
        let mut server = Server::new_async().await;
        let mock_url = server.url();

        let envelope = format!(
            r#"{{"name": "COPYING", "download_url": "{mock_url}/raw/COPYING"}}"#
        );
        let _m1 = server
            .mock("GET", "/repos/librtlsdr/librtlsdr/license")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(envelope)
            .create_async()
            .await;
        let _m2 = server
            .mock("GET", "/raw/COPYING")
            .with_status(200)
            .with_body("GNU GENERAL PUBLIC LICENSE")
            .create_async()
            .await;

        let dest = tempdir().unwrap();
        let client = reqwest::Client::new();
        let path = fetch_license_at(&client, &mock_url, "librtlsdr/librtlsdr", dest.path())
            .await
            .unwrap();

        assert_eq!(path, dest.path().join("COPYING"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("GNU GENERAL PUBLIC LICENSE"));
    }

    #[tokio::test]
    async fn test_fetch_latest_release_surfaces_api_errors() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/librtlsdr/librtlsdr/releases/latest")
            .with_status(404)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = fetch_latest_release_at(&client, &server.url(), "librtlsdr/librtlsdr")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GitHub API error"));
    }
}
