//! Archive download with checksum verification and registry auth.
//!
//! Bottles hosted on the GitHub Container Registry answer anonymous requests
//! with 401 and a `WWW-Authenticate` challenge; the fetcher performs the
//! bearer-token dance and retries before giving up.

use crate::domain::{archive_ext, Package};
use crate::error::{ChatrError, Result};
use crate::traits::{Fetcher, ProgressSink};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

// Covers the whole operation including body transfer.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const GHCR_HOST: &str = "ghcr.io";

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

pub struct HttpFetcher {
    client: reqwest::Client,
    output_dir: PathBuf,
}

impl HttpFetcher {
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent("chatr")
            .build()?;
        Ok(Self { client, output_dir })
    }

    /// Exchange a `WWW-Authenticate: Bearer realm=…,service=…,scope=…`
    /// challenge for an anonymous pull token.
    async fn ghcr_token(&self, challenge: &str) -> Result<String> {
        let params = parse_bearer_challenge(challenge);
        let url = format!(
            "{}?service={}&scope={}",
            params.get("realm").map(String::as_str).unwrap_or_default(),
            params.get("service").map(String::as_str).unwrap_or_default(),
            params.get("scope").map(String::as_str).unwrap_or_default(),
        );

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ChatrError::UnexpectedStatus(resp.status().as_u16()));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token.token)
    }

    async fn download(
        &self,
        resp: reqwest::Response,
        dst: &Path,
        name: &str,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<String> {
        if let Some(sink) = progress {
            sink.start(name, resp.content_length());
        }

        let mut file = tokio::fs::File::create(dst).await?;
        let mut hasher = Sha256::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            if let Some(sink) = progress {
                sink.advance(name, chunk.len() as u64);
            }
        }
        file.flush().await?;

        if let Some(sink) = progress {
            sink.finish(name);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, pkg: &Package, progress: Option<&dyn ProgressSink>) -> Result<PathBuf> {
        let ext = ext_from_url(&pkg.download_url);
        let dst = self
            .output_dir
            .join(format!("{}-{}{}", pkg.name, pkg.version, ext));
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut resp = self.client.get(&pkg.download_url).send().await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED && is_ghcr(&pkg.download_url) {
            let challenge = resp
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let token = self.ghcr_token(&challenge).await?;
            resp = self
                .client
                .get(&pkg.download_url)
                .bearer_auth(token)
                .send()
                .await?;
        }

        if !resp.status().is_success() {
            return Err(ChatrError::UnexpectedStatus(resp.status().as_u16()));
        }

        let actual = self.download(resp, &dst, &pkg.name, progress).await?;

        if !pkg.sha256.is_empty() && !actual.eq_ignore_ascii_case(&pkg.sha256) {
            tokio::fs::remove_file(&dst).await.ok();
            return Err(ChatrError::ChecksumMismatch {
                expected: pkg.sha256.clone(),
                actual,
            });
        }

        Ok(dst)
    }
}

fn is_ghcr(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == GHCR_HOST))
        .unwrap_or(false)
}

/// Staging-file suffix for a download URL: match the basename against the
/// supported set, otherwise keep its final suffix verbatim.
fn ext_from_url(url: &str) -> String {
    let base = url.rsplit('/').next().unwrap_or(url);
    // Strip any query string before suffix matching.
    let base = base.split('?').next().unwrap_or(base);

    if let Some(ext) = archive_ext(base) {
        return ext.to_string();
    }

    match base.rfind('.') {
        Some(idx) => base[idx..].to_string(),
        None => String::new(),
    }
}

fn parse_bearer_challenge(header: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for part in header.split(',') {
        let part = part.trim().trim_start_matches("Bearer ");
        if let Some(idx) = part.find('=') {
            let key = part[..idx].to_string();
            let val = part[idx + 1..].trim_matches('"').to_string();
            params.insert(key, val);
        }
    }
    params
}
