//! Homebrew JSON API client, formula and cask flavored.
//!
//! Single lookups hit `formula/<name>.json` (or `cask/<name>.json`) unless
//! the bulk index is already resident. The bulk index is fetched at most
//! once per process and mirrored to a TTL disk cache so back-to-back
//! searches stay off the network.

use crate::domain::Formula;
use crate::error::{ChatrError, Result};
use crate::platform;
use crate::traits::Registry;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::OnceCell;

const API_BASE: &str = "https://formulae.brew.sh/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const INDEX_TTL: Duration = Duration::from_secs(10 * 60);

/// Which upstream namespace this client serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Formula,
    Cask,
}

impl RegistryKind {
    fn single_url(&self, name: &str) -> String {
        match self {
            RegistryKind::Formula => format!("{}/formula/{}.json", API_BASE, name),
            RegistryKind::Cask => format!("{}/cask/{}.json", API_BASE, name),
        }
    }

    fn bulk_url(&self) -> String {
        match self {
            RegistryKind::Formula => format!("{}/formula.json", API_BASE),
            RegistryKind::Cask => format!("{}/cask.json", API_BASE),
        }
    }

    fn index_file(&self) -> &'static str {
        match self {
            RegistryKind::Formula => "formulae.json",
            RegistryKind::Cask => "casks.json",
        }
    }
}

pub struct HttpRegistry {
    kind: RegistryKind,
    client: reqwest::Client,
    cache_dir: PathBuf,
    index: OnceCell<HashMap<String, Formula>>,
    // Keeps repeated single lookups (shared deps across roots) off the wire.
    single_cache: moka::future::Cache<String, Formula>,
}

impl HttpRegistry {
    pub fn formulae(cache_dir: PathBuf) -> Result<Self> {
        Self::new(RegistryKind::Formula, cache_dir)
    }

    pub fn casks(cache_dir: PathBuf) -> Result<Self> {
        Self::new(RegistryKind::Cask, cache_dir)
    }

    fn new(kind: RegistryKind, cache_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("chatr")
            .build()?;
        Ok(Self {
            kind,
            client,
            cache_dir,
            index: OnceCell::new(),
            single_cache: moka::future::Cache::new(1000),
        })
    }

    async fn load_index(&self) -> Result<&HashMap<String, Formula>> {
        self.index
            .get_or_try_init(|| async {
                if let Some(bytes) = self.read_disk_cache() {
                    if let Ok(index) = self.decode_index(&bytes) {
                        return Ok(index);
                    }
                }

                let resp = self.client.get(self.kind.bulk_url()).send().await?;
                if !resp.status().is_success() {
                    return Err(ChatrError::UnexpectedStatus(resp.status().as_u16()));
                }

                let bytes = resp.bytes().await?;
                let index = self.decode_index(&bytes)?;
                self.write_disk_cache(&bytes);
                Ok(index)
            })
            .await
    }

    fn decode_index(&self, bytes: &[u8]) -> Result<HashMap<String, Formula>> {
        let formulae: Vec<Formula> = match self.kind {
            RegistryKind::Formula => {
                let raw: Vec<ApiFormula> = serde_json::from_slice(bytes)?;
                let candidates = platform::bottle_candidates();
                raw.into_iter().map(|f| f.into_formula(&candidates)).collect()
            }
            RegistryKind::Cask => {
                let raw: Vec<ApiCask> = serde_json::from_slice(bytes)?;
                raw.into_iter().map(ApiCask::into_formula).collect()
            }
        };
        Ok(formulae.into_iter().map(|f| (f.name.clone(), f)).collect())
    }

    fn decode_single(&self, bytes: &[u8]) -> Result<Formula> {
        match self.kind {
            RegistryKind::Formula => {
                let raw: ApiFormula = serde_json::from_slice(bytes)?;
                Ok(raw.into_formula(&platform::bottle_candidates()))
            }
            RegistryKind::Cask => {
                let raw: ApiCask = serde_json::from_slice(bytes)?;
                Ok(raw.into_formula())
            }
        }
    }

    fn read_disk_cache(&self) -> Option<Vec<u8>> {
        let path = self.cache_dir.join(self.kind.index_file());
        let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age > INDEX_TTL {
            return None;
        }
        std::fs::read(&path).ok()
    }

    fn write_disk_cache(&self, bytes: &[u8]) {
        if std::fs::create_dir_all(&self.cache_dir).is_ok() {
            let _ = std::fs::write(self.cache_dir.join(self.kind.index_file()), bytes);
        }
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn get(&self, name: &str) -> Result<Formula> {
        if let Some(index) = self.index.get() {
            if let Some(formula) = index.get(name) {
                return Ok(formula.clone());
            }
        }

        if let Some(cached) = self.single_cache.get(name).await {
            return Ok(cached);
        }

        let resp = self.client.get(self.kind.single_url(name)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ChatrError::NotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(ChatrError::UnexpectedStatus(resp.status().as_u16()));
        }

        let bytes = resp.bytes().await?;
        let formula = self.decode_single(&bytes)?;
        self.single_cache
            .insert(name.to_string(), formula.clone())
            .await;
        Ok(formula)
    }

    async fn search(&self, query: &str) -> Result<Vec<Formula>> {
        let index = self.load_index().await?;
        Ok(filter_and_sort(index.values(), query))
    }
}

fn filter_and_sort<'a, I>(formulae: I, query: &str) -> Vec<Formula>
where
    I: Iterator<Item = &'a Formula>,
{
    let query = query.to_lowercase();

    let mut results: Vec<Formula> = formulae
        .filter(|f| {
            f.name.to_lowercase().contains(&query)
                || f.description.to_lowercase().contains(&query)
        })
        .cloned()
        .collect();

    results.sort_by(|a, b| {
        let name_a = a.name.to_lowercase();
        let name_b = b.name.to_lowercase();

        let exact_b = name_b == query;
        let exact_a = name_a == query;
        let prefix_b = name_b.starts_with(&query);
        let prefix_a = name_a.starts_with(&query);

        exact_b
            .cmp(&exact_a)
            .then(prefix_b.cmp(&prefix_a))
            .then(name_a.cmp(&name_b))
    });

    results
}

// Upstream wire schemas.

#[derive(Debug, Default, Deserialize)]
struct ApiVersions {
    #[serde(default)]
    stable: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStableUrl {
    #[serde(default)]
    url: String,
    #[serde(default)]
    checksum: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUrls {
    #[serde(default)]
    stable: ApiStableUrl,
}

#[derive(Debug, Deserialize)]
struct ApiBottleFile {
    url: String,
    sha256: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiBottleStable {
    #[serde(default)]
    files: HashMap<String, ApiBottleFile>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiBottle {
    #[serde(default)]
    stable: ApiBottleStable,
}

#[derive(Debug, Deserialize)]
struct ApiFormula {
    name: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    versions: ApiVersions,
    #[serde(default)]
    revision: u32,
    #[serde(default)]
    urls: ApiUrls,
    #[serde(default)]
    bottle: ApiBottle,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl ApiFormula {
    /// Pick the first bottle matching a platform candidate, falling back to
    /// the source tarball.
    fn into_formula(self, candidates: &[&str]) -> Formula {
        let mut url = String::new();
        let mut sha256 = String::new();

        for tag in candidates {
            if let Some(file) = self.bottle.stable.files.get(*tag) {
                url = file.url.clone();
                sha256 = file.sha256.clone();
                break;
            }
        }

        if url.is_empty() && !self.urls.stable.url.is_empty() {
            url = self.urls.stable.url;
            sha256 = self.urls.stable.checksum;
        }

        Formula {
            name: self.name,
            description: self.desc.unwrap_or_default(),
            homepage: self.homepage.unwrap_or_default(),
            version: self.versions.stable.unwrap_or_default(),
            revision: self.revision.to_string(),
            url,
            sha256,
            dependencies: self.dependencies,
            is_cask: false,
            apps: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCask {
    token: String,
    #[serde(default)]
    name: Vec<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    artifacts: Vec<serde_json::Value>,
}

impl ApiCask {
    fn into_formula(self) -> Formula {
        // "no_check" means the publisher opts out of verification.
        let sha256 = match self.sha256 {
            Some(s) if s != "no_check" => s,
            _ => String::new(),
        };

        let desc = self.desc.unwrap_or_default();
        let description = match self.name.first() {
            Some(display) if !desc.is_empty() => format!("{} — {}", display, desc),
            Some(display) => display.clone(),
            None => desc,
        };

        Formula {
            name: self.token,
            description,
            homepage: self.homepage.unwrap_or_default(),
            version: self.version.unwrap_or_default(),
            revision: String::new(),
            url: self.url.unwrap_or_default(),
            sha256,
            dependencies: Vec::new(),
            is_cask: true,
            apps: parse_artifacts(&self.artifacts),
        }
    }
}

/// App bundle names: any artifact object with an `app` field holding an
/// array of strings.
fn parse_artifacts(artifacts: &[serde_json::Value]) -> Vec<String> {
    let mut apps = Vec::new();
    for artifact in artifacts {
        if let Some(list) = artifact.get("app").and_then(|a| a.as_array()) {
            apps.extend(list.iter().filter_map(|v| v.as_str().map(String::from)));
        }
    }
    apps
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_formula() -> ApiFormula {
        serde_json::from_value(json!({
            "name": "wget",
            "desc": "Internet file retriever",
            "homepage": "https://www.gnu.org/software/wget/",
            "versions": { "stable": "1.21.4" },
            "revision": 0,
            "urls": {
                "stable": {
                    "url": "https://ftp.gnu.org/gnu/wget/wget-1.21.4.tar.gz",
                    "checksum": "feedc0de"
                }
            },
            "bottle": {
                "stable": {
                    "files": {
                        "arm64_sequoia": { "url": "https://ghcr.io/a", "sha256": "aa" },
                        "x86_64_linux": { "url": "https://ghcr.io/b", "sha256": "bb" }
                    }
                }
            },
            "dependencies": ["openssl@3", "libidn2"]
        }))
        .unwrap()
    }

    #[test]
    fn bottle_selection_prefers_first_candidate() {
        let f = sample_formula().into_formula(&["arm64_sequoia", "all"]);
        assert_eq!(f.url, "https://ghcr.io/a");
        assert_eq!(f.sha256, "aa");
        assert_eq!(f.version, "1.21.4");
        assert_eq!(f.revision, "0");
        assert_eq!(f.dependencies, vec!["openssl@3", "libidn2"]);
    }

    #[test]
    fn bottle_selection_falls_back_to_source() {
        let f = sample_formula().into_formula(&["arm64_ventura", "all"]);
        assert_eq!(f.url, "https://ftp.gnu.org/gnu/wget/wget-1.21.4.tar.gz");
        assert_eq!(f.sha256, "feedc0de");
    }

    #[test]
    fn cask_maps_to_formula() {
        let cask: ApiCask = serde_json::from_value(json!({
            "token": "firefox",
            "name": ["Mozilla Firefox"],
            "desc": "Web browser",
            "homepage": "https://www.mozilla.org/firefox/",
            "version": "128.0",
            "url": "https://download.mozilla.org/Firefox%20128.0.dmg",
            "sha256": "no_check",
            "artifacts": [
                { "app": ["Firefox.app"] },
                { "zap": { "trash": ["~/Library/Caches/Firefox"] } }
            ]
        }))
        .unwrap();

        let f = cask.into_formula();
        assert_eq!(f.name, "firefox");
        assert_eq!(f.description, "Mozilla Firefox — Web browser");
        assert!(f.sha256.is_empty());
        assert!(f.is_cask);
        assert_eq!(f.apps, vec!["Firefox.app"]);
    }

    #[test]
    fn search_orders_exact_prefix_then_lexicographic() {
        let formulae = vec![
            Formula { name: "libwget".into(), description: "".into(), ..Default::default() },
            Formula { name: "wget2".into(), description: "".into(), ..Default::default() },
            Formula { name: "wget".into(), description: "".into(), ..Default::default() },
            Formula { name: "aria2".into(), description: "like wget".into(), ..Default::default() },
        ];

        let results = filter_and_sort(formulae.iter(), "wget");
        let names: Vec<&str> = results.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["wget", "wget2", "aria2", "libwget"]);
    }

    #[test]
    fn search_matches_descriptions() {
        let formulae = vec![Formula {
            name: "aria2".into(),
            description: "Download with resuming and segmented downloading".into(),
            ..Default::default()
        }];
        let results = filter_and_sort(formulae.iter(), "SEGMENTED");
        assert_eq!(results.len(), 1);
    }
}
