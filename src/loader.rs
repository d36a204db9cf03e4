//! Sequential loading of dashboard assets (locale and chart definitions).
//!
//! Assets load strictly one after another: a chart definition may name a
//! locale, and that locale must have been loaded by an earlier asset.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::charts::{presets, ChartConfig};
use crate::config::ContractVersion;
use crate::logging::{log, log_asset_loaded, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locale {
    pub name: String,
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Asset {
    Locale(Locale),
    Chart(ChartConfig),
}

impl Asset {
    pub fn kind(&self) -> &'static str {
        match self {
            Asset::Locale(_) => "locale",
            Asset::Chart(_) => "chart",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Asset::Locale(l) => &l.name,
            Asset::Chart(c) => &c.id,
        }
    }
}

/// Load order: locale first, base charts next, air-mass effect last.
pub fn default_assets(contract: ContractVersion) -> Vec<String> {
    let mut paths = vec![
        "locale_se.json",
        "mygrid_prod.json",
        "mygrid_incidence.json",
        "mygrid_temp.json",
    ];
    if contract == ContractVersion::Extended {
        paths.push("mygrid_ame.json");
    }
    paths.into_iter().map(String::from).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLoadError {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for ScriptLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error loading script: {} ({})", self.path, self.reason)
    }
}

impl std::error::Error for ScriptLoadError {}

#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;
}

/// Assets compiled into the binary.
pub struct EmbeddedAssetSource {
    assets: BTreeMap<String, Asset>,
}

impl EmbeddedAssetSource {
    pub fn new() -> Self {
        let mut assets = BTreeMap::new();
        assets.insert("locale_se.json".to_string(), Asset::Locale(presets::swedish()));
        for chart in presets::all() {
            assets.insert(format!("mygrid_{}.json", chart.id), Asset::Chart(chart));
        }
        Self { assets }
    }

    /// Write every embedded asset as `<dir>/<path>`; returns the written paths.
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut written = Vec::new();
        for (name, asset) in &self.assets {
            let path = dir.join(name);
            std::fs::write(&path, serde_json::to_vec_pretty(asset)?)
                .with_context(|| format!("writing {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }
}

impl Default for EmbeddedAssetSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetSource for EmbeddedAssetSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let asset = self
            .assets
            .get(path)
            .ok_or_else(|| anyhow!("no embedded asset named {}", path))?;
        Ok(serde_json::to_vec(asset)?)
    }
}

pub struct FsAssetSource {
    dir: PathBuf,
}

impl FsAssetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AssetSource for FsAssetSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.dir.join(path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("reading {}", full.display()))
    }
}

/// Assets served next to the backend endpoints.
pub struct HttpAssetSource {
    client: Client,
    base: Url,
}

impl HttpAssetSource {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.base.join(path)?;
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {} returned {}", url, status);
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

pub struct ScriptLoader {
    source: Box<dyn AssetSource>,
    locales: BTreeMap<String, Locale>,
}

impl ScriptLoader {
    pub fn new(source: Box<dyn AssetSource>) -> Self {
        Self {
            source,
            locales: BTreeMap::new(),
        }
    }

    pub fn locale(&self, name: &str) -> Option<&Locale> {
        self.locales.get(name)
    }

    /// Fetch, parse and register one asset. Returns once it is fully loaded.
    pub async fn load_sequentially(&mut self, path: &str) -> Result<Asset, ScriptLoadError> {
        let fail = |reason: String| ScriptLoadError {
            path: path.to_string(),
            reason,
        };
        let bytes = self
            .source
            .fetch(path)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;
        let asset: Asset = serde_json::from_slice(&bytes).map_err(|e| fail(e.to_string()))?;

        match &asset {
            Asset::Locale(locale) => {
                self.locales.insert(locale.name.clone(), locale.clone());
            }
            Asset::Chart(chart) => {
                if let Some(needed) = &chart.locale {
                    if !self.locales.contains_key(needed) {
                        return Err(fail(format!("locale {} is not loaded", needed)));
                    }
                }
            }
        }
        log_asset_loaded(path, asset.kind(), asset.name());
        Ok(asset)
    }

    /// Load `paths` in order, handing each asset to `on_loaded` before the
    /// next one is requested. The first failure ends the chain.
    pub async fn load_chain<F>(&mut self, paths: &[String], mut on_loaded: F) -> Result<(), ScriptLoadError>
    where
        F: FnMut(Asset) -> Result<()> + Send,
    {
        for path in paths {
            let asset = self.load_sequentially(path).await?;
            on_loaded(asset).map_err(|e| ScriptLoadError {
                path: path.clone(),
                reason: format!("{:#}", e),
            })?;
        }
        log(
            Level::Info,
            Domain::Loader,
            "chain_complete",
            obj(&[("count", serde_json::json!(paths.len())), ("msg", v_str("all assets loaded"))]),
        );
        Ok(())
    }
}
