//! Lookups against the platform's Anaconda package channel.
//!
//! Availability comes from `channeldata.json` (one fetch per client). Version
//! lists come from the per-platform `repodata.json` indexes.

use crate::component::package_name;
use crate::error::{Result, SnowdevError};
use crate::registrar::SNOWPARK_PACKAGE;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

pub const SUBDIRS: &[&str] = &["noarch", "linux-64"];

#[derive(Deserialize)]
struct ChannelData {
    #[serde(default)]
    packages: HashMap<String, serde::de::IgnoredAny>,
}

#[derive(Deserialize)]
struct RepoData {
    #[serde(default)]
    packages: HashMap<String, RepoEntry>,
    #[serde(default, rename = "packages.conda")]
    packages_conda: HashMap<String, RepoEntry>,
}

#[derive(Deserialize)]
struct RepoEntry {
    name: String,
    version: String,
}

/// `Scikit_Learn` → `scikit-learn`
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}

pub struct ChannelClient {
    client: Client,
    base_url: String,
    available: Option<BTreeSet<String>>,
}

impl ChannelClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("snowdev/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            available: None,
        })
    }

    fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        tracing::debug!(%url, "fetching channel index");
        let response = self.client.get(&url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SnowdevError::UnexpectedResponse(format!("GET {url}: HTTP {status}")));
        }
        Ok(response.json()?)
    }

    fn available(&mut self) -> Result<&BTreeSet<String>> {
        let available = match self.available.take() {
            Some(set) => set,
            None => {
                let data: ChannelData = self.fetch("channeldata.json")?;
                data.packages.into_keys().map(|k| normalize(&k)).collect()
            }
        };
        Ok(self.available.insert(available))
    }

    pub fn is_available(&mut self, name: &str) -> Result<bool> {
        let name = normalize(name);
        Ok(self.available()?.contains(&name))
    }

    /// Distinct versions of `name` across [`SUBDIRS`], oldest first.
    pub fn versions(&self, name: &str) -> Result<Vec<String>> {
        let name = normalize(name);
        let mut versions = BTreeMap::new();
        for subdir in SUBDIRS {
            let repo: RepoData = self.fetch(&format!("{subdir}/repodata.json"))?;
            for entry in repo.packages.into_values().chain(repo.packages_conda.into_values()) {
                if normalize(&entry.name) == name {
                    versions.insert(version_key(&entry.version), entry.version);
                }
            }
        }
        Ok(versions.into_values().collect())
    }

    /// Names from `packages` that the channel does not carry. Version
    /// specifiers are ignored; the Snowpark client and `skip` are not checked.
    pub fn unavailable(&mut self, packages: &[String], skip: &[String]) -> Result<Vec<String>> {
        let skip: BTreeSet<String> = skip.iter().map(|s| normalize(s)).collect();
        let mut missing = Vec::new();
        for spec in packages {
            let name = package_name(spec);
            let normalized = normalize(name);
            if normalized == SNOWPARK_PACKAGE || skip.contains(&normalized) {
                continue;
            }
            if !self.is_available(name)? {
                missing.push(name.to_string());
            }
        }
        Ok(missing)
    }

    /// Fail with `PackagesUnavailable` if any package is missing.
    pub fn check(&mut self, packages: &[String], skip: &[String]) -> Result<()> {
        let missing = self.unavailable(packages, skip)?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SnowdevError::PackagesUnavailable(missing))
        }
    }
}

/// Sort key ordering `1.10.0` after `1.9.2`. Non-numeric segments sort
/// after numeric ones, lexically.
fn version_key(version: &str) -> Vec<(u64, String)> {
    version
        .split(|c: char| c == '.' || c == '-' || c == '_')
        .map(|part| match part.parse::<u64>() {
            Ok(n) => (n, String::new()),
            Err(_) => (u64::MAX, part.to_string()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
