//! Block system: shared types and the registry of available blocks

mod traits;
pub mod ee_quota;
pub mod huawei;

pub use traits::*;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::host::Host;

/// Block identifier enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    EeQuota,
    Huawei,
}

impl ProviderId {
    pub fn all() -> Vec<ProviderId> {
        vec![ProviderId::EeQuota, ProviderId::Huawei]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::EeQuota => "ee_quota",
            ProviderId::Huawei => "huawei",
        }
    }

    pub fn parse(value: &str) -> Result<ProviderId, anyhow::Error> {
        match value {
            "ee_quota" | "ee-quota" | "ee" => Ok(ProviderId::EeQuota),
            "huawei" => Ok(ProviderId::Huawei),
            _ => Err(anyhow!("Unknown block: {value}")),
        }
    }
}

/// Urgency level of a block, mapped to a color by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Bad,
    Degraded,
    Good,
}

/// Two cutoffs splitting a health metric into three severities.
///
/// A value equal to a cutoff is not below it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub bad_threshold: f64,
    pub degraded_threshold: f64,
}

impl ThresholdPolicy {
    pub fn new(bad_threshold: f64, degraded_threshold: f64) -> Self {
        Self {
            bad_threshold,
            degraded_threshold,
        }
    }

    pub fn classify(&self, value: f64) -> Severity {
        if value < self.bad_threshold {
            Severity::Bad
        } else if value < self.degraded_threshold {
            Severity::Degraded
        } else {
            Severity::Good
        }
    }
}

/// Placeholder values and severity produced by one poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    values: BTreeMap<String, String>,
    severity: Option<Severity>,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for an unreachable source: no fields, bad severity
    pub fn down() -> Self {
        Self {
            values: BTreeMap::new(),
            severity: Some(Severity::Bad),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set_severity(&mut self, severity: Severity) {
        self.severity = Some(severity);
    }

    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when every required placeholder holds a non-empty value and a
    /// severity was derived.
    pub fn is_complete(&self, required: &[&str]) -> bool {
        self.severity.is_some()
            && required
                .iter()
                .all(|name| self.get(name).is_some_and(|value| !value.is_empty()))
    }
}

/// What the bar receives for one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResponse {
    pub full_text: String,
    pub color: String,
    pub cached_until: DateTime<Utc>,
}

/// Block state
struct ProviderState {
    cached_response: Option<BlockResponse>,
    fetcher: Box<dyn BlockProvider>,
}

/// Registry managing all blocks
pub struct ProviderRegistry {
    providers: RwLock<HashMap<ProviderId, ProviderState>>,
    host: Arc<dyn Host>,
}

impl ProviderRegistry {
    pub fn new(settings: &Settings, host: Arc<dyn Host>) -> Self {
        let mut providers = HashMap::new();

        providers.insert(
            ProviderId::EeQuota,
            ProviderState {
                cached_response: None,
                fetcher: Box::new(ee_quota::EeQuotaProvider::new(
                    settings.ee_quota.clone(),
                    host.clone(),
                )),
            },
        );

        providers.insert(
            ProviderId::Huawei,
            ProviderState {
                cached_response: None,
                fetcher: Box::new(huawei::HuaweiProvider::new(
                    settings.huawei.clone(),
                    host.clone(),
                )),
            },
        );

        Self {
            providers: RwLock::new(providers),
            host,
        }
    }

    /// Registry without any blocks
    pub fn empty(host: Arc<dyn Host>) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            host,
        }
    }

    pub async fn register(&self, id: ProviderId, fetcher: Box<dyn BlockProvider>) {
        self.providers.write().await.insert(
            id,
            ProviderState {
                cached_response: None,
                fetcher,
            },
        );
    }

    pub async fn describe(&self, id: &ProviderId) -> Option<(&'static str, &'static str)> {
        let providers = self.providers.read().await;
        providers
            .get(id)
            .map(|state| (state.fetcher.name(), state.fetcher.description()))
    }

    pub async fn cache_seconds(&self, id: &ProviderId) -> Option<i64> {
        let providers = self.providers.read().await;
        providers.get(id).map(|state| state.fetcher.cache_seconds())
    }

    /// Poll a block unconditionally and cache the response
    pub async fn poll(&self, id: &ProviderId) -> Result<BlockResponse, anyhow::Error> {
        let providers = self.providers.read().await;

        if let Some(state) = providers.get(id) {
            let response = state.fetcher.poll().await?;
            drop(providers);

            let mut providers = self.providers.write().await;
            if let Some(state) = providers.get_mut(id) {
                state.cached_response = Some(response.clone());
            }

            Ok(response)
        } else {
            Err(anyhow!("Block {:?} not found", id))
        }
    }

    /// Cached response while it is still valid, otherwise a fresh poll
    pub async fn poll_cached(&self, id: &ProviderId) -> Result<BlockResponse, anyhow::Error> {
        if let Some(response) = self.get_cached_response(id).await {
            tracing::debug!("Using cached response for {:?}", id);
            return Ok(response);
        }
        self.poll(id).await
    }

    pub async fn get_cached_response(&self, id: &ProviderId) -> Option<BlockResponse> {
        let providers = self.providers.read().await;
        let cached = providers.get(id)?.cached_response.as_ref()?;
        (cached.cached_until > self.host.now()).then(|| cached.clone())
    }
}
