use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;
use writeflow_ai_harness::{Credential, ModelCatalog, ProviderId, vendors};

/// Source of per-vendor API credentials.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credential(&self, vendor: &ProviderId) -> Option<Credential>;

    /// Vendors that currently have a credential, sorted.
    async fn configured_vendors(&self) -> Vec<ProviderId>;
}

/// Environment variables read by [`MemoryCredentialStore::from_env`], in
/// lookup order per vendor.
pub const VENDOR_KEY_ENVS: &[(&str, &[&str])] = &[
    (vendors::OPENAI, &["OPENAI_API_KEY"]),
    (vendors::ANTHROPIC, &["ANTHROPIC_API_KEY"]),
    (vendors::GOOGLE, &["GOOGLE_API_KEY", "GEMINI_API_KEY"]),
    (vendors::MISTRAL, &["MISTRAL_API_KEY"]),
];

/// In-process credential map. Changes invalidate the attached model catalog.
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: DashMap<ProviderId, Credential>,
    catalog: Option<Arc<ModelCatalog>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let store = Self::new();
        for (vendor, keys) in VENDOR_KEY_ENVS {
            let found = keys
                .iter()
                .filter_map(|key| lookup(key))
                .map(Credential::new)
                .find(|c| !c.is_blank());
            if let Some(credential) = found {
                store.keys.insert(ProviderId::new(*vendor), credential);
            }
        }
        store
    }

    pub fn with_catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_key(self, vendor: impl Into<ProviderId>, secret: impl Into<String>) -> Self {
        self.set(vendor, Credential::new(secret));
        self
    }

    pub fn set(&self, vendor: impl Into<ProviderId>, credential: Credential) {
        let vendor = vendor.into();
        self.keys.insert(vendor.clone(), credential);
        info!(event = "credential.updated", domain = "config", vendor = %vendor);
        self.notify(&vendor);
    }

    pub fn remove(&self, vendor: &ProviderId) -> bool {
        let removed = self.keys.remove(vendor).is_some();
        if removed {
            info!(event = "credential.removed", domain = "config", vendor = %vendor);
            self.notify(vendor);
        }
        removed
    }

    fn notify(&self, vendor: &ProviderId) {
        if let Some(catalog) = &self.catalog {
            catalog.invalidate(vendor);
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn credential(&self, vendor: &ProviderId) -> Option<Credential> {
        self.keys
            .get(vendor)
            .map(|entry| entry.value().clone())
            .filter(|c| !c.is_blank())
    }

    async fn configured_vendors(&self) -> Vec<ProviderId> {
        let mut vendors: Vec<ProviderId> = self.keys.iter().map(|e| e.key().clone()).collect();
        vendors.sort();
        vendors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn seeds_from_lookup_with_gemini_fallback() {
        let env = HashMap::from([
            ("OPENAI_API_KEY", "sk-1"),
            ("GEMINI_API_KEY", "g-1"),
            ("MISTRAL_API_KEY", "   "),
        ]);
        let store = MemoryCredentialStore::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(
            store.configured_vendors().await,
            vec![ProviderId::new("google"), ProviderId::new("openai")]
        );
        assert_eq!(
            store
                .credential(&ProviderId::new("google"))
                .await
                .map(|c| c.expose().to_string()),
            Some("g-1".to_string())
        );
    }

    #[tokio::test]
    async fn set_and_remove_round_trip() {
        let store = MemoryCredentialStore::new();
        let vendor = ProviderId::new("anthropic");
        assert!(store.credential(&vendor).await.is_none());
        store.set(vendor.clone(), Credential::new("k"));
        assert!(store.credential(&vendor).await.is_some());
        assert!(store.remove(&vendor));
        assert!(!store.remove(&vendor));
    }
}
