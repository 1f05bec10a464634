use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::errors::ProviderError;
use crate::harness::Harness;
use crate::model::{Credential, ProviderId};

struct CatalogEntry {
    models: Arc<Vec<String>>,
    fetched_at: Instant,
}

/// Time-boxed cache of the models each vendor offers.
///
/// Shared across runs. Entries expire after `ttl`; call
/// [`ModelCatalog::invalidate`] whenever a vendor credential changes.
pub struct ModelCatalog {
    harness: Harness,
    ttl: Duration,
    entries: DashMap<ProviderId, CatalogEntry>,
    /// Bumped by every invalidation; a fetch only lands if its epoch survived.
    epochs: DashMap<ProviderId, u64>,
}

impl ModelCatalog {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

    pub fn new(harness: Harness, ttl: Duration) -> Self {
        Self {
            harness,
            ttl,
            entries: DashMap::new(),
            epochs: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the fresh cached list for `provider`, if any.
    pub fn cached(&self, provider: &ProviderId) -> Option<Arc<Vec<String>>> {
        let entry = self.entries.get(provider)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.models.clone())
    }

    /// Returns the model list, fetching through the vendor when the cache is
    /// empty or stale.
    pub async fn models(
        &self,
        provider: &ProviderId,
        credential: &Credential,
    ) -> Result<Arc<Vec<String>>, ProviderError> {
        if let Some(models) = self.cached(provider) {
            return Ok(models);
        }
        debug!(event = "catalog.refresh", domain = "ai", provider = %provider, "fetching model list");
        let started = *self.epochs.entry(provider.clone()).or_insert(0);
        let mut models = self.harness.list_models(provider, credential).await?;
        models.sort();
        models.dedup();
        let models = Arc::new(models);

        // Held across the insert; an invalidation cannot slip in between.
        let epoch = self.epochs.entry(provider.clone()).or_insert(0);
        if *epoch == started {
            self.entries.insert(
                provider.clone(),
                CatalogEntry {
                    models: models.clone(),
                    fetched_at: Instant::now(),
                },
            );
        } else {
            debug!(
                event = "catalog.refresh_discarded",
                domain = "ai",
                provider = %provider,
                "model list invalidated while fetching"
            );
        }
        Ok(models)
    }

    /// Drops the cached list for one vendor, including a fetch still in flight.
    pub fn invalidate(&self, provider: &ProviderId) {
        let mut epoch = self.epochs.entry(provider.clone()).or_insert(0);
        *epoch += 1;
        if self.entries.remove(provider).is_some() {
            debug!(event = "catalog.invalidated", domain = "ai", provider = %provider, "model list invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        // Every fetch registers its vendor here first, so bumping each known
        // epoch also covers lists that are not cached yet.
        for mut epoch in self.epochs.iter_mut() {
            *epoch += 1;
            self.entries.remove(epoch.key());
        }
        self.entries.clear();
    }
}
