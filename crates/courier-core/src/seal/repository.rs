//! Seal repository trait definition and in-memory implementation.
//!
//! Uses RPITIT (return-position `impl Trait` in traits) for async methods.

use std::sync::Arc;

use courier_types::error::RepositoryError;
use courier_types::seal::Seal;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Storage port for seal records, keyed by link.
pub trait SealRepository: Send + Sync + 'static {
    fn get(
        &self,
        link: &str,
    ) -> impl std::future::Future<Output = Result<Option<Seal>, RepositoryError>> + Send;

    /// Insert a new record. Fails with `Conflict` if the link already has one.
    fn insert(
        &self,
        seal: &Seal,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Overwrite an existing record. Fails with `NotFound` if there is none.
    fn update(
        &self,
        seal: &Seal,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn remove(
        &self,
        link: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All seals, oldest request first.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Seal>, RepositoryError>> + Send;
}

/// Non-persistent [`SealRepository`]. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySealRepository {
    seals: Arc<DashMap<String, Seal>>,
}

impl MemorySealRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SealRepository for MemorySealRepository {
    async fn get(&self, link: &str) -> Result<Option<Seal>, RepositoryError> {
        Ok(self.seals.get(link).map(|s| s.clone()))
    }

    async fn insert(&self, seal: &Seal) -> Result<(), RepositoryError> {
        match self.seals.entry(seal.link.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "seal for link '{}' already exists",
                seal.link
            ))),
            Entry::Vacant(slot) => {
                slot.insert(seal.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, seal: &Seal) -> Result<(), RepositoryError> {
        match self.seals.get_mut(&seal.link) {
            Some(mut existing) => {
                *existing = seal.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn remove(&self, link: &str) -> Result<bool, RepositoryError> {
        Ok(self.seals.remove(link).is_some())
    }

    async fn list(&self) -> Result<Vec<Seal>, RepositoryError> {
        let mut seals: Vec<Seal> = self.seals.iter().map(|s| s.value().clone()).collect();
        seals.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.link.cmp(&b.link))
        });
        Ok(seals)
    }
}
