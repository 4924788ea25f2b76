use std::collections::BTreeSet;

use tracing::{debug, info, warn};
use tuffix_core::{PackageIntent, PackageManager, TuffixError};

use crate::process::{terminate_lock_holders, ProcessTable};

const LOCKED_RESOURCE: &str = "apt";

/// Why a refresh or a staged batch did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    /// Another process holds the package manager lock; `holder` is its pid when known.
    ResourceHeld { holder: Option<u32>, detail: String },
    Other(String),
}

/// A package cache opened for one batch. Dropping it releases the cache.
pub trait PackageCache {
    fn contains(&self, name: &str) -> Result<bool, TuffixError>;

    fn mark(&mut self, name: &str, intent: PackageIntent);

    fn commit(&mut self) -> Result<(), BackendFailure>;
}

pub trait PackageBackend {
    type Cache: PackageCache;

    /// Refresh the package index.
    fn refresh(&mut self) -> Result<(), BackendFailure>;

    fn open(&mut self) -> Result<Self::Cache, TuffixError>;

    fn autoremove(&mut self) -> Result<(), TuffixError>;
}

/// [`PackageManager`] that stages whole batches on a [`PackageBackend`] and
/// clears lock contention by terminating the holder.
#[derive(Debug)]
pub struct TransactionExecutor<B, P> {
    backend: B,
    processes: P,
}

impl<B, P> TransactionExecutor<B, P>
where
    B: PackageBackend,
    P: ProcessTable,
{
    pub fn new(backend: B, processes: P) -> Self {
        Self { backend, processes }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn processes(&self) -> &P {
        &self.processes
    }

    /// Turn a backend failure into an error, terminating the lock holder first
    /// when the package manager was busy.
    fn recover(
        &mut self,
        failure: BackendFailure,
        context: impl FnOnce() -> String,
    ) -> TuffixError {
        match failure {
            BackendFailure::ResourceHeld { holder, detail } => {
                warn!(%detail, "package manager lock is held by another process");
                let terminated = terminate_lock_holders(&mut self.processes, holder);
                TuffixError::ResourceHeld {
                    resource: LOCKED_RESOURCE.to_string(),
                    terminated,
                }
            }
            BackendFailure::Other(detail) => {
                TuffixError::package_manager(format!("{}: {detail}", context()))
            }
        }
    }
}

impl<B, P> PackageManager for TransactionExecutor<B, P>
where
    B: PackageBackend,
    P: ProcessTable,
{
    fn apply(
        &mut self,
        packages: &BTreeSet<String>,
        intent: PackageIntent,
    ) -> Result<(), TuffixError> {
        if packages.is_empty() {
            debug!(intent = intent.as_str(), "no packages to apply");
            return Ok(());
        }

        info!(
            count = packages.len(),
            intent = intent.as_str(),
            "adding packages to the apt queue"
        );
        if let Err(failure) = self.backend.refresh() {
            return Err(self.recover(failure, || {
                "failed to refresh the package index".to_string()
            }));
        }
        let mut cache = self.backend.open()?;

        for name in packages {
            if !cache.contains(name)? {
                return Err(TuffixError::PackageNotFound(name.clone()));
            }
            debug!(package = %name, intent = intent.as_str(), "staged package");
            cache.mark(name, intent);
        }

        let committed = cache.commit();
        drop(cache);

        committed.map_err(|failure| {
            self.recover(failure, || {
                let names = packages.iter().cloned().collect::<Vec<_>>().join(", ");
                format!("could not {} {names}", intent.as_str())
            })
        })
    }

    fn autoremove(&mut self) -> Result<(), TuffixError> {
        self.backend.autoremove()
    }
}
