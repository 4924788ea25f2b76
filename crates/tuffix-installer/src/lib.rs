mod apt;
mod executor;
mod layout;
mod mark;
mod privilege;
mod process;
mod state;

pub use apt::{AptBackend, AptCache};
pub use executor::{BackendFailure, PackageBackend, PackageCache, TransactionExecutor};
pub use layout::StateLayout;
pub use mark::{AssumeYes, Confirmer, MarkEngine, MarkFailure, MarkOutcome};
pub use privilege::{PrivilegeCheck, RootPrivilege};
pub use process::{terminate_lock_holders, HostProcessTable, ProcessTable, LOCK_HOLDER_NAMES};
pub use state::{State, StateStore};

/// The executor wired to the host's apt and process table.
pub type HostPackageManager = TransactionExecutor<AptBackend, HostProcessTable>;

pub fn host_package_manager() -> HostPackageManager {
    TransactionExecutor::new(AptBackend, HostProcessTable)
}

#[cfg(test)]
mod tests;
