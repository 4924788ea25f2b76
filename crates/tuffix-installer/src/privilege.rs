use tuffix_core::TuffixError;

pub trait PrivilegeCheck {
    fn ensure_privileged(&self) -> Result<(), TuffixError>;
}

/// Requires an effective uid of 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootPrivilege;

impl PrivilegeCheck for RootPrivilege {
    fn ensure_privileged(&self) -> Result<(), TuffixError> {
        if unsafe { libc::geteuid() } == 0 {
            return Ok(());
        }
        Err(TuffixError::Permission(
            "this command changes system packages and must be run as root (try sudo)".to_string(),
        ))
    }
}
