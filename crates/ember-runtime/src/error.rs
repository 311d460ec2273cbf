//! Runtime errors.

use ember_vm::VmError;
use thiserror::Error;

/// Failure recorded against a runtime instance. Nothing escapes the public
/// entry calls as a panic; every failure becomes one of these.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// Fatal VM failure: broken program or misconfigured host. Never retried.
    #[error(transparent)]
    Vm(#[from] VmError),

    /// A native handler reported or raised a failure. The run itself
    /// completed; the script saw null in place of the result.
    #[error("native '{native}' failed: {message}")]
    NativeFailure { native: String, message: String },

    /// Construction-time misuse, rejected before any execution.
    #[error("invalid runtime configuration: {message}")]
    Config { message: String },
}

impl RuntimeError {
    /// Watchdog failures (budget trips, capability denials) are flagged for
    /// alerting separately from ordinary bugs.
    pub fn is_watchdog(&self) -> bool {
        matches!(
            self,
            RuntimeError::Vm(VmError::BudgetExceeded { .. })
                | RuntimeError::Vm(VmError::CapabilityDenied { .. })
        )
    }
}
