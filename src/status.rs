//! Operator status values
//!
//! The status vocabulary is deliberately small: an attempt is either in
//! progress, finished successfully (which includes the non-leader no-op),
//! or blocked on an unresolvable image reference. No other values exist.

use std::fmt;

#[cfg(test)]
use mockall::automock;

/// Unit status reported for a reconciliation attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Work in progress, with a short human-readable message
    Maintenance(String),
    /// Attempt succeeded, or was a non-leader no-op
    Active,
    /// Attempt blocked; carries the image resolver's failure message
    Blocked(String),
}

impl Status {
    /// The in-progress status used while the pod spec is being set
    pub fn setting_pod_spec() -> Self {
        Status::Maintenance("Setting pod spec".to_string())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Maintenance(msg) => write!(f, "maintenance: {}", msg),
            Status::Active => write!(f, "active"),
            Status::Blocked(msg) => write!(f, "blocked: {}", msg),
        }
    }
}

/// Sink for status transitions during a reconciliation attempt
///
/// The reconciler reports the in-progress status before doing work and
/// the terminal status when it finishes; the platform decides how to
/// surface them.
#[cfg_attr(test, automock)]
pub trait StatusReporter: Send + Sync {
    /// Report a status transition
    fn report(&self, status: &Status);
}

/// Reporter that emits status transitions as tracing events
#[derive(Default)]
pub struct LogStatusReporter;

impl StatusReporter for LogStatusReporter {
    fn report(&self, status: &Status) {
        tracing::info!(status = %status, "unit status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Status::Active.to_string(), "active");
        assert_eq!(
            Status::setting_pod_spec().to_string(),
            "maintenance: Setting pod spec"
        );
        assert_eq!(
            Status::Blocked("oci resource unavailable".into()).to_string(),
            "blocked: oci resource unavailable"
        );
    }
}
