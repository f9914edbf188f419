//! Error types for the katib-operator

use thiserror::Error;

use crate::apply::ApplyError;
use crate::config::ConfigError;
use crate::image::ResolutionError;
use crate::pki::PkiError;
use crate::template::TemplateError;

/// Main error type for operator operations
///
/// Every variant aborts the current reconciliation attempt; none are
/// downgraded or retried inside an attempt. A later trigger starts a
/// fresh attempt from scratch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// TLS trust chain bootstrap failed
    #[error("pki error: {0}")]
    Pki(#[from] PkiError),

    /// OCI image reference could not be resolved
    #[error("image resolution error: {0}")]
    Image(#[from] ResolutionError),

    /// A static template is missing, malformed, or incomplete
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// The apply sink rejected the descriptor
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Invalid runtime configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
