//! katib-operator - lifecycle manager for the katib-controller service
//!
//! The katib-controller is a Kubernetes admission-controller service. On
//! install and upgrade this operator provisions a private TLS trust chain
//! for the controller's webhook endpoint and emits the complete declarative
//! workload specification (container spec, RBAC role, CRDs, webhook
//! registrations, and configuration artifacts) to the orchestration
//! platform.
//!
//! # Architecture
//!
//! Two components run in sequence on every reconciliation attempt:
//! - The PKI bootstrapper generates a CA, a server key, and a CA-signed
//!   leaf certificate bound to the service's cluster DNS identities. The
//!   result is memoized for the process lifetime.
//! - The descriptor compiler is a pure function from the resolved image,
//!   runtime configuration, and static templates to a single versioned
//!   deployment descriptor.
//!
//! Only the leader replica produces a descriptor; non-leader attempts are
//! success no-ops.
//!
//! # Modules
//!
//! - [`pki`] - TLS trust chain bootstrap for the webhook endpoint
//! - [`config`] - Runtime configuration and service identity
//! - [`image`] - OCI image reference resolution seam
//! - [`template`] - Static template set (CRDs, webhooks, config fragments)
//! - [`descriptor`] - Deployment descriptor types and compiler
//! - [`apply`] - Descriptor hand-off to the orchestration platform
//! - [`controller`] - Per-attempt reconciliation logic
//! - [`status`] - Operator status values and reporting
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod apply;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod image;
pub mod pki;
pub mod status;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// These constants define the default values used throughout the operator.
// Centralizing them here ensures consistency across CLI defaults and test
// fixtures.

/// Default port for the admission webhook endpoint
pub const DEFAULT_WEBHOOK_PORT: u16 = 443;

/// Default port for the metrics endpoint
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default application name under which the service is deployed
pub const DEFAULT_APP_NAME: &str = "katib-controller";

/// Default operating namespace (model) for the controller
pub const DEFAULT_MODEL_NAME: &str = "kubeflow";
