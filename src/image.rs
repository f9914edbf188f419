//! OCI image reference resolution seam
//!
//! The actual resolution - reading a registry descriptor attached to the
//! deployment - happens outside the core. The core consumes the resolved
//! [`ImageDetails`] and never constructs one itself; a resolver failure
//! short-circuits the reconciliation attempt before any assembly begins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// The resolver could not produce an image reference
///
/// The message is surfaced verbatim as the attempt's blocked status.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ResolutionError(
    /// The resolver's failure message, surfaced verbatim in the status
    pub String,
);

/// Resolved OCI image reference with pull metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    /// Fully qualified image path
    pub image_path: String,
    /// Registry username, when the registry requires authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Registry password, when the registry requires authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ImageDetails {
    /// Create an unauthenticated image reference
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            username: None,
            password: None,
        }
    }
}

/// Trait abstracting image reference resolution
///
/// This trait allows mocking the external resolver in tests while using
/// a real registry-descriptor resolver in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Resolve the controller image reference
    async fn fetch(&self) -> Result<ImageDetails, ResolutionError>;
}

/// Resolver that returns a fixed, pre-resolved image reference
///
/// Used by the CLI, where the image is supplied as an argument rather
/// than resolved from a registry descriptor.
pub struct FixedResolver {
    details: ImageDetails,
}

impl FixedResolver {
    /// Create a resolver around an already resolved reference
    pub fn new(details: ImageDetails) -> Self {
        Self { details }
    }
}

#[async_trait]
impl ImageResolver for FixedResolver {
    async fn fetch(&self) -> Result<ImageDetails, ResolutionError> {
        Ok(self.details.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_resolver_returns_its_reference() {
        let resolver = FixedResolver::new(ImageDetails::new("docker.io/kubeflowkatib/katib-controller:v0.11.1"));
        let details = resolver.fetch().await.unwrap();
        assert_eq!(
            details.image_path,
            "docker.io/kubeflowkatib/katib-controller:v0.11.1"
        );
        assert!(details.username.is_none());
    }

    #[test]
    fn resolution_error_message_is_verbatim() {
        let err = ResolutionError("Missing resource: oci-image".into());
        assert_eq!(err.to_string(), "Missing resource: oci-image");
    }
}
