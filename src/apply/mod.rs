//! Descriptor hand-off to the orchestration platform
//!
//! The reconciler does not apply anything itself; it hands the finished
//! [`DeploymentDescriptor`] to an [`ApplySink`] and propagates whatever
//! the sink reports. Either the whole descriptor reaches the sink or
//! none of it does - there is no partial application and no retry inside
//! an attempt.
//!
//! The shipped [`KubeApplySink`] server-side-applies the Kubernetes
//! resource half of the descriptor (CRDs, webhook registrations, config
//! maps). The pod half is the platform's own input format; executing it
//! is the platform's job, not this operator's.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::Client;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::descriptor::DeploymentDescriptor;

/// Field manager name used for server-side apply
const FIELD_MANAGER: &str = "katib-operator";

/// Errors from the apply sink
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The Kubernetes API rejected a resource
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A descriptor subtree could not be serialized for the API
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Trait abstracting the platform's spec-application mechanism
///
/// This trait allows mocking the apply path in tests while using the
/// real cluster client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApplySink: Send + Sync {
    /// Apply a complete deployment descriptor
    async fn apply(&self, descriptor: &DeploymentDescriptor) -> Result<(), ApplyError>;
}

/// Apply sink backed by the Kubernetes API
pub struct KubeApplySink {
    client: Client,
    namespace: String,
}

impl KubeApplySink {
    /// Create a sink applying into the given namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Server-side apply one cluster-scoped manifest
    async fn apply_cluster_manifest(
        &self,
        manifest: &serde_json::Value,
    ) -> Result<(), ApplyError> {
        let kind = manifest
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApplyError::Serialization("manifest has no kind".to_string()))?;
        let api_version = manifest
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApplyError::Serialization("manifest has no apiVersion".to_string()))?;
        let name = manifest
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ApplyError::Serialization("manifest has no metadata.name".to_string())
            })?;

        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };

        let gvk = kube::api::GroupVersionKind {
            group,
            version,
            kind: kind.to_string(),
        };
        let api_resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource);

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &params, &Patch::Apply(manifest)).await?;

        debug!(kind = kind, name = name, "Applied manifest");
        Ok(())
    }

    /// Rebuild a full manifest around a lifted `spec`/`webhooks` subtree
    fn manifest(
        api_version: &str,
        kind: &str,
        name: &str,
        field: &str,
        subtree: &serde_yaml::Value,
    ) -> Result<serde_json::Value, ApplyError> {
        let subtree = serde_json::to_value(subtree)
            .map_err(|e| ApplyError::Serialization(format!("{kind}/{name}: {e}")))?;

        let mut manifest = serde_json::json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": name },
        });
        manifest[field] = subtree;
        Ok(manifest)
    }
}

#[async_trait]
impl ApplySink for KubeApplySink {
    async fn apply(&self, descriptor: &DeploymentDescriptor) -> Result<(), ApplyError> {
        let resources = &descriptor.resources.kubernetes_resources;

        for crd in &resources.custom_resource_definitions {
            let manifest = Self::manifest(
                "apiextensions.k8s.io/v1",
                "CustomResourceDefinition",
                &crd.name,
                "spec",
                &crd.spec,
            )?;
            self.apply_cluster_manifest(&manifest).await?;
        }

        for webhook in &resources.mutating_webhook_configurations {
            let manifest = Self::manifest(
                "admissionregistration.k8s.io/v1",
                "MutatingWebhookConfiguration",
                &webhook.name,
                "webhooks",
                &webhook.webhooks,
            )?;
            self.apply_cluster_manifest(&manifest).await?;
        }

        for webhook in &resources.validating_webhook_configurations {
            let manifest = Self::manifest(
                "admissionregistration.k8s.io/v1",
                "ValidatingWebhookConfiguration",
                &webhook.name,
                "webhooks",
                &webhook.webhooks,
            )?;
            self.apply_cluster_manifest(&manifest).await?;
        }

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        for (name, data) in &descriptor.resources.config_maps {
            let config_map = ConfigMap {
                metadata: kube::api::ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(self.namespace.clone()),
                    ..Default::default()
                },
                data: Some(data.clone()),
                ..Default::default()
            };
            config_maps
                .patch(name, &params, &Patch::Apply(&config_map))
                .await?;
            debug!(name = %name, "Applied config map");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_rebuilds_document_around_subtree() {
        let subtree: serde_yaml::Value = serde_yaml::from_str("group: kubeflow.org").unwrap();
        let manifest = KubeApplySink::manifest(
            "apiextensions.k8s.io/v1",
            "CustomResourceDefinition",
            "experiments.kubeflow.org",
            "spec",
            &subtree,
        )
        .unwrap();

        assert_eq!(
            manifest["metadata"]["name"],
            serde_json::json!("experiments.kubeflow.org")
        );
        assert_eq!(manifest["spec"]["group"], serde_json::json!("kubeflow.org"));
    }
}
