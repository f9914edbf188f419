//! Static template set for the katib-controller deployment
//!
//! The controller ships with a fixed set of template documents authored
//! upstream: the CRD list, the mutating and validating webhook
//! registrations, three JSON configuration fragments, and three trial
//! job templates. This module loads them verbatim; the descriptor
//! compiler later lifts `metadata.name` and the `spec`/`webhooks`
//! subtrees without interpreting anything else.
//!
//! A template that is missing, fails to parse, or lacks required
//! metadata is fatal for the reconciliation attempt - resources are
//! never silently omitted.

use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

/// CRD list, multi-document YAML
pub const CRDS_FILE: &str = "crds.yaml";
/// Webhook registrations: validating first, mutating second
pub const WEBHOOKS_FILE: &str = "webhooks.yaml";
/// Metrics collector sidecar configuration fragment
pub const METRICS_COLLECTOR_SIDECAR_FILE: &str = "metrics-collector-sidecar.json";
/// Suggestion service configuration fragment
pub const SUGGESTION_FILE: &str = "suggestion.json";
/// Early stopping configuration fragment
pub const EARLY_STOPPING_FILE: &str = "early-stopping.json";
/// Default trial job template
pub const DEFAULT_TRIAL_TEMPLATE_FILE: &str = "defaultTrialTemplate.yaml";
/// ENAS CPU trial job template
pub const ENAS_CPU_TEMPLATE_FILE: &str = "enasCPUTemplate.yaml";
/// PyTorch trial job template
pub const PYTORCH_JOB_TEMPLATE_FILE: &str = "pytorchJobTemplate.yaml";

/// Static template errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A template file could not be read
    #[error("failed to read template {template}: {source}")]
    Missing {
        /// Template file name
        template: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A template did not parse as YAML
    #[error("template {template} is not valid YAML: {source}")]
    MalformedYaml {
        /// Template file name
        template: String,
        /// Underlying parse error
        #[source]
        source: serde_yaml::Error,
    },

    /// A template did not parse as JSON
    #[error("template {template} is not valid JSON: {source}")]
    MalformedJson {
        /// Template file name
        template: String,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// A template contained no documents
    #[error("template {template} contains no documents")]
    Empty {
        /// Template file name
        template: String,
    },

    /// A multi-document template had the wrong document count
    #[error("template {template} must contain {expected} documents, found {found}")]
    DocumentCount {
        /// Template file name
        template: String,
        /// Required document count
        expected: usize,
        /// Actual document count
        found: usize,
    },

    /// A document lacks `metadata.name`
    #[error("document in {template} has no metadata.name")]
    MissingName {
        /// Template file name
        template: String,
    },

    /// A document lacks a required subtree
    #[error("document in {template} has no {field}")]
    MissingField {
        /// Template file name
        template: String,
        /// The absent subtree key
        field: &'static str,
    },
}

/// Raw template text, keyed by the fixed upstream file names
///
/// Carries the documents before structural validation; tests construct
/// this directly from string literals, production code reads it from the
/// template directory.
#[derive(Clone, Debug)]
pub struct TemplateDocuments {
    /// Content of `crds.yaml`
    pub crds: String,
    /// Content of `webhooks.yaml`
    pub webhooks: String,
    /// Content of `metrics-collector-sidecar.json`
    pub metrics_collector_sidecar: String,
    /// Content of `suggestion.json`
    pub suggestion: String,
    /// Content of `early-stopping.json`
    pub early_stopping: String,
    /// Content of `defaultTrialTemplate.yaml`
    pub default_trial_template: String,
    /// Content of `enasCPUTemplate.yaml`
    pub enas_cpu_template: String,
    /// Content of `pytorchJobTemplate.yaml`
    pub pytorch_job_template: String,
}

/// The parsed, validated static template set
#[derive(Clone, Debug)]
pub struct StaticTemplates {
    /// CRD documents, one per CRD kind
    pub crds: Vec<Value>,
    /// The validating webhook registration document
    pub validating_webhook: Value,
    /// The mutating webhook registration document
    pub mutating_webhook: Value,
    /// Metrics collector sidecar config, verbatim JSON text
    pub metrics_collector_sidecar: String,
    /// Suggestion config, verbatim JSON text
    pub suggestion: String,
    /// Early stopping config, verbatim JSON text
    pub early_stopping: String,
    /// Default trial template, verbatim text
    pub default_trial_template: String,
    /// ENAS CPU trial template, verbatim text
    pub enas_cpu_template: String,
    /// PyTorch trial template, verbatim text
    pub pytorch_job_template: String,
}

impl StaticTemplates {
    /// Load and validate the template set from a directory
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        let read = |name: &str| {
            std::fs::read_to_string(dir.join(name)).map_err(|source| TemplateError::Missing {
                template: name.to_string(),
                source,
            })
        };

        Self::parse(TemplateDocuments {
            crds: read(CRDS_FILE)?,
            webhooks: read(WEBHOOKS_FILE)?,
            metrics_collector_sidecar: read(METRICS_COLLECTOR_SIDECAR_FILE)?,
            suggestion: read(SUGGESTION_FILE)?,
            early_stopping: read(EARLY_STOPPING_FILE)?,
            default_trial_template: read(DEFAULT_TRIAL_TEMPLATE_FILE)?,
            enas_cpu_template: read(ENAS_CPU_TEMPLATE_FILE)?,
            pytorch_job_template: read(PYTORCH_JOB_TEMPLATE_FILE)?,
        })
    }

    /// Parse and validate already loaded template text
    pub fn parse(docs: TemplateDocuments) -> Result<Self, TemplateError> {
        let crds = yaml_documents(CRDS_FILE, &docs.crds)?;
        if crds.is_empty() {
            return Err(TemplateError::Empty {
                template: CRDS_FILE.to_string(),
            });
        }

        // The webhook template carries exactly two documents, validating
        // first, mutating second.
        let mut webhooks = yaml_documents(WEBHOOKS_FILE, &docs.webhooks)?;
        if webhooks.len() != 2 {
            return Err(TemplateError::DocumentCount {
                template: WEBHOOKS_FILE.to_string(),
                expected: 2,
                found: webhooks.len(),
            });
        }
        let mutating_webhook = webhooks.pop().expect("length checked above");
        let validating_webhook = webhooks.pop().expect("length checked above");

        // Config fragments stay verbatim but must at least be valid JSON.
        for (name, text) in [
            (METRICS_COLLECTOR_SIDECAR_FILE, &docs.metrics_collector_sidecar),
            (SUGGESTION_FILE, &docs.suggestion),
            (EARLY_STOPPING_FILE, &docs.early_stopping),
        ] {
            serde_json::from_str::<serde_json::Value>(text).map_err(|source| {
                TemplateError::MalformedJson {
                    template: name.to_string(),
                    source,
                }
            })?;
        }

        Ok(Self {
            crds,
            validating_webhook,
            mutating_webhook,
            metrics_collector_sidecar: docs.metrics_collector_sidecar,
            suggestion: docs.suggestion,
            early_stopping: docs.early_stopping,
            default_trial_template: docs.default_trial_template,
            enas_cpu_template: docs.enas_cpu_template,
            pytorch_job_template: docs.pytorch_job_template,
        })
    }
}

/// Split multi-document YAML, skipping empty documents
fn yaml_documents(template: &str, text: &str) -> Result<Vec<Value>, TemplateError> {
    let mut documents = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(doc).map_err(|source| TemplateError::MalformedYaml {
            template: template.to_string(),
            source,
        })?;
        if value.is_null() {
            continue;
        }
        documents.push(value);
    }
    Ok(documents)
}

/// Lift a document's `metadata.name`
///
/// Used by the descriptor compiler when re-keying pass-through documents
/// into the resource bundle.
pub fn document_name(template: &str, doc: &Value) -> Result<String, TemplateError> {
    doc.get("metadata")
        .and_then(|meta| meta.get("name"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| TemplateError::MissingName {
            template: template.to_string(),
        })
}

/// Lift a required subtree (`spec` or `webhooks`) from a document
pub fn document_field(
    template: &str,
    doc: &Value,
    field: &'static str,
) -> Result<Value, TemplateError> {
    doc.get(field)
        .cloned()
        .ok_or_else(|| TemplateError::MissingField {
            template: template.to_string(),
            field,
        })
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal well-formed template fixtures shared across test modules

    use super::TemplateDocuments;

    /// A small but structurally complete template set
    pub fn documents() -> TemplateDocuments {
        TemplateDocuments {
            crds: r#"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: experiments.kubeflow.org
spec:
  group: kubeflow.org
  names:
    kind: Experiment
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: trials.kubeflow.org
spec:
  group: kubeflow.org
  names:
    kind: Trial
"#
            .to_string(),
            webhooks: r#"apiVersion: admissionregistration.k8s.io/v1
kind: ValidatingWebhookConfiguration
metadata:
  name: katib.kubeflow.org
webhooks:
  - name: validator.experiment.katib.kubeflow.org
---
apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata:
  name: katib.kubeflow.org
webhooks:
  - name: defaulter.experiment.katib.kubeflow.org
"#
            .to_string(),
            metrics_collector_sidecar: r#"{"StdOut": {"image": "kubeflowkatib/file-metrics-collector"}}"#
                .to_string(),
            suggestion: r#"{"random": {"image": "kubeflowkatib/suggestion-hyperopt"}}"#.to_string(),
            early_stopping: r#"{"medianstop": {"image": "kubeflowkatib/earlystopping-medianstop"}}"#
                .to_string(),
            default_trial_template: "apiVersion: batch/v1\nkind: Job\n".to_string(),
            enas_cpu_template: "apiVersion: batch/v1\nkind: Job\n".to_string(),
            pytorch_job_template: "apiVersion: kubeflow.org/v1\nkind: PyTorchJob\n".to_string(),
        }
    }
}
