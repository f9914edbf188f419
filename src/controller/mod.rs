//! Reconciliation logic for the katib-controller deployment
//!
//! One reconciliation attempt runs per install/upgrade trigger, and only
//! one at a time - queuing and debouncing belong to the external event
//! dispatcher. The attempt walks a fixed sequence: leadership check,
//! TLS material (memoized), image resolution, descriptor assembly,
//! hand-off to the apply sink. Any failure aborts the whole attempt;
//! the next trigger starts over from the leadership check.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::apply::ApplySink;
use crate::config::{Identity, RuntimeConfig};
use crate::descriptor::{DescriptorCompiler, DescriptorContext};
use crate::image::ImageResolver;
use crate::pki::CertStore;
use crate::status::{Status, StatusReporter};
use crate::template::StaticTemplates;

/// Per-deployment reconciler
///
/// Owns the identity context, configuration, template set, and the
/// process-wide certificate store; collaborators arrive as trait objects
/// so tests can substitute them.
pub struct Reconciler {
    identity: Identity,
    config: RuntimeConfig,
    templates: StaticTemplates,
    certs: CertStore,
    resolver: Arc<dyn ImageResolver>,
    sink: Arc<dyn ApplySink>,
    status: Arc<dyn StatusReporter>,
}

impl Reconciler {
    /// Create a reconciler for one deployment
    pub fn new(
        identity: Identity,
        config: RuntimeConfig,
        templates: StaticTemplates,
        resolver: Arc<dyn ImageResolver>,
        sink: Arc<dyn ApplySink>,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            identity,
            config,
            templates,
            certs: CertStore::new(),
            resolver,
            sink,
            status,
        }
    }

    /// Whether the TLS material has been generated
    pub fn certs_populated(&self) -> bool {
        self.certs.is_populated()
    }

    /// Run one reconciliation attempt
    ///
    /// Returns the terminal status of the attempt. Image-resolution
    /// failure is reported as a blocked status carrying the resolver's
    /// message; PKI, template, and apply failures abort with an error.
    #[instrument(skip(self), fields(app = %self.identity.app_name, model = %self.identity.model_name))]
    pub async fn reconcile(&self, leader: bool) -> crate::Result<Status> {
        if !leader {
            info!("Not a leader, skipping any work");
            return Ok(self.finish(Status::Active));
        }

        self.status.report(&Status::setting_pod_spec());

        let certs = self
            .certs
            .get_or_bootstrap(&self.identity.app_name, &self.identity.model_name)?;

        let image = match self.resolver.fetch().await {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Image resolution failed, attempt blocked");
                return Ok(self.finish(Status::Blocked(e.to_string())));
            }
        };

        let descriptor = DescriptorCompiler::compile(&DescriptorContext {
            identity: &self.identity,
            config: self.config,
            image: &image,
            certs: &certs,
            templates: &self.templates,
        })?;

        self.sink.apply(&descriptor).await?;
        info!("Pod spec applied");

        Ok(self.finish(Status::Active))
    }

    /// Report and return the attempt's terminal status
    fn finish(&self, status: Status) -> Status {
        self.status.report(&status);
        status
    }
}
