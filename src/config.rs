//! Runtime configuration and service identity
//!
//! Both values arrive from outside the core: the identity from the
//! deployment context (application name and operating namespace), the
//! runtime configuration from the operator's keyed configuration map.
//! The core validates range and type only.

use thiserror::Error;

/// Errors for externally supplied configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A port option is outside the usable range
    #[error("invalid {name}: port must be nonzero")]
    InvalidPort {
        /// The offending configuration key
        name: &'static str,
    },
}

/// Identity context for the managed service
///
/// The model name doubles as the controller's operating namespace; it is
/// injected into the container environment and into the webhook DNS
/// identities.
#[derive(Clone, Debug)]
pub struct Identity {
    /// Application name the service is deployed under
    pub app_name: String,
    /// Operating namespace (model) of the deployment
    pub model_name: String,
}

impl Identity {
    /// Create an identity from the application and model names
    pub fn new(app_name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            model_name: model_name.into(),
        }
    }
}

/// Port configuration for the katib-controller container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Port the admission webhook listens on
    pub webhook_port: u16,
    /// Port the metrics endpoint listens on
    pub metrics_port: u16,
}

impl RuntimeConfig {
    /// Create a validated runtime configuration
    pub fn new(webhook_port: u16, metrics_port: u16) -> Result<Self, ConfigError> {
        if webhook_port == 0 {
            return Err(ConfigError::InvalidPort {
                name: "webhook-port",
            });
        }
        if metrics_port == 0 {
            return Err(ConfigError::InvalidPort {
                name: "metrics-port",
            });
        }
        Ok(Self {
            webhook_port,
            metrics_port,
        })
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            webhook_port: crate::DEFAULT_WEBHOOK_PORT,
            metrics_port: crate::DEFAULT_METRICS_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_standard_ports() {
        let config = RuntimeConfig::new(443, 8080).unwrap();
        assert_eq!(config.webhook_port, 443);
        assert_eq!(config.metrics_port, 8080);
    }

    #[test]
    fn rejects_zero_ports() {
        assert!(matches!(
            RuntimeConfig::new(0, 8080),
            Err(ConfigError::InvalidPort {
                name: "webhook-port"
            })
        ));
        assert!(matches!(
            RuntimeConfig::new(443, 0),
            Err(ConfigError::InvalidPort {
                name: "metrics-port"
            })
        ));
    }

    #[test]
    fn defaults_match_crate_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.webhook_port, crate::DEFAULT_WEBHOOK_PORT);
        assert_eq!(config.metrics_port, crate::DEFAULT_METRICS_PORT);
    }
}
