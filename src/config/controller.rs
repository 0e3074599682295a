//! # Controller Configuration
//!
//! Settings for the org and space controllers and the awaiter.

use super::env_var_or_default;
use crate::constants;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace holding CFOrgs and the credentials propagated into org namespaces
    pub root_namespace: String,
    /// Registry secrets propagated into every child namespace
    pub container_registry_secret_names: Vec<String>,
    /// How long deleting a space waits for its apps (seconds)
    pub space_finalizer_app_deletion_timeout_secs: u64,
    /// How long deleting an org waits for its spaces (seconds)
    pub org_finalizer_space_deletion_timeout_secs: u64,
    /// Pod security level enforced and audited in child namespaces
    pub namespace_pod_security_level: String,
    pub awaiter_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            root_namespace: constants::DEFAULT_ROOT_NAMESPACE.to_string(),
            container_registry_secret_names: parse_list(
                constants::DEFAULT_CONTAINER_REGISTRY_SECRET_NAMES,
            ),
            space_finalizer_app_deletion_timeout_secs:
                constants::DEFAULT_SPACE_FINALIZER_APP_DELETION_TIMEOUT_SECS,
            org_finalizer_space_deletion_timeout_secs:
                constants::DEFAULT_ORG_FINALIZER_SPACE_DELETION_TIMEOUT_SECS,
            namespace_pod_security_level: constants::DEFAULT_NAMESPACE_POD_SECURITY_LEVEL
                .to_string(),
            awaiter_timeout_secs: constants::DEFAULT_AWAITER_TIMEOUT_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root_namespace: env_var_or_default("ROOT_NAMESPACE", defaults.root_namespace),
            container_registry_secret_names: std::env::var("CONTAINER_REGISTRY_SECRET_NAMES")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.container_registry_secret_names),
            space_finalizer_app_deletion_timeout_secs: env_var_or_default(
                "SPACE_FINALIZER_APP_DELETION_TIMEOUT_SECS",
                defaults.space_finalizer_app_deletion_timeout_secs,
            ),
            org_finalizer_space_deletion_timeout_secs: env_var_or_default(
                "ORG_FINALIZER_SPACE_DELETION_TIMEOUT_SECS",
                defaults.org_finalizer_space_deletion_timeout_secs,
            ),
            namespace_pod_security_level: env_var_or_default(
                "NAMESPACE_POD_SECURITY_LEVEL",
                defaults.namespace_pod_security_level,
            ),
            awaiter_timeout_secs: env_var_or_default(
                "AWAITER_TIMEOUT_SECS",
                defaults.awaiter_timeout_secs,
            ),
        }
    }

    pub fn space_finalizer_app_deletion_timeout(&self) -> Duration {
        Duration::from_secs(self.space_finalizer_app_deletion_timeout_secs)
    }

    pub fn org_finalizer_space_deletion_timeout(&self) -> Duration {
        Duration::from_secs(self.org_finalizer_space_deletion_timeout_secs)
    }

    pub fn awaiter_timeout(&self) -> Duration {
        Duration::from_secs(self.awaiter_timeout_secs)
    }
}

/// Split a comma separated list, dropping blanks
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.root_namespace, "cf");
        assert_eq!(
            config.container_registry_secret_names,
            vec!["image-registry-credentials".to_string()]
        );
        assert_eq!(config.space_finalizer_app_deletion_timeout(), Duration::from_secs(60));
        assert_eq!(config.namespace_pod_security_level, "restricted");
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" a, b ,,c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(parse_list("").is_empty());
    }
}
