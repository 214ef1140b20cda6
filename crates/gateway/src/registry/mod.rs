//! Per-collection encryption policies loaded from a YAML file.
//!
//! The file maps collection names to a schema definition and policy options:
//!
//! ```yaml
//! identities:
//!   schema:
//!     firstName: { type: String }
//!     email: String
//!     idx: { type: String, index: true }
//!   options:
//!     key_creation_convergent_encryption: true
//! ```
//!
//! Every policy is validated when loaded. One invalid collection rejects the
//! whole file, so a bad edit never replaces a working registry.

pub mod cache;

pub use cache::{PolicyRegistry, RegistryError};

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use fle::{EncryptionPolicy, FieldEncryptor, KeyService, PolicyOptions, Schema};
use serde::Deserialize;
use tokio::time;
use tracing::{info, warn};

use crate::config::Config;

/// One collection entry of the policy file.
#[derive(Debug, Deserialize)]
struct CollectionPolicy {
    schema: serde_json::Value,
    #[serde(default)]
    options: PolicyOptions,
}

/// Parse policy file contents and bind every collection to `key_service`.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or any collection's schema or
/// options are invalid.
pub fn parse_policies(
    text: &str,
    key_service: Arc<dyn KeyService>,
) -> Result<HashMap<String, FieldEncryptor>> {
    let entries: HashMap<String, CollectionPolicy> =
        serde_yaml::from_str(text).context("policy file is not valid YAML")?;

    entries
        .into_iter()
        .map(|(name, entry)| {
            let schema = Schema::from_definition(&entry.schema)
                .with_context(|| format!("invalid schema for collection {name}"))?;
            let policy = EncryptionPolicy::new(&schema, entry.options)
                .with_context(|| format!("invalid policy for collection {name}"))?;
            info!(collection = %name, fields = policy.fields().len(), "loaded collection policy");
            let encryptor = policy.bind(key_service.clone(), name.clone());
            Ok::<_, anyhow::Error>((name, encryptor))
        })
        .collect()
}

/// Read the policy file and atomically replace the registry contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails [`parse_policies`].
pub async fn load_all(
    cfg: &Config,
    key_service: Arc<dyn KeyService>,
    registry: &PolicyRegistry,
) -> Result<()> {
    let text = tokio::fs::read_to_string(&cfg.policy_file)
        .await
        .with_context(|| format!("failed to read policy file {}", cfg.policy_file))?;

    let encryptors = parse_policies(&text, key_service)?;
    if encryptors.is_empty() {
        warn!(path = %cfg.policy_file, "policy file declares no collections");
    }

    registry.replace_all(encryptors);
    info!(count = registry.len(), "policy registry refreshed");
    Ok(())
}

/// Spawn a background task that periodically reloads the policy file.
///
/// On failure the previous registry contents are retained and a warning is
/// emitted.
pub fn refresh_task(
    cfg: Config,
    key_service: Arc<dyn KeyService>,
    registry: PolicyRegistry,
) -> tokio::task::JoinHandle<()> {
    let interval = std::time::Duration::from_secs(cfg.policy_refresh_interval_secs);
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately; startup already loaded the file.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = load_all(&cfg, key_service.clone(), &registry).await {
                warn!(error = %e, "policy refresh failed; retaining previous registry");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fle::{KeyNameStrategy, MemoryTransit};

    const POLICIES: &str = r#"
identities:
  schema:
    firstName: { type: String }
    email: String
    num: Number
    idx: { type: String, index: true }
    objectOfStrings:
      string1: String
  options:
    key_creation_convergent_encryption: true
archive:
  schema:
    note: String
  options:
    key_name: per_document
"#;

    fn transit() -> Arc<dyn KeyService> {
        Arc::new(MemoryTransit::new())
    }

    #[test]
    fn parses_every_collection() {
        let encryptors = parse_policies(POLICIES, transit()).unwrap();
        assert_eq!(encryptors.len(), 2);

        let identities = &encryptors["identities"];
        let mut fields = identities.policy().fields().to_vec();
        fields.sort();
        assert_eq!(fields, vec!["email", "firstName", "objectOfStrings.string1"]);
        assert_eq!(identities.policy().key_creation().convergent_encryption, Some(true));

        assert!(matches!(
            encryptors["archive"].policy().key_name(),
            KeyNameStrategy::PerDocument
        ));
    }

    #[test]
    fn options_are_optional() {
        let encryptors = parse_policies("people:\n  schema:\n    name: String\n", transit()).unwrap();
        assert_eq!(encryptors["people"].policy().fields(), ["name"]);
    }

    #[test]
    fn invalid_collection_rejects_the_file() {
        let text = r#"
people:
  schema:
    num: Number
  options:
    encrypted_fields: [num]
"#;
        let err = parse_policies(text, transit()).unwrap_err();
        assert!(format!("{err:#}").contains("num is a Number"), "{err:#}");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(parse_policies("people: [", transit()).is_err());
    }

    #[tokio::test]
    async fn missing_file_keeps_previous_registry() {
        let registry = PolicyRegistry::new();
        registry.replace_all(parse_policies(POLICIES, transit()).unwrap());

        let cfg = Config {
            vault_addr: "http://127.0.0.1:8200".into(),
            vault_token: "t".into(),
            vault_transit_mount: "transit".into(),
            vault_namespace: None,
            policy_file: "/nonexistent/policies.yaml".into(),
            policy_refresh_interval_secs: 300,
            listen_port: 8080,
            otel_exporter_otlp_endpoint: None,
            log_level: "info".into(),
        };
        assert!(load_all(&cfg, transit(), &registry).await.is_err());
        assert_eq!(registry.len(), 2);
    }
}
