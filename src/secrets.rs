//! Secret lookup from the environment and a secrets directory

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;

use crate::authentication::SecretStore;
use crate::error::BridgeError;

/// Key under which the OIDC client secret is stored
pub const OIDC_CLIENT_SECRET_KEY: &str = "oidc:client-secret";

/// Resolves `oidc:client-secret` from `OIDC_CLIENT_SECRET`, then from the
/// file `<secrets_dir>/oidc_client-secret`
#[derive(Debug, Clone, Default)]
pub struct SecretsDirStore {
    secrets_dir: Option<PathBuf>,
}

impl SecretsDirStore {
    #[must_use]
    pub fn new(secrets_dir: Option<PathBuf>) -> Self {
        Self { secrets_dir }
    }

    /// Environment variable consulted for `key`
    #[must_use]
    pub fn env_var_name(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// File name consulted for `key` inside the secrets directory
    #[must_use]
    pub fn file_name(key: &str) -> String {
        key.replace(':', "_")
    }

    fn non_empty(value: &str) -> Option<String> {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

#[async_trait]
impl SecretStore for SecretsDirStore {
    async fn get_credential(&self, key: &str) -> Result<Option<String>, BridgeError> {
        if let Ok(value) = std::env::var(Self::env_var_name(key)) {
            if let Some(value) = Self::non_empty(&value) {
                debug!("🔑 Credential '{key}' resolved from environment");
                return Ok(Some(value));
            }
        }

        let Some(dir) = &self.secrets_dir else {
            return Ok(None);
        };

        let path = dir.join(Self::file_name(key));
        match fs::read_to_string(&path) {
            Ok(contents) => {
                debug!("🔑 Credential '{key}' resolved from {}", path.display());
                Ok(Self::non_empty(&contents))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Configuration(format!(
                "Unable to read credential '{key}': {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_key_mapping() {
        assert_eq!(
            SecretsDirStore::env_var_name(OIDC_CLIENT_SECRET_KEY),
            "OIDC_CLIENT_SECRET"
        );
        assert_eq!(
            SecretsDirStore::file_name(OIDC_CLIENT_SECRET_KEY),
            "oidc_client-secret"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_environment_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("oidc_client-secret"), "from-file\n").unwrap();
        let store = SecretsDirStore::new(Some(dir.path().to_path_buf()));

        std::env::remove_var("OIDC_CLIENT_SECRET");
        assert_eq!(
            store.get_credential(OIDC_CLIENT_SECRET_KEY).await.unwrap(),
            Some("from-file".to_string())
        );

        std::env::set_var("OIDC_CLIENT_SECRET", "from-env");
        assert_eq!(
            store.get_credential(OIDC_CLIENT_SECRET_KEY).await.unwrap(),
            Some("from-env".to_string())
        );
        std::env::remove_var("OIDC_CLIENT_SECRET");
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_and_blank_credentials_are_absent() {
        std::env::remove_var("OIDC_CLIENT_SECRET");
        let dir = tempfile::tempdir().unwrap();
        let store = SecretsDirStore::new(Some(dir.path().to_path_buf()));

        assert_eq!(store.get_credential(OIDC_CLIENT_SECRET_KEY).await.unwrap(), None);

        fs::write(dir.path().join("oidc_client-secret"), "  \n").unwrap();
        assert_eq!(store.get_credential(OIDC_CLIENT_SECRET_KEY).await.unwrap(), None);

        std::env::set_var("OIDC_CLIENT_SECRET", "");
        assert_eq!(
            SecretsDirStore::default()
                .get_credential(OIDC_CLIENT_SECRET_KEY)
                .await
                .unwrap(),
            None
        );
        std::env::remove_var("OIDC_CLIENT_SECRET");
    }
}
