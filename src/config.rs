use serde::{Deserialize, Serialize};

use crate::errors::{TransformError, TransformErrorKind};

/// Where the registration functions are imported from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationConfig {
    pub import_source: String,
    /// Registers a client reference on the server target.
    pub client_export: String,
    /// Registers a server reference (actions on the server, stubs on the client).
    pub server_export: String,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            import_source: "mwap/runtime/server".to_string(),
            client_export: "$$client".to_string(),
            server_export: "$$server".to_string(),
        }
    }
}

/// Encrypt / decrypt pair wrapped around captured closure values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    pub import_source: String,
    pub decrypt_export: String,
    pub encrypt_export: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// `"<directive>:<file>"`
    #[default]
    Directive,
    /// Root-relative `./path`
    Relative,
    /// Digest of the relative path and directive
    Hashed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub encryption: Option<EncryptionConfig>,
    #[serde(default)]
    pub id_strategy: IdStrategy,
    /// Project root used by the path-based id strategies.
    #[serde(default)]
    pub root: Option<String>,
    /// Sidecar file the module log is persisted to.
    #[serde(default)]
    pub module_log: Option<String>,
}

impl TransformOptions {
    pub fn from_json(json: &str) -> Result<Self, TransformError> {
        serde_json::from_str(json).map_err(|e| {
            TransformError::new(
                TransformErrorKind::Io,
                format!("invalid transform options: {}", e),
                "<options>",
            )
        })
    }

    pub fn with_encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = Some(encryption);
        self
    }
}
