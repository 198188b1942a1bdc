use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Wire shape of the message Bootstrap publishes retained on
/// `bigskies/coordinator/bootstrap/credentials`. `pgpass_path` is
/// base64-encoded "for casual obscurity" per spec — it is not a secret
/// boundary, the referenced file's 0600 permissions are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub pgpass_path: String,
    pub version: String,
}

impl CredentialRecord {
    pub fn new(path: &str, version: impl Into<String>) -> Self {
        Self {
            pgpass_path: STANDARD.encode(path),
            version: version.into(),
        }
    }

    /// Decode the wrapped filesystem path.
    pub fn decoded_path(&self) -> Result<String, base64::DecodeError> {
        let bytes = STANDARD.decode(&self.pgpath_bytes())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn pgpath_bytes(&self) -> &[u8] {
        self.pgpass_path.as_bytes()
    }
}
