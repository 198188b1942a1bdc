use std::fs;
use std::path::Path;

use bigskies_core::{CoordinatorError, CredentialRecord};
use tracing::warn;

const PROTOCOL_VERSION: &str = "1.0";

/// Load the local `.pgpass`-style credential file Bootstrap republishes.
/// Only the path is ever touched — contents are never read or logged, the
/// referenced file is opened downstream by whatever consumes the
/// materialized connection string.
pub fn load_local_credential(path: &Path) -> Result<CredentialRecord, CoordinatorError> {
    let metadata = fs::metadata(path)
        .map_err(|e| CoordinatorError::Other(format!("reading credential file {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode),
                "credential file permissions are not owner-only (0600)"
            );
        }
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
    }

    let path_str = path.to_string_lossy().into_owned();
    Ok(CredentialRecord::new(&path_str, PROTOCOL_VERSION))
}
