//! Node identity resolution
//!
//! An explicit override wins; otherwise the name the host reports through
//! its hostname file is used.

use crate::error::IdentityError;
use crate::types::NodeIdentity;
use std::path::Path;
use tracing::debug;

/// Environment variable overriding the node name
pub const NODE_NAME_ENV: &str = "NODE_NAME";

/// Hostname file mounted into the labeller's container
pub const DEFAULT_HOSTNAME_FILE: &str = "/labeller/hostname";

/// Resolve the node identity
///
/// `override_name` is normally the value of [`NODE_NAME_ENV`]; a blank
/// value counts as unset.
///
/// # Errors
/// - `IdentityError::HostnameFile` if the fallback file cannot be read
/// - `IdentityError::Empty` if the file is blank
pub fn resolve_identity(
    override_name: Option<&str>,
    hostname_file: &Path,
) -> Result<NodeIdentity, IdentityError> {
    if let Some(name) = override_name.filter(|n| !n.trim().is_empty()) {
        debug!(source = NODE_NAME_ENV, node = name.trim(), "resolved node identity");
        return NodeIdentity::new(name);
    }

    let contents =
        std::fs::read_to_string(hostname_file).map_err(|source| IdentityError::HostnameFile {
            path: hostname_file.display().to_string(),
            source,
        })?;
    let identity = NodeIdentity::new(contents)?;
    debug!(source = %hostname_file.display(), node = %identity, "resolved node identity");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn override_wins() {
        let identity = resolve_identity(Some("node-a"), Path::new("/nonexistent")).unwrap();
        assert_eq!(identity.as_str(), "node-a");
    }

    #[test]
    fn blank_override_falls_back_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "node-b").unwrap();

        let identity = resolve_identity(Some("  "), file.path()).unwrap();
        assert_eq!(identity.as_str(), "node-b");
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_identity(None, &dir.path().join("hostname")).unwrap_err();
        assert!(matches!(err, IdentityError::HostnameFile { .. }));
    }

    #[test]
    fn blank_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = resolve_identity(None, file.path()).unwrap_err();
        assert!(matches!(err, IdentityError::Empty));
    }
}
