//! Owner-only identity file backing every `ssh` and `scp` invocation.

use std::path::Path;

use tempfile::NamedTempFile;

use super::RemoteError;
use crate::compute::KeyMaterial;
use crate::files;

/// Private key written to a temporary file that is removed on drop.
#[derive(Debug)]
pub(super) struct IdentityFile {
    file: NamedTempFile,
}

impl IdentityFile {
    pub(super) fn write(material: &KeyMaterial) -> Result<Self, RemoteError> {
        let identity_error = |message: String| RemoteError::Identity { message };
        let file = tempfile::Builder::new()
            .prefix("armada-identity-")
            .tempfile()
            .map_err(|err| identity_error(err.to_string()))?;
        let path = file
            .path()
            .to_str()
            .ok_or_else(|| identity_error(String::from("temporary path is not UTF-8")))?;

        // OpenSSH rejects keys without a trailing newline.
        let mut text = material.expose().to_owned();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        files::write_owner_only(path, &text).map_err(identity_error)?;
        Ok(Self { file })
    }

    pub(super) fn path(&self) -> &Path {
        self.file.path()
    }
}
