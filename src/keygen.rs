//! Fresh SSH key pairs generated with `ssh-keygen`.
//!
//! Providers that only accept a public key (Scaleway IAM among them) need
//! the pair minted locally. Generation runs through the [`CommandRunner`]
//! seam inside a scratch directory that is removed as soon as both halves
//! have been read back.

use std::ffi::OsString;

use camino::Utf8Path;
use tracing::debug;

use crate::compute::{ComputeError, KeyMaterial};
use crate::files;
use crate::remote::CommandRunner;

/// Private and public halves of a generated key pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedKeyPair {
    /// Private key in OpenSSH format.
    pub private_key: KeyMaterial,
    /// Public key in `authorized_keys` format.
    pub public_key: String,
}

/// Generates ed25519 key pairs by shelling out to `ssh-keygen`.
#[derive(Clone, Debug)]
pub struct SshKeygen<R> {
    program: String,
    runner: R,
}

impl<R: CommandRunner> SshKeygen<R> {
    /// Creates a generator that runs `program` through `runner`.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Generates a pair whose public half carries `comment`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::KeyGeneration`] when `ssh-keygen` cannot run,
    /// exits non-zero, or leaves no readable key behind.
    pub async fn generate(&self, comment: &str) -> Result<GeneratedKeyPair, ComputeError> {
        let failure = |message: String| ComputeError::KeyGeneration { message };
        let scratch = tempfile::Builder::new()
            .prefix("armada-keygen-")
            .tempdir()
            .map_err(|err| failure(err.to_string()))?;
        let dir = Utf8Path::from_path(scratch.path())
            .ok_or_else(|| failure(String::from("scratch directory is not UTF-8")))?;
        let key_path = dir.join("id_ed25519");

        let args = [
            "-q",
            "-t",
            "ed25519",
            "-N",
            "",
            "-C",
            comment,
            "-f",
            key_path.as_str(),
        ]
        .map(OsString::from);
        debug!(program = %self.program, comment, "generating key pair");
        let output = self
            .runner
            .run(&self.program, &args)
            .await
            .map_err(|err| failure(err.to_string()))?;
        if !output.is_success() {
            return Err(failure(format!(
                "{} exited with status {:?}: {}",
                self.program,
                output.code,
                output.stderr.trim()
            )));
        }

        let private_key = files::read_to_string(key_path.as_str()).map_err(failure)?;
        let public_key = files::read_to_string(&format!("{key_path}.pub")).map_err(failure)?;
        Ok(GeneratedKeyPair {
            private_key: KeyMaterial::new(private_key),
            public_key: public_key.trim().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeKeygenRunner, ScriptedRunner};

    #[tokio::test]
    async fn generate_reads_back_both_halves() {
        let runner = FakeKeygenRunner::default();
        let keygen = SshKeygen::new("ssh-keygen", runner.clone());

        let pair = keygen.generate("armada-key-pair-1").await.expect("generate");

        assert_eq!(pair.private_key.expose(), FakeKeygenRunner::PRIVATE_KEY);
        assert_eq!(pair.public_key, FakeKeygenRunner::PUBLIC_KEY.trim());
        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        let command = calls.first().expect("one call").command_string();
        assert!(command.contains("-t ed25519"), "command: {command}");
        assert!(command.contains("-C armada-key-pair-1"), "command: {command}");
    }

    #[tokio::test]
    async fn generate_reports_non_zero_exit() {
        let runner = ScriptedRunner::new();
        runner.push_failure(1);
        let keygen = SshKeygen::new("ssh-keygen", runner);

        let err = keygen.generate("k").await.expect_err("should fail");

        assert!(matches!(err, ComputeError::KeyGeneration { ref message } if message.contains("simulated failure")));
    }
}
