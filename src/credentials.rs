//! SSH key provisioning for new servers.
//!
//! The group injects one authorized key into every server it creates. When
//! the host does not supply a private key, an Ed25519 key is generated once
//! per session and kept in the connector settings so that connection info
//! can hand it back to the host.

use std::io;

use camino::Utf8Path;
#[cfg(unix)]
use cap_std::fs::Permissions;
use cap_std::fs_utf8::Dir;
use rand::rngs::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey, PublicKey};
use thiserror::Error;

use crate::config::open_parent_dir;
use crate::settings::ConnectorSettings;
use crate::version::PLUGIN_NAME;

/// Comment appended to injected keys so operators can trace their origin.
pub const KEY_COMMENT: &str = PLUGIN_NAME;

/// Errors raised while generating or reading key material.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialError {
    /// Raised when key generation fails.
    #[error("failed to generate SSH private key: {0}")]
    Generate(String),
    /// Raised when a generated key cannot be encoded.
    #[error("failed to marshal SSH private key: {0}")]
    Encode(String),
    /// Raised when the private key cannot be parsed.
    #[error("reading private key: {0}")]
    Parse(String),
    /// Raised when no public key can be rendered from the private key.
    #[error("generating ssh public key: {0}")]
    PublicKey(String),
    /// Raised when a private key cannot be written out.
    #[error("writing private key: {0}")]
    Store(String),
}

/// Generates an Ed25519 private key in OpenSSH PEM form.
///
/// # Errors
///
/// Returns [`CredentialError`] when generation or encoding fails.
pub fn generate_private_key() -> Result<Vec<u8>, CredentialError> {
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .map_err(|err| CredentialError::Generate(err.to_string()))?;
    let pem = key
        .to_openssh(LineEnding::LF)
        .map_err(|err| CredentialError::Encode(err.to_string()))?;
    Ok(pem.as_bytes().to_vec())
}

/// Makes sure `settings` carries a private key, generating one when absent.
///
/// Returns the key that is now stored in the settings.
///
/// # Errors
///
/// Returns [`CredentialError`] when a key has to be generated and that fails.
pub fn ensure_key(settings: &mut ConnectorSettings) -> Result<&[u8], CredentialError> {
    let key = match settings.key.take() {
        Some(existing) => existing,
        None => generate_private_key()?,
    };
    Ok(settings.key.insert(key).as_slice())
}

/// Renders the authorized-key line for `private_key`, tagged with
/// [`KEY_COMMENT`] and terminated by a newline.
///
/// # Errors
///
/// Returns [`CredentialError::Parse`] when the key is not a valid OpenSSH
/// private key and [`CredentialError::PublicKey`] when its public half
/// cannot be encoded.
pub fn public_key(private_key: &[u8]) -> Result<String, CredentialError> {
    let key = PrivateKey::from_openssh(private_key)
        .map_err(|err| CredentialError::Parse(err.to_string()))?;
    let public = PublicKey::new(key.public_key().key_data().clone(), "");
    let line = public
        .to_openssh()
        .map_err(|err| CredentialError::PublicKey(err.to_string()))?;
    Ok(format!("{} {KEY_COMMENT}\n", line.trim_end()))
}

/// Writes `key` to `path`, readable and writable by the owner only.
///
/// # Errors
///
/// Returns [`CredentialError::Store`] when the file cannot be created,
/// restricted or written.
pub fn store_private_key(path: &Utf8Path, key: &[u8]) -> Result<(), CredentialError> {
    let store = |message: String| CredentialError::Store(format!("{path}: {message}"));
    let (dir, file) = open_parent_dir(path).map_err(store)?;

    dir.write(file, b"").map_err(|err| store(err.to_string()))?;
    restrict_to_owner(&dir, file).map_err(|err| store(err.to_string()))?;
    dir.write(file, key).map_err(|err| store(err.to_string()))
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Dir, file: &Utf8Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    dir.set_permissions(
        file,
        Permissions::from_std(std::fs::Permissions::from_mode(0o600)),
    )
}

#[cfg(not(unix))]
const fn restrict_to_owner(_dir: &Dir, _file: &Utf8Path) -> io::Result<()> {
    Ok(())
}
