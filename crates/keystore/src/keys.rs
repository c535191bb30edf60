//! RSA-2048 keypair generation and on-disk persistence for the token
//! authority. See §4.1 and §6's on-disk layout (`keys/private.pem`,
//! `keys/public.pem`).

use std::fs;
use std::io::Write as _;
use std::path::Path;

use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use facegate_core::Error;

const RSA_KEY_BITS: usize = 2048;

/// The authority's signing keypair, loaded once at startup.
pub struct KeyMaterial {
    pub private_key: RsaPrivateKey,
    pub public_key: RsaPublicKey,
}

impl KeyMaterial {
    /// Load an existing keypair from `keys_dir`, or generate and persist a
    /// fresh one if none exists. `private.pem` is written with mode 0600.
    pub fn load_or_generate(keys_dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(keys_dir)
            .map_err(|e| Error::Internal(anyhow::anyhow!("creating keys dir: {e}")))?;

        let private_path = keys_dir.join("private.pem");
        let public_path = keys_dir.join("public.pem");

        if private_path.exists() && public_path.exists() {
            let private_key = RsaPrivateKey::read_pkcs8_pem_file(&private_path)
                .map_err(|e| Error::Internal(anyhow::anyhow!("reading private key: {e}")))?;
            let public_key = RsaPublicKey::read_public_key_pem_file(&public_path)
                .map_err(|e| Error::Internal(anyhow::anyhow!("reading public key: {e}")))?;
            return Ok(KeyMaterial {
                private_key,
                public_key,
            });
        }

        tracing::info!(dir = %keys_dir.display(), "generating new RSA-2048 token authority keypair");
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| Error::Internal(anyhow::anyhow!("generating RSA key: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        write_private_pem(&private_path, &private_key)?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Internal(anyhow::anyhow!("encoding public key: {e}")))?;
        atomic_write(&public_path, public_pem.as_bytes())?;

        Ok(KeyMaterial {
            private_key,
            public_key,
        })
    }
}

#[cfg(unix)]
fn write_private_pem(path: &Path, key: &RsaPrivateKey) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::Internal(anyhow::anyhow!("encoding private key: {e}")))?;
    atomic_write(path, pem.as_bytes())?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| Error::Internal(anyhow::anyhow!("setting key file permissions: {e}")))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private_pem(path: &Path, key: &RsaPrivateKey) -> Result<(), Error> {
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::Internal(anyhow::anyhow!("encoding private key: {e}")))?;
    atomic_write(path, pem.as_bytes())
}

/// Write `contents` to `path` via a sibling temp file then rename, so a
/// crash mid-write never leaves a partial key or registry file behind.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let tmp_path = {
        let mut p = path.to_path_buf();
        let file_name = p
            .file_name()
            .map(|n| format!("{}.tmp", n.to_string_lossy()))
            .unwrap_or_else(|| "facegate.tmp".to_string());
        p.set_file_name(file_name);
        p
    };

    let mut file = fs::File::create(&tmp_path)
        .map_err(|e| Error::Internal(anyhow::anyhow!("creating temp file {tmp_path:?}: {e}")))?;
    file.write_all(contents)
        .map_err(|e| Error::Internal(anyhow::anyhow!("writing temp file {tmp_path:?}: {e}")))?;
    file.sync_all()
        .map_err(|e| Error::Internal(anyhow::anyhow!("syncing temp file {tmp_path:?}: {e}")))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Internal(anyhow::anyhow!("renaming into place {path:?}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_keypair() {
        let dir = tempfile::tempdir().unwrap();
        let first = KeyMaterial::load_or_generate(dir.path()).unwrap();
        let second = KeyMaterial::load_or_generate(dir.path()).unwrap();
        assert_eq!(
            first.private_key.to_pkcs8_pem(LineEnding::LF).unwrap(),
            second.private_key.to_pkcs8_pem(LineEnding::LF).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        KeyMaterial::load_or_generate(dir.path()).unwrap();
        let meta = fs::metadata(dir.path().join("private.pem")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
