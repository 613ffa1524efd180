use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::Utc;
use jsonwebtoken::EncodingKey;
use rsa::{
    pkcs1::EncodeRsaPrivateKey,
    pkcs8::{
        DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey,
        LineEnding,
    },
    RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use atlas_slo::crypto::digest::random_hex;

const PRIVATE_PEM: &str = "private.pem";
const PUBLIC_PEM: &str = "public.pem";
const KID_FILE: &str = "kid.txt";
const CURRENT: &str = "current";
const ARTIFACTS: [&str; 3] = [PRIVATE_PEM, PUBLIC_PEM, KID_FILE];

const KEY_BITS: usize = 2048;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("key directory {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("partial key state in {dir}, missing {missing:?}; restore the key or remove the directory")]
    Partial {
        dir: PathBuf,
        missing: Vec<&'static str>,
    },
    #[error("kid in {dir} is {stored} but the public key hashes to {computed}")]
    KidMismatch {
        dir: PathBuf,
        stored: String,
        computed: String,
    },
    #[error("public key in {dir} does not belong to the private key")]
    Inconsistent { dir: PathBuf },
    #[error("key encoding: {0}")]
    Encoding(String),
}

impl KeyStoreError {
    fn io(dir: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            dir: dir.to_owned(),
            source,
        }
    }

    fn encoding(err: impl fmt::Display) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// The issuer's RSA signing key and its `kid`.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    private: RsaPrivateKey,
    public: RsaPublicKey,
    encoding: EncodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    pub fn generate() -> Result<Self, KeyStoreError> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
            .map_err(KeyStoreError::encoding)?;
        Self::from_private(private)
    }

    fn from_private(private: RsaPrivateKey) -> Result<Self, KeyStoreError> {
        let public = private.to_public_key();
        let kid = kid_of(&public)?;
        let der = private.to_pkcs1_der().map_err(KeyStoreError::encoding)?;
        Ok(Self {
            kid,
            encoding: EncodingKey::from_rsa_der(der.as_bytes()),
            private,
            public,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }
}

/// First 8 bytes of SHA-256 over the SubjectPublicKeyInfo DER, as hex.
pub fn kid_of(public: &RsaPublicKey) -> Result<String, KeyStoreError> {
    let der = public
        .to_public_key_der()
        .map_err(KeyStoreError::encoding)?;
    Ok(hex::encode(&Sha256::digest(der.as_bytes())[..8]))
}

/// Keeps the signing key under `dir/current` as `private.pem` (PKCS#8),
/// `public.pem` (SPKI) and `kid.txt`.
///
/// `dir` itself may be a mount point or hold unrelated entries. The three
/// files are written into a staging directory inside `dir` which is then
/// renamed to `current`, so a reader sees all of them or none. A `current`
/// holding only some of them, or whose `kid` does not match its key, is
/// refused rather than replaced: relying parties may still hold tokens
/// signed by that key.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the persisted key, generating and persisting one on first use.
    pub fn ensure_key(&self) -> Result<SigningKey, KeyStoreError> {
        if let Some(key) = self.load()? {
            info!(kid = key.kid(), dir = %self.dir.display(), "signing key loaded");
            return Ok(key);
        }
        let key = SigningKey::generate()?;
        match self.persist(&key) {
            Ok(()) => {
                info!(kid = key.kid(), dir = %self.dir.display(), "signing key generated");
                Ok(key)
            }
            // another process won the race; its key is the one to use
            Err(err) => self.load()?.ok_or(err),
        }
    }

    /// Retires the current key and installs a fresh one.
    ///
    /// The old key moves to `dir/retired-<timestamp>`, never deleted. Tokens
    /// it signed stop verifying once relying parties refetch the key set.
    pub fn rotate(&self) -> Result<SigningKey, KeyStoreError> {
        let current = self.current();
        if current.exists() {
            let retired = self.dir.join(format!(
                "retired-{}",
                Utc::now().format("%Y%m%dT%H%M%S")
            ));
            fs::rename(&current, &retired)
                .map_err(KeyStoreError::io(&self.dir))?;
            warn!(retired = %retired.display(), "signing key retired");
        }
        let key = SigningKey::generate()?;
        self.persist(&key)?;
        info!(kid = key.kid(), "signing key rotated");
        Ok(key)
    }

    /// `None` when no artifact exists at all.
    pub fn load(&self) -> Result<Option<SigningKey>, KeyStoreError> {
        let current = self.current();
        let missing = ARTIFACTS
            .into_iter()
            .filter(|name| !current.join(name).is_file())
            .collect::<Vec<_>>();
        if missing.len() == ARTIFACTS.len() {
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(KeyStoreError::Partial {
                dir: current,
                missing,
            });
        }

        let read = |name: &str| {
            fs::read_to_string(current.join(name))
                .map_err(KeyStoreError::io(&current))
        };
        let private = RsaPrivateKey::from_pkcs8_pem(&read(PRIVATE_PEM)?)
            .map_err(KeyStoreError::encoding)?;
        let public = RsaPublicKey::from_public_key_pem(&read(PUBLIC_PEM)?)
            .map_err(KeyStoreError::encoding)?;
        let stored = read(KID_FILE)?.trim().to_owned();

        let key = SigningKey::from_private(private)?;
        if key.public != public {
            return Err(KeyStoreError::Inconsistent { dir: current });
        }
        if key.kid != stored {
            return Err(KeyStoreError::KidMismatch {
                dir: current,
                stored,
                computed: key.kid,
            });
        }
        Ok(Some(key))
    }

    fn current(&self) -> PathBuf {
        self.dir.join(CURRENT)
    }

    fn persist(&self, key: &SigningKey) -> Result<(), KeyStoreError> {
        fs::create_dir_all(&self.dir).map_err(KeyStoreError::io(&self.dir))?;
        let staging = self.dir.join(format!(".staging-{}", random_hex(4)));
        fs::create_dir(&staging).map_err(KeyStoreError::io(&staging))?;

        let result = self.write_artifacts(&staging, key).and_then(|()| {
            fs::rename(&staging, self.current())
                .map_err(KeyStoreError::io(&self.dir))
        });
        if result.is_err() {
            let _ = fs::remove_dir_all(&staging);
        }
        result
    }

    fn write_artifacts(
        &self,
        staging: &Path,
        key: &SigningKey,
    ) -> Result<(), KeyStoreError> {
        let private_pem = key
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(KeyStoreError::encoding)?;
        let public_pem = key
            .public
            .to_public_key_pem(LineEnding::LF)
            .map_err(KeyStoreError::encoding)?;

        write_file(&staging.join(PRIVATE_PEM), private_pem.as_bytes(), true)
            .map_err(KeyStoreError::io(staging))?;
        write_file(&staging.join(PUBLIC_PEM), public_pem.as_bytes(), false)
            .map_err(KeyStoreError::io(staging))?;
        write_file(&staging.join(KID_FILE), key.kid.as_bytes(), false)
            .map_err(KeyStoreError::io(staging))?;
        Ok(())
    }

}

fn write_file(path: &Path, contents: &[u8], secret: bool) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if secret {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = secret;
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
