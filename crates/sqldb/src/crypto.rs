use super::Error;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;

/// Keyring resolves data-encryption keys (DEKs) by id. The current key
/// is referenced by every new write; older keys remain readable until
/// rotated out of the ring.
pub trait Keyring: Send + Sync {
    fn current(&self) -> (String, [u8; 32]);
    fn get(&self, dek_id: &str) -> Option<[u8; 32]>;
}

/// A fixed single-key ring, for tests and single-key deployments.
pub struct StaticKeyring {
    dek_id: String,
    key: [u8; 32],
}

impl StaticKeyring {
    pub fn new(dek_id: &str, key: [u8; 32]) -> Self {
        Self {
            dek_id: dek_id.to_string(),
            key,
        }
    }
}

impl Keyring for StaticKeyring {
    fn current(&self) -> (String, [u8; 32]) {
        (self.dek_id.clone(), self.key)
    }

    fn get(&self, dek_id: &str) -> Option<[u8; 32]> {
        (dek_id == self.dek_id).then_some(self.key)
    }
}

/// Encrypt `plain` under `key` with a fresh random 96-bit nonce.
pub fn seal(key: &[u8; 32], plain: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = Aes256Gcm::new(key.into())
        .encrypt(&nonce, plain)
        .map_err(|_| Error::Encode("aead encryption failed".into()))?;
    Ok((sealed, nonce.to_vec()))
}

pub fn open(key: &[u8; 32], nonce: &[u8], sealed: &[u8], dek_id: &str) -> Result<Vec<u8>, Error> {
    let err = || Error::Decrypt {
        dek_id: dek_id.to_string(),
    };
    if nonce.len() != 12 {
        return Err(err());
    }
    Aes256Gcm::new(key.into())
        .decrypt(nonce.into(), sealed)
        .map_err(|_| err())
}
