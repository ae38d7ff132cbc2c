use std::ops::Deref;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use multihash::Multihash;

use crate::linked_data::{cid_base36, Cid, IDENTITY_HASH, LIBP2P_KEY_CODEC};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Public key naming a mutable root.
///
/// The public part of an Ed25519 keypair. Its canonical identifier is
/// a version-1 CID carrying the raw key bytes under the libp2p-key
/// codec, rendered in base36 wherever it appears in a URL host.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct PublicKey(VerifyingKey);

impl Deref for PublicKey {
    type Target = VerifyingKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )
            .into());
        }
        let mut buff = [0; PUBLIC_KEY_SIZE];
        buff.copy_from_slice(bytes);
        let key = VerifyingKey::from_bytes(&buff)
            .map_err(|_| anyhow::anyhow!("public key invalid edwards point"))?;
        Ok(PublicKey(key))
    }
}

impl PublicKey {
    /// Parse a public key from a hexadecimal string
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("public key hex decode error"))?;
        Self::try_from(&buff[..])
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The key's identity as a version-1 CID: the raw key bytes
    /// inlined under the libp2p-key codec.
    pub fn id(&self) -> Cid {
        let mh = Multihash::wrap(IDENTITY_HASH, &self.to_bytes()).expect("32 byte digest");
        Cid::new_v1(LIBP2P_KEY_CODEC, mh)
    }

    /// Base36 rendering of [`Self::id`], the form used in name URLs.
    pub fn id_string(&self) -> String {
        cid_base36(&self.id())
    }

    /// Verify an Ed25519 signature on a message.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &ed25519_dalek::Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        self.0.verify_strict(msg, signature)
    }
}

/// Secret key behind a mutable name.
///
/// Keep out of records and logs; only signatures and the public
/// identifier ever leave the key set.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&"..").finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&secret))
    }
}

impl SecretKey {
    /// Parse a secret key from a hexadecimal string
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PRIVATE_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("private key hex decode error"))?;
        Ok(Self::from(buff))
    }

    /// Generate a new random secret key using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
        Self::from(bytes)
    }

    /// Derive the public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Sign a message with this secret key using Ed25519.
    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let private_key = SecretKey::generate();
        let public_key = private_key.public();

        let private_hex = private_key.to_hex();
        let recovered_private = SecretKey::from_hex(&private_hex).unwrap();
        assert_eq!(private_key.to_bytes(), recovered_private.to_bytes());

        let public_hex = public_key.to_hex();
        let recovered_public = PublicKey::from_hex(&public_hex).unwrap();
        assert_eq!(public_key.to_bytes(), recovered_public.to_bytes());
    }

    #[test]
    fn test_public_id_shape() {
        let key = SecretKey::generate().public();
        let id = key.id();
        assert_eq!(id.codec(), LIBP2P_KEY_CODEC);
        assert_eq!(id.hash().code(), IDENTITY_HASH);
        // base36 multibase prefix
        assert!(key.id_string().starts_with('k'));
        // id is recoverable from the CID digest
        let recovered = PublicKey::try_from(id.hash().digest()).unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn test_sign_and_verify() {
        let secret_key = SecretKey::generate();
        let public_key = secret_key.public();
        let message = b"0:/content/bafyaabakaieac/";

        let signature = secret_key.sign(message);
        assert!(public_key.verify(message, &signature).is_ok());

        let wrong_message = b"1:/content/bafyaabakaieac/";
        assert!(public_key.verify(wrong_message, &signature).is_err());

        let other_key = SecretKey::generate().public();
        assert!(other_key.verify(message, &signature).is_err());
    }
}
