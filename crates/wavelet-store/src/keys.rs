//! Key material generated at first run: the Noise static keypair, the
//! Signal identity keypair, and the signed pre-key. Private halves never
//! leave this module except as persistence bytes.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Result, StoreError};

/// Key-type marker prepended to curve public keys in Signal-flavored blobs.
pub const DJB_KEY_TYPE: u8 = 0x05;

// ─── X25519 ─────────────────────────────────────────────────────────────────

/// An X25519 keypair (Noise static key, pre-keys).
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct from the 32 persisted secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// The 32 secret bytes, for persistence only.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Diffie-Hellman agreement with a peer public key.
    pub fn dh(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        self.secret
            .diffie_hellman(&PublicKey::from(*peer_public))
            .to_bytes()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

// ─── Ed25519 identity ───────────────────────────────────────────────────────

/// The device identity keypair: signs device-identity attestations and
/// anchors the Signal protocol identity.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::generate(&mut OsRng) }
    }

    /// Reconstruct from the 32 persisted seed bytes.
    pub fn from_seed(bytes: [u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(&bytes) }
    }

    /// The 32 seed bytes, for persistence only.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign `message`, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature over `message` under a raw 32-byte key.
pub fn verify_signature(public: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

// ─── Signed pre-key ─────────────────────────────────────────────────────────

/// The signed pre-key uploaded at registration.
#[derive(Clone, Debug)]
pub struct SignedPreKey {
    pub id: u32,
    pub key_pair: KeyPair,
    pub signature: [u8; 64],
}

impl SignedPreKey {
    /// Generate and sign a pre-key under the identity key. The signed
    /// message is the type-marked public key.
    pub fn generate(id: u32, identity: &IdentityKeyPair) -> Self {
        let key_pair = KeyPair::generate();
        let signature = identity.sign(&type_marked(&key_pair.public_bytes()));
        Self { id, key_pair, signature }
    }
}

/// `0x05 ‖ key` — the Signal-flavored public key form.
pub fn type_marked(public: &[u8; 32]) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = DJB_KEY_TYPE;
    out[1..].copy_from_slice(public);
    out
}

// ─── Misc generation ────────────────────────────────────────────────────────

/// Random registration id in the 14-bit range the server expects, never 0.
pub fn generate_registration_id() -> u32 {
    let mut rng = rand::rng();
    (rng.next_u32() & 0x3FFF).max(1)
}

/// Random 32-byte adv secret.
pub fn generate_adv_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    secret
}

/// Fixed-size view over a persisted BLOB column.
pub fn blob_to_array<const N: usize>(
    column: &'static str,
    blob: &[u8],
) -> Result<[u8; N]> {
    <[u8; N]>::try_from(blob).map_err(|_| StoreError::CorruptKeyMaterial {
        column,
        expected: N,
        actual: blob.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypairs_rebuild_from_persisted_bytes() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_secret_bytes(kp.secret_bytes());
        assert_eq!(kp.public_bytes(), restored.public_bytes());

        let identity = IdentityKeyPair::generate();
        let restored = IdentityKeyPair::from_seed(identity.seed_bytes());
        assert_eq!(identity.public_bytes(), restored.public_bytes());
    }

    #[test]
    fn dh_is_symmetric() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_eq!(a.dh(&b.public_bytes()), b.dh(&a.public_bytes()));
    }

    #[test]
    fn identity_signatures_verify_and_reject_tampering() {
        let identity = IdentityKeyPair::generate();
        let sig = identity.sign(b"device details");
        assert!(verify_signature(&identity.public_bytes(), &sig, b"device details"));
        assert!(!verify_signature(&identity.public_bytes(), &sig, b"device detailz"));

        let mut bad_sig = sig;
        bad_sig[0] ^= 1;
        assert!(!verify_signature(&identity.public_bytes(), &bad_sig, b"device details"));
    }

    #[test]
    fn signed_prekey_verifies_under_identity() {
        let identity = IdentityKeyPair::generate();
        let spk = SignedPreKey::generate(1, &identity);
        assert!(verify_signature(
            &identity.public_bytes(),
            &spk.signature,
            &type_marked(&spk.key_pair.public_bytes()),
        ));
    }

    #[test]
    fn registration_id_stays_in_range() {
        for _ in 0..100 {
            let id = generate_registration_id();
            assert!(id >= 1 && id <= 0x3FFF);
        }
    }
}
