//! Long-term identity key and the HD derivation that splits one seed into
//! independent identity / spending / viewing keypairs.
//!
//! The identity key is Ed25519 (for signing the signed prekey); its X25519
//! DH form is obtained from the same 32-byte secret via the standard
//! birational map from the Ed25519 curve to Curve25519, never transmitted
//! or stored separately.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::primitives::{ed25519_sign, ed25519_verify, hkdf_sha256};

const INFO_IDENTITY: &[u8] = b"styx-identity-v1";
const INFO_SPENDING: &[u8] = b"styx-spending-v1";
const INFO_VIEWING: &[u8] = b"styx-viewing-v1";

/// Convert an Ed25519 secret key to its X25519 DH form, mirroring the
/// clamped SHA-512 expansion `ed25519-dalek` uses internally.
pub fn ed25519_secret_to_x25519(ed_secret: &[u8; 32]) -> StaticSecret {
    let mut h = Sha512::digest(ed_secret);
    h[0] &= 248;
    h[31] &= 127;
    h[31] |= 64;
    let mut key = [0u8; 32];
    key.copy_from_slice(&h[..32]);
    h.as_mut_slice().zeroize();
    StaticSecret::from(key)
}

/// Convert an Ed25519 public key to its X25519 form via the birational map
/// from the twisted Edwards curve to its Montgomery form.
pub fn ed25519_pub_to_x25519(ed_pub: &[u8; 32]) -> Result<X25519Public, CryptoError> {
    let compressed = CompressedEdwardsY(*ed_pub);
    let point = compressed
        .decompress()
        .ok_or(CryptoError::InvalidLength("invalid Ed25519 public key"))?;
    Ok(X25519Public::from(point.to_montgomery().to_bytes()))
}

/// Long-term identity signing key. Its X25519 DH form is derived on demand,
/// never cached alongside the secret in a second field.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    verifying_key: VerifyingKey,
    secret_bytes: [u8; 32],
}

impl IdentityKeyPair {
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let mut secret_bytes = [0u8; 32];
        hkdf_sha256(seed, None, INFO_IDENTITY, &mut secret_bytes)?;
        let signing_key = SigningKey::from_bytes(&secret_bytes);
        Ok(Self {
            verifying_key: signing_key.verifying_key(),
            secret_bytes,
        })
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        ed25519_sign(&self.signing_key(), msg)
    }

    pub fn verify(public: &VerifyingKey, msg: &[u8], sig: &[u8; 64]) -> Result<(), CryptoError> {
        ed25519_verify(public, msg, sig)
    }

    /// The X25519 secret usable for DH with this identity's Ed25519 key.
    pub fn x25519_secret(&self) -> StaticSecret {
        ed25519_secret_to_x25519(&self.secret_bytes)
    }

    pub fn x25519_public(&self) -> Result<X25519Public, CryptoError> {
        ed25519_pub_to_x25519(&self.verifying_key.to_bytes())
    }
}

/// An X25519 keypair derived deterministically from the HD seed, used for
/// stealth-address viewing (recomputing the shared secret via DH).
pub struct DerivedX25519KeyPair {
    pub secret: StaticSecret,
    pub public: X25519Public,
}

/// The spending keypair on the Edwards form of Curve25519, kept as a raw
/// scalar/point pair rather than the Montgomery `X25519` type used for
/// viewing. Stealth-address derivation adds a public tweak onto the
/// spending public key to get a one-time address; only the Edwards
/// group's point-addition law supports that, so the spending key lives
/// here instead of being birationally mapped like the identity key is.
#[derive(ZeroizeOnDrop)]
pub struct SpendingKeyPair {
    scalar: Scalar,
    #[zeroize(skip)]
    public: EdwardsPoint,
}

impl SpendingKeyPair {
    pub fn scalar(&self) -> &Scalar {
        &self.scalar
    }

    pub fn public(&self) -> EdwardsPoint {
        self.public
    }

    pub fn public_compressed(&self) -> CompressedEdwardsY {
        self.public.compress()
    }
}

/// The three independently-derived keypairs produced from one 32-byte seed.
pub struct HdKeys {
    pub identity: IdentityKeyPair,
    pub spending: SpendingKeyPair,
    pub viewing: DerivedX25519KeyPair,
}

/// Split a 32-byte master seed into identity, spending, and viewing
/// keypairs via three independent HKDF-SHA-256 derivations. Spending and
/// viewing are derived separately so a viewing key can be delegated to a
/// scanning service without granting spend authority: a scanner given only
/// `spending.public_compressed()` and the viewing secret can recognize a
/// stealth announcement, but deriving the one-time *private* key for
/// spending requires the `SpendingKeyPair` itself.
pub fn derive_hd_keys(seed: &[u8; 32]) -> Result<HdKeys, CryptoError> {
    let identity = IdentityKeyPair::from_seed(seed)?;

    let mut spending_wide = [0u8; 64];
    hkdf_sha256(seed, None, INFO_SPENDING, &mut spending_wide)?;
    let spending_scalar = Scalar::from_bytes_mod_order_wide(&spending_wide);
    spending_wide.zeroize();
    let spending_public = &ED25519_BASEPOINT_TABLE * &spending_scalar;
    let spending = SpendingKeyPair { scalar: spending_scalar, public: spending_public };

    let mut viewing_secret = [0u8; 32];
    hkdf_sha256(seed, None, INFO_VIEWING, &mut viewing_secret)?;
    let viewing_secret = StaticSecret::from(viewing_secret);
    let viewing_public = X25519Public::from(&viewing_secret);

    Ok(HdKeys {
        identity,
        spending,
        viewing: DerivedX25519KeyPair { secret: viewing_secret, public: viewing_public },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hd_derivation_is_deterministic_and_independent() {
        let seed = [5u8; 32];
        let a = derive_hd_keys(&seed).unwrap();
        let b = derive_hd_keys(&seed).unwrap();
        assert_eq!(a.identity.public_key_bytes(), b.identity.public_key_bytes());
        assert_eq!(a.spending.public_compressed(), b.spending.public_compressed());
        assert_eq!(a.viewing.public.as_bytes(), b.viewing.public.as_bytes());
        assert_ne!(a.spending.public_compressed().to_bytes(), *a.viewing.public.as_bytes());
    }

    #[test]
    fn identity_sign_verify_roundtrip() {
        let keys = derive_hd_keys(&[9u8; 32]).unwrap();
        let sig = keys.identity.sign(b"hello");
        assert!(IdentityKeyPair::verify(&keys.identity.public_key(), b"hello", &sig).is_ok());
    }

    #[test]
    fn x25519_conversion_is_consistent_between_parties() {
        // A signature made with the Ed25519 secret should not be affected by
        // the independently-computed X25519 form; the conversion is only
        // used for DH, but both derivations must be stable.
        let keys = derive_hd_keys(&[3u8; 32]).unwrap();
        let x_pub_from_secret = X25519Public::from(&keys.identity.x25519_secret());
        let x_pub_from_public = keys.identity.x25519_public().unwrap();
        assert_eq!(x_pub_from_secret.as_bytes(), x_pub_from_public.as_bytes());
    }
}
