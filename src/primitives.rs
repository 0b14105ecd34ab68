//! Byte-oriented wrappers around the handful of primitives everything else
//! in this crate is built from: X25519 ECDH, Ed25519 sign/verify, SHA-256,
//! HKDF-SHA-256, HMAC-SHA-256, and ChaCha20-Poly1305 AEAD.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Generate a fresh X25519 keypair. Clamping is handled internally by
/// `x25519_dalek::StaticSecret`.
pub fn x25519_keypair<R: CryptoRng + RngCore>(rng: &mut R) -> (StaticSecret, PublicKey) {
    let secret = StaticSecret::random_from_rng(rng);
    let public = PublicKey::from(&secret);
    (secret, public)
}

/// `DH(priv, peer_pub)`, rejecting an all-zero output (a small-subgroup or
/// identity-element result, which `x25519_dalek` does not reject itself).
pub fn x25519_dh(secret: &StaticSecret, peer_pub: &PublicKey) -> Result<[u8; 32], CryptoError> {
    let shared = secret.diffie_hellman(peer_pub);
    let bytes = shared.to_bytes();
    if bytes == [0u8; 32] {
        return Err(CryptoError::InvalidPoint);
    }
    Ok(bytes)
}

pub fn ed25519_sign(signing_key: &SigningKey, msg: &[u8]) -> [u8; 64] {
    signing_key.sign(msg).to_bytes()
}

pub fn ed25519_verify(
    verifying_key: &VerifyingKey,
    msg: &[u8],
    sig: &[u8; 64],
) -> Result<(), CryptoError> {
    let signature = Signature::from_bytes(sig);
    verifying_key
        .verify(msg, &signature)
        .map_err(|_| CryptoError::PrekeySignatureInvalid)
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// `HKDF-SHA256(ikm, salt, info) -> out_len` bytes.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    out: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, out)
        .map_err(|_| CryptoError::InvalidLength("HKDF output too long"))
}

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256(key: &[u8; 32], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// `ChaCha20-Poly1305(key32, nonce12, ad, plaintext) -> ciphertext || tag`.
pub fn aead_encrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad: ad })
        .map_err(|_| CryptoError::AeadAuthenticationFailed)
}

pub fn aead_decrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad: ad })
        .map_err(|_| CryptoError::AeadAuthenticationFailed)
}

/// Constant-time equality. No early return on mismatch.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn zeroize_bytes(buf: &mut [u8]) {
    buf.zeroize();
}

pub fn write_u32_be(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn read_u32_be(buf: &[u8]) -> Result<u32, CryptoError> {
    let arr: [u8; 4] = buf
        .try_into()
        .map_err(|_| CryptoError::InvalidLength("expected 4-byte big-endian u32"))?;
    Ok(u32::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::OsRandom;

    #[test]
    fn dh_is_symmetric() {
        let (a_secret, a_pub) = x25519_keypair(&mut OsRandom);
        let (b_secret, b_pub) = x25519_keypair(&mut OsRandom);
        let shared_a = x25519_dh(&a_secret, &b_pub).unwrap();
        let shared_b = x25519_dh(&b_secret, &a_pub).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn aead_roundtrip() {
        let key = [7u8; 32];
        let nonce = [1u8; NONCE_LEN];
        let ct = aead_encrypt(&key, &nonce, b"ad", b"hello").unwrap();
        let pt = aead_decrypt(&key, &nonce, b"ad", &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn aead_rejects_tampered_ad() {
        let key = [7u8; 32];
        let nonce = [1u8; NONCE_LEN];
        let ct = aead_encrypt(&key, &nonce, b"ad", b"hello").unwrap();
        assert!(aead_decrypt(&key, &nonce, b"wrong-ad", &ct).is_err());
    }

    #[test]
    fn ct_eq_matches_and_rejects() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"ab"));
    }
}
