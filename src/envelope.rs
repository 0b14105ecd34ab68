//! Anonymous message envelopes that don't require an established ratchet
//! session: a sealed box hides even the sender's identity, a crypto box
//! authenticates a known sender.

use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::primitives::{aead_decrypt, aead_encrypt, hkdf_sha256, sha256_concat, x25519_dh, x25519_keypair, NONCE_LEN};

const INFO_SEALED: &[u8] = b"styx-sealed-v1";
const INFO_CRYPTOBOX: &[u8] = b"styx-cryptobox-v1";

/// `(ephemeral_pub, ciphertext)`. The sender's identity never appears
/// anywhere in this envelope, including the key derivation.
#[derive(Debug, Clone)]
pub struct SealedBox {
    pub ephemeral_pub: [u8; 32],
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` for `recipient_pub` such that only the recipient can
/// open it and nothing in the envelope identifies the sender.
pub fn seal<R: CryptoRng + RngCore>(
    recipient_pub: &X25519Public,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<SealedBox, CryptoError> {
    let (ephemeral_secret, ephemeral_public) = x25519_keypair(rng);
    let mut dh_out = x25519_dh(&ephemeral_secret, recipient_pub)?;
    let mut key = [0u8; 32];
    hkdf_sha256(&dh_out, None, INFO_SEALED, &mut key)?;
    dh_out.zeroize();

    let nonce_hash = sha256_concat(&[ephemeral_public.as_bytes(), recipient_pub.as_bytes()]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&nonce_hash[..NONCE_LEN]);

    let ciphertext = aead_encrypt(&key, &nonce, &[], plaintext);
    key.zeroize();
    Ok(SealedBox { ephemeral_pub: ephemeral_public.to_bytes(), ciphertext: ciphertext? })
}

/// Recipient side: recompute the same key from the recipient's secret key
/// and the envelope's ephemeral public key.
pub fn unseal(
    recipient_secret: &StaticSecret,
    sealed: &SealedBox,
) -> Result<Vec<u8>, CryptoError> {
    let recipient_pub = X25519Public::from(recipient_secret);
    let ephemeral_pub = X25519Public::from(sealed.ephemeral_pub);
    let mut dh_out = x25519_dh(recipient_secret, &ephemeral_pub)?;
    let mut key = [0u8; 32];
    hkdf_sha256(&dh_out, None, INFO_SEALED, &mut key)?;
    dh_out.zeroize();

    let nonce_hash = sha256_concat(&[sealed.ephemeral_pub.as_slice(), recipient_pub.as_bytes()]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&nonce_hash[..NONCE_LEN]);

    let plaintext = aead_decrypt(&key, &nonce, &[], &sealed.ciphertext);
    key.zeroize();
    plaintext
}

/// `(nonce, ciphertext)` for an authenticated exchange between two known
/// long-term X25519 keys, with no forward secrecy or ratcheting.
#[derive(Debug, Clone)]
pub struct CryptoBox {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

pub fn box_encrypt<R: CryptoRng + RngCore>(
    sender_secret: &StaticSecret,
    recipient_pub: &X25519Public,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<CryptoBox, CryptoError> {
    let mut dh_out = x25519_dh(sender_secret, recipient_pub)?;
    let mut key = [0u8; 32];
    hkdf_sha256(&dh_out, None, INFO_CRYPTOBOX, &mut key)?;
    dh_out.zeroize();

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let ciphertext = aead_encrypt(&key, &nonce, &[], plaintext);
    key.zeroize();
    Ok(CryptoBox { nonce, ciphertext: ciphertext? })
}

pub fn box_open(
    recipient_secret: &StaticSecret,
    sender_pub: &X25519Public,
    boxed: &CryptoBox,
) -> Result<Vec<u8>, CryptoError> {
    let mut dh_out = x25519_dh(recipient_secret, sender_pub)?;
    let mut key = [0u8; 32];
    hkdf_sha256(&dh_out, None, INFO_CRYPTOBOX, &mut key)?;
    dh_out.zeroize();

    let plaintext = aead_decrypt(&key, &boxed.nonce, &[], &boxed.ciphertext);
    key.zeroize();
    plaintext
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::OsRandom;

    #[test]
    fn sealed_box_roundtrip() {
        let recipient_secret = StaticSecret::random_from_rng(OsRandom);
        let recipient_pub = X25519Public::from(&recipient_secret);

        let sealed = seal(&recipient_pub, b"who is this", &mut OsRandom).unwrap();
        let plaintext = unseal(&recipient_secret, &sealed).unwrap();
        assert_eq!(plaintext, b"who is this");
    }

    #[test]
    fn sealed_box_rejects_wrong_recipient() {
        let recipient_secret = StaticSecret::random_from_rng(OsRandom);
        let recipient_pub = X25519Public::from(&recipient_secret);
        let wrong_secret = StaticSecret::random_from_rng(OsRandom);

        let sealed = seal(&recipient_pub, b"secret", &mut OsRandom).unwrap();
        assert!(unseal(&wrong_secret, &sealed).is_err());
    }

    #[test]
    fn crypto_box_roundtrip() {
        let sender_secret = StaticSecret::random_from_rng(OsRandom);
        let sender_pub = X25519Public::from(&sender_secret);
        let recipient_secret = StaticSecret::random_from_rng(OsRandom);
        let recipient_pub = X25519Public::from(&recipient_secret);

        let boxed = box_encrypt(&sender_secret, &recipient_pub, b"hi", &mut OsRandom).unwrap();
        let plaintext = box_open(&recipient_secret, &sender_pub, &boxed).unwrap();
        assert_eq!(plaintext, b"hi");
    }

    #[test]
    fn crypto_box_rejects_impersonated_sender() {
        let sender_secret = StaticSecret::random_from_rng(OsRandom);
        let impostor_secret = StaticSecret::random_from_rng(OsRandom);
        let impostor_pub = X25519Public::from(&impostor_secret);
        let recipient_secret = StaticSecret::random_from_rng(OsRandom);
        let recipient_pub = X25519Public::from(&recipient_secret);

        let boxed = box_encrypt(&sender_secret, &recipient_pub, b"hi", &mut OsRandom).unwrap();
        assert!(box_open(&recipient_secret, &impostor_pub, &boxed).is_err());
    }
}
