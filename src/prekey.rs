//! Signed prekeys, one-time prekeys, and the `PrekeyBundle` a directory
//! assembles and hands to a session initiator.

use std::time::SystemTime;

use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::identity::IdentityKeyPair;
use crate::primitives::{read_u32_be, write_u32_be, x25519_keypair};

/// An X25519 keypair whose public half is signed by the owning identity key,
/// rotated on a schedule by the caller.
#[derive(ZeroizeOnDrop)]
pub struct SignedPrekey {
    pub id: u32,
    pub secret: StaticSecret,
    #[zeroize(skip)]
    pub public: X25519Public,
    #[zeroize(skip)]
    pub signature: [u8; 64],
    #[zeroize(skip)]
    pub created_at: SystemTime,
}

pub fn generate_signed_prekey<R: CryptoRng + RngCore>(
    identity: &IdentityKeyPair,
    id: u32,
    rng: &mut R,
) -> SignedPrekey {
    let (secret, public) = x25519_keypair(rng);
    let signature = identity.sign(public.as_bytes());
    SignedPrekey { id, secret, public, signature, created_at: SystemTime::now() }
}

/// A single-use X25519 keypair. The private half must be destroyed the
/// first time a responder consumes it.
#[derive(ZeroizeOnDrop)]
pub struct OneTimePrekey {
    pub id: u32,
    pub secret: StaticSecret,
    #[zeroize(skip)]
    pub public: X25519Public,
}

/// Generate `count` one-time prekeys, ids assigned from `start_id`.
pub fn generate_one_time_prekeys<R: CryptoRng + RngCore>(
    start_id: u32,
    count: usize,
    rng: &mut R,
) -> Vec<OneTimePrekey> {
    (0..count as u32)
        .map(|offset| {
            let (secret, public) = x25519_keypair(rng);
            OneTimePrekey { id: start_id + offset, secret, public }
        })
        .collect()
}

/// What a directory assembles per fetch and hands to an initiator.
#[derive(Debug, Clone)]
pub struct PrekeyBundle {
    pub identity_pub: [u8; 32],
    pub signed_prekey_id: u32,
    pub signed_prekey_pub: [u8; 32],
    pub signed_prekey_sig: [u8; 64],
    pub one_time_prekey: Option<(u32, [u8; 32])>,
}

impl PrekeyBundle {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 4 + 32 + 64 + 1 + 4 + 32);
        out.extend_from_slice(&self.identity_pub);
        write_u32_be(&mut out, self.signed_prekey_id);
        out.extend_from_slice(&self.signed_prekey_pub);
        out.extend_from_slice(&self.signed_prekey_sig);
        match self.one_time_prekey {
            Some((id, pub_bytes)) => {
                out.push(1);
                write_u32_be(&mut out, id);
                out.extend_from_slice(&pub_bytes);
            }
            None => out.push(0),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < 32 + 4 + 32 + 64 + 1 {
            return Err(CryptoError::HeaderMalformed);
        }
        let mut cursor = 0usize;
        let identity_pub = take_32(bytes, &mut cursor)?;
        let signed_prekey_id = read_u32_be(take_n(bytes, &mut cursor, 4)?)?;
        let signed_prekey_pub = take_32(bytes, &mut cursor)?;
        let mut signed_prekey_sig = [0u8; 64];
        signed_prekey_sig.copy_from_slice(take_n(bytes, &mut cursor, 64)?);
        let opk_present = take_n(bytes, &mut cursor, 1)?[0];
        let one_time_prekey = match opk_present {
            0 => None,
            1 => {
                let id = read_u32_be(take_n(bytes, &mut cursor, 4)?)?;
                let pub_bytes = take_32(bytes, &mut cursor)?;
                Some((id, pub_bytes))
            }
            _ => return Err(CryptoError::HeaderMalformed),
        };
        Ok(Self {
            identity_pub,
            signed_prekey_id,
            signed_prekey_pub,
            signed_prekey_sig,
            one_time_prekey,
        })
    }
}

fn take_n<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], CryptoError> {
    let end = *cursor + n;
    let slice = bytes.get(*cursor..end).ok_or(CryptoError::HeaderMalformed)?;
    *cursor = end;
    Ok(slice)
}

fn take_32(bytes: &[u8], cursor: &mut usize) -> Result<[u8; 32], CryptoError> {
    let slice = take_n(bytes, cursor, 32)?;
    let mut arr = [0u8; 32];
    arr.copy_from_slice(slice);
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_hd_keys;
    use crate::rng::OsRandom;

    #[test]
    fn bundle_encode_decode_roundtrip_without_opk() {
        let keys = derive_hd_keys(&[1u8; 32]).unwrap();
        let spk = generate_signed_prekey(&keys.identity, 1, &mut OsRandom);
        let bundle = PrekeyBundle {
            identity_pub: keys.identity.public_key_bytes(),
            signed_prekey_id: spk.id,
            signed_prekey_pub: spk.public.to_bytes(),
            signed_prekey_sig: spk.signature,
            one_time_prekey: None,
        };
        let encoded = bundle.encode();
        assert_eq!(encoded.len(), 32 + 4 + 32 + 64 + 1);
        let decoded = PrekeyBundle::decode(&encoded).unwrap();
        assert_eq!(decoded.identity_pub, bundle.identity_pub);
        assert!(decoded.one_time_prekey.is_none());
    }

    #[test]
    fn bundle_encode_decode_roundtrip_with_opk() {
        let keys = derive_hd_keys(&[2u8; 32]).unwrap();
        let spk = generate_signed_prekey(&keys.identity, 1, &mut OsRandom);
        let opks = generate_one_time_prekeys(0, 1, &mut OsRandom);
        let bundle = PrekeyBundle {
            identity_pub: keys.identity.public_key_bytes(),
            signed_prekey_id: spk.id,
            signed_prekey_pub: spk.public.to_bytes(),
            signed_prekey_sig: spk.signature,
            one_time_prekey: Some((opks[0].id, opks[0].public.to_bytes())),
        };
        let encoded = bundle.encode();
        assert_eq!(encoded.len(), 32 + 4 + 32 + 64 + 1 + 4 + 32);
        let decoded = PrekeyBundle::decode(&encoded).unwrap();
        assert_eq!(decoded.one_time_prekey, Some((0, opks[0].public.to_bytes())));
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        assert!(PrekeyBundle::decode(&[0u8; 10]).is_err());
    }
}
