//! X3DH asynchronous key agreement: derives a shared root secret from three
//! or four Diffie-Hellman combinations, binds it to both identity keys, and
//! produces the handshake header the initiator attaches to its first
//! ciphertext.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::identity::{ed25519_pub_to_x25519, IdentityKeyPair};
use crate::prekey::{OneTimePrekey, PrekeyBundle, SignedPrekey};
use crate::primitives::{hkdf_sha256, read_u32_be, write_u32_be, x25519_dh, x25519_keypair};

const INFO_X3DH: &[u8] = b"styx-x3dh-v1";

/// Accompanies the initiator's first outbound ciphertext.
#[derive(Debug, Clone)]
pub struct HandshakeHeader {
    pub initiator_identity_pub: [u8; 32],
    pub ephemeral_pub: [u8; 32],
    pub opk_id: Option<u32>,
}

impl HandshakeHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 32 + 1 + 4);
        out.extend_from_slice(&self.initiator_identity_pub);
        out.extend_from_slice(&self.ephemeral_pub);
        match self.opk_id {
            Some(id) => {
                out.push(1);
                write_u32_be(&mut out, id);
            }
            None => out.push(0),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < 32 + 32 + 1 {
            return Err(CryptoError::HeaderMalformed);
        }
        let mut initiator_identity_pub = [0u8; 32];
        initiator_identity_pub.copy_from_slice(&bytes[0..32]);
        let mut ephemeral_pub = [0u8; 32];
        ephemeral_pub.copy_from_slice(&bytes[32..64]);
        let opk_id = match bytes[64] {
            0 => None,
            1 => {
                let id_bytes = bytes.get(65..69).ok_or(CryptoError::HeaderMalformed)?;
                Some(read_u32_be(id_bytes)?)
            }
            _ => return Err(CryptoError::HeaderMalformed),
        };
        Ok(Self { initiator_identity_pub, ephemeral_pub, opk_id })
    }
}

/// Output of a successful initiation: the derived root key, the handshake
/// header to attach to the first message, and the ephemeral secret/peer
/// signed-prekey public needed to seed the Double Ratchet's first DH step.
pub struct X3DHInitiation {
    pub root_key: [u8; 32],
    pub header: HandshakeHeader,
    pub ephemeral_secret: StaticSecret,
    pub ephemeral_public: X25519Public,
    pub peer_signed_prekey_public: X25519Public,
}

/// Alice's side: derive the shared secret from a verified peer bundle.
pub fn initiate<R: CryptoRng + RngCore>(
    my_identity: &IdentityKeyPair,
    bundle: &PrekeyBundle,
    rng: &mut R,
) -> Result<X3DHInitiation, CryptoError> {
    let peer_identity_vk = VerifyingKey::from_bytes(&bundle.identity_pub)
        .map_err(|_| CryptoError::PeerIdentityRejected)?;
    let spk_sig = Signature::from_bytes(&bundle.signed_prekey_sig);
    peer_identity_vk
        .verify(&bundle.signed_prekey_pub, &spk_sig)
        .map_err(|_| CryptoError::PeerIdentityRejected)?;

    let ik_a_x = my_identity.x25519_secret();
    let ik_b_x = ed25519_pub_to_x25519(&bundle.identity_pub)?;
    let spk_b = X25519Public::from(bundle.signed_prekey_pub);
    let (ek_secret, ek_public) = x25519_keypair(rng);

    let dh1 = x25519_dh(&ik_a_x, &spk_b)?;
    let dh2 = x25519_dh(&ek_secret, &ik_b_x)?;
    let dh3 = x25519_dh(&ek_secret, &spk_b)?;

    let mut root_material = Vec::with_capacity(32 * 4);
    root_material.extend_from_slice(&dh1);
    root_material.extend_from_slice(&dh2);
    root_material.extend_from_slice(&dh3);

    let opk_id = if let Some((opk_id, opk_pub_bytes)) = bundle.one_time_prekey {
        let opk_pub = X25519Public::from(opk_pub_bytes);
        let dh4 = x25519_dh(&ek_secret, &opk_pub)?;
        root_material.extend_from_slice(&dh4);
        Some(opk_id)
    } else {
        None
    };

    let mut root_key = [0u8; 32];
    hkdf_sha256(&root_material, Some(&[0u8; 32]), INFO_X3DH, &mut root_key)?;
    root_material.zeroize();

    Ok(X3DHInitiation {
        root_key,
        header: HandshakeHeader {
            initiator_identity_pub: my_identity.public_key_bytes(),
            ephemeral_pub: ek_public.to_bytes(),
            opk_id,
        },
        ephemeral_secret: ek_secret,
        ephemeral_public: ek_public,
        peer_signed_prekey_public: spk_b,
    })
}

/// Bob's side: reconstruct the shared secret from the initiator's handshake
/// header. `one_time_prekey` is consumed by value and destroyed (via
/// `ZeroizeOnDrop`) when this function returns, win or lose.
pub fn respond(
    my_identity: &IdentityKeyPair,
    my_signed_prekey: &SignedPrekey,
    one_time_prekey: Option<OneTimePrekey>,
    sender_identity_pub: &[u8; 32],
    header: &HandshakeHeader,
) -> Result<[u8; 32], CryptoError> {
    let ek_a = X25519Public::from(header.ephemeral_pub);
    let sender_ik_x = ed25519_pub_to_x25519(sender_identity_pub)?;
    let ik_b_x = my_identity.x25519_secret();

    let dh1 = x25519_dh(&my_signed_prekey.secret, &sender_ik_x)?;
    let dh2 = x25519_dh(&ik_b_x, &ek_a)?;
    let dh3 = x25519_dh(&my_signed_prekey.secret, &ek_a)?;

    let mut root_material = Vec::with_capacity(32 * 4);
    root_material.extend_from_slice(&dh1);
    root_material.extend_from_slice(&dh2);
    root_material.extend_from_slice(&dh3);

    if let Some(wanted_id) = header.opk_id {
        let opk = one_time_prekey.ok_or(CryptoError::NoSuchOneTimePrekey)?;
        if opk.id != wanted_id {
            return Err(CryptoError::NoSuchOneTimePrekey);
        }
        let dh4 = x25519_dh(&opk.secret, &ek_a)?;
        root_material.extend_from_slice(&dh4);
    }

    let mut root_key = [0u8; 32];
    hkdf_sha256(&root_material, Some(&[0u8; 32]), INFO_X3DH, &mut root_key)?;
    root_material.zeroize();

    Ok(root_key)
}
