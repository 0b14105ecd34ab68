//! Stealth addressing: a sender publishes a one-time address derived from a
//! recipient's published meta-address, and only the recipient (holding the
//! viewing key) can recognize it; only the recipient holding the *spending*
//! key can derive spend authority over it.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::identity::SpendingKeyPair;
use crate::primitives::{ct_eq, sha256_concat, x25519_dh, x25519_keypair};

const INFO_VIEW_TAG: &[u8] = b"styx-viewtag-v1";
const INFO_STEALTH_SEED: &[u8] = b"styx-stealth-v1";

/// The two public keys a recipient publishes so senders can address them.
#[derive(Debug, Clone, Copy)]
pub struct StealthMetaAddress {
    pub spending_pub: CompressedEdwardsY,
    pub viewing_pub: X25519Public,
}

/// Published alongside a transfer so the recipient can recognize and later
/// derive the spending key for the one-time address it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthAnnouncement {
    pub ephemeral_pub: [u8; 32],
    pub view_tag: u8,
    pub one_time_address: [u8; 32],
}

impl StealthAnnouncement {
    pub fn encode(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0..32].copy_from_slice(&self.ephemeral_pub);
        out[32] = self.view_tag;
        out[33..65].copy_from_slice(&self.one_time_address);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 65 {
            return Err(CryptoError::HeaderMalformed);
        }
        let mut ephemeral_pub = [0u8; 32];
        ephemeral_pub.copy_from_slice(&bytes[0..32]);
        let view_tag = bytes[32];
        let mut one_time_address = [0u8; 32];
        one_time_address.copy_from_slice(&bytes[33..65]);
        Ok(Self { ephemeral_pub, view_tag, one_time_address })
    }
}

fn view_tag(shared: &[u8; 32]) -> u8 {
    sha256_concat(&[INFO_VIEW_TAG, shared])[0]
}

fn tweak_scalar(spending_pub: &CompressedEdwardsY, shared: &[u8; 32]) -> Scalar {
    let seed = sha256_concat(&[INFO_STEALTH_SEED, spending_pub.as_bytes(), shared]);
    Scalar::from_bytes_mod_order(seed)
}

/// `spending_pub + tweak * G`, an additive point tweak onto the published
/// spending public key. Computable from `spending_pub` alone (public),
/// matching the Umbra/CARROT-style `base_pubkey + hash(shared_secret) * G`
/// construction: a viewing-only scanner can recompute this to recognize an
/// announcement, but cannot derive the corresponding private scalar.
fn derive_one_time_public(
    spending_pub: &CompressedEdwardsY,
    shared: &[u8; 32],
) -> Result<CompressedEdwardsY, CryptoError> {
    let base = spending_pub.decompress().ok_or(CryptoError::InvalidPoint)?;
    let tweak = tweak_scalar(spending_pub, shared);
    let tweak_point = &ED25519_BASEPOINT_TABLE * &tweak;
    Ok((base + tweak_point).compress())
}

/// `spending_scalar + tweak`, the one-time private scalar matching
/// `derive_one_time_public`. Requires the full `SpendingKeyPair`, not just
/// its public half, so only the key's actual owner can spend.
pub fn derive_one_time_secret(spending: &SpendingKeyPair, shared: &[u8; 32]) -> Scalar {
    let tweak = tweak_scalar(&spending.public_compressed(), shared);
    spending.scalar() + tweak
}

/// Sender side: given a recipient's meta-address, produce a fresh
/// announcement. The returned one-time address is for the sender's own
/// bookkeeping; only the recipient can independently derive its secret key.
pub fn generate_stealth_announcement<R: CryptoRng + RngCore>(
    recipient: &StealthMetaAddress,
    rng: &mut R,
) -> Result<StealthAnnouncement, CryptoError> {
    let (ephemeral_secret, ephemeral_public) = x25519_keypair(rng);
    let mut shared = x25519_dh(&ephemeral_secret, &recipient.viewing_pub)?;
    let tag = view_tag(&shared);
    let one_time_public = derive_one_time_public(&recipient.spending_pub, &shared)?;
    shared.zeroize();

    Ok(StealthAnnouncement {
        ephemeral_pub: ephemeral_public.to_bytes(),
        view_tag: tag,
        one_time_address: one_time_public.to_bytes(),
    })
}

/// Recipient side: does this announcement belong to us, and if so, is its
/// claimed one-time address genuinely derived from our keys?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    RejectedByTag,
    FalsePositiveTag,
    Confirmed,
}

/// Recognizes an announcement using only the viewing secret and the
/// spending *public* key — a scanning service holding these two cannot
/// derive spend authority, only recognition.
pub fn scan_announcement(
    announcement: &StealthAnnouncement,
    spending_pub: &CompressedEdwardsY,
    viewing_secret: &StaticSecret,
) -> Result<ScanOutcome, CryptoError> {
    let ephemeral_pub = X25519Public::from(announcement.ephemeral_pub);
    let mut shared = x25519_dh(viewing_secret, &ephemeral_pub)?;
    let expected_tag = view_tag(&shared);

    if expected_tag != announcement.view_tag {
        shared.zeroize();
        return Ok(ScanOutcome::RejectedByTag);
    }

    let derived = derive_one_time_public(spending_pub, &shared)?;
    shared.zeroize();

    if ct_eq(derived.as_bytes(), &announcement.one_time_address) {
        Ok(ScanOutcome::Confirmed)
    } else {
        Ok(ScanOutcome::FalsePositiveTag)
    }
}

/// Aggregate result of scanning a batch of announcements, useful for
/// monitoring the 1-in-256 view-tag false-positive rate in practice.
#[derive(Debug, Clone, Copy)]
pub struct ScanReport {
    pub matches: usize,
    pub total: usize,
    pub rejected_by_tag: usize,
    pub passed_tag_confirmed: usize,
    pub passed_tag_false_positive: usize,
    pub elapsed: std::time::Duration,
}

/// Scan every announcement in one pass. Each announcement costs one DH and,
/// on the ~1/256 that pass the tag filter, one more hash and a constant-time
/// compare — linear in the number of announcements, not in the number of
/// addresses a recipient has ever published.
pub fn scan_batch(
    meta: &StealthMetaAddress,
    viewing_secret: &StaticSecret,
    announcements: &[StealthAnnouncement],
) -> Result<ScanReport, CryptoError> {
    let start = std::time::Instant::now();
    let mut rejected_by_tag = 0usize;
    let mut passed_tag_confirmed = 0usize;
    let mut passed_tag_false_positive = 0usize;

    for announcement in announcements {
        match scan_announcement(announcement, &meta.spending_pub, viewing_secret)? {
            ScanOutcome::RejectedByTag => rejected_by_tag += 1,
            ScanOutcome::Confirmed => passed_tag_confirmed += 1,
            ScanOutcome::FalsePositiveTag => passed_tag_false_positive += 1,
        }
    }

    Ok(ScanReport {
        matches: passed_tag_confirmed,
        total: announcements.len(),
        rejected_by_tag,
        passed_tag_confirmed,
        passed_tag_false_positive,
        elapsed: start.elapsed(),
    })
}
