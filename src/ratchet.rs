//! The Double Ratchet: an outer DH ratchet that advances the root key
//! whenever a new peer ratchet key is observed, and an inner symmetric
//! chain ratchet that derives one message key per message.

use std::collections::{HashMap, VecDeque};

use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::primitives::{
    aead_decrypt, aead_encrypt, hkdf_sha256, hmac_sha256, read_u32_be, write_u32_be,
    x25519_dh, x25519_keypair, NONCE_LEN,
};

const INFO_RK: &[u8] = b"styx-rk-v1";
const MAX_SKIP_PER_CHAIN: u32 = 1000;
const MAX_SKIP_TOTAL: usize = 1000;
const ENVELOPE_VERSION: u8 = 0x01;

/// Sent alongside every ciphertext so the recipient can advance its ratchet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatchetHeader {
    pub dh_pub: [u8; 32],
    pub pn: u32,
    pub n: u32,
}

impl RatchetHeader {
    fn encoded_len(&self) -> usize {
        32 + 4 + 4
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.dh_pub);
        write_u32_be(out, self.pn);
        write_u32_be(out, self.n);
    }
}

/// A bounded, insertion-ordered cache of message keys skipped while a chain
/// raced ahead of the receiver. Eviction is FIFO by insertion order, not by
/// access, matching a plain LRU-by-arrival-time policy.
#[derive(Clone, Default)]
struct SkippedCache {
    map: HashMap<([u8; 32], u32), [u8; 32]>,
    order: VecDeque<([u8; 32], u32)>,
}

impl SkippedCache {
    fn insert(&mut self, key: ([u8; 32], u32), value: [u8; 32]) {
        if self.map.insert(key, value).is_none() {
            self.order.push_back(key);
        }
        while self.map.len() > MAX_SKIP_TOTAL {
            match self.order.pop_front() {
                Some(oldest) => {
                    if let Some(mut v) = self.map.remove(&oldest) {
                        v.zeroize();
                    }
                }
                None => break,
            }
        }
    }

    fn remove(&mut self, key: &([u8; 32], u32)) -> Option<[u8; 32]> {
        let value = self.map.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    /// Drop every entry whose chain is not one of `keep`. Used after a DH
    /// ratchet step to purge keys belonging to chains older than the one
    /// just replaced.
    fn retain_chains(&mut self, keep: &[[u8; 32]]) {
        self.map.retain(|(dh_pub, _), value| {
            let keep_it = keep.contains(dh_pub);
            if !keep_it {
                value.zeroize();
            }
            keep_it
        });
        let live: std::collections::HashSet<_> = self.map.keys().cloned().collect();
        self.order.retain(|k| live.contains(k));
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn iter_in_order(&self) -> impl Iterator<Item = (&([u8; 32], u32), &[u8; 32])> {
        self.order.iter().filter_map(move |k| self.map.get_key_value(k))
    }
}

/// Complete Double Ratchet session state. Single-writer per session; the
/// caller is responsible for embedding this in whatever concurrency
/// primitive its architecture requires.
#[derive(Clone)]
pub struct SessionState {
    root_key: [u8; 32],
    dh_priv: [u8; 32],
    dh_pub: [u8; 32],
    remote_pub: Option<[u8; 32]>,
    send_ck: [u8; 32],
    recv_ck: [u8; 32],
    n_s: u32,
    n_r: u32,
    pn: u32,
    skipped: SkippedCache,
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.root_key.zeroize();
        self.dh_priv.zeroize();
        self.send_ck.zeroize();
        self.recv_ck.zeroize();
        for (_, v) in self.skipped.map.iter_mut() {
            v.zeroize();
        }
    }
}

impl SessionState {
    /// Start a session as the initiator. `ephemeral_secret`/`ephemeral_public`
    /// are the X3DH ephemeral keypair, reused here (not regenerated) as the
    /// first ratchet send key, per the handshake's own DH-ratchet step.
    pub fn initiate_as_sender(
        root_key: [u8; 32],
        ephemeral_secret: StaticSecret,
        ephemeral_public: X25519Public,
        peer_signed_prekey_public: X25519Public,
    ) -> Result<Self, CryptoError> {
        let dh_out = x25519_dh(&ephemeral_secret, &peer_signed_prekey_public)?;
        let (new_root, send_ck) = kdf_rk(&root_key, &dh_out)?;
        Ok(Self {
            root_key: new_root,
            dh_priv: ephemeral_secret.to_bytes(),
            dh_pub: ephemeral_public.to_bytes(),
            remote_pub: Some(peer_signed_prekey_public.to_bytes()),
            send_ck,
            recv_ck: [0u8; 32],
            n_s: 0,
            n_r: 0,
            pn: 0,
            skipped: SkippedCache::default(),
        })
    }

    /// Start a session as the responder. No DH ratchet has happened yet;
    /// that occurs when the initiator's first message arrives.
    pub fn initiate_as_receiver(
        root_key: [u8; 32],
        my_signed_prekey_secret: &StaticSecret,
        my_signed_prekey_public: X25519Public,
    ) -> Self {
        Self {
            root_key,
            dh_priv: my_signed_prekey_secret.to_bytes(),
            dh_pub: my_signed_prekey_public.to_bytes(),
            remote_pub: None,
            send_ck: [0u8; 32],
            recv_ck: [0u8; 32],
            n_s: 0,
            n_r: 0,
            pn: 0,
            skipped: SkippedCache::default(),
        }
    }

    pub fn local_ratchet_public(&self) -> [u8; 32] {
        self.dh_pub
    }

    /// Encrypt `plaintext`. `ad_outer` is `IK_init_pub ‖ IK_peer_pub` on the
    /// very first message of a session and empty on every message after.
    pub fn encrypt<R: CryptoRng + RngCore>(
        &mut self,
        ad_outer: &[u8],
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<(RatchetHeader, [u8; NONCE_LEN], Vec<u8>), CryptoError> {
        if self.n_s == u32::MAX {
            return Err(CryptoError::ChainKeyExhausted);
        }
        let (new_ck, msg_key) = kdf_ck(&self.send_ck);
        self.send_ck = new_ck;

        let header = RatchetHeader { dh_pub: self.dh_pub, pn: self.pn, n: self.n_s };
        let ad = build_ad(ad_outer, &header);

        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let ciphertext = aead_encrypt(&msg_key, &nonce, &ad, plaintext)?;
        self.n_s += 1;
        Ok((header, nonce, ciphertext))
    }

    /// Decrypt a received message. On any error the state is left exactly
    /// as it was before the call — the ratchet/skip-ahead work that leads
    /// up to the AEAD check is performed on a scratch copy and only
    /// committed once the AEAD tag verifies.
    pub fn decrypt<R: CryptoRng + RngCore>(
        &mut self,
        header: &RatchetHeader,
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
        ad_outer: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        // Case 1: a key already skipped into the cache. No ratchet mutation
        // involved, so this can be tried directly against `self`.
        if let Some(mut msg_key) = self.skipped.remove(&(header.dh_pub, header.n)) {
            let ad = build_ad(ad_outer, header);
            let result = aead_decrypt(&msg_key, nonce, &ad, ciphertext);
            msg_key.zeroize();
            return result;
        }

        let mut scratch = self.clone();
        let plaintext = scratch.decrypt_advancing(header, nonce, ciphertext, ad_outer, rng)?;
        *self = scratch;
        Ok(plaintext)
    }

    fn decrypt_advancing<R: CryptoRng + RngCore>(
        &mut self,
        header: &RatchetHeader,
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
        ad_outer: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        let peer_pub = X25519Public::from(header.dh_pub);

        let need_dh_ratchet = match self.remote_pub {
            Some(current) => current != header.dh_pub,
            None => true,
        };

        if need_dh_ratchet {
            if self.remote_pub.is_some() {
                self.skip_message_keys(header.pn)?;
            }
            let replaced_chain = self.remote_pub;
            self.remote_pub = Some(header.dh_pub);

            let local_secret = StaticSecret::from(self.dh_priv);
            let dh_recv_out = x25519_dh(&local_secret, &peer_pub)?;
            let (new_root, new_recv_ck) = kdf_rk(&self.root_key, &dh_recv_out)?;
            self.root_key = new_root;
            self.recv_ck = new_recv_ck;
            self.n_r = 0;

            self.pn = self.n_s;
            self.n_s = 0;
            let (new_secret, new_public) = x25519_keypair(rng);
            let dh_send_out = x25519_dh(&new_secret, &peer_pub)?;
            let (new_root2, new_send_ck) = kdf_rk(&self.root_key, &dh_send_out)?;
            self.root_key = new_root2;
            self.send_ck = new_send_ck;
            self.dh_pub = new_public.to_bytes();
            self.dh_priv = new_secret.to_bytes();

            let mut keep = vec![header.dh_pub];
            if let Some(prev) = replaced_chain {
                keep.push(prev);
            }
            self.skipped.retain_chains(&keep);
        }

        self.skip_message_keys(header.n)?;

        if self.n_r == u32::MAX {
            return Err(CryptoError::ChainKeyExhausted);
        }
        let (new_ck, msg_key) = kdf_ck(&self.recv_ck);
        self.recv_ck = new_ck;

        let ad = build_ad(ad_outer, header);
        let plaintext = aead_decrypt(&msg_key, nonce, &ad, ciphertext)?;
        self.n_r += 1;
        Ok(plaintext)
    }

    /// Derive and cache message keys for `self.n_r..until` in the current
    /// receiving chain.
    fn skip_message_keys(&mut self, until: u32) -> Result<(), CryptoError> {
        if until < self.n_r {
            return Ok(());
        }
        let skip_count = until - self.n_r;
        if skip_count >= MAX_SKIP_PER_CHAIN {
            return Err(CryptoError::TooManySkippedKeys);
        }
        let remote = self.remote_pub.ok_or(CryptoError::HeaderMalformed)?;
        while self.n_r < until {
            let (new_ck, msg_key) = kdf_ck(&self.recv_ck);
            self.recv_ck = new_ck;
            self.skipped.insert((remote, self.n_r), msg_key);
            self.n_r += 1;
        }
        Ok(())
    }

    /// Serialize every field in the canonical, versioned, length-prefixed
    /// framing. Field order is fixed so `ct_eq` over two exports is a valid
    /// equality test.
    pub fn export(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.skipped.len() * 68);
        out.push(ENVELOPE_VERSION);
        out.extend_from_slice(&self.root_key);
        out.extend_from_slice(&self.dh_priv);
        out.extend_from_slice(&self.dh_pub);
        match self.remote_pub {
            Some(remote) => {
                out.push(1);
                out.extend_from_slice(&remote);
            }
            None => {
                out.push(0);
                out.extend_from_slice(&[0u8; 32]);
            }
        }
        out.extend_from_slice(&self.send_ck);
        out.extend_from_slice(&self.recv_ck);
        write_u32_be(&mut out, self.n_s);
        write_u32_be(&mut out, self.n_r);
        write_u32_be(&mut out, self.pn);
        write_u32_be(&mut out, self.skipped.len() as u32);
        for ((dh_pub, n), msg_key) in self.skipped.iter_in_order() {
            out.extend_from_slice(dh_pub);
            write_u32_be(&mut out, *n);
            out.extend_from_slice(msg_key);
        }
        out
    }

    /// Validate the version byte, field lengths, and counter well-formedness,
    /// then load private key bytes into the new state.
    pub fn import(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut cursor = 0usize;
        let version = take_n(bytes, &mut cursor, 1)?[0];
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::StateVersionUnsupported);
        }
        let root_key = take_32(bytes, &mut cursor)?;
        let dh_priv = take_32(bytes, &mut cursor)?;
        let dh_pub = take_32(bytes, &mut cursor)?;
        let remote_present = take_n(bytes, &mut cursor, 1)?[0];
        let remote_bytes = take_32(bytes, &mut cursor)?;
        let remote_pub = match remote_present {
            0 => None,
            1 => Some(remote_bytes),
            _ => return Err(CryptoError::HeaderMalformed),
        };
        let send_ck = take_32(bytes, &mut cursor)?;
        let recv_ck = take_32(bytes, &mut cursor)?;
        let n_s = read_u32_be(take_n(bytes, &mut cursor, 4)?)?;
        let n_r = read_u32_be(take_n(bytes, &mut cursor, 4)?)?;
        let pn = read_u32_be(take_n(bytes, &mut cursor, 4)?)?;
        let skipped_count = read_u32_be(take_n(bytes, &mut cursor, 4)?)?;

        let mut skipped = SkippedCache::default();
        for _ in 0..skipped_count {
            let dh_pub_entry = take_32(bytes, &mut cursor)?;
            let n = read_u32_be(take_n(bytes, &mut cursor, 4)?)?;
            let msg_key = take_32(bytes, &mut cursor)?;
            skipped.insert((dh_pub_entry, n), msg_key);
        }

        Ok(Self { root_key, dh_priv, dh_pub, remote_pub, send_ck, recv_ck, n_s, n_r, pn, skipped })
    }
}

/// Constant-time equality over two exported envelopes.
pub fn ct_eq_exported(a: &[u8], b: &[u8]) -> bool {
    crate::primitives::ct_eq(a, b)
}

fn build_ad(ad_outer: &[u8], header: &RatchetHeader) -> Vec<u8> {
    let mut ad = Vec::with_capacity(ad_outer.len() + header.encoded_len());
    ad.extend_from_slice(ad_outer);
    header.write_to(&mut ad);
    ad
}

/// `KDF_RK`: mix a DH output into the root key, producing a fresh root key
/// and chain key from one 64-byte HKDF expansion split 32/32.
fn kdf_rk(rk: &[u8; 32], dh_output: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let mut out = [0u8; 64];
    hkdf_sha256(dh_output, Some(rk), INFO_RK, &mut out)?;
    let mut new_rk = [0u8; 32];
    let mut new_ck = [0u8; 32];
    new_rk.copy_from_slice(&out[..32]);
    new_ck.copy_from_slice(&out[32..]);
    out.zeroize();
    Ok((new_rk, new_ck))
}

/// `KDF_CK`: chain key -> (next chain key, message key).
fn kdf_ck(ck: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let new_ck = hmac_sha256(ck, &[0x02]);
    let msg_key = hmac_sha256(ck, &[0x01]);
    (new_ck, msg_key)
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
    use crate::rng::OsRandom;

    fn establish_pair() -> (SessionState, SessionState) {
        let shared_key = [42u8; 32];
        let bob_spk = StaticSecret::random_from_rng(OsRandom);
        let bob_spk_pub = X25519Public::from(&bob_spk);
        let (ek_secret, ek_public) = x25519_keypair(&mut OsRandom);

        let alice =
            SessionState::initiate_as_sender(shared_key, ek_secret, ek_public, bob_spk_pub).unwrap();
        let bob = SessionState::initiate_as_receiver(shared_key, &bob_spk, bob_spk_pub);
        (alice, bob)
    }

    #[test]
    fn happy_path_in_order() {
        let (mut alice, mut bob) = establish_pair();
        for msg in [b"A".as_slice(), b"B", b"C"] {
            let (header, nonce, ct) = alice.encrypt(b"", msg, &mut OsRandom).unwrap();
            let pt = bob.decrypt(&header, &nonce, &ct, b"", &mut OsRandom).unwrap();
            assert_eq!(pt, msg);
        }
        let (header, nonce, ct) = bob.encrypt(b"", b"D", &mut OsRandom).unwrap();
        let pt = alice.decrypt(&header, &nonce, &ct, b"", &mut OsRandom).unwrap();
        assert_eq!(pt, b"D");
    }

    #[test]
    fn out_of_order_within_one_chain() {
        let (mut alice, mut bob) = establish_pair();
        let m0 = alice.encrypt(b"", b"M0", &mut OsRandom).unwrap();
        let m1 = alice.encrypt(b"", b"M1", &mut OsRandom).unwrap();
        let m2 = alice.encrypt(b"", b"M2", &mut OsRandom).unwrap();

        let pt2 = bob.decrypt(&m2.0, &m2.1, &m2.2, b"", &mut OsRandom).unwrap();
        assert_eq!(pt2, b"M2");
        let pt0 = bob.decrypt(&m0.0, &m0.1, &m0.2, b"", &mut OsRandom).unwrap();
        assert_eq!(pt0, b"M0");
        let pt1 = bob.decrypt(&m1.0, &m1.1, &m1.2, b"", &mut OsRandom).unwrap();
        assert_eq!(pt1, b"M1");
        assert_eq!(bob.skipped.len(), 0);
    }

    #[test]
    fn dh_ratchet_across_reply() {
        let (mut alice, mut bob) = establish_pair();
        let hello = alice.encrypt(b"", b"hello", &mut OsRandom).unwrap();
        bob.decrypt(&hello.0, &hello.1, &hello.2, b"", &mut OsRandom).unwrap();

        let hi = bob.encrypt(b"", b"hi", &mut OsRandom).unwrap();
        alice.decrypt(&hi.0, &hi.1, &hi.2, b"", &mut OsRandom).unwrap();

        let how = alice.encrypt(b"", b"how", &mut OsRandom).unwrap();
        let are = alice.encrypt(b"", b"are", &mut OsRandom).unwrap();

        let pt_are = bob.decrypt(&are.0, &are.1, &are.2, b"", &mut OsRandom).unwrap();
        assert_eq!(pt_are, b"are");
        let pt_how = bob.decrypt(&how.0, &how.1, &how.2, b"", &mut OsRandom).unwrap();
        assert_eq!(pt_how, b"how");
        bob.encrypt(b"", b"ok", &mut OsRandom).unwrap();

        assert_eq!(alice.n_s, 2);
        assert_eq!(alice.pn, 1);
        assert_eq!(alice.n_r, 1);
        assert_eq!(bob.n_s, 1);
        assert_eq!(bob.pn, 1);
        assert_eq!(bob.n_r, 2);
    }

    #[test]
    fn skip_cap_rejects_and_does_not_mutate_state() {
        let (mut alice, mut bob) = establish_pair();
        let mut last = None;
        for i in 0..1001 {
            let msg = format!("m{i}");
            last = Some(alice.encrypt(b"", msg.as_bytes(), &mut OsRandom).unwrap());
        }
        let (header, nonce, ct) = last.unwrap();
        let before = bob.export();
        let err = bob.decrypt(&header, &nonce, &ct, b"", &mut OsRandom);
        assert!(matches!(err, Err(CryptoError::TooManySkippedKeys)));
        let after = bob.export();
        assert!(ct_eq_exported(&before, &after));
    }

    #[test]
    fn forged_ciphertext_leaves_state_untouched() {
        let (mut alice, mut bob) = establish_pair();
        let (header, nonce, mut ct) = alice.encrypt(b"", b"hello", &mut OsRandom).unwrap();
        ct[0] ^= 0xFF;
        let before = bob.export();
        let err = bob.decrypt(&header, &nonce, &ct, b"", &mut OsRandom);
        assert!(matches!(err, Err(CryptoError::AeadAuthenticationFailed)));
        let after = bob.export();
        assert!(ct_eq_exported(&before, &after));
    }

    #[test]
    fn export_import_round_trip_is_ct_equal_and_functional() {
        let (mut alice, mut bob) = establish_pair();
        let (header, nonce, ct) = alice.encrypt(b"", b"hello", &mut OsRandom).unwrap();
        bob.decrypt(&header, &nonce, &ct, b"", &mut OsRandom).unwrap();

        let exported = bob.export();
        let mut restored = SessionState::import(&exported).unwrap();
        assert!(ct_eq_exported(&exported, &restored.export()));

        let (header2, nonce2, ct2) = alice.encrypt(b"", b"again", &mut OsRandom).unwrap();
        let pt_a = bob.decrypt(&header2, &nonce2, &ct2, b"", &mut OsRandom).unwrap();
        let pt_b = restored.decrypt(&header2, &nonce2, &ct2, b"", &mut OsRandom).unwrap();
        assert_eq!(pt_a, pt_b);
    }

    #[test]
    fn import_rejects_unknown_version() {
        let mut bytes = vec![0xAA];
        bytes.extend_from_slice(&[0u8; 200]);
        assert!(matches!(
            SessionState::import(&bytes),
            Err(CryptoError::StateVersionUnsupported)
        ));
    }
}
