//! A thin seam over the one piece of shared mutable state the core has: the
//! random number generator. Everything else is owned by a single session.
//!
//! Key-generating APIs take `&mut R where R: CryptoRng + RngCore` directly
//! (the traits `x25519-dalek`/`ed25519-dalek` already expect), so callers
//! that want a deterministic test double can substitute any `rand_core`
//! generator without this crate inventing a parallel RNG ecosystem.

use rand_core::{CryptoRng, RngCore};

/// The default generator, backed by the OS entropy source.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RngCore for OsRandom {
    fn next_u32(&mut self) -> u32 {
        rand::rngs::OsRng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        rand::rngs::OsRng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        rand::rngs::OsRng.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for OsRandom {}
