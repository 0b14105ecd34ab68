//! styx-crypto — cryptographic core for a privacy-preserving messaging and
//! payment stack.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - All public APIs return opaque newtypes to prevent accidental misuse.
//! - This crate neither logs, retries, nor surfaces contextual error
//!   strings; callers own policy, this crate owns correctness.
//!
//! # Module layout
//! - `identity`    — long-term Ed25519 identity key + HD spending/viewing derivation
//! - `prekey`      — signed prekeys, one-time prekeys, prekey bundles
//! - `x3dh`        — X3DH asynchronous key agreement
//! - `ratchet`      — full Double Ratchet with DH ratchet steps + skipped message keys
//! - `stealth`     — stealth meta-addresses, announcements, and view-tag scanning
//! - `envelope`    — sealed-box and crypto-box anonymous envelopes
//! - `commitment`  — hash-based value commitments
//! - `primitives`  — byte-oriented wrappers over the underlying crypto crates
//! - `rng`         — thin RNG seam
//! - `error`       — unified error type

pub mod commitment;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod prekey;
pub mod primitives;
pub mod ratchet;
pub mod rng;
pub mod stealth;
pub mod x3dh;

pub use error::CryptoError;
