use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid point: DH output was the identity element")]
    InvalidPoint,

    #[error("AEAD authentication failed")]
    AeadAuthenticationFailed,

    #[error("invalid length: {0}")]
    InvalidLength(&'static str),

    #[error("random number generator failed: {0}")]
    RngFailure(String),

    #[error("signed prekey signature does not verify under the claimed identity key")]
    PrekeySignatureInvalid,

    #[error("peer identity rejected")]
    PeerIdentityRejected,

    #[error("chain key exhausted (message counter reached u32::MAX)")]
    ChainKeyExhausted,

    #[error("too many skipped message keys requested")]
    TooManySkippedKeys,

    #[error("malformed message header")]
    HeaderMalformed,

    #[error("unsupported session state envelope version")]
    StateVersionUnsupported,

    #[error("no such one-time prekey")]
    NoSuchOneTimePrekey,
}
