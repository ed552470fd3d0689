use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Why a delivery's `X-Hub-Signature-256` header was not accepted.
#[derive(Debug, PartialEq, Eq)]
pub enum SignatureError {
    MissingHeader,
    MissingMethod,
    MissingHash,
    InvalidHex,
    UnsupportedMethod,
    InvalidSecret,
    Mismatch,
}

impl SignatureError {
    /// The body sent back to GitHub with the error status.
    pub fn message(&self) -> &'static [u8] {
        match self {
            SignatureError::MissingHeader => b"Missing signature header",
            SignatureError::MissingMethod => b"Signature hash method missing",
            SignatureError::MissingHash => b"Signature hash missing",
            SignatureError::InvalidHex => b"Invalid signature hash hex",
            SignatureError::UnsupportedMethod => b"Invalid signature hash method",
            SignatureError::InvalidSecret => b"Unable to create HMAC from secret",
            SignatureError::Mismatch => b"Signature verification failed",
        }
    }

    /// Errors on our side rather than the sender's.
    pub fn is_internal(&self) -> bool {
        *self == SignatureError::InvalidSecret
    }
}

/// Checks a `sha256=<hex>` signature of `body` against `secret`.
pub fn verify_signature(
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    let sig = signature.ok_or(SignatureError::MissingHeader)?;

    let mut components = sig.splitn(2, '=');
    let algo = components
        .next()
        .filter(|a| !a.is_empty())
        .ok_or(SignatureError::MissingMethod)?;
    let hash = components.next().ok_or(SignatureError::MissingHash)?;
    let hash = hex::decode(hash).map_err(|_| SignatureError::InvalidHex)?;

    if algo != "sha256" {
        return Err(SignatureError::UnsupportedMethod);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(body);
    mac.verify_slice(hash.as_slice())
        .map_err(|_| SignatureError::Mismatch)
}
