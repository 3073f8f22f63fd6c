//! Decoding and expiry checks for bearer credentials.
//!
//! Credentials issued by the budget API are compact JWS strings
//! (`header.payload.signature`). Only the payload is read here. Signatures
//! are not verified on the client: the server rejects forged or stale
//! credentials with a 401, which the unauthorized handler turns into a logout.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use thiserror::Error;

/// Number of dot-separated segments in a compact JWS
const JWS_SEGMENTS: usize = 3;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Credential is not a three-part token (found {0} segments)")]
    Malformed(usize),

    #[error("Credential payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Credential payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Credential payload is missing the `{0}` claim")]
    MissingClaim(&'static str),
}

/// The claims this client cares about, read out of a raw credential.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCredential {
    pub subject: String,
    pub expiry_epoch_ms: i64,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    exp: Option<serde_json::Number>,
}

/// Decode the payload of a raw credential.
pub fn decode(raw: &str) -> Result<DecodedCredential, DecodeError> {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    if segments.len() != JWS_SEGMENTS {
        return Err(DecodeError::Malformed(segments.len()));
    }

    // Some issuers pad the payload even though JWS forbids it
    let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    let claims: Claims = serde_json::from_slice(&payload)?;

    let subject = claims
        .sub
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::MissingClaim("sub"))?;

    let exp_secs = claims
        .exp
        .and_then(|n| n.as_f64())
        .ok_or(DecodeError::MissingClaim("exp"))?;

    Ok(DecodedCredential {
        subject,
        expiry_epoch_ms: (exp_secs * 1000.0) as i64,
    })
}

/// A credential is expired from its expiry instant onwards.
pub fn is_expired(decoded: &DecodedCredential, now_epoch_ms: i64) -> bool {
    now_epoch_ms >= decoded.expiry_epoch_ms
}
