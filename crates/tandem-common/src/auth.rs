//! Anonymous relay authentication.
//!
//! Relays running in anonymous mode accept any well-formed, unexpired JWT
//! passed as a `token` query parameter and never check the signature.
//! Clients mint their own, signed HS256 under a throwaway secret.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use miette::Diagnostic;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

/// How long a minted token stays valid.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum AuthError {
    #[error("system random source unavailable")]
    #[diagnostic(code(tandem::auth::random))]
    Random,

    #[error("system clock is set before the unix epoch")]
    #[diagnostic(code(tandem::auth::clock))]
    Clock,

    #[error("failed to encode token")]
    #[diagnostic(code(tandem::auth::encode))]
    Encode(#[from] serde_json::Error),
}

/// Claims an anonymous relay expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Display name.
    pub sub: String,
    /// Issued at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
    /// Random per-token session id.
    pub sid: String,
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

/// Mint a token for `username`, issued at `now`.
pub fn anonymous_token(username: &str, now: SystemTime) -> Result<String, AuthError> {
    let rng = SystemRandom::new();
    let mut sid = [0u8; 16];
    rng.fill(&mut sid).map_err(|_| AuthError::Random)?;
    let mut secret = [0u8; 32];
    rng.fill(&mut secret).map_err(|_| AuthError::Random)?;

    let iat = now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| AuthError::Clock)?
        .as_secs();
    let claims = Claims {
        sub: username.to_owned(),
        iat,
        exp: iat + TOKEN_LIFETIME.as_secs(),
        sid: sid.iter().map(|b| format!("{b:02x}")).collect(),
    };

    let header = Header {
        alg: "HS256",
        typ: "JWT",
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    );
    let key = hmac::Key::new(hmac::HMAC_SHA256, &secret);
    let signature = hmac::sign(&key, signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.as_ref())
    ))
}

/// Append `token` to a relay URL as a query parameter.
pub fn with_token(url: &str, token: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}token={token}")
}
