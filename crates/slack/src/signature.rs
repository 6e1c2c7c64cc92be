//! Inbound request verification.
//!
//! Slack proves a request's origin either with the legacy verification token carried inside the
//! payload, or with an `X-Slack-Signature` HMAC over `v0:<timestamp>:<body>`. Every configured
//! mechanism must pass.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Maximum age of a signed request, in seconds.
pub const MAX_REQUEST_AGE_SECS: u64 = 300;
const MAX_CLOCK_SKEW_SECS: u64 = 60;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("no verification token or signing secret is configured")]
    NotConfigured,
    #[error("missing `{0}`")]
    Missing(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("request signature does not match")]
    SignatureMismatch,
    #[error("verification token does not match")]
    TokenMismatch,
    #[error("signing secret cannot be used as an HMAC key")]
    InvalidSecret,
}

/// The parts of an inbound request that carry proof of origin.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestProof<'a> {
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
    pub token: Option<&'a str>,
}

#[derive(Clone, Debug)]
pub struct RequestVerifier {
    verification_token: Option<SecretString>,
    signing_secret: Option<SecretString>,
}

impl RequestVerifier {
    pub fn new(verification_token: Option<SecretString>, signing_secret: Option<SecretString>) -> Self {
        let present = |secret: Option<SecretString>| {
            secret.filter(|value| !value.expose_secret().trim().is_empty())
        };
        Self {
            verification_token: present(verification_token),
            signing_secret: present(signing_secret),
        }
    }

    pub fn verify(&self, proof: &RequestProof<'_>) -> Result<(), VerificationError> {
        self.verify_at(proof, unix_now())
    }

    pub fn verify_at(&self, proof: &RequestProof<'_>, now_secs: u64) -> Result<(), VerificationError> {
        self.verify_signature_at(proof, now_secs)?;
        self.verify_token(proof.token)
    }

    /// Checks only the header signature, which needs nothing but the headers and the raw body.
    pub fn verify_signature(&self, proof: &RequestProof<'_>) -> Result<(), VerificationError> {
        self.verify_signature_at(proof, unix_now())
    }

    pub fn verify_signature_at(
        &self,
        proof: &RequestProof<'_>,
        now_secs: u64,
    ) -> Result<(), VerificationError> {
        if self.verification_token.is_none() && self.signing_secret.is_none() {
            return Err(VerificationError::NotConfigured);
        }
        match &self.signing_secret {
            Some(secret) => check_signature(secret, proof, now_secs),
            None => Ok(()),
        }
    }

    /// Checks the payload token when one is configured. Compared in constant time.
    pub fn verify_token(&self, token: Option<&str>) -> Result<(), VerificationError> {
        let Some(expected) = &self.verification_token else {
            return Ok(());
        };
        let token = token.ok_or(VerificationError::Missing("token"))?;
        if bool::from(token.as_bytes().ct_eq(expected.expose_secret().as_bytes())) {
            Ok(())
        } else {
            Err(VerificationError::TokenMismatch)
        }
    }

    pub fn expects_token(&self) -> bool {
        self.verification_token.is_some()
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn check_signature(
    secret: &SecretString,
    proof: &RequestProof<'_>,
    now_secs: u64,
) -> Result<(), VerificationError> {
    let timestamp = proof.timestamp.ok_or(VerificationError::Missing(TIMESTAMP_HEADER))?;
    let signature = proof.signature.ok_or(VerificationError::Missing(SIGNATURE_HEADER))?;

    let sent_at: u64 = timestamp
        .trim()
        .parse()
        .map_err(|_| VerificationError::InvalidTimestamp(timestamp.to_owned()))?;
    if now_secs.saturating_sub(sent_at) > MAX_REQUEST_AGE_SECS
        || sent_at > now_secs + MAX_CLOCK_SKEW_SECS
    {
        return Err(VerificationError::StaleTimestamp);
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or(VerificationError::SignatureMismatch)?;
    signing_mac(secret.expose_secret(), timestamp, proof.body)?
        .verify_slice(&provided)
        .map_err(|_| VerificationError::SignatureMismatch)
}

fn signing_mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<Hmac<Sha256>, VerificationError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::InvalidSecret)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

/// `v0=<hex digest>` for the given request parts.
pub fn compute_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<String, VerificationError> {
    let digest = signing_mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("v0={}", hex::encode(digest)))
}
