// Copyright 2025 Cadence Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Webhook signature verification.
//!
//! Signatures are HMAC-SHA-256 over the *exact raw request bytes*,
//! hex-encoded, optionally prefixed with `sha256=`. Verification must run
//! before any parsing: re-serializing a parsed payload does not round-trip
//! byte-for-byte, and the MAC is byte-sensitive. Comparison is constant
//! time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signature verification failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// No shared secret is configured for the provider
    #[error("no webhook secret configured")]
    MissingSecret,

    /// The request carried no signature header
    #[error("missing signature header")]
    MissingSignature,

    /// The signature did not match the payload
    #[error("invalid signature")]
    InvalidSignature,
}

/// Computes the hex-encoded HMAC-SHA-256 of `payload` under `secret`.
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a provider-supplied signature against the raw payload bytes.
///
/// An optional `sha256=` prefix on the header value is stripped before
/// comparison. The comparison itself is constant time to keep timing from
/// leaking how much of a forged signature matched.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
) -> Result<(), SignatureError> {
    let presented = signature_header
        .strip_prefix("sha256=")
        .unwrap_or(signature_header)
        .trim();

    if presented.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let expected = compute_signature(secret, payload);

    let matches: bool = expected
        .as_bytes()
        .ct_eq(presented.to_lowercase().as_bytes())
        .into();

    if matches {
        Ok(())
    } else {
        Err(SignatureError::InvalidSignature)
    }
}
