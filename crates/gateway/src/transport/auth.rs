// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handshake authentication: `HMAC-SHA256(key, session_id)`, hex-encoded
//! lowercase, compared in constant time.

use ring::hmac;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Compute the expected auth token for a session.
pub fn session_token(key: &str, session_id: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    let tag = hmac::sign(&key, session_id.as_bytes());
    hex_lower(tag.as_ref())
}

/// Validate a presented `rs_auth` value against the account key.
pub fn verify_session_token(key: &str, session_id: &str, presented: &str) -> bool {
    constant_time_eq(&session_token(key, session_id), presented)
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
