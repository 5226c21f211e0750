//! Session identifiers

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt::Write;

const TOKEN_BYTES: usize = 32;

/// Issue a fresh, unguessable session id (256 random bits, URL-safe).
pub fn issue_session_id() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short digest of a session id for log output. Raw ids are never logged.
pub fn redact(session_id: &str) -> String {
    let digest = Sha256::digest(session_id.as_bytes());
    digest.iter().take(6).fold(String::with_capacity(12), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_issued_ids_are_unique_and_url_safe() {
        let ids: HashSet<_> = (0..100).map(|_| issue_session_id()).collect();
        assert_eq!(ids.len(), 100);
        for id in &ids {
            assert_eq!(id.len(), 43);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_redact_is_stable_and_short() {
        let a = redact("session-a");
        assert_eq!(a, redact("session-a"));
        assert_ne!(a, redact("session-b"));
        assert_eq!(a.len(), 12);
        assert!(!a.contains("session"));
    }
}
