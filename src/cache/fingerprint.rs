use sha2::{Digest, Sha256};

use crate::session::Value;

/// Deterministic cache keys for (operation, parameters) pairs.
///
/// The digest is SHA-256 over a normalized operation text followed by a
/// canonical encoding of each parameter, so a fingerprint computed today
/// matches the one computed after a restart.
pub struct QueryFingerprint;

impl QueryFingerprint {
    /// Hex fingerprint of an operation and its ordered parameters
    pub fn generate(operation: &str, params: &[Value]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::normalize(operation));
        hasher.update([0u8]);
        for param in params {
            hasher.update(param.fingerprint_repr());
            hasher.update([0x1fu8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Collapse whitespace and upper-case everything outside quotes.
    /// Literals are preserved: `id = 1` and `id = 2` are different results.
    pub fn normalize(query: &str) -> String {
        let mut result = String::with_capacity(query.len());
        let mut quote: Option<char> = None;
        let mut after_whitespace = false;

        for ch in query.chars() {
            match (quote, ch) {
                (None, '\'' | '"') => {
                    quote = Some(ch);
                    result.push(ch);
                    after_whitespace = false;
                }
                (Some(open), _) if ch == open => {
                    // A doubled quote closes and immediately reopens, which keeps '' escapes intact
                    quote = None;
                    result.push(ch);
                }
                (Some(_), _) => result.push(ch),
                (None, ' ' | '\t' | '\n' | '\r') => {
                    if !after_whitespace && !result.is_empty() {
                        result.push(' ');
                        after_whitespace = true;
                    }
                }
                (None, _) => {
                    after_whitespace = false;
                    result.push(ch.to_ascii_uppercase());
                }
            }
        }

        let trimmed = result.trim_end();
        trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end().to_string()
    }
}
