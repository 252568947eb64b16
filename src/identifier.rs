//! Interface identifier codec
//!
//! Interfaces are keyed by a 128-bit identifier. Callers may pass a hint in
//! canonical string form; anything absent, empty or malformed is replaced by
//! a freshly generated random identifier. No error is ever reported here.

use tracing::debug;
use uuid::Uuid;

const CANONICAL_LEN: usize = 36;

/// Resolve an optional identifier hint into an identifier
pub fn resolve(hint: Option<&str>) -> Uuid {
    match hint {
        Some(text) if !text.is_empty() => parse_canonical(text).unwrap_or_else(|| {
            debug!(hint = text, "malformed interface identifier, generating one");
            Uuid::new_v4()
        }),
        _ => Uuid::new_v4(),
    }
}

/// Parse the 36-character hyphenated form only
///
/// `Uuid::parse_str` also takes the simple, braced and URN forms; the host
/// does not.
pub fn parse_canonical(text: &str) -> Option<Uuid> {
    if text.len() != CANONICAL_LEN {
        return None;
    }
    Uuid::parse_str(text).ok()
}

/// Format an identifier the way the host reports it (lowercase, hyphenated)
pub fn to_canonical(id: &Uuid) -> String {
    id.as_hyphenated().to_string()
}
