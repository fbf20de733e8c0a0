//! Small validation helpers for auth handlers.

use regex::Regex;

/// Opaque uid shape shared by profile keys and order-id prefixes.
pub(super) fn valid_uid(uid: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").is_ok_and(|regex| regex.is_match(uid))
}
