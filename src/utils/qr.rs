// src/utils/qr.rs

use uuid::Uuid;

/// Mints an opaque check-in token.
///
/// 122 random bits from the OS generator, rendered as 32 lowercase hex chars.
/// Nothing about the session (id, time) can be recovered from it.
pub fn generate_qr_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Cheap shape check before touching the database.
pub fn looks_like_qr_token(candidate: &str) -> bool {
    candidate.len() == 32 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}
