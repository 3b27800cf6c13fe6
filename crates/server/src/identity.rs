//! Identifier normalization.
//!
//! The user pool stores a non-email-shaped `Username` and treats email
//! addresses as sign-in aliases. Registration therefore derives a stable,
//! provider-safe username from the email, and explicit usernames must never
//! look like an email (an email-shaped username collides with the alias
//! feature).

use crate::error::ServiceError;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Request-scoped identity input. At least one of email/username is present;
/// nothing here is ever persisted locally.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub email: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub given_name: Option<String>,
    pub display_name: Option<String>,
}

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    // Intentionally loose `local@domain.tld` shape check, not RFC 5322.
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email shape regex")
});

/// True if the candidate matches a simple `local@domain.tld` pattern.
pub fn is_email_shaped(candidate: &str) -> bool {
    EMAIL_SHAPE.is_match(candidate.trim())
}

/// Rejects email-shaped usernames before any provider call is made.
pub fn reject_if_email_shaped(candidate: &str) -> Result<(), ServiceError> {
    if is_email_shaped(candidate) {
        return Err(ServiceError::validation(
            "Username must not be an email address",
        ));
    }
    Ok(())
}

fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;
    for c in input.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "user".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derive the provider-safe username for an email.
///
/// Deterministic and free of I/O: registration and later confirmation must
/// reproduce the identical value, so the result is a pure function of the
/// trimmed, lowercased email. The `usr_` prefix plus the sanitizer guarantee
/// the output is never email-shaped.
pub fn username_from_email(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hash = String::with_capacity(10);
    for byte in digest.iter().take(5) {
        hash.push_str(&format!("{byte:02x}"));
    }
    format!("usr_{}_{hash}", sanitize(&normalized))
}

/// Derive the provider username for an [`Identity`].
///
/// An explicit non-email-shaped username wins verbatim (after trimming);
/// otherwise the username is derived from the email.
pub fn derive_provider_username(identity: &Identity) -> Result<String, ServiceError> {
    if let Some(username) = identity.username.as_deref() {
        let username = username.trim();
        if !username.is_empty() {
            reject_if_email_shaped(username)?;
            return Ok(username.to_string());
        }
    }
    match identity.email.as_deref() {
        Some(email) if !email.trim().is_empty() => Ok(username_from_email(email)),
        _ => Err(ServiceError::validation(
            "An email or username is required",
        )),
    }
}

/// Best-effort E.164 normalization: strip everything except digits and a
/// single leading `+`, then prepend `+` to an all-digit remainder.
///
/// Known limitation: this does not validate country codes or lengths.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }
    if !out.starts_with('+') && !out.is_empty() && out.chars().all(|c| c.is_ascii_digit()) {
        out.insert(0, '+');
    }
    out
}
