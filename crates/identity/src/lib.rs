//! # Leadforge Identity Crate
//!
//! Identity verification and plan quotas for the Leadforge backend:
//!
//! - **accounts**: registration, password login and the session store backing
//!   the request guard
//! - **tokens**: single-use, expiring security tokens for password reset,
//!   email verification, email change and team invitations
//! - **quota**: OTP allowance per subscription plan
//! - **audit**: append-only log of sensitive actions
//! - **mail**: outbound email transport abstraction
//!
//! Every component holds its own `SqlitePool` handle, handed in at
//! construction time.

pub mod accounts;
pub mod audit;
pub mod mail;
pub mod password;
pub mod quota;
pub mod tokens;
pub mod validation;

pub use accounts::{AuthError, AuthSession, Authenticator, NewAccount, User};
pub use audit::{AuditAction, AuditEntry, AuditError, AuditRecorder};
pub use mail::{HttpMailer, LogMailer, MailError, MailTemplate, Mailer};
pub use quota::{Plan, QuotaError, QuotaResolver, CANONICAL_OTP_OVERRIDES, PLAN_LIMITS};
pub use tokens::{
    AcceptedInvite, EmailChange, InvitePreview, IssuedToken, ResendOutcome, TokenError,
    TokenPurpose, TokenService, TokenSubject, TokenTtls, VerifiedEmail, VerifiedToken,
};
pub use validation::ValidationError;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use leadforge_config::MAX_TTL_SECONDS;
use base64::Engine as _;
use cuid2::CuidConstructor;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

/// 32 bytes from the OS RNG, URL-safe base64 without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest stored in place of a raw session or security token.
pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Lifetime from configured seconds, capped at [`MAX_TTL_SECONDS`] so that
/// `now + ttl` stays representable.
pub fn ttl_from_seconds(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_TTL_SECONDS) as i64)
}

pub(crate) fn new_public_id() -> String {
    CUID.create_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_secret_has_256_bits_of_entropy() {
        let secret = generate_secret();
        let decoded = URL_SAFE_NO_PAD.decode(secret.as_bytes()).unwrap();
        assert_eq!(decoded.len(), 32);
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn ttl_from_seconds_caps_oversized_values() {
        assert_eq!(ttl_from_seconds(3_600), Duration::hours(1));
        assert_eq!(ttl_from_seconds(u64::MAX), Duration::days(3_650));
        assert_eq!(ttl_from_seconds(i64::MAX as u64), Duration::days(3_650));
    }

    #[test]
    fn hash_secret_is_stable_and_case_sensitive() {
        assert_eq!(hash_secret("token"), hash_secret("token"));
        assert_ne!(hash_secret("token"), hash_secret("TOKEN"));
        assert_ne!(hash_secret("token"), "token");
    }
}
