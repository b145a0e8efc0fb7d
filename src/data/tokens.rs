//! Scoped, expiring, one-way-hashed tokens.
//!
//! Only the SHA-256 hash of a token is ever persisted; the plaintext is
//! returned to the caller exactly once at issuance.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::data::StoreError;

/// Length of a token plaintext in characters.
pub const PLAINTEXT_LEN: usize = 26;

/// Alphabet for token plaintexts (base32, no padding).
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// The purpose a token is valid for. A token issued for one scope is never
/// accepted for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Authentication,
    Activation,
    PasswordReset,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Authentication => "authentication",
            TokenScope::Activation => "activation",
            TokenScope::PasswordReset => "password-reset",
        }
    }
}

/// A freshly issued token. `plaintext` goes to the client; `hash` goes to
/// the store.
#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: String,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl Token {
    /// Generate a new random token for the given user, lifetime and scope.
    pub fn generate(user_id: i64, ttl: Duration, scope: TokenScope) -> Self {
        let mut rng = rand::thread_rng();
        let plaintext: String = (0..PLAINTEXT_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let hash = Self::hash_plaintext(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }

    /// One-way hash of a token plaintext, hex encoded.
    pub fn hash_plaintext(plaintext: &str) -> String {
        hex::encode(Sha256::digest(plaintext.as_bytes()))
    }
}

/// Stateless structural check on a client-supplied plaintext. Run before any
/// store lookup so garbage input never costs a query.
pub fn plaintext_is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == PLAINTEXT_LEN && plaintext.bytes().all(|b| ALPHABET.contains(&b))
}

/// Store contract for tokens. Resolution of a token back to its user lives on
/// [`crate::data::UserStore::get_for_token`], where the expiry predicate is
/// part of the lookup.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    /// Delete every token a user holds for one scope. Used when a token is
    /// consumed (activation, password reset) or superseded.
    async fn delete_all_for_user(&self, scope: TokenScope, user_id: i64)
        -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_plaintext_is_well_formed() {
        let token = Token::generate(1, Duration::hours(24), TokenScope::Authentication);
        assert_eq!(token.plaintext.len(), PLAINTEXT_LEN);
        assert!(plaintext_is_well_formed(&token.plaintext));
        assert!(token.expiry > Utc::now());
    }

    #[test]
    fn hash_is_deterministic_and_not_the_plaintext() {
        let token = Token::generate(1, Duration::hours(1), TokenScope::Activation);
        assert_eq!(token.hash, Token::hash_plaintext(&token.plaintext));
        assert_ne!(token.hash, token.plaintext);
        assert_eq!(token.hash.len(), 64);
    }

    #[test]
    fn structural_check_rejects_garbage() {
        assert!(!plaintext_is_well_formed(""));
        assert!(!plaintext_is_well_formed("too-short"));
        assert!(!plaintext_is_well_formed(&"a".repeat(PLAINTEXT_LEN)));
        assert!(!plaintext_is_well_formed(&"A".repeat(PLAINTEXT_LEN + 1)));
        assert!(plaintext_is_well_formed(&"A".repeat(PLAINTEXT_LEN)));
    }
}
