use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL_SAFE, Engine as _};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// How many fresh tokens to mint before giving up on a unique insert. A
/// collision on 256 random bits means the RNG is broken, not bad luck.
const MAX_TOKEN_ROTATIONS: u32 = 3;

/// A single-use handoff credential binding one player to one game server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JoinToken {
    pub token: String,          // opaque url-safe string, 256 bits of entropy
    pub player_id: String,
    pub server_id: String,
    pub created_at: i64,        // unix seconds
    pub expires_at: i64,        // unix seconds
    pub used_at: Option<i64>,   // set exactly once, by the consuming server
}

/// Outcome of persisting a freshly minted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTokenOutcome {
    Inserted,
    /// The token string already exists; mint another one.
    Duplicate,
}

#[derive(Debug)]
pub enum TokenError {
    NotFound,
    Expired,
    AlreadyUsed,
    Store(StoreError),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::NotFound => write!(f, "join token not found"),
            TokenError::Expired => write!(f, "join token expired"),
            TokenError::AlreadyUsed => write!(f, "join token already used"),
            TokenError::Store(e) => write!(f, "join token storage error: {}", e),
        }
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TokenError::Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl TokenError {
    pub fn status_code(&self) -> u16 {
        match self {
            TokenError::NotFound => 404,
            TokenError::Expired => 410,
            TokenError::AlreadyUsed => 409,
            TokenError::Store(_) => 500,
        }
    }

    /// Log the failure with severity matching what it means operationally.
    pub fn log_token_event(&self) {
        match self {
            TokenError::AlreadyUsed => {
                tracing::warn!("⚠️  SECURITY: join token presented after use - possible replay");
            }
            TokenError::Store(e) => {
                tracing::error!("Join token storage error: {}", e);
            }
            _ => {
                tracing::debug!("Join token rejected: {}", self);
            }
        }
    }
}

/// Storage surface the token authority needs. The server implements this
/// over diesel; tests use an in-memory substitute.
pub trait TokenStore {
    fn create_join_token(&self, token: &JoinToken) -> Result<InsertTokenOutcome, StoreError>;
    fn join_token(&self, token: &str) -> Result<Option<JoinToken>, StoreError>;
    /// Set `used_at = now` only when it is still unset. Returns true when
    /// this call was the one that flipped it.
    fn mark_token_used(&self, token: &str, now: i64) -> Result<bool, StoreError>;
    /// Delete every token that is expired or already used.
    fn delete_expired_or_used(&self, now: i64) -> Result<usize, StoreError>;
}

/// Mint an opaque url-safe credential string with 256 bits of entropy.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    BASE64_URL_SAFE.encode(bytes)
}

/// Issues, checks and consumes single-use join tokens.
///
/// Every operation takes the current time explicitly; expiry is always
/// computed from `expires_at`, never stored as a flag.
pub struct JoinTokenAuthority<S> {
    store: S,
}

impl<S: TokenStore> JoinTokenAuthority<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mint and persist a token for `player_id` to join `server_id`.
    pub fn issue(
        &self,
        player_id: &str,
        server_id: &str,
        ttl_secs: i64,
        now: i64,
    ) -> Result<JoinToken, TokenError> {
        for _ in 0..MAX_TOKEN_ROTATIONS {
            let record = JoinToken {
                token: generate_token(),
                player_id: player_id.to_string(),
                server_id: server_id.to_string(),
                created_at: now,
                expires_at: now + ttl_secs,
                used_at: None,
            };
            match self
                .store
                .create_join_token(&record)
                .map_err(TokenError::Store)?
            {
                InsertTokenOutcome::Inserted => {
                    tracing::debug!(
                        "Issued join token {}... for player {} on server {} (expires {})",
                        &record.token[..8],
                        player_id,
                        server_id,
                        record.expires_at
                    );
                    return Ok(record);
                }
                InsertTokenOutcome::Duplicate => {
                    tracing::warn!("Join token collision, rotating to a fresh token");
                }
            }
        }
        Err(TokenError::Store(
            "join token collision persisted across rotations".into(),
        ))
    }

    /// Check a token without consuming it. Expiry wins over used state so a
    /// stale replay is reported as stale, not as a replay.
    pub fn validate(&self, token: &str, now: i64) -> Result<JoinToken, TokenError> {
        let record = self
            .store
            .join_token(token)
            .map_err(TokenError::Store)?
            .ok_or(TokenError::NotFound)?;
        if now > record.expires_at {
            return Err(TokenError::Expired);
        }
        if record.used_at.is_some() {
            return Err(TokenError::AlreadyUsed);
        }
        Ok(record)
    }

    /// Consume a token. The underlying write is conditional on `used_at`
    /// still being unset, so exactly one concurrent caller wins.
    pub fn mark_used(&self, token: &str, now: i64) -> Result<(), TokenError> {
        if self
            .store
            .mark_token_used(token, now)
            .map_err(TokenError::Store)?
        {
            return Ok(());
        }
        // Lost the conditional write: either the token never existed or
        // someone consumed it first.
        match self.store.join_token(token).map_err(TokenError::Store)? {
            Some(_) => Err(TokenError::AlreadyUsed),
            None => Err(TokenError::NotFound),
        }
    }

    /// Remove tokens that can never validate again. Returns how many rows
    /// were deleted.
    pub fn sweep(&self, now: i64) -> Result<usize, TokenError> {
        self.store
            .delete_expired_or_used(now)
            .map_err(TokenError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct MemoryTokenStore {
        rows: Mutex<HashMap<String, JoinToken>>,
    }

    impl MemoryTokenStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
            }
        }

        fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    impl TokenStore for MemoryTokenStore {
        fn create_join_token(&self, token: &JoinToken) -> Result<InsertTokenOutcome, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&token.token) {
                return Ok(InsertTokenOutcome::Duplicate);
            }
            rows.insert(token.token.clone(), token.clone());
            Ok(InsertTokenOutcome::Inserted)
        }

        fn join_token(&self, token: &str) -> Result<Option<JoinToken>, StoreError> {
            Ok(self.rows.lock().unwrap().get(token).cloned())
        }

        fn mark_token_used(&self, token: &str, now: i64) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(token) {
                Some(record) if record.used_at.is_none() => {
                    record.used_at = Some(now);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        fn delete_expired_or_used(&self, now: i64) -> Result<usize, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, record| record.used_at.is_none() && record.expires_at >= now);
            Ok(before - rows.len())
        }
    }

    fn authority() -> JoinTokenAuthority<MemoryTokenStore> {
        JoinTokenAuthority::new(MemoryTokenStore::new())
    }

    #[test]
    fn test_issue_produces_opaque_token_with_ttl() {
        let authority = authority();
        let record = authority.issue("p1", "s1", 60, 1000).unwrap();

        // 32 bytes of entropy, url-safe base64 without padding.
        assert_eq!(record.token.len(), 43);
        assert_eq!(record.created_at, 1000);
        assert_eq!(record.expires_at, 1060);
        assert_eq!(record.used_at, None);
        assert_eq!(authority.store().len(), 1);
    }

    #[test]
    fn test_issued_tokens_are_unique() {
        let authority = authority();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let record = authority.issue("p1", "s1", 60, 1000).unwrap();
            assert!(seen.insert(record.token));
        }
    }

    #[test]
    fn test_validate_unknown_token_is_not_found() {
        let authority = authority();
        let err = authority.validate("nope", 1000).unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_validate_is_non_destructive() {
        let authority = authority();
        let record = authority.issue("p1", "s1", 60, 1000).unwrap();

        let first = authority.validate(&record.token, 1010).unwrap();
        let second = authority.validate(&record.token, 1020).unwrap();
        assert_eq!(first.player_id, "p1");
        assert_eq!(second.server_id, "s1");
        assert_eq!(second.used_at, None);
    }

    #[test]
    fn test_validate_respects_expiry_boundary() {
        let authority = authority();
        let record = authority.issue("p1", "s1", 60, 1000).unwrap();

        // Valid through expires_at itself, expired one second later.
        assert!(authority.validate(&record.token, 1060).is_ok());
        let err = authority.validate(&record.token, 1061).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
        assert_eq!(err.status_code(), 410);
    }

    #[test]
    fn test_validate_after_consume_is_already_used() {
        let authority = authority();
        let record = authority.issue("p1", "s1", 60, 1000).unwrap();

        authority.mark_used(&record.token, 1010).unwrap();
        let err = authority.validate(&record.token, 1020).unwrap_err();
        assert!(matches!(err, TokenError::AlreadyUsed));
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_expired_reported_even_when_also_used() {
        let authority = authority();
        let record = authority.issue("p1", "s1", 60, 1000).unwrap();

        authority.mark_used(&record.token, 1010).unwrap();
        let err = authority.validate(&record.token, 5000).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn test_mark_used_is_single_shot() {
        let authority = authority();
        let record = authority.issue("p1", "s1", 60, 1000).unwrap();

        authority.mark_used(&record.token, 1010).unwrap();
        let err = authority.mark_used(&record.token, 1011).unwrap_err();
        assert!(matches!(err, TokenError::AlreadyUsed));
    }

    #[test]
    fn test_mark_used_unknown_token_is_not_found() {
        let authority = authority();
        let err = authority.mark_used("nope", 1000).unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[test]
    fn test_concurrent_mark_used_has_exactly_one_winner() {
        let authority = Arc::new(authority());
        let record = authority.issue("p1", "s1", 60, 1000).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let authority = Arc::clone(&authority);
            let token = record.token.clone();
            handles.push(std::thread::spawn(move || {
                authority.mark_used(&token, 1010).is_ok()
            }));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_sweep_removes_expired_and_used_but_keeps_live() {
        let authority = authority();
        let live = authority.issue("p1", "s1", 600, 1000).unwrap();
        let expired = authority.issue("p2", "s1", 10, 1000).unwrap();
        let used = authority.issue("p3", "s1", 600, 1000).unwrap();
        authority.mark_used(&used.token, 1005).unwrap();

        let removed = authority.sweep(1100).unwrap();
        assert_eq!(removed, 2);
        assert!(authority.validate(&live.token, 1100).is_ok());
        assert!(matches!(
            authority.validate(&expired.token, 1100).unwrap_err(),
            TokenError::NotFound
        ));
    }
}
