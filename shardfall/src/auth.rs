use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL_SAFE, Engine as _};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access tokens are short-lived; clients refresh them.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 900; // 15 minutes
/// Refresh tokens live for a week.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 604_800; // 7 days

/// JWT claims for player sessions (OAuth2-style).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,        // player UUID
    pub exp: usize,         // expiration (unix seconds)
    pub iat: usize,         // issued at (unix seconds)
    pub token_type: String, // "access" or "refresh"
}

/// Token pair handed out on login and refresh (OAuth2 pattern).
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String, // "Bearer"
    pub expires_in: i64,    // seconds until access_token expires
}

#[derive(Debug, Clone)]
pub enum AuthError {
    InvalidCredentials,
    InvalidToken,
    TokenCreation,
    PasswordHash,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "invalid username or password"),
            AuthError::InvalidToken => write!(f, "invalid or expired session token"),
            AuthError::TokenCreation => write!(f, "failed to create session token"),
            AuthError::PasswordHash => write!(f, "failed to process password"),
        }
    }
}

impl std::error::Error for AuthError {}

impl AuthError {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials | AuthError::InvalidToken => 401,
            AuthError::TokenCreation | AuthError::PasswordHash => 500,
        }
    }
}

/// Hash a password into a PHC string (argon2id with per-hash salt).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored PHC string. Unparsable hashes count
/// as a mismatch rather than an error so login never leaks storage state.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Stateless session issuer: players authenticate once and carry a signed
/// pair of JWTs afterwards. No session rows are kept server-side.
pub struct SessionAuth {
    jwt_secret: String,
}

impl SessionAuth {
    /// Build with a configured secret, or mint an ephemeral one when none is
    /// provided. An ephemeral secret invalidates every session on restart.
    pub fn new(secret: Option<String>) -> Self {
        let jwt_secret = match secret {
            Some(secret) => secret,
            None => {
                let random_bytes: [u8; 32] = rand::random();
                tracing::warn!(
                    "JWT_SECRET not configured - generated an ephemeral signing secret; sessions will not survive a restart"
                );
                BASE64_URL_SAFE.encode(random_bytes)
            }
        };
        Self { jwt_secret }
    }

    fn generate_token(
        &self,
        player_id: &Uuid,
        token_type: &str,
        ttl_secs: i64,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: player_id.to_string(),
            exp: (now + ttl_secs) as usize,
            iat: now as usize,
            token_type: token_type.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|_| AuthError::TokenCreation)
    }

    /// Generate an access/refresh pair for a player.
    pub fn generate_token_pair(&self, player_id: &Uuid) -> Result<TokenPair, AuthError> {
        let access_token = self.generate_token(player_id, "access", ACCESS_TOKEN_TTL_SECS)?;
        let refresh_token = self.generate_token(player_id, "refresh", REFRESH_TOKEN_TTL_SECS)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_TTL_SECS,
        })
    }

    fn validate_token(&self, token: &str, expected_type: &str) -> Result<Uuid, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 30; // clock skew allowance

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!("Token validation failed for type '{}': {:?}", expected_type, e);
            AuthError::InvalidToken
        })?;

        if token_data.claims.token_type != expected_type {
            tracing::warn!(
                "Token type mismatch: expected '{}', got '{}'",
                expected_type,
                token_data.claims.token_type
            );
            return Err(AuthError::InvalidToken);
        }

        Uuid::parse_str(&token_data.claims.sub).map_err(|_| AuthError::InvalidToken)
    }

    /// Validate an access token and extract the player id.
    pub fn validate_access_token(&self, token: &str) -> Result<Uuid, AuthError> {
        self.validate_token(token, "access")
    }

    /// Validate a refresh token and extract the player id.
    pub fn validate_refresh_token(&self, token: &str) -> Result<Uuid, AuthError> {
        self.validate_token(token, "refresh")
    }
}
