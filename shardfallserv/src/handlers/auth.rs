// Account registration and session endpoints
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, DbPool, Player, PlayerProgress, PlayerStats};
use shardfall::auth::{hash_password, verify_password, SessionAuth};

const STARTING_RATING: i32 = 1000;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn valid_username(username: &str) -> bool {
    (3..=24).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create a player account along with its progress and stats rows, then log
/// the player straight in.
pub async fn register(
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    body: web::Json<RegisterRequest>,
) -> HttpResponse {
    if !valid_username(&body.username) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "username must be 3-24 characters of [a-zA-Z0-9_]"
        }));
    }
    if body.password.len() < 8 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "password must be at least 8 characters"
        }));
    }

    let password_hash = match hash_password(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Failed to hash password during registration: {}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "registration failed"}));
        }
    };

    let now = Utc::now().timestamp();
    let player = Player {
        id: Uuid::new_v4().to_string(),
        username: body.username.clone(),
        display_name: body
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| body.username.clone()),
        password_hash,
        is_admin: false,
        created_at: now,
        last_login: now,
    };

    let progress = PlayerProgress {
        player_id: player.id.clone(),
        xp: 0,
        coins: 0,
        shards: 0,
    };
    let stats = PlayerStats {
        player_id: player.id.clone(),
        matches_played: 0,
        wins: 0,
        kills: 0,
        deaths: 0,
        score: 0,
        rating: STARTING_RATING,
    };
    // All-or-nothing: a failed seed must not leave a half-created account
    // squatting on the username.
    match db::create_player_account(&db, &player, &progress, &stats) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("Registration rejected, username taken: {}", body.username);
            return HttpResponse::Conflict()
                .json(serde_json::json!({"error": "username already taken"}));
        }
        Err(e) => {
            tracing::error!("Failed to create account for {}: {:?}", body.username, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "registration failed"}));
        }
    }

    let player_uuid = match Uuid::parse_str(&player.id) {
        Ok(uuid) => uuid,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "registration failed"}));
        }
    };
    match auth.generate_token_pair(&player_uuid) {
        Ok(pair) => {
            tracing::info!("Registered player {} ({})", player.username, player.id);
            HttpResponse::Created().json(serde_json::json!({
                "player_id": player.id,
                "username": player.username,
                "display_name": player.display_name,
                "tokens": pair,
            }))
        }
        Err(e) => {
            tracing::error!("Failed to issue tokens after registration: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "registration failed"}))
        }
    }
}

/// Check credentials and hand out a fresh token pair.
pub async fn login(
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    body: web::Json<LoginRequest>,
) -> HttpResponse {
    let player = match db::get_player_by_username(&db, &body.username) {
        Ok(Some(player)) => player,
        Ok(None) => {
            tracing::debug!("Login failed, unknown username: {}", body.username);
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "invalid username or password"}));
        }
        Err(e) => {
            tracing::error!("Failed to load player for login: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "login failed"}));
        }
    };

    if !verify_password(&body.password, &player.password_hash) {
        tracing::debug!("Login failed, wrong password for: {}", body.username);
        return HttpResponse::Unauthorized()
            .json(serde_json::json!({"error": "invalid username or password"}));
    }

    let now = Utc::now().timestamp();
    if let Err(e) = db::update_last_login(&db, &player.id, now) {
        tracing::warn!("Failed to stamp last_login for {}: {:?}", player.id, e);
    }

    let player_uuid = match Uuid::parse_str(&player.id) {
        Ok(uuid) => uuid,
        Err(_) => {
            tracing::error!("Player {} has a non-UUID id", player.id);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "login failed"}));
        }
    };
    match auth.generate_token_pair(&player_uuid) {
        Ok(pair) => {
            tracing::info!("Player {} logged in", player.username);
            HttpResponse::Ok().json(serde_json::json!({
                "player_id": player.id,
                "username": player.username,
                "display_name": player.display_name,
                "tokens": pair,
            }))
        }
        Err(e) => {
            tracing::error!("Failed to issue tokens on login: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({"error": "login failed"}))
        }
    }
}

/// Trade a refresh token for a new token pair (OAuth2-style rotation).
pub async fn refresh(
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    body: web::Json<RefreshRequest>,
) -> HttpResponse {
    let player_uuid = match auth.validate_refresh_token(&body.refresh_token) {
        Ok(uuid) => uuid,
        Err(e) => {
            tracing::debug!("Refresh rejected: {}", e);
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "invalid or expired refresh token"}));
        }
    };

    // A valid signature is not enough: the account must still exist.
    match db::get_player_by_id(&db, &player_uuid.to_string()) {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!("Refresh token for deleted player {}", player_uuid);
            return HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "unknown player"}));
        }
        Err(e) => {
            tracing::error!("Failed to load player on refresh: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "refresh failed"}));
        }
    }

    match auth.generate_token_pair(&player_uuid) {
        Ok(pair) => HttpResponse::Ok().json(serde_json::json!({"tokens": pair})),
        Err(e) => {
            tracing::error!("Failed to issue tokens on refresh: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "refresh failed"}))
        }
    }
}
