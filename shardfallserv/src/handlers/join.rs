// Join-token endpoints: players request admission, game servers validate
// and consume
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use super::servers::is_online;
use super::{authenticated_player, authenticated_server};
use crate::config::Config;
use crate::db::{self, DbPool};
use crate::store::DieselStore;
use shardfall::auth::SessionAuth;
use shardfall::token::{JoinTokenAuthority, TokenError};

fn token_error_response(e: &TokenError) -> HttpResponse {
    e.log_token_event();
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = match e {
        TokenError::NotFound => "unknown join token",
        TokenError::Expired => "join token expired",
        TokenError::AlreadyUsed => "join token already used",
        TokenError::Store(_) => "database error",
    };
    HttpResponse::build(status).json(serde_json::json!({"error": message}))
}

/// A player asks to join a server. The server must be online and have a free
/// slot; the answer is a single-use token plus the address to connect to.
pub async fn request_join(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    authority: web::Data<JoinTokenAuthority<DieselStore>>,
    config: web::Data<Config>,
    path: web::Path<String>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };
    let server_id = path.into_inner();

    let server = match db::get_server(&db, &server_id) {
        Ok(Some(server)) => server,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "unknown server"}));
        }
        Err(e) => {
            tracing::error!("Failed to load server {}: {:?}", server_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    let now = Utc::now().timestamp();
    if !is_online(&server, config.heartbeat_ttl_secs, now) {
        return HttpResponse::Conflict()
            .json(serde_json::json!({"error": "server is offline"}));
    }
    if server.current_players >= server.max_players {
        return HttpResponse::Conflict()
            .json(serde_json::json!({"error": "server is full"}));
    }

    match authority.issue(&player.id, &server.id, config.join_token_ttl_secs, now) {
        Ok(token) => {
            tracing::info!(
                "Player {} requested to join server {} ({})",
                player.username,
                server.name,
                server.id
            );
            HttpResponse::Created().json(serde_json::json!({
                "token": token.token,
                "expires_at": token.expires_at,
                "server": {
                    "id": server.id,
                    "host": server.host,
                    "port": server.port,
                },
            }))
        }
        Err(e) => token_error_response(&e),
    }
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
    pub server_id: String,
}

/// Speculative check by a game server: is this token good, and whose is it?
/// Nothing is consumed; the same token validates again until someone marks
/// it used.
pub async fn validate(
    req: HttpRequest,
    db: web::Data<DbPool>,
    authority: web::Data<JoinTokenAuthority<DieselStore>>,
    body: web::Json<TokenRequest>,
) -> HttpResponse {
    let server = match authenticated_server(&req, &db, &body.server_id) {
        Ok(server) => server,
        Err(resp) => return resp,
    };

    let now = Utc::now().timestamp();
    match authority.validate(&body.token, now) {
        Ok(record) => {
            if record.server_id != server.id {
                tracing::warn!(
                    "⚠️  SECURITY: server {} presented a join token bound to server {}",
                    server.id,
                    record.server_id
                );
                return HttpResponse::Forbidden()
                    .json(serde_json::json!({"error": "token is bound to another server"}));
            }
            HttpResponse::Ok().json(serde_json::json!({
                "player_id": record.player_id,
                "server_id": record.server_id,
                "expires_at": record.expires_at,
            }))
        }
        Err(e) => token_error_response(&e),
    }
}

/// Consume a token when the player actually connects. The underlying write
/// is conditional on the token being unused, so when several server
/// processes race on the same token exactly one of them gets the 200.
pub async fn consume(
    req: HttpRequest,
    db: web::Data<DbPool>,
    authority: web::Data<JoinTokenAuthority<DieselStore>>,
    body: web::Json<TokenRequest>,
) -> HttpResponse {
    let server = match authenticated_server(&req, &db, &body.server_id) {
        Ok(server) => server,
        Err(resp) => return resp,
    };

    let now = Utc::now().timestamp();
    // Check the binding before consuming: a token for another server must be
    // refused without burning it.
    let record = match authority.validate(&body.token, now) {
        Ok(record) => record,
        Err(e) => return token_error_response(&e),
    };
    if record.server_id != server.id {
        tracing::warn!(
            "⚠️  SECURITY: server {} tried to consume a join token bound to server {}",
            server.id,
            record.server_id
        );
        return HttpResponse::Forbidden()
            .json(serde_json::json!({"error": "token is bound to another server"}));
    }

    match authority.mark_used(&body.token, now) {
        Ok(()) => {
            tracing::info!(
                "Join token consumed: player {} admitted to server {}",
                record.player_id,
                server.name
            );
            HttpResponse::Ok().json(serde_json::json!({
                "status": "consumed",
                "player_id": record.player_id,
            }))
        }
        // Lost the conditional write to a concurrent consumer.
        Err(e) => token_error_response(&e),
    }
}
