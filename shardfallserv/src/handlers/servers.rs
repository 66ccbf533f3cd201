// Server browser, favorites and heartbeat endpoints
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{authenticated_player, authenticated_server};
use crate::config::Config;
use crate::db::{self, DbPool, GameServer, ServerFavorite};
use shardfall::auth::SessionAuth;

/// A server is online when its latest heartbeat is recent enough; a freshly
/// registered server (last_heartbeat = 0) is offline until its first beat.
/// Liveness is always computed, never stored as a flag.
pub(crate) fn is_online(server: &GameServer, heartbeat_ttl_secs: i64, now: i64) -> bool {
    now - server.last_heartbeat <= heartbeat_ttl_secs
}

/// Browser-facing view of a server. The server_key never appears here; it is
/// only shown once, in the admin registration response.
fn server_json(server: &GameServer, online: bool) -> serde_json::Value {
    serde_json::json!({
        "id": server.id,
        "name": server.name,
        "region": server.region,
        "host": server.host,
        "port": server.port,
        "max_players": server.max_players,
        "current_players": server.current_players,
        "online": online,
    })
}

/// The server browser: every registered server with its computed online flag.
pub async fn browse(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    config: web::Data<Config>,
) -> HttpResponse {
    if let Err(resp) = authenticated_player(&req, &auth, &db) {
        return resp;
    }

    match db::list_servers(&db) {
        Ok(rows) => {
            let now = Utc::now().timestamp();
            let servers: Vec<serde_json::Value> = rows
                .iter()
                .map(|server| server_json(server, is_online(server, config.heartbeat_ttl_secs, now)))
                .collect();
            HttpResponse::Ok().json(serde_json::json!({"servers": servers}))
        }
        Err(e) => {
            tracing::error!("Failed to list servers: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// Mark a server as a favorite. Idempotent: favoriting twice answers the
/// same way, the duplicate insert folds to success.
pub async fn favorite(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<String>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };
    let server_id = path.into_inner();

    match db::get_server(&db, &server_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "unknown server"}));
        }
        Err(e) => {
            tracing::error!("Failed to load server {}: {:?}", server_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    }

    let row = ServerFavorite {
        id: Uuid::new_v4().to_string(),
        player_id: player.id.clone(),
        server_id: server_id.clone(),
        created_at: Utc::now().timestamp(),
    };
    match db::insert_favorite(&db, &row) {
        // Ok(false) means it already was a favorite; same outcome either way.
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({"status": "favorited"})),
        Err(e) => {
            tracing::error!("Failed to insert favorite: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

pub async fn unfavorite(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<String>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };
    let server_id = path.into_inner();

    match db::delete_favorite(&db, &player.id, &server_id) {
        Ok(0) => HttpResponse::NotFound()
            .json(serde_json::json!({"error": "not a favorite"})),
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({"status": "removed"})),
        Err(e) => {
            tracing::error!("Failed to delete favorite: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// The caller's favorite servers, with the same computed online flag as the
/// browser list.
pub async fn list_favorites(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    config: web::Data<Config>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    match db::list_favorites(&db, &player.id) {
        Ok(rows) => {
            let now = Utc::now().timestamp();
            let favorites: Vec<serde_json::Value> = rows
                .iter()
                .map(|(favorite, server)| {
                    serde_json::json!({
                        "server": server_json(
                            server,
                            is_online(server, config.heartbeat_ttl_secs, now),
                        ),
                        "favorited_at": favorite.created_at,
                    })
                })
                .collect();
            HttpResponse::Ok().json(serde_json::json!({"favorites": favorites}))
        }
        Err(e) => {
            tracing::error!("Failed to list favorites for {}: {:?}", player.id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub current_players: i32,
}

/// Liveness ping from a game server: refreshes last_heartbeat and records
/// the current player count.
pub async fn heartbeat(
    req: HttpRequest,
    db: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<HeartbeatRequest>,
) -> HttpResponse {
    let server_id = path.into_inner();
    let server = match authenticated_server(&req, &db, &server_id) {
        Ok(server) => server,
        Err(resp) => return resp,
    };

    if body.current_players < 0 {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "current_players cannot be negative"}));
    }
    if body.current_players > server.max_players {
        tracing::warn!(
            "Server {} reports {} players over its registered capacity {}",
            server.name,
            body.current_players,
            server.max_players
        );
    }

    let now = Utc::now().timestamp();
    match db::record_heartbeat(&db, &server.id, body.current_players, now) {
        // The row was deleted between the gate and the update.
        Ok(0) => HttpResponse::NotFound()
            .json(serde_json::json!({"error": "unknown server"})),
        Ok(_) => {
            tracing::debug!(
                "Heartbeat from {} ({}/{} players)",
                server.name,
                body.current_players,
                server.max_players
            );
            HttpResponse::Ok().json(serde_json::json!({
                "status": "ok",
                "server_time": now,
            }))
        }
        Err(e) => {
            tracing::error!("Failed to record heartbeat for {}: {:?}", server.id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}
