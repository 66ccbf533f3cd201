// HTTP handlers, grouped by API surface
pub mod admin;
pub mod auth;
pub mod cosmetics;
pub mod join;
pub mod loot;
pub mod matches;
pub mod players;
pub mod servers;
pub mod social;

use actix_web::{http::header, web, HttpRequest, HttpResponse};

use crate::db::{self, DbPool, GameServer, Player};
use shardfall::auth::SessionAuth;

/// Header carrying the shared secret of a registered game server.
pub const SERVER_KEY_HEADER: &str = "X-Server-Key";

/// The full REST surface. Registration order matters for the /players
/// routes: the literal "me" segments must come before the {id} capture.
pub fn configure_routes() -> impl actix_web::dev::HttpServiceFactory {
    web::scope("")
        .service(
            web::scope("/api")
                .route("/auth/register", web::post().to(auth::register))
                .route("/auth/login", web::post().to(auth::login))
                .route("/auth/refresh", web::post().to(auth::refresh))
                .route("/players/me", web::get().to(players::me))
                .route("/players/me/cosmetics", web::get().to(cosmetics::locker))
                .route("/players/me/favorites", web::get().to(servers::list_favorites))
                .route("/players/me/matches", web::get().to(matches::recent_for_me))
                .route("/players/{id}", web::get().to(players::profile))
                .route("/leaderboard", web::get().to(players::leaderboard))
                .route("/cosmetics", web::get().to(cosmetics::catalog))
                .route("/loot/drop", web::post().to(loot::drop))
                .route("/friends", web::get().to(social::list_friends))
                .route("/friends/requests", web::post().to(social::send_request))
                .route("/friends/requests", web::get().to(social::list_requests))
                .route(
                    "/friends/requests/{id}/accept",
                    web::post().to(social::accept_request),
                )
                .route("/friends/{player_id}", web::delete().to(social::remove_friend))
                .route("/servers", web::get().to(servers::browse))
                .route("/servers/{id}/favorite", web::put().to(servers::favorite))
                .route("/servers/{id}/favorite", web::delete().to(servers::unfavorite))
                .route("/servers/{id}/join", web::post().to(join::request_join))
                .route("/servers/{id}/heartbeat", web::post().to(servers::heartbeat))
                .route("/servers/{id}/matches", web::post().to(matches::open_match))
                .route("/matches/{id}/results", web::post().to(matches::submit_results))
                .route("/join/validate", web::post().to(join::validate))
                .route("/join/consume", web::post().to(join::consume))
                .service(
                    web::scope("/admin")
                        .route("/loot/tables", web::post().to(admin::create_table))
                        .route("/loot/tables", web::get().to(admin::list_tables))
                        .route("/loot/tables/{id}", web::put().to(admin::update_table))
                        .route("/loot/tables/{id}", web::delete().to(admin::delete_table))
                        .route(
                            "/loot/tables/{id}/entries",
                            web::post().to(admin::create_entry),
                        )
                        .route("/loot/entries/{id}", web::delete().to(admin::delete_entry))
                        .route("/cosmetics", web::post().to(admin::create_cosmetic))
                        .route("/players/{id}/grants", web::post().to(admin::grant_to_player))
                        .route("/servers", web::post().to(admin::register_server)),
                ),
        )
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Gate for player endpoints: checks the Bearer access token and loads the
/// player row. Returns the error response to send when the gate fails.
pub(crate) fn authenticated_player(
    req: &HttpRequest,
    auth: &SessionAuth,
    db: &DbPool,
) -> Result<Player, HttpResponse> {
    let token = match bearer_token(req) {
        Some(token) => token,
        None => {
            tracing::debug!("Missing bearer token on {}", req.path());
            return Err(HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "missing bearer token"})));
        }
    };

    let player_id = match auth.validate_access_token(token) {
        Ok(uuid) => uuid,
        Err(e) => {
            tracing::debug!("Rejected access token on {}: {}", req.path(), e);
            return Err(HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "invalid or expired session token"})));
        }
    };

    match db::get_player_by_id(db, &player_id.to_string()) {
        Ok(Some(player)) => Ok(player),
        Ok(None) => {
            tracing::warn!("Valid token for unknown player {}", player_id);
            Err(HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "unknown player"})))
        }
        Err(e) => {
            tracing::error!("Failed to load player {}: {:?}", player_id, e);
            Err(HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"})))
        }
    }
}

/// Gate for admin endpoints: a player gate plus the is_admin flag.
pub(crate) fn authenticated_admin(
    req: &HttpRequest,
    auth: &SessionAuth,
    db: &DbPool,
) -> Result<Player, HttpResponse> {
    let player = authenticated_player(req, auth, db)?;
    if !player.is_admin {
        tracing::warn!(
            "Player {} attempted admin endpoint {} without privileges",
            player.username,
            req.path()
        );
        return Err(HttpResponse::Forbidden()
            .json(serde_json::json!({"error": "admin privileges required"})));
    }
    Ok(player)
}

/// Gate for game-server endpoints: the caller must present the shared key
/// of the server it claims to be.
pub(crate) fn authenticated_server(
    req: &HttpRequest,
    db: &DbPool,
    server_id: &str,
) -> Result<GameServer, HttpResponse> {
    let key = match req
        .headers()
        .get(SERVER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(key) => key,
        None => {
            tracing::debug!("Missing {} header on {}", SERVER_KEY_HEADER, req.path());
            return Err(HttpResponse::Unauthorized()
                .json(serde_json::json!({"error": "missing server key"})));
        }
    };

    let server = match db::get_server(db, server_id) {
        Ok(Some(server)) => server,
        Ok(None) => {
            return Err(
                HttpResponse::NotFound().json(serde_json::json!({"error": "unknown server"}))
            );
        }
        Err(e) => {
            tracing::error!("Failed to load server {}: {:?}", server_id, e);
            return Err(HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"})));
        }
    };

    if server.server_key != key {
        tracing::warn!(
            "⚠️  SECURITY: wrong server key presented for server {}",
            server_id
        );
        return Err(HttpResponse::Unauthorized()
            .json(serde_json::json!({"error": "invalid server key"})));
    }

    Ok(server)
}
