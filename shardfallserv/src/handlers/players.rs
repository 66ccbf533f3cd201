// Player profile and leaderboard endpoints
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use super::authenticated_player;
use crate::db::{self, DbPool, Player, PlayerStats};
use shardfall::auth::SessionAuth;

const DEFAULT_LEADERBOARD_LIMIT: i64 = 10;
const MAX_LEADERBOARD_LIMIT: i64 = 100;

/// Level is derived from lifetime xp, never stored: quadratic curve, so each
/// level costs progressively more (level 2 at 100 xp, 3 at 400, 4 at 900...).
pub(crate) fn level_for_xp(xp: i64) -> i64 {
    1 + ((xp.max(0) as f64) / 100.0).sqrt() as i64
}

fn stats_json(stats: &PlayerStats) -> serde_json::Value {
    serde_json::json!({
        "matches_played": stats.matches_played,
        "wins": stats.wins,
        "kills": stats.kills,
        "deaths": stats.deaths,
        "score": stats.score,
        "rating": stats.rating,
    })
}

/// Full profile for the calling player: account, progression and stats.
pub async fn me(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    let progress = match db::get_progress(&db, &player.id) {
        Ok(Some(progress)) => progress,
        Ok(None) => {
            tracing::error!("Player {} has no progress row", player.id);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "missing progression data"}));
        }
        Err(e) => {
            tracing::error!("Failed to load progress for {}: {:?}", player.id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };
    let stats = match db::get_stats(&db, &player.id) {
        Ok(Some(stats)) => stats,
        Ok(None) => {
            tracing::error!("Player {} has no stats row", player.id);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "missing stats data"}));
        }
        Err(e) => {
            tracing::error!("Failed to load stats for {}: {:?}", player.id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "id": player.id,
        "username": player.username,
        "display_name": player.display_name,
        "is_admin": player.is_admin,
        "created_at": player.created_at,
        "last_login": player.last_login,
        "progress": {
            "xp": progress.xp,
            "level": level_for_xp(progress.xp),
            "coins": progress.coins,
            "shards": progress.shards,
        },
        "stats": stats_json(&stats),
    }))
}

/// Public profile of another player: no account details, just the parts that
/// show up on scoreboards.
pub async fn profile(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(resp) = authenticated_player(&req, &auth, &db) {
        return resp;
    }
    let player_id = path.into_inner();

    let player = match db::get_player_by_id(&db, &player_id) {
        Ok(Some(player)) => player,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "unknown player"}));
        }
        Err(e) => {
            tracing::error!("Failed to load player {}: {:?}", player_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    let level = match db::get_progress(&db, &player.id) {
        Ok(Some(progress)) => level_for_xp(progress.xp),
        Ok(None) => 1,
        Err(e) => {
            tracing::error!("Failed to load progress for {}: {:?}", player.id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };
    let stats = match db::get_stats(&db, &player.id) {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Failed to load stats for {}: {:?}", player.id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "id": player.id,
        "username": player.username,
        "display_name": player.display_name,
        "created_at": player.created_at,
        "level": level,
        "stats": stats.as_ref().map(stats_json),
    }))
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// Rating top-N across all players.
pub async fn leaderboard(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    query: web::Query<LeaderboardQuery>,
) -> HttpResponse {
    if let Err(resp) = authenticated_player(&req, &auth, &db) {
        return resp;
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);

    let rows: Vec<(PlayerStats, Player)> = match db::top_players_by_rating(&db, limit) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Failed to load leaderboard: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    let entries: Vec<serde_json::Value> = rows
        .iter()
        .enumerate()
        .map(|(i, (stats, player))| {
            serde_json::json!({
                "rank": i as i64 + 1,
                "player_id": player.id,
                "username": player.username,
                "display_name": player.display_name,
                "rating": stats.rating,
                "wins": stats.wins,
                "matches_played": stats.matches_played,
            })
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({"entries": entries}))
}
