// Match lifecycle endpoints: game servers open matches and submit results
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{authenticated_player, authenticated_server};
use crate::db::{self, DbPool, Match, MatchResult};
use shardfall::auth::SessionAuth;

const COINS_PER_KILL: i64 = 10;
const WIN_BONUS_COINS: i64 = 50;
const RATING_WIN_DELTA: i32 = 25;
const RATING_LOSS_DELTA: i32 = -15;

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 50;

/// Per-player payout for one match: xp mirrors the match score, coins pay
/// per kill with a bonus for first place, rating moves up on a win and down
/// otherwise (the floor at zero lives in the stats update).
pub(crate) fn match_rewards(placement: i32, kills: i32, score: i32) -> (i64, i64, i32) {
    let won = placement == 1;
    let xp = i64::from(score);
    let coins = i64::from(kills) * COINS_PER_KILL + if won { WIN_BONUS_COINS } else { 0 };
    let rating_delta = if won { RATING_WIN_DELTA } else { RATING_LOSS_DELTA };
    (xp, coins, rating_delta)
}

#[derive(Deserialize)]
pub struct OpenMatchRequest {
    pub mode: String,
    pub map_name: String,
}

/// A game server announces a match it is about to run.
pub async fn open_match(
    req: HttpRequest,
    db: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<OpenMatchRequest>,
) -> HttpResponse {
    let server_id = path.into_inner();
    let server = match authenticated_server(&req, &db, &server_id) {
        Ok(server) => server,
        Err(resp) => return resp,
    };

    if body.mode.trim().is_empty() || body.map_name.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "mode and map_name are required"}));
    }

    let game_match = Match {
        id: Uuid::new_v4().to_string(),
        server_id: server.id.clone(),
        mode: body.mode.clone(),
        map_name: body.map_name.clone(),
        started_at: Utc::now().timestamp(),
        ended_at: None,
    };
    match db::insert_match(&db, &game_match) {
        Ok(()) => {
            tracing::info!(
                "Server {} opened match {} ({} on {})",
                server.name,
                game_match.id,
                game_match.mode,
                game_match.map_name
            );
            HttpResponse::Created().json(serde_json::json!({
                "match_id": game_match.id,
                "server_id": game_match.server_id,
                "mode": game_match.mode,
                "map_name": game_match.map_name,
                "started_at": game_match.started_at,
            }))
        }
        Err(e) => {
            tracing::error!("Failed to insert match: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

#[derive(Deserialize)]
pub struct ResultEntry {
    pub player_id: String,
    pub placement: i32,
    pub kills: i32,
    pub deaths: i32,
    pub score: i32,
}

#[derive(Deserialize)]
pub struct SubmitResultsRequest {
    pub results: Vec<ResultEntry>,
}

/// The hosting server submits per-player results, closing the match and
/// paying out progression, stats and rating in one transaction. The close is
/// conditional on ended_at, so a duplicate submission gets a 409 and pays
/// nobody, and a payout failure rolls the close back instead of leaving the
/// match half paid.
pub async fn submit_results(
    req: HttpRequest,
    db: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<SubmitResultsRequest>,
) -> HttpResponse {
    let match_id = path.into_inner();

    let game_match = match db::get_match(&db, &match_id) {
        Ok(Some(game_match)) => game_match,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "unknown match"}));
        }
        Err(e) => {
            tracing::error!("Failed to load match {}: {:?}", match_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };
    // Only the server that opened the match may close it.
    let server = match authenticated_server(&req, &db, &game_match.server_id) {
        Ok(server) => server,
        Err(resp) => return resp,
    };

    if body.results.is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "results cannot be empty"}));
    }
    for entry in &body.results {
        if entry.placement < 1 || entry.kills < 0 || entry.deaths < 0 || entry.score < 0 {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("invalid result for player {}", entry.player_id)
            }));
        }
    }

    let now = Utc::now().timestamp();
    let payouts: Vec<db::MatchPayout> = body
        .results
        .iter()
        .map(|entry| {
            let (xp, coins, rating_delta) =
                match_rewards(entry.placement, entry.kills, entry.score);
            db::MatchPayout {
                row: MatchResult {
                    id: Uuid::new_v4().to_string(),
                    match_id: match_id.clone(),
                    player_id: entry.player_id.clone(),
                    placement: entry.placement,
                    kills: entry.kills,
                    deaths: entry.deaths,
                    score: entry.score,
                },
                won: entry.placement == 1,
                xp,
                coins,
                rating_delta,
            }
        })
        .collect();

    let settlement = match db::settle_match(&db, &match_id, now, &payouts) {
        Ok(Some(settlement)) => settlement,
        Ok(None) => {
            return HttpResponse::Conflict()
                .json(serde_json::json!({"error": "results already submitted"}));
        }
        Err(e) => {
            tracing::error!("Failed to settle match {}: {:?}", match_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    for player_id in &settlement.unknown_players {
        tracing::warn!(
            "Match {} result names unknown player {}, skipping",
            match_id,
            player_id
        );
    }
    for player_id in &settlement.duplicates {
        tracing::warn!(
            "Duplicate result for player {} in match {}, skipping",
            player_id,
            match_id
        );
    }

    let skipped = settlement.unknown_players.len() + settlement.duplicates.len();
    tracing::info!(
        "Server {} closed match {} ({} results applied, {} skipped)",
        server.name,
        match_id,
        settlement.applied,
        skipped
    );
    HttpResponse::Ok().json(serde_json::json!({
        "match_id": match_id,
        "ended_at": now,
        "applied": settlement.applied,
        "skipped": skipped,
    }))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// The caller's recent match history, newest first.
pub async fn recent_for_me(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    match db::recent_matches_for_player(&db, &player.id, limit) {
        Ok(rows) => {
            let matches: Vec<serde_json::Value> = rows
                .iter()
                .map(|(result, game_match)| {
                    serde_json::json!({
                        "match": {
                            "id": game_match.id,
                            "server_id": game_match.server_id,
                            "mode": game_match.mode,
                            "map_name": game_match.map_name,
                            "started_at": game_match.started_at,
                            "ended_at": game_match.ended_at,
                        },
                        "placement": result.placement,
                        "kills": result.kills,
                        "deaths": result.deaths,
                        "score": result.score,
                    })
                })
                .collect();
            HttpResponse::Ok().json(serde_json::json!({"matches": matches}))
        }
        Err(e) => {
            tracing::error!("Failed to load match history for {}: {:?}", player.id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}
