// Cosmetic catalog and player locker endpoints
use actix_web::{web, HttpRequest, HttpResponse};

use super::authenticated_player;
use crate::db::{self, DbPool};
use shardfall::auth::SessionAuth;

/// The full catalog. Open endpoint: the game client shows the catalog on the
/// login screen before any session exists.
pub async fn catalog(db: web::Data<DbPool>) -> HttpResponse {
    match db::list_cosmetics(&db) {
        Ok(rows) => {
            let items: Vec<shardfall::loot::CosmeticItem> =
                rows.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(serde_json::json!({"items": items}))
        }
        Err(e) => {
            tracing::error!("Failed to load cosmetic catalog: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// The calling player's locker: every owned cosmetic with how and when it
/// was acquired.
pub async fn locker(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    match db::list_player_cosmetics(&db, &player.id) {
        Ok(rows) => {
            let items: Vec<serde_json::Value> = rows
                .iter()
                .map(|(owned, item)| {
                    serde_json::json!({
                        "cosmetic": {
                            "id": item.id,
                            "name": item.name,
                            "rarity": item.rarity,
                            "slot": item.slot,
                            "unlock_level": item.unlock_level,
                        },
                        "acquired_via": owned.acquired_via,
                        "acquired_at": owned.acquired_at,
                    })
                })
                .collect();
            HttpResponse::Ok().json(serde_json::json!({"items": items}))
        }
        Err(e) => {
            tracing::error!("Failed to load locker for {}: {:?}", player.id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}
