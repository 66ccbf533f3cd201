// Loot drop endpoint
use actix_web::{web, HttpRequest, HttpResponse};
use rand::thread_rng;

use super::authenticated_player;
use crate::db::DbPool;
use crate::store::DieselStore;
use shardfall::auth::SessionAuth;
use shardfall::loot::LootEngine;

/// Roll a loot drop for the calling player. A roll that resolves to nothing
/// is a 200 with a distinguishing outcome code, not an error; only integrity
/// faults and storage failures become 500s.
pub async fn drop(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    engine: web::Data<LootEngine<DieselStore>>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    match engine.generate_drop(&player.id, &mut thread_rng()) {
        Ok(drop) => {
            tracing::info!(
                "Player {} dropped cosmetic {} x{} from table {}",
                player.username,
                drop.cosmetic.id,
                drop.quantity,
                drop.table_id
            );
            HttpResponse::Ok().json(serde_json::json!({
                "outcome": "drop",
                "drop": drop,
            }))
        }
        Err(e) if e.is_no_drop() => {
            e.log_drop_event();
            HttpResponse::Ok().json(serde_json::json!({"outcome": e.outcome_code()}))
        }
        Err(e) => {
            e.log_drop_event();
            HttpResponse::InternalServerError().json(serde_json::json!({
                "outcome": e.outcome_code(),
                "error": "loot drop failed",
            }))
        }
    }
}
