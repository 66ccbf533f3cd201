// Admin endpoints: loot configuration, catalog, grants, server registry
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::authenticated_admin;
use crate::db::{
    self, DbPool, GameServer, LootTableChanges, NewCosmetic, NewLootTable, NewLootTableEntry,
    PlayerCosmetic,
};
use shardfall::auth::SessionAuth;
use shardfall::token::generate_token;

/// Acquisition channel recorded for direct admin grants.
pub const ACQUIRED_VIA_ADMIN: &str = "admin";

const RARITIES: [&str; 4] = ["common", "rare", "epic", "legendary"];

// ==================== LOOT TABLES ====================

#[derive(Deserialize)]
pub struct CreateTableRequest {
    /// Pinned id; omit to let the database assign one.
    pub id: Option<i32>,
    pub name: String,
    pub drop_chance: f64,
    pub is_active: Option<bool>,
}

/// Create a loot table. The drop chance is a probability, so anything
/// outside [0, 1] is rejected before it can poison the roll loop.
pub async fn create_table(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    body: web::Json<CreateTableRequest>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    if body.name.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({"error": "name is required"}));
    }
    if !(0.0..=1.0).contains(&body.drop_chance) {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "drop_chance must be within [0.0, 1.0]"}));
    }

    let table = NewLootTable {
        id: body.id,
        name: body.name.clone(),
        drop_chance: body.drop_chance,
        is_active: body.is_active.unwrap_or(true),
    };
    match db::insert_loot_table(&db, &table) {
        Ok(Some(row)) => {
            tracing::info!(
                "Admin {} created loot table {} ({}, chance {:.4})",
                admin.username,
                row.id,
                row.name,
                row.drop_chance
            );
            let table: shardfall::loot::LootTable = row.into();
            HttpResponse::Created().json(serde_json::json!({"table": table}))
        }
        Ok(None) => HttpResponse::Conflict()
            .json(serde_json::json!({"error": "loot table id already taken"})),
        Err(e) => {
            tracing::error!("Failed to insert loot table: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateTableRequest {
    pub name: Option<String>,
    pub drop_chance: Option<f64>,
    pub is_active: Option<bool>,
}

/// Partial update of a loot table; absent fields are left untouched.
pub async fn update_table(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<i32>,
    body: web::Json<UpdateTableRequest>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let table_id = path.into_inner();

    if body.name.is_none() && body.drop_chance.is_none() && body.is_active.is_none() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "no fields to update"}));
    }
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({"error": "name cannot be empty"}));
        }
    }
    if let Some(chance) = body.drop_chance {
        if !(0.0..=1.0).contains(&chance) {
            return HttpResponse::BadRequest()
                .json(serde_json::json!({"error": "drop_chance must be within [0.0, 1.0]"}));
        }
    }

    let changes = LootTableChanges {
        name: body.name.clone(),
        drop_chance: body.drop_chance,
        is_active: body.is_active,
    };
    match db::update_loot_table(&db, table_id, &changes) {
        Ok(0) => HttpResponse::NotFound()
            .json(serde_json::json!({"error": "unknown loot table"})),
        Ok(_) => match db::get_loot_table(&db, table_id) {
            Ok(Some(row)) => {
                tracing::info!("Admin {} updated loot table {}", admin.username, table_id);
                let table: shardfall::loot::LootTable = row.into();
                HttpResponse::Ok().json(serde_json::json!({"table": table}))
            }
            Ok(None) | Err(_) => {
                tracing::error!("Loot table {} vanished after update", table_id);
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "database error"}))
            }
        },
        Err(e) => {
            tracing::error!("Failed to update loot table {}: {:?}", table_id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// Delete a loot table together with its entries.
pub async fn delete_table(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<i32>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let table_id = path.into_inner();

    match db::delete_loot_table(&db, table_id) {
        Ok(0) => HttpResponse::NotFound()
            .json(serde_json::json!({"error": "unknown loot table"})),
        Ok(_) => {
            tracing::info!("Admin {} deleted loot table {}", admin.username, table_id);
            HttpResponse::Ok().json(serde_json::json!({"status": "deleted"}))
        }
        Err(e) => {
            tracing::error!("Failed to delete loot table {}: {:?}", table_id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// Every loot table with its entries, active or not. Admin view of the full
/// drop configuration.
pub async fn list_tables(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
) -> HttpResponse {
    if let Err(resp) = authenticated_admin(&req, &auth, &db) {
        return resp;
    }

    let tables = match db::list_loot_tables(&db) {
        Ok(tables) => tables,
        Err(e) => {
            tracing::error!("Failed to list loot tables: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    let mut out = Vec::with_capacity(tables.len());
    for table in tables {
        let entries = match db::entries_for_table(&db, table.id) {
            Ok(rows) => rows
                .into_iter()
                .map(shardfall::loot::LootTableEntry::from)
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::error!("Failed to load entries for table {}: {:?}", table.id, e);
                return HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "database error"}));
            }
        };
        out.push(serde_json::json!({
            "id": table.id,
            "name": table.name,
            "drop_chance": table.drop_chance,
            "is_active": table.is_active,
            "entries": entries,
        }));
    }

    HttpResponse::Ok().json(serde_json::json!({"tables": out}))
}

// ==================== LOOT ENTRIES ====================

#[derive(Deserialize)]
pub struct CreateEntryRequest {
    pub id: Option<i32>,
    pub cosmetic_id: i32,
    pub weight: i32,
    pub min_quantity: Option<i32>,
    pub max_quantity: Option<i32>,
}

/// Add a weighted entry to a loot table. Non-positive weights are rejected
/// here so the engine's total-weight invariant holds for every stored row.
pub async fn create_entry(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<i32>,
    body: web::Json<CreateEntryRequest>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let table_id = path.into_inner();

    if body.weight <= 0 {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "weight must be positive"}));
    }
    let min_quantity = body.min_quantity.unwrap_or(1);
    let max_quantity = body.max_quantity.unwrap_or(min_quantity);
    if min_quantity < 1 {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "min_quantity must be at least 1"}));
    }
    if max_quantity < min_quantity {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "max_quantity cannot be below min_quantity"}));
    }

    match db::get_loot_table(&db, table_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "unknown loot table"}));
        }
        Err(e) => {
            tracing::error!("Failed to load loot table {}: {:?}", table_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    }
    // A dangling cosmetic reference would only surface later as an integrity
    // fault during a drop, so catch it at configuration time instead.
    match db::get_cosmetic(&db, body.cosmetic_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("cosmetic {} does not exist", body.cosmetic_id)
            }));
        }
        Err(e) => {
            tracing::error!("Failed to load cosmetic {}: {:?}", body.cosmetic_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    }

    let entry = NewLootTableEntry {
        id: body.id,
        loot_table_id: table_id,
        cosmetic_id: body.cosmetic_id,
        weight: body.weight,
        min_quantity,
        max_quantity,
    };
    match db::insert_loot_entry(&db, &entry) {
        Ok(Some(row)) => {
            tracing::info!(
                "Admin {} added entry {} (cosmetic {}, weight {}) to table {}",
                admin.username,
                row.id,
                row.cosmetic_id,
                row.weight,
                table_id
            );
            let entry: shardfall::loot::LootTableEntry = row.into();
            HttpResponse::Created().json(serde_json::json!({"entry": entry}))
        }
        Ok(None) => HttpResponse::Conflict()
            .json(serde_json::json!({"error": "loot entry id already taken"})),
        Err(e) => {
            tracing::error!("Failed to insert loot entry: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

pub async fn delete_entry(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<i32>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
    let entry_id = path.into_inner();

    match db::delete_loot_entry(&db, entry_id) {
        Ok(0) => HttpResponse::NotFound()
            .json(serde_json::json!({"error": "unknown loot entry"})),
        Ok(_) => {
            tracing::info!("Admin {} deleted loot entry {}", admin.username, entry_id);
            HttpResponse::Ok().json(serde_json::json!({"status": "deleted"}))
        }
        Err(e) => {
            tracing::error!("Failed to delete loot entry {}: {:?}", entry_id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

// ==================== CATALOG ====================

#[derive(Deserialize)]
pub struct CreateCosmeticRequest {
    /// Pinned id; omit to let the database assign one.
    pub id: Option<i32>,
    pub name: String,
    pub rarity: String,
    pub slot: String,
    pub unlock_level: Option<i32>,
}

/// Add a cosmetic to the catalog.
pub async fn create_cosmetic(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    body: web::Json<CreateCosmeticRequest>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    if body.name.trim().is_empty() || body.slot.trim().is_empty() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "name and slot are required"}));
    }
    if !RARITIES.contains(&body.rarity.as_str()) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("rarity must be one of {:?}", RARITIES)
        }));
    }
    let unlock_level = body.unlock_level.unwrap_or(1);
    if unlock_level < 1 {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "unlock_level must be at least 1"}));
    }

    let cosmetic = NewCosmetic {
        id: body.id,
        name: body.name.clone(),
        rarity: body.rarity.clone(),
        slot: body.slot.clone(),
        unlock_level,
    };
    match db::insert_cosmetic(&db, &cosmetic) {
        Ok(Some(row)) => {
            tracing::info!(
                "Admin {} added cosmetic {} ({}, {})",
                admin.username,
                row.id,
                row.name,
                row.rarity
            );
            let cosmetic: shardfall::loot::CosmeticItem = row.into();
            HttpResponse::Created().json(serde_json::json!({"cosmetic": cosmetic}))
        }
        Ok(None) => HttpResponse::Conflict()
            .json(serde_json::json!({"error": "cosmetic id already taken"})),
        Err(e) => {
            tracing::error!("Failed to insert cosmetic: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

// ==================== PLAYER GRANTS ====================

#[derive(Deserialize)]
pub struct GrantRequest {
    /// Progression deltas; negative values deduct.
    pub xp: Option<i64>,
    pub coins: Option<i64>,
    pub shards: Option<i64>,
    /// Direct cosmetic grant through the "admin" channel.
    pub cosmetic_id: Option<i32>,
}

/// Grant currency, xp and/or a cosmetic to a player. A cosmetic the player
/// already owns folds to success, same as the loot path.
pub async fn grant_to_player(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<String>,
    body: web::Json<GrantRequest>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };
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

    let xp = body.xp.unwrap_or(0);
    let coins = body.coins.unwrap_or(0);
    let shards = body.shards.unwrap_or(0);
    if xp == 0 && coins == 0 && shards == 0 && body.cosmetic_id.is_none() {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "nothing to grant"}));
    }

    // The cosmetic must resolve before anything is written, the same order
    // the loot engine uses; a grant naming a bad id refuses without moving
    // progression.
    let owned = match body.cosmetic_id {
        Some(cosmetic_id) => match db::get_cosmetic(&db, cosmetic_id) {
            Ok(Some(_)) => Some(PlayerCosmetic {
                id: Uuid::new_v4().to_string(),
                player_id: player.id.clone(),
                cosmetic_id,
                acquired_via: ACQUIRED_VIA_ADMIN.to_string(),
                acquired_at: Utc::now().timestamp(),
            }),
            Ok(None) => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("cosmetic {} does not exist", cosmetic_id)
                }));
            }
            Err(e) => {
                tracing::error!("Failed to load cosmetic {}: {:?}", cosmetic_id, e);
                return HttpResponse::InternalServerError()
                    .json(serde_json::json!({"error": "database error"}));
            }
        },
        None => None,
    };

    let granted = match db::apply_admin_grant(&db, &player.id, xp, coins, shards, owned.as_ref()) {
        Ok(granted) => granted,
        Err(e) => {
            tracing::error!("Failed to apply grant to {}: {:?}", player.id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };
    if (xp != 0 || coins != 0 || shards != 0) && granted.progress_rows == 0 {
        tracing::error!("Player {} has no progress row", player.id);
        return HttpResponse::InternalServerError()
            .json(serde_json::json!({"error": "missing progression data"}));
    }

    let cosmetic = granted.newly_granted.map(|newly_granted| {
        serde_json::json!({
            "id": body.cosmetic_id,
            "newly_granted": newly_granted,
        })
    });

    tracing::info!(
        "Admin {} granted xp {} coins {} shards {} cosmetic {:?} to {}",
        admin.username,
        xp,
        coins,
        shards,
        body.cosmetic_id,
        player.username
    );
    HttpResponse::Ok().json(serde_json::json!({
        "player_id": player.id,
        "xp": xp,
        "coins": coins,
        "shards": shards,
        "cosmetic": cosmetic,
    }))
}

// ==================== SERVER REGISTRY ====================

#[derive(Deserialize)]
pub struct RegisterServerRequest {
    pub name: String,
    pub region: String,
    pub host: String,
    pub port: i32,
    pub max_players: i32,
}

/// Register a game server and mint its key. The key authenticates every
/// later server-to-backend call and is only ever shown in this response.
pub async fn register_server(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    body: web::Json<RegisterServerRequest>,
) -> HttpResponse {
    let admin = match authenticated_admin(&req, &auth, &db) {
        Ok(admin) => admin,
        Err(resp) => return resp,
    };

    if body.name.trim().is_empty() || body.region.trim().is_empty() || body.host.trim().is_empty()
    {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "name, region and host are required"}));
    }
    if !(1..=65535).contains(&body.port) {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "port must be within 1-65535"}));
    }
    if body.max_players < 1 {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "max_players must be at least 1"}));
    }

    let server = GameServer {
        id: Uuid::new_v4().to_string(),
        name: body.name.clone(),
        region: body.region.clone(),
        host: body.host.clone(),
        port: body.port,
        max_players: body.max_players,
        current_players: 0,
        server_key: generate_token(),
        last_heartbeat: 0, // offline until the first heartbeat
        registered_at: Utc::now().timestamp(),
    };
    match db::insert_server(&db, &server) {
        Ok(()) => {
            tracing::info!(
                "Admin {} registered game server {} ({} in {})",
                admin.username,
                server.id,
                server.name,
                server.region
            );
            HttpResponse::Created().json(serde_json::json!({
                "server": {
                    "id": server.id,
                    "name": server.name,
                    "region": server.region,
                    "host": server.host,
                    "port": server.port,
                    "max_players": server.max_players,
                },
                "server_key": server.server_key,
            }))
        }
        Err(e) => {
            tracing::error!("Failed to register server: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}
