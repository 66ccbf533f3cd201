// Database models for the Shardfall backend
use diesel::prelude::*;

use super::schema::*;

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = players)]
pub struct Player {
    pub id: String,             // UUID
    pub username: String,       // unique login name
    pub display_name: String,   // shown on leaderboards and friend lists
    pub password_hash: String,  // argon2id PHC string
    pub is_admin: bool,
    pub created_at: i64,        // Unix timestamp
    pub last_login: i64,        // Unix timestamp
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = player_progress)]
pub struct PlayerProgress {
    pub player_id: String,      // UUID
    pub xp: i64,                // lifetime experience, level is derived
    pub coins: i64,             // soft currency
    pub shards: i64,            // hard currency
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = player_stats)]
pub struct PlayerStats {
    pub player_id: String,      // UUID
    pub matches_played: i32,
    pub wins: i32,
    pub kills: i32,
    pub deaths: i32,
    pub score: i64,             // lifetime score across all matches
    pub rating: i32,            // ladder rating, never below zero
}

#[derive(Queryable, Clone, Debug)]
pub struct Cosmetic {
    pub id: i32,
    pub name: String,
    pub rarity: String,         // "common", "rare", "epic", "legendary"
    pub slot: String,           // "banner", "trail", "skin", ...
    pub unlock_level: i32,
}

/// Insert form: id is None for AUTOINCREMENT, Some for a pinned catalog id.
#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = cosmetic_items)]
pub struct NewCosmetic {
    pub id: Option<i32>,
    pub name: String,
    pub rarity: String,
    pub slot: String,
    pub unlock_level: i32,
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = player_cosmetics)]
pub struct PlayerCosmetic {
    pub id: String,             // UUID
    pub player_id: String,      // UUID
    pub cosmetic_id: i32,
    pub acquired_via: String,   // "loot_drop", "admin"
    pub acquired_at: i64,       // Unix timestamp
}

#[derive(Queryable, Clone, Debug)]
pub struct LootTable {
    pub id: i32,
    pub name: String,
    pub drop_chance: f64,       // [0.0, 1.0]
    pub is_active: bool,
}

#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = loot_tables)]
pub struct NewLootTable {
    pub id: Option<i32>,
    pub name: String,
    pub drop_chance: f64,
    pub is_active: bool,
}

/// Partial update; None fields are left untouched.
#[derive(AsChangeset, Clone, Debug)]
#[diesel(table_name = loot_tables)]
pub struct LootTableChanges {
    pub name: Option<String>,
    pub drop_chance: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Queryable, Clone, Debug)]
pub struct LootTableEntry {
    pub id: i32,
    pub loot_table_id: i32,
    pub cosmetic_id: i32,
    pub weight: i32,            // positive, enforced by CHECK and at creation
    pub min_quantity: i32,
    pub max_quantity: i32,
}

#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = loot_table_entries)]
pub struct NewLootTableEntry {
    pub id: Option<i32>,
    pub loot_table_id: i32,
    pub cosmetic_id: i32,
    pub weight: i32,
    pub min_quantity: i32,
    pub max_quantity: i32,
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: String,             // UUID
    pub server_id: String,      // UUID of the hosting game server
    pub mode: String,           // "ranked", "casual", ...
    pub map_name: String,
    pub started_at: i64,        // Unix timestamp
    pub ended_at: Option<i64>,  // set when results are submitted
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = match_results)]
pub struct MatchResult {
    pub id: String,             // UUID
    pub match_id: String,       // UUID
    pub player_id: String,      // UUID
    pub placement: i32,         // 1 = winner
    pub kills: i32,
    pub deaths: i32,
    pub score: i32,
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = friendships)]
pub struct Friendship {
    pub id: String,             // UUID
    pub requester_id: String,   // UUID of the player who asked
    pub addressee_id: String,   // UUID of the player who must answer
    pub status: String,         // "pending", "accepted"
    pub created_at: i64,        // Unix timestamp
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = game_servers)]
pub struct GameServer {
    pub id: String,             // UUID
    pub name: String,
    pub region: String,         // "eu-west", "us-east", ...
    pub host: String,           // hostname or IP players connect to
    pub port: i32,
    pub max_players: i32,
    pub current_players: i32,   // updated by heartbeats
    pub server_key: String,     // shared secret for X-Server-Key auth
    pub last_heartbeat: i64,    // Unix timestamp, 0 until the first beat
    pub registered_at: i64,     // Unix timestamp
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = server_favorites)]
pub struct ServerFavorite {
    pub id: String,             // UUID
    pub player_id: String,      // UUID
    pub server_id: String,      // UUID
    pub created_at: i64,        // Unix timestamp
}

#[derive(Insertable, Queryable, Clone, Debug)]
#[diesel(table_name = join_tokens)]
pub struct JoinToken {
    pub token: String,          // opaque url-safe string, primary key
    pub player_id: String,      // UUID
    pub server_id: String,      // UUID
    pub created_at: i64,        // Unix timestamp
    pub expires_at: i64,        // Unix timestamp
    pub used_at: Option<i64>,   // set exactly once on consumption
}

// Conversions between rows and the core engine types.

impl From<Cosmetic> for shardfall::loot::CosmeticItem {
    fn from(row: Cosmetic) -> Self {
        Self {
            id: row.id,
            name: row.name,
            rarity: row.rarity,
            slot: row.slot,
            unlock_level: row.unlock_level,
        }
    }
}

impl From<LootTable> for shardfall::loot::LootTable {
    fn from(row: LootTable) -> Self {
        Self {
            id: row.id,
            name: row.name,
            drop_chance: row.drop_chance,
            is_active: row.is_active,
        }
    }
}

impl From<LootTableEntry> for shardfall::loot::LootTableEntry {
    fn from(row: LootTableEntry) -> Self {
        Self {
            id: row.id,
            loot_table_id: row.loot_table_id,
            cosmetic_id: row.cosmetic_id,
            weight: row.weight,
            min_quantity: row.min_quantity,
            max_quantity: row.max_quantity,
        }
    }
}

impl From<JoinToken> for shardfall::token::JoinToken {
    fn from(row: JoinToken) -> Self {
        Self {
            token: row.token,
            player_id: row.player_id,
            server_id: row.server_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            used_at: row.used_at,
        }
    }
}

impl From<&shardfall::token::JoinToken> for JoinToken {
    fn from(record: &shardfall::token::JoinToken) -> Self {
        Self {
            token: record.token.clone(),
            player_id: record.player_id.clone(),
            server_id: record.server_id.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            used_at: record.used_at,
        }
    }
}
