// Database initialization and connection management
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL_SAFE, Engine as _};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use std::sync::{Arc, Mutex};

pub type DbPool = Arc<Mutex<SqliteConnection>>;

/// Error type shared by the whole db layer.
pub type DbError = Box<dyn std::error::Error + Send + Sync>;

/// Open the SQLite database, creating the file if it doesn't exist.
/// Note: SQLite has built-in thread-safety; Arc<Mutex<>> provides safe shared access
pub fn init_db(database_url: &str) -> Result<DbPool, DbError> {
    Ok(Arc::new(Mutex::new(SqliteConnection::establish(
        database_url,
    )?)))
}

/// Run migrations on the database
pub fn run_migrations(db: &DbPool) -> Result<(), DbError> {
    use diesel::sql_query;
    use diesel::RunQueryDsl;

    let mut conn = db.lock().unwrap();

    // Execute each CREATE TABLE separately for better error handling
    let tables = vec![
        "CREATE TABLE IF NOT EXISTS players (
            id TEXT PRIMARY KEY NOT NULL,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            is_admin BOOLEAN NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            last_login INTEGER NOT NULL
        )",

        "CREATE TABLE IF NOT EXISTS player_progress (
            player_id TEXT PRIMARY KEY NOT NULL,
            xp INTEGER NOT NULL DEFAULT 0,
            coins INTEGER NOT NULL DEFAULT 0,
            shards INTEGER NOT NULL DEFAULT 0
        )",

        "CREATE TABLE IF NOT EXISTS player_stats (
            player_id TEXT PRIMARY KEY NOT NULL,
            matches_played INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            kills INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            rating INTEGER NOT NULL DEFAULT 1000
        )",

        "CREATE TABLE IF NOT EXISTS cosmetic_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            rarity TEXT NOT NULL DEFAULT 'common',
            slot TEXT NOT NULL,
            unlock_level INTEGER NOT NULL DEFAULT 1
        )",

        "CREATE TABLE IF NOT EXISTS player_cosmetics (
            id TEXT PRIMARY KEY NOT NULL,
            player_id TEXT NOT NULL,
            cosmetic_id INTEGER NOT NULL,
            acquired_via TEXT NOT NULL,
            acquired_at INTEGER NOT NULL,
            UNIQUE(player_id, cosmetic_id)
        )",

        "CREATE TABLE IF NOT EXISTS loot_tables (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            drop_chance REAL NOT NULL CHECK (drop_chance >= 0.0 AND drop_chance <= 1.0),
            is_active BOOLEAN NOT NULL DEFAULT 1
        )",

        "CREATE TABLE IF NOT EXISTS loot_table_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            loot_table_id INTEGER NOT NULL,
            cosmetic_id INTEGER NOT NULL,
            weight INTEGER NOT NULL CHECK (weight > 0),
            min_quantity INTEGER NOT NULL DEFAULT 1,
            max_quantity INTEGER NOT NULL DEFAULT 1,
            CHECK (min_quantity > 0 AND max_quantity >= min_quantity)
        )",

        "CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY NOT NULL,
            server_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            map_name TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER
        )",

        "CREATE TABLE IF NOT EXISTS match_results (
            id TEXT PRIMARY KEY NOT NULL,
            match_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            placement INTEGER NOT NULL,
            kills INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            UNIQUE(match_id, player_id)
        )",

        "CREATE TABLE IF NOT EXISTS friendships (
            id TEXT PRIMARY KEY NOT NULL,
            requester_id TEXT NOT NULL,
            addressee_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            UNIQUE(requester_id, addressee_id)
        )",

        "CREATE TABLE IF NOT EXISTS game_servers (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            region TEXT NOT NULL,
            host TEXT NOT NULL,
            port INTEGER NOT NULL,
            max_players INTEGER NOT NULL,
            current_players INTEGER NOT NULL DEFAULT 0,
            server_key TEXT NOT NULL UNIQUE,
            last_heartbeat INTEGER NOT NULL DEFAULT 0,
            registered_at INTEGER NOT NULL
        )",

        "CREATE TABLE IF NOT EXISTS server_favorites (
            id TEXT PRIMARY KEY NOT NULL,
            player_id TEXT NOT NULL,
            server_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(player_id, server_id)
        )",

        "CREATE TABLE IF NOT EXISTS join_tokens (
            token TEXT PRIMARY KEY NOT NULL,
            player_id TEXT NOT NULL,
            server_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            used_at INTEGER
        )",
    ];

    // Create tables
    for table_sql in tables {
        match sql_query(table_sql).execute(&mut *conn) {
            Ok(_) => tracing::debug!("✅ Table created/verified"),
            Err(e) => tracing::warn!("⚠️ Table creation warning: {:?}", e),
        }
    }

    // Create indexes
    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_players_username ON players(username)",
        "CREATE INDEX IF NOT EXISTS idx_player_cosmetics_player ON player_cosmetics(player_id)",
        "CREATE INDEX IF NOT EXISTS idx_loot_table_entries_table ON loot_table_entries(loot_table_id)",
        "CREATE INDEX IF NOT EXISTS idx_match_results_match ON match_results(match_id)",
        "CREATE INDEX IF NOT EXISTS idx_match_results_player ON match_results(player_id)",
        "CREATE INDEX IF NOT EXISTS idx_friendships_requester ON friendships(requester_id)",
        "CREATE INDEX IF NOT EXISTS idx_friendships_addressee ON friendships(addressee_id)",
        "CREATE INDEX IF NOT EXISTS idx_player_stats_rating ON player_stats(rating)",
        "CREATE INDEX IF NOT EXISTS idx_server_favorites_player ON server_favorites(player_id)",
        "CREATE INDEX IF NOT EXISTS idx_join_tokens_expires ON join_tokens(expires_at)",
    ];

    for index_sql in indexes {
        match sql_query(index_sql).execute(&mut *conn) {
            Ok(_) => tracing::debug!("✅ Index created/verified"),
            Err(e) => tracing::warn!("⚠️ Index creation warning: {:?}", e),
        }
    }

    Ok(())
}

/// Seed the bootstrap admin account if it doesn't exist. When no password is
/// configured a random one is generated and logged once.
pub fn init_admin_account(db: &DbPool, configured_password: Option<&str>) -> Result<(), DbError> {
    use super::models::{Player, PlayerProgress, PlayerStats};
    use super::schema::{player_progress, player_stats, players};
    use chrono::Utc;
    use diesel::prelude::*;
    use uuid::Uuid;

    let mut conn = db.lock().unwrap();

    let existing = players::table
        .filter(players::username.eq("admin"))
        .first::<Player>(&mut *conn)
        .optional()?;
    if existing.is_some() {
        tracing::debug!("Admin account already present, skipping bootstrap");
        return Ok(());
    }

    let generated;
    let password = match configured_password {
        Some(p) => p,
        None => {
            let random_bytes: [u8; 12] = rand::random();
            generated = BASE64_URL_SAFE.encode(random_bytes);
            &generated
        }
    };

    let now = Utc::now().timestamp();
    let admin = Player {
        id: Uuid::new_v4().to_string(),
        username: "admin".to_string(),
        display_name: "Administrator".to_string(),
        password_hash: shardfall::auth::hash_password(password)
            .map_err(|e| format!("failed to hash bootstrap admin password: {}", e))?,
        is_admin: true,
        created_at: now,
        last_login: now,
    };

    // Account, progress and stats land together or not at all.
    conn.transaction(|conn| -> Result<(), DbError> {
        diesel::insert_into(players::table)
            .values(&admin)
            .execute(conn)?;
        diesel::insert_into(player_progress::table)
            .values(&PlayerProgress {
                player_id: admin.id.clone(),
                xp: 0,
                coins: 0,
                shards: 0,
            })
            .execute(conn)?;
        diesel::insert_into(player_stats::table)
            .values(&PlayerStats {
                player_id: admin.id.clone(),
                matches_played: 0,
                wins: 0,
                kills: 0,
                deaths: 0,
                score: 0,
                rating: 1000,
            })
            .execute(conn)?;
        Ok(())
    })?;

    match configured_password {
        Some(_) => tracing::info!("🔑 Bootstrap admin account created (username: admin)"),
        None => tracing::warn!(
            "🔑 Bootstrap admin account created (username: admin, password: {}) - change it",
            password
        ),
    }

    Ok(())
}
