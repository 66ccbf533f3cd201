// Database query functions for all tables
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::{
    schema::*, Cosmetic, DbError, DbPool, Friendship, GameServer, JoinToken, LootTable,
    LootTableChanges, LootTableEntry, Match, MatchResult, NewCosmetic, NewLootTable,
    NewLootTableEntry, Player, PlayerCosmetic, PlayerProgress, PlayerStats, ServerFavorite,
};

fn is_unique_violation(e: &diesel::result::Error) -> bool {
    matches!(
        e,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _
        )
    )
}

// ==================== PLAYER QUERIES ====================

/// Returns false when the username is already taken.
pub fn insert_player(db: &DbPool, player: &Player) -> Result<bool, DbError> {
    let mut conn = db.lock().unwrap();
    insert_player_on(&mut conn, player)
}

fn insert_player_on(conn: &mut SqliteConnection, player: &Player) -> Result<bool, DbError> {
    use diesel::insert_into;

    match insert_into(players::table).values(player).execute(conn) {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Creates the player row together with its progress and stats rows. All
/// three land in one transaction: a failed seed rolls the account back and
/// leaves the username free. Returns false when the username is taken.
pub fn create_player_account(
    db: &DbPool,
    player: &Player,
    progress: &PlayerProgress,
    stats: &PlayerStats,
) -> Result<bool, DbError> {
    let mut conn = db.lock().unwrap();
    conn.transaction(|conn| -> Result<bool, DbError> {
        if !insert_player_on(conn, player)? {
            return Ok(false);
        }
        insert_progress_on(conn, progress)?;
        insert_stats_on(conn, stats)?;
        Ok(true)
    })
}

pub fn get_player_by_id(db: &DbPool, player_id: &str) -> Result<Option<Player>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = players::table
        .find(player_id)
        .first::<Player>(&mut *conn)
        .optional()?;

    Ok(result)
}

pub fn get_player_by_username(db: &DbPool, username: &str) -> Result<Option<Player>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = players::table
        .filter(players::username.eq(username))
        .first::<Player>(&mut *conn)
        .optional()?;

    Ok(result)
}

pub fn update_last_login(db: &DbPool, player_id: &str, now: i64) -> Result<(), DbError> {
    use diesel::update;

    let mut conn = db.lock().unwrap();
    update(players::table.find(player_id))
        .set(players::last_login.eq(now))
        .execute(&mut *conn)?;

    Ok(())
}

// ==================== PROGRESS QUERIES ====================

pub fn insert_progress(db: &DbPool, progress: &PlayerProgress) -> Result<(), DbError> {
    let mut conn = db.lock().unwrap();
    insert_progress_on(&mut conn, progress)
}

fn insert_progress_on(
    conn: &mut SqliteConnection,
    progress: &PlayerProgress,
) -> Result<(), DbError> {
    use diesel::insert_into;

    insert_into(player_progress::table)
        .values(progress)
        .execute(conn)?;

    Ok(())
}

pub fn get_progress(db: &DbPool, player_id: &str) -> Result<Option<PlayerProgress>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = player_progress::table
        .find(player_id)
        .first::<PlayerProgress>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Additive update of the three progression counters. Returns the number of
/// rows touched (0 means the player has no progress row).
pub fn apply_progress_delta(
    db: &DbPool,
    player_id: &str,
    xp: i64,
    coins: i64,
    shards: i64,
) -> Result<usize, DbError> {
    let mut conn = db.lock().unwrap();
    apply_progress_delta_on(&mut conn, player_id, xp, coins, shards)
}

fn apply_progress_delta_on(
    conn: &mut SqliteConnection,
    player_id: &str,
    xp: i64,
    coins: i64,
    shards: i64,
) -> Result<usize, DbError> {
    use diesel::update;

    let touched = update(player_progress::table.find(player_id))
        .set((
            player_progress::xp.eq(player_progress::xp + xp),
            player_progress::coins.eq(player_progress::coins + coins),
            player_progress::shards.eq(player_progress::shards + shards),
        ))
        .execute(conn)?;

    Ok(touched)
}

// ==================== STATS QUERIES ====================

pub fn insert_stats(db: &DbPool, stats: &PlayerStats) -> Result<(), DbError> {
    let mut conn = db.lock().unwrap();
    insert_stats_on(&mut conn, stats)
}

fn insert_stats_on(conn: &mut SqliteConnection, stats: &PlayerStats) -> Result<(), DbError> {
    use diesel::insert_into;

    insert_into(player_stats::table)
        .values(stats)
        .execute(conn)?;

    Ok(())
}

pub fn get_stats(db: &DbPool, player_id: &str) -> Result<Option<PlayerStats>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = player_stats::table
        .find(player_id)
        .first::<PlayerStats>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Fold one match result into the lifetime stats. Rating never drops below
/// zero. The read-modify-write is serialized by the connection mutex.
pub fn apply_match_stats(
    db: &DbPool,
    player_id: &str,
    won: bool,
    kills: i32,
    deaths: i32,
    score: i32,
    rating_delta: i32,
) -> Result<(), DbError> {
    let mut conn = db.lock().unwrap();
    apply_match_stats_on(&mut conn, player_id, won, kills, deaths, score, rating_delta)
}

fn apply_match_stats_on(
    conn: &mut SqliteConnection,
    player_id: &str,
    won: bool,
    kills: i32,
    deaths: i32,
    score: i32,
    rating_delta: i32,
) -> Result<(), DbError> {
    use diesel::update;

    let stats = player_stats::table
        .find(player_id)
        .first::<PlayerStats>(conn)
        .optional()?;
    let stats = match stats {
        Some(s) => s,
        None => return Err(format!("no stats row for player {}", player_id).into()),
    };

    update(player_stats::table.find(player_id))
        .set((
            player_stats::matches_played.eq(stats.matches_played + 1),
            player_stats::wins.eq(stats.wins + i32::from(won)),
            player_stats::kills.eq(stats.kills + kills),
            player_stats::deaths.eq(stats.deaths + deaths),
            player_stats::score.eq(stats.score + i64::from(score)),
            player_stats::rating.eq((stats.rating + rating_delta).max(0)),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn top_players_by_rating(
    db: &DbPool,
    limit: i64,
) -> Result<Vec<(PlayerStats, Player)>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = player_stats::table
        .inner_join(players::table)
        .order_by(player_stats::rating.desc())
        .limit(limit)
        .load::<(PlayerStats, Player)>(&mut *conn)?;

    Ok(results)
}

// ==================== COSMETIC QUERIES ====================

/// Returns None when a pinned id is already taken.
pub fn insert_cosmetic(db: &DbPool, cosmetic: &NewCosmetic) -> Result<Option<Cosmetic>, DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    match insert_into(cosmetic_items::table)
        .values(cosmetic)
        .get_result::<Cosmetic>(&mut *conn)
    {
        Ok(row) => Ok(Some(row)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_cosmetics(db: &DbPool) -> Result<Vec<Cosmetic>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = cosmetic_items::table
        .order_by(cosmetic_items::id.asc())
        .load::<Cosmetic>(&mut *conn)?;

    Ok(results)
}

pub fn get_cosmetic(db: &DbPool, cosmetic_id: i32) -> Result<Option<Cosmetic>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = cosmetic_items::table
        .find(cosmetic_id)
        .first::<Cosmetic>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Record ownership. Returns false when the player already owns the
/// cosmetic; the UNIQUE(player_id, cosmetic_id) constraint makes a repeated
/// grant a no-op instead of an error.
pub fn insert_player_cosmetic(db: &DbPool, owned: &PlayerCosmetic) -> Result<bool, DbError> {
    let mut conn = db.lock().unwrap();
    insert_player_cosmetic_on(&mut conn, owned)
}

fn insert_player_cosmetic_on(
    conn: &mut SqliteConnection,
    owned: &PlayerCosmetic,
) -> Result<bool, DbError> {
    use diesel::insert_into;

    match insert_into(player_cosmetics::table)
        .values(owned)
        .execute(conn)
    {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Progress rows touched and the ownership fold for one admin grant.
#[derive(Debug)]
pub struct AdminGrant {
    pub progress_rows: usize,
    pub newly_granted: Option<bool>,
}

/// Applies an admin grant in one transaction: the progression delta (when
/// any of it is non-zero) plus optional cosmetic ownership. A delta that
/// finds no progress row writes nothing at all, the cosmetic included.
pub fn apply_admin_grant(
    db: &DbPool,
    player_id: &str,
    xp: i64,
    coins: i64,
    shards: i64,
    cosmetic: Option<&PlayerCosmetic>,
) -> Result<AdminGrant, DbError> {
    let wants_delta = xp != 0 || coins != 0 || shards != 0;

    let mut conn = db.lock().unwrap();
    conn.transaction(|conn| -> Result<AdminGrant, DbError> {
        let mut grant = AdminGrant {
            progress_rows: 0,
            newly_granted: None,
        };
        if wants_delta {
            grant.progress_rows = apply_progress_delta_on(conn, player_id, xp, coins, shards)?;
            if grant.progress_rows == 0 {
                return Ok(grant);
            }
        }
        if let Some(owned) = cosmetic {
            grant.newly_granted = Some(insert_player_cosmetic_on(conn, owned)?);
        }
        Ok(grant)
    })
}

pub fn list_player_cosmetics(
    db: &DbPool,
    player_id: &str,
) -> Result<Vec<(PlayerCosmetic, Cosmetic)>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = player_cosmetics::table
        .inner_join(cosmetic_items::table)
        .filter(player_cosmetics::player_id.eq(player_id))
        .order_by(player_cosmetics::acquired_at.desc())
        .load::<(PlayerCosmetic, Cosmetic)>(&mut *conn)?;

    Ok(results)
}

// ==================== LOOT TABLE QUERIES ====================

/// Returns None when a pinned id is already taken.
pub fn insert_loot_table(db: &DbPool, table: &NewLootTable) -> Result<Option<LootTable>, DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    match insert_into(loot_tables::table)
        .values(table)
        .get_result::<LootTable>(&mut *conn)
    {
        Ok(row) => Ok(Some(row)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_loot_table(
    db: &DbPool,
    table_id: i32,
    changes: &LootTableChanges,
) -> Result<usize, DbError> {
    use diesel::update;

    let mut conn = db.lock().unwrap();
    let touched = update(loot_tables::table.find(table_id))
        .set(changes)
        .execute(&mut *conn)?;

    Ok(touched)
}

/// Deletes a table and its entries. Returns 0 when the table is unknown.
pub fn delete_loot_table(db: &DbPool, table_id: i32) -> Result<usize, DbError> {
    use diesel::delete;

    let mut conn = db.lock().unwrap();
    delete(loot_table_entries::table.filter(loot_table_entries::loot_table_id.eq(table_id)))
        .execute(&mut *conn)?;
    let removed = delete(loot_tables::table.find(table_id)).execute(&mut *conn)?;

    Ok(removed)
}

pub fn list_loot_tables(db: &DbPool) -> Result<Vec<LootTable>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = loot_tables::table
        .order_by(loot_tables::id.asc())
        .load::<LootTable>(&mut *conn)?;

    Ok(results)
}

pub fn active_loot_tables(db: &DbPool) -> Result<Vec<LootTable>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = loot_tables::table
        .filter(loot_tables::is_active.eq(true))
        .order_by(loot_tables::id.asc())
        .load::<LootTable>(&mut *conn)?;

    Ok(results)
}

pub fn get_loot_table(db: &DbPool, table_id: i32) -> Result<Option<LootTable>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = loot_tables::table
        .find(table_id)
        .first::<LootTable>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Returns None when a pinned id is already taken.
pub fn insert_loot_entry(
    db: &DbPool,
    entry: &NewLootTableEntry,
) -> Result<Option<LootTableEntry>, DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    match insert_into(loot_table_entries::table)
        .values(entry)
        .get_result::<LootTableEntry>(&mut *conn)
    {
        Ok(row) => Ok(Some(row)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_loot_entry(db: &DbPool, entry_id: i32) -> Result<usize, DbError> {
    use diesel::delete;

    let mut conn = db.lock().unwrap();
    let removed = delete(loot_table_entries::table.find(entry_id)).execute(&mut *conn)?;

    Ok(removed)
}

pub fn entries_for_table(db: &DbPool, table_id: i32) -> Result<Vec<LootTableEntry>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = loot_table_entries::table
        .filter(loot_table_entries::loot_table_id.eq(table_id))
        .order_by(loot_table_entries::id.asc())
        .load::<LootTableEntry>(&mut *conn)?;

    Ok(results)
}

// ==================== MATCH QUERIES ====================

pub fn insert_match(db: &DbPool, game_match: &Match) -> Result<(), DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    insert_into(matches::table)
        .values(game_match)
        .execute(&mut *conn)?;

    Ok(())
}

pub fn get_match(db: &DbPool, match_id: &str) -> Result<Option<Match>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = matches::table
        .find(match_id)
        .first::<Match>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Stamps the end of a match; conditional on it still being open so result
/// submission can only close it once.
pub fn end_match(db: &DbPool, match_id: &str, now: i64) -> Result<usize, DbError> {
    let mut conn = db.lock().unwrap();
    end_match_on(&mut conn, match_id, now)
}

fn end_match_on(conn: &mut SqliteConnection, match_id: &str, now: i64) -> Result<usize, DbError> {
    use diesel::update;

    let touched = update(
        matches::table
            .find(match_id)
            .filter(matches::ended_at.is_null()),
    )
    .set(matches::ended_at.eq(Some(now)))
    .execute(conn)?;

    Ok(touched)
}

/// Returns false when this player already has a result in the match.
pub fn insert_match_result(db: &DbPool, result: &MatchResult) -> Result<bool, DbError> {
    let mut conn = db.lock().unwrap();
    insert_match_result_on(&mut conn, result)
}

fn insert_match_result_on(
    conn: &mut SqliteConnection,
    result: &MatchResult,
) -> Result<bool, DbError> {
    use diesel::insert_into;

    match insert_into(match_results::table)
        .values(result)
        .execute(conn)
    {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// One row of a result submission together with its computed payout.
pub struct MatchPayout {
    pub row: MatchResult,
    pub won: bool,
    pub xp: i64,
    pub coins: i64,
    pub rating_delta: i32,
}

/// What a settlement actually did, with the skipped rows by cause.
#[derive(Debug)]
pub struct MatchSettlement {
    pub applied: usize,
    pub unknown_players: Vec<String>,
    pub duplicates: Vec<String>,
}

/// Closes the match and pays out every result in one transaction. Returns
/// None without writing anything when the match is already closed. Any
/// failure rolls the whole settlement back, the close included, so a retry
/// starts again from an open match. Unknown players and duplicate rows are
/// skipped and reported back, not fatal.
pub fn settle_match(
    db: &DbPool,
    match_id: &str,
    ended_at: i64,
    payouts: &[MatchPayout],
) -> Result<Option<MatchSettlement>, DbError> {
    let mut conn = db.lock().unwrap();
    conn.transaction(|conn| -> Result<Option<MatchSettlement>, DbError> {
        if end_match_on(conn, match_id, ended_at)? == 0 {
            return Ok(None);
        }

        let mut settlement = MatchSettlement {
            applied: 0,
            unknown_players: Vec::new(),
            duplicates: Vec::new(),
        };
        for payout in payouts {
            let player_id = payout.row.player_id.as_str();
            let known = players::table
                .find(player_id)
                .select(players::id)
                .first::<String>(conn)
                .optional()?;
            if known.is_none() {
                settlement.unknown_players.push(player_id.to_string());
                continue;
            }
            if !insert_match_result_on(conn, &payout.row)? {
                settlement.duplicates.push(player_id.to_string());
                continue;
            }

            if apply_progress_delta_on(conn, player_id, payout.xp, payout.coins, 0)? == 0 {
                return Err(format!("no progress row for player {}", player_id).into());
            }
            apply_match_stats_on(
                conn,
                player_id,
                payout.won,
                payout.row.kills,
                payout.row.deaths,
                payout.row.score,
                payout.rating_delta,
            )?;
            settlement.applied += 1;
        }
        Ok(Some(settlement))
    })
}

pub fn results_for_match(db: &DbPool, match_id: &str) -> Result<Vec<MatchResult>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = match_results::table
        .filter(match_results::match_id.eq(match_id))
        .order_by(match_results::placement.asc())
        .load::<MatchResult>(&mut *conn)?;

    Ok(results)
}

pub fn recent_matches_for_player(
    db: &DbPool,
    player_id: &str,
    limit: i64,
) -> Result<Vec<(MatchResult, Match)>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = match_results::table
        .inner_join(matches::table)
        .filter(match_results::player_id.eq(player_id))
        .order_by(matches::started_at.desc())
        .limit(limit)
        .load::<(MatchResult, Match)>(&mut *conn)?;

    Ok(results)
}

// ==================== FRIENDSHIP QUERIES ====================

/// Returns false when the exact pair already has a row.
pub fn insert_friendship(db: &DbPool, friendship: &Friendship) -> Result<bool, DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    match insert_into(friendships::table)
        .values(friendship)
        .execute(&mut *conn)
    {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn get_friendship(db: &DbPool, friendship_id: &str) -> Result<Option<Friendship>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = friendships::table
        .find(friendship_id)
        .first::<Friendship>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Finds a friendship row between two players in either direction.
pub fn get_friendship_between(
    db: &DbPool,
    a: &str,
    b: &str,
) -> Result<Option<Friendship>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = friendships::table
        .filter(
            friendships::requester_id
                .eq(a)
                .and(friendships::addressee_id.eq(b))
                .or(friendships::requester_id
                    .eq(b)
                    .and(friendships::addressee_id.eq(a))),
        )
        .first::<Friendship>(&mut *conn)
        .optional()?;

    Ok(result)
}

pub fn set_friendship_status(
    db: &DbPool,
    friendship_id: &str,
    status: &str,
) -> Result<usize, DbError> {
    use diesel::update;

    let mut conn = db.lock().unwrap();
    let touched = update(friendships::table.find(friendship_id))
        .set(friendships::status.eq(status))
        .execute(&mut *conn)?;

    Ok(touched)
}

pub fn delete_friendship(db: &DbPool, friendship_id: &str) -> Result<usize, DbError> {
    use diesel::delete;

    let mut conn = db.lock().unwrap();
    let removed = delete(friendships::table.find(friendship_id)).execute(&mut *conn)?;

    Ok(removed)
}

pub fn list_friendships_of(db: &DbPool, player_id: &str) -> Result<Vec<Friendship>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = friendships::table
        .filter(friendships::status.eq("accepted"))
        .filter(
            friendships::requester_id
                .eq(player_id)
                .or(friendships::addressee_id.eq(player_id)),
        )
        .order_by(friendships::created_at.desc())
        .load::<Friendship>(&mut *conn)?;

    Ok(results)
}

pub fn list_incoming_requests(db: &DbPool, player_id: &str) -> Result<Vec<Friendship>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = friendships::table
        .filter(friendships::addressee_id.eq(player_id))
        .filter(friendships::status.eq("pending"))
        .order_by(friendships::created_at.desc())
        .load::<Friendship>(&mut *conn)?;

    Ok(results)
}

// ==================== GAME SERVER QUERIES ====================

pub fn insert_server(db: &DbPool, server: &GameServer) -> Result<(), DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    insert_into(game_servers::table)
        .values(server)
        .execute(&mut *conn)?;

    Ok(())
}

pub fn get_server(db: &DbPool, server_id: &str) -> Result<Option<GameServer>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = game_servers::table
        .find(server_id)
        .first::<GameServer>(&mut *conn)
        .optional()?;

    Ok(result)
}

pub fn list_servers(db: &DbPool) -> Result<Vec<GameServer>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = game_servers::table
        .order_by(game_servers::name.asc())
        .load::<GameServer>(&mut *conn)?;

    Ok(results)
}

/// Updates the liveness fields. Returns 0 when the server is unknown.
pub fn record_heartbeat(
    db: &DbPool,
    server_id: &str,
    current_players: i32,
    now: i64,
) -> Result<usize, DbError> {
    use diesel::update;

    let mut conn = db.lock().unwrap();
    let touched = update(game_servers::table.find(server_id))
        .set((
            game_servers::current_players.eq(current_players),
            game_servers::last_heartbeat.eq(now),
        ))
        .execute(&mut *conn)?;

    Ok(touched)
}

// ==================== FAVORITE QUERIES ====================

/// Returns false when the server is already a favorite.
pub fn insert_favorite(db: &DbPool, favorite: &ServerFavorite) -> Result<bool, DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    match insert_into(server_favorites::table)
        .values(favorite)
        .execute(&mut *conn)
    {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_favorite(db: &DbPool, player_id: &str, server_id: &str) -> Result<usize, DbError> {
    use diesel::delete;

    let mut conn = db.lock().unwrap();
    let removed = delete(
        server_favorites::table
            .filter(server_favorites::player_id.eq(player_id))
            .filter(server_favorites::server_id.eq(server_id)),
    )
    .execute(&mut *conn)?;

    Ok(removed)
}

pub fn list_favorites(
    db: &DbPool,
    player_id: &str,
) -> Result<Vec<(ServerFavorite, GameServer)>, DbError> {
    let mut conn = db.lock().unwrap();
    let results = server_favorites::table
        .inner_join(game_servers::table)
        .filter(server_favorites::player_id.eq(player_id))
        .order_by(server_favorites::created_at.desc())
        .load::<(ServerFavorite, GameServer)>(&mut *conn)?;

    Ok(results)
}

// ==================== JOIN TOKEN QUERIES ====================

/// Returns false on a token string collision.
pub fn insert_join_token(db: &DbPool, token: &JoinToken) -> Result<bool, DbError> {
    use diesel::insert_into;

    let mut conn = db.lock().unwrap();
    match insert_into(join_tokens::table)
        .values(token)
        .execute(&mut *conn)
    {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn get_join_token(db: &DbPool, token: &str) -> Result<Option<JoinToken>, DbError> {
    let mut conn = db.lock().unwrap();
    let result = join_tokens::table
        .find(token)
        .first::<JoinToken>(&mut *conn)
        .optional()?;

    Ok(result)
}

/// Single conditional UPDATE: flips used_at only while it is still NULL, so
/// concurrent consumers race on the row and exactly one sees 1 row touched.
pub fn mark_token_used(db: &DbPool, token: &str, now: i64) -> Result<usize, DbError> {
    use diesel::update;

    let mut conn = db.lock().unwrap();
    let touched = update(
        join_tokens::table
            .find(token)
            .filter(join_tokens::used_at.is_null()),
    )
    .set(join_tokens::used_at.eq(Some(now)))
    .execute(&mut *conn)?;

    Ok(touched)
}

pub fn delete_expired_or_used_tokens(db: &DbPool, now: i64) -> Result<usize, DbError> {
    use diesel::delete;

    let mut conn = db.lock().unwrap();
    let removed = delete(
        join_tokens::table.filter(
            join_tokens::expires_at
                .lt(now)
                .or(join_tokens::used_at.is_not_null()),
        ),
    )
    .execute(&mut *conn)?;

    Ok(removed)
}
