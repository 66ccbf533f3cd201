//! The diesel-backed store against a real SQLite database: unique-violation
//! folding, conditional single-shot writes, and the loot engine and token
//! authority running over the same rows the handlers use.

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use shardfall::loot::{GrantOutcome, LootEngine, LootStore, ACQUIRED_VIA_DROP};
use shardfall::token::{JoinTokenAuthority, TokenError};
use shardfallserv::db::{self, DbPool};
use shardfallserv::store::DieselStore;

fn fresh_pool() -> DbPool {
    let pool = db::init::init_db(":memory:").expect("in-memory database");
    db::init::run_migrations(&pool).expect("migrations");
    pool
}

fn seed_player(pool: &DbPool, username: &str) -> String {
    let now = Utc::now().timestamp();
    let player = db::Player {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        display_name: username.to_string(),
        password_hash: "x".to_string(),
        is_admin: false,
        created_at: now,
        last_login: now,
    };
    assert!(db::insert_player(pool, &player).expect("insert player"));
    db::insert_progress(
        pool,
        &db::PlayerProgress {
            player_id: player.id.clone(),
            xp: 0,
            coins: 0,
            shards: 0,
        },
    )
    .expect("insert progress");
    db::insert_stats(
        pool,
        &db::PlayerStats {
            player_id: player.id.clone(),
            matches_played: 0,
            wins: 0,
            kills: 0,
            deaths: 0,
            score: 0,
            rating: 1000,
        },
    )
    .expect("insert stats");
    player.id
}

fn seed_server(pool: &DbPool, name: &str) -> db::GameServer {
    let server = db::GameServer {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        region: "eu-west".to_string(),
        host: "10.0.0.1".to_string(),
        port: 7777,
        max_players: 16,
        current_players: 0,
        server_key: shardfall::token::generate_token(),
        last_heartbeat: 0,
        registered_at: Utc::now().timestamp(),
    };
    db::insert_server(pool, &server).expect("insert server");
    server
}

fn seed_cosmetic(pool: &DbPool, id: i32) {
    let row = db::insert_cosmetic(
        pool,
        &db::NewCosmetic {
            id: Some(id),
            name: format!("cosmetic-{}", id),
            rarity: "common".to_string(),
            slot: "banner".to_string(),
            unlock_level: 1,
        },
    )
    .expect("insert cosmetic");
    assert!(row.is_some());
}

#[test]
fn duplicate_username_folds_to_false() {
    let pool = fresh_pool();
    let first_id = seed_player(&pool, "kara");

    let dupe = db::Player {
        id: Uuid::new_v4().to_string(),
        username: "kara".to_string(),
        display_name: "someone else".to_string(),
        password_hash: "y".to_string(),
        is_admin: false,
        created_at: 0,
        last_login: 0,
    };
    assert!(!db::insert_player(&pool, &dupe).expect("second insert"));

    let loaded = db::get_player_by_username(&pool, "kara")
        .expect("lookup")
        .expect("player exists");
    assert_eq!(loaded.id, first_id);
}

#[test]
fn grant_cosmetic_folds_duplicates_to_already_owned() {
    let pool = fresh_pool();
    let player_id = seed_player(&pool, "mara");
    seed_cosmetic(&pool, 7);
    let store = DieselStore::new(pool.clone());

    let first = store
        .grant_cosmetic(&player_id, 7, ACQUIRED_VIA_DROP)
        .expect("first grant");
    let second = store
        .grant_cosmetic(&player_id, 7, ACQUIRED_VIA_DROP)
        .expect("second grant");
    assert_eq!(first, GrantOutcome::Granted);
    assert_eq!(second, GrantOutcome::AlreadyOwned);

    let owned = db::list_player_cosmetics(&pool, &player_id).expect("locker");
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].0.acquired_via, "loot_drop");
    assert_eq!(owned[0].1.id, 7);
}

#[test]
fn loot_engine_rolls_against_real_tables() {
    let pool = fresh_pool();
    let player_id = seed_player(&pool, "nils");
    seed_cosmetic(&pool, 7);
    let table = db::insert_loot_table(
        &pool,
        &db::NewLootTable {
            id: Some(1),
            name: "launch-crate".to_string(),
            drop_chance: 1.0,
            is_active: true,
        },
    )
    .expect("insert table")
    .expect("row");
    db::insert_loot_entry(
        &pool,
        &db::NewLootTableEntry {
            id: None,
            loot_table_id: table.id,
            cosmetic_id: 7,
            weight: 100,
            min_quantity: 1,
            max_quantity: 1,
        },
    )
    .expect("insert entry")
    .expect("row");

    // A second table pinned to the same id folds to None instead of erroring.
    let clash = db::insert_loot_table(
        &pool,
        &db::NewLootTable {
            id: Some(1),
            name: "impostor".to_string(),
            drop_chance: 0.5,
            is_active: true,
        },
    )
    .expect("pinned insert");
    assert!(clash.is_none());

    let engine = LootEngine::new(DieselStore::new(pool.clone()));
    let mut rng = StdRng::seed_from_u64(7);

    let first = engine.generate_drop(&player_id, &mut rng).expect("drop");
    assert_eq!(first.table_id, 1);
    assert_eq!(first.cosmetic.id, 7);
    assert!(first.newly_granted);

    let second = engine.generate_drop(&player_id, &mut rng).expect("drop");
    assert!(!second.newly_granted);
    assert_eq!(
        db::list_player_cosmetics(&pool, &player_id)
            .expect("locker")
            .len(),
        1
    );
}

#[test]
fn token_authority_lifecycle_over_sqlite() {
    let pool = fresh_pool();
    let authority = JoinTokenAuthority::new(DieselStore::new(pool));

    let record = authority.issue("p1", "s1", 60, 1_000).expect("issue");
    assert_eq!(record.expires_at, 1_060);

    // Non-destructive validation, inclusive of the expiry boundary.
    assert!(authority.validate(&record.token, 1_030).is_ok());
    assert!(authority.validate(&record.token, 1_060).is_ok());
    assert!(matches!(
        authority.validate(&record.token, 1_061).unwrap_err(),
        TokenError::Expired
    ));

    authority.mark_used(&record.token, 1_030).expect("consume");
    assert!(matches!(
        authority.validate(&record.token, 1_040).unwrap_err(),
        TokenError::AlreadyUsed
    ));
    assert!(matches!(
        authority.mark_used(&record.token, 1_041).unwrap_err(),
        TokenError::AlreadyUsed
    ));

    // Expiry outranks the used flag when both apply.
    assert!(matches!(
        authority.validate(&record.token, 5_000).unwrap_err(),
        TokenError::Expired
    ));

    assert!(matches!(
        authority.mark_used("no-such-token", 1_000).unwrap_err(),
        TokenError::NotFound
    ));
}

#[test]
fn concurrent_consumers_race_for_one_win() {
    let pool = fresh_pool();
    let authority = Arc::new(JoinTokenAuthority::new(DieselStore::new(pool)));
    let record = authority.issue("p1", "s1", 60, 1_000).expect("issue");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let authority = Arc::clone(&authority);
        let token = record.token.clone();
        handles.push(std::thread::spawn(move || {
            authority.mark_used(&token, 1_010).is_ok()
        }));
    }

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn sweep_clears_dead_tokens_and_keeps_live_ones() {
    let pool = fresh_pool();
    let authority = JoinTokenAuthority::new(DieselStore::new(pool));

    let live = authority.issue("p1", "s1", 600, 1_000).expect("issue");
    let expired = authority.issue("p2", "s1", 10, 1_000).expect("issue");
    let used = authority.issue("p3", "s1", 600, 1_000).expect("issue");
    authority.mark_used(&used.token, 1_005).expect("consume");

    let removed = authority.sweep(1_100).expect("sweep");
    assert_eq!(removed, 2);

    assert!(authority.validate(&live.token, 1_100).is_ok());
    assert!(matches!(
        authority.validate(&expired.token, 1_100).unwrap_err(),
        TokenError::NotFound
    ));

    // A second sweep finds nothing left to remove.
    assert_eq!(authority.sweep(1_100).expect("sweep"), 0);
}

#[test]
fn rating_is_floored_at_zero() {
    let pool = fresh_pool();
    let player_id = seed_player(&pool, "olga");

    db::apply_match_stats(&pool, &player_id, false, 0, 5, 10, -1_500).expect("stats");
    let stats = db::get_stats(&pool, &player_id)
        .expect("load")
        .expect("row");
    assert_eq!(stats.rating, 0);
    assert_eq!(stats.matches_played, 1);

    // Further losses cannot push it below the floor.
    db::apply_match_stats(&pool, &player_id, false, 0, 2, 3, -15).expect("stats");
    let stats = db::get_stats(&pool, &player_id)
        .expect("load")
        .expect("row");
    assert_eq!(stats.rating, 0);
    assert_eq!(stats.matches_played, 2);
}

#[test]
fn progress_deltas_accumulate_and_miss_unknown_players() {
    let pool = fresh_pool();
    let player_id = seed_player(&pool, "pym");

    assert_eq!(
        db::apply_progress_delta(&pool, &player_id, 120, 80, 1).expect("delta"),
        1
    );
    assert_eq!(
        db::apply_progress_delta(&pool, &player_id, 40, 10, 0).expect("delta"),
        1
    );
    let progress = db::get_progress(&pool, &player_id)
        .expect("load")
        .expect("row");
    assert_eq!(progress.xp, 160);
    assert_eq!(progress.coins, 90);
    assert_eq!(progress.shards, 1);

    assert_eq!(
        db::apply_progress_delta(&pool, "nobody", 10, 10, 10).expect("delta"),
        0
    );
}

#[test]
fn heartbeat_updates_count_and_timestamp() {
    let pool = fresh_pool();
    let server = seed_server(&pool, "eu-1");

    assert_eq!(
        db::record_heartbeat(&pool, &server.id, 5, 1_234).expect("beat"),
        1
    );
    let loaded = db::get_server(&pool, &server.id)
        .expect("load")
        .expect("row");
    assert_eq!(loaded.current_players, 5);
    assert_eq!(loaded.last_heartbeat, 1_234);

    assert_eq!(
        db::record_heartbeat(&pool, "ghost", 5, 1_234).expect("beat"),
        0
    );
}

#[test]
fn unique_pairs_fold_for_favorites_friendships_and_results() {
    let pool = fresh_pool();
    let player_a = seed_player(&pool, "quinn");
    let player_b = seed_player(&pool, "rhea");
    let server = seed_server(&pool, "eu-1");

    let favorite = db::ServerFavorite {
        id: Uuid::new_v4().to_string(),
        player_id: player_a.clone(),
        server_id: server.id.clone(),
        created_at: 1_000,
    };
    assert!(db::insert_favorite(&pool, &favorite).expect("favorite"));
    let again = db::ServerFavorite {
        id: Uuid::new_v4().to_string(),
        ..favorite.clone()
    };
    assert!(!db::insert_favorite(&pool, &again).expect("favorite"));
    assert_eq!(
        db::delete_favorite(&pool, &player_a, &server.id).expect("unfavorite"),
        1
    );
    assert_eq!(
        db::delete_favorite(&pool, &player_a, &server.id).expect("unfavorite"),
        0
    );

    let friendship = db::Friendship {
        id: Uuid::new_v4().to_string(),
        requester_id: player_a.clone(),
        addressee_id: player_b.clone(),
        status: "pending".to_string(),
        created_at: 1_000,
    };
    assert!(db::insert_friendship(&pool, &friendship).expect("friendship"));
    let again = db::Friendship {
        id: Uuid::new_v4().to_string(),
        ..friendship.clone()
    };
    assert!(!db::insert_friendship(&pool, &again).expect("friendship"));

    let game_match = db::Match {
        id: Uuid::new_v4().to_string(),
        server_id: server.id.clone(),
        mode: "brawl".to_string(),
        map_name: "relay-station".to_string(),
        started_at: 1_000,
        ended_at: None,
    };
    db::insert_match(&pool, &game_match).expect("match");
    let result = db::MatchResult {
        id: Uuid::new_v4().to_string(),
        match_id: game_match.id.clone(),
        player_id: player_a.clone(),
        placement: 1,
        kills: 3,
        deaths: 1,
        score: 120,
    };
    assert!(db::insert_match_result(&pool, &result).expect("result"));
    let again = db::MatchResult {
        id: Uuid::new_v4().to_string(),
        placement: 2,
        ..result.clone()
    };
    assert!(!db::insert_match_result(&pool, &again).expect("result"));
    assert_eq!(
        db::results_for_match(&pool, &game_match.id)
            .expect("results")
            .len(),
        1
    );
}

#[test]
fn end_match_is_single_shot() {
    let pool = fresh_pool();
    let server = seed_server(&pool, "eu-1");

    let game_match = db::Match {
        id: Uuid::new_v4().to_string(),
        server_id: server.id,
        mode: "brawl".to_string(),
        map_name: "relay-station".to_string(),
        started_at: 1_000,
        ended_at: None,
    };
    db::insert_match(&pool, &game_match).expect("match");

    assert_eq!(db::end_match(&pool, &game_match.id, 2_000).expect("end"), 1);
    assert_eq!(db::end_match(&pool, &game_match.id, 3_000).expect("end"), 0);

    let loaded = db::get_match(&pool, &game_match.id)
        .expect("load")
        .expect("row");
    assert_eq!(loaded.ended_at, Some(2_000));
}

#[test]
fn match_settlement_is_all_or_nothing() {
    let pool = fresh_pool();
    let server = seed_server(&pool, "eu-1");
    let paid = seed_player(&pool, "saul");

    // A player row without progress or stats makes the payout loop fail
    // partway through.
    let broken = db::Player {
        id: Uuid::new_v4().to_string(),
        username: "tilda".to_string(),
        display_name: "tilda".to_string(),
        password_hash: "x".to_string(),
        is_admin: false,
        created_at: 0,
        last_login: 0,
    };
    assert!(db::insert_player(&pool, &broken).expect("insert player"));

    let game_match = db::Match {
        id: Uuid::new_v4().to_string(),
        server_id: server.id,
        mode: "brawl".to_string(),
        map_name: "relay-station".to_string(),
        started_at: 1_000,
        ended_at: None,
    };
    db::insert_match(&pool, &game_match).expect("match");

    let payout = |player_id: &str, placement: i32| db::MatchPayout {
        row: db::MatchResult {
            id: Uuid::new_v4().to_string(),
            match_id: game_match.id.clone(),
            player_id: player_id.to_string(),
            placement,
            kills: 1,
            deaths: 0,
            score: 60,
        },
        won: placement == 1,
        xp: 60,
        coins: 10,
        rating_delta: if placement == 1 { 25 } else { -15 },
    };

    let attempt = db::settle_match(
        &pool,
        &game_match.id,
        2_000,
        &[payout(&paid, 1), payout(&broken.id, 2)],
    );
    assert!(attempt.is_err());

    // The failure rolled everything back: the match is still open, no
    // results landed, and the first player in the roster was not paid.
    let loaded = db::get_match(&pool, &game_match.id)
        .expect("load")
        .expect("row");
    assert_eq!(loaded.ended_at, None);
    assert!(db::results_for_match(&pool, &game_match.id)
        .expect("results")
        .is_empty());
    let progress = db::get_progress(&pool, &paid).expect("load").expect("row");
    assert_eq!(progress.xp, 0);
    assert_eq!(progress.coins, 0);
    let stats = db::get_stats(&pool, &paid).expect("load").expect("row");
    assert_eq!(stats.matches_played, 0);
    assert_eq!(stats.rating, 1000);

    // A retry with a good roster settles the still-open match.
    let settlement = db::settle_match(&pool, &game_match.id, 2_000, &[payout(&paid, 1)])
        .expect("settle")
        .expect("open match");
    assert_eq!(settlement.applied, 1);
    assert!(settlement.unknown_players.is_empty());
    assert!(settlement.duplicates.is_empty());
    let progress = db::get_progress(&pool, &paid).expect("load").expect("row");
    assert_eq!(progress.xp, 60);

    // The retry closed the match, so a further settlement refuses.
    assert!(
        db::settle_match(&pool, &game_match.id, 3_000, &[payout(&paid, 1)])
            .expect("settle")
            .is_none()
    );
}

#[test]
fn account_creation_is_all_or_nothing() {
    let pool = fresh_pool();

    let account = |username: &str| {
        let id = Uuid::new_v4().to_string();
        (
            db::Player {
                id: id.clone(),
                username: username.to_string(),
                display_name: username.to_string(),
                password_hash: "x".to_string(),
                is_admin: false,
                created_at: 0,
                last_login: 0,
            },
            db::PlayerProgress {
                player_id: id.clone(),
                xp: 0,
                coins: 0,
                shards: 0,
            },
            db::PlayerStats {
                player_id: id,
                matches_played: 0,
                wins: 0,
                kills: 0,
                deaths: 0,
                score: 0,
                rating: 1000,
            },
        )
    };

    // An orphan progress row under the same id makes the seed step fail; the
    // player row must roll back with it and leave the username free.
    let (player, progress, stats) = account("ugo");
    db::insert_progress(&pool, &progress).expect("orphan progress");
    assert!(db::create_player_account(&pool, &player, &progress, &stats).is_err());
    assert!(db::get_player_by_username(&pool, "ugo")
        .expect("lookup")
        .is_none());

    let (player, progress, stats) = account("vik");
    assert!(db::create_player_account(&pool, &player, &progress, &stats).expect("create"));
    assert!(db::get_progress(&pool, &player.id).expect("load").is_some());
    assert!(db::get_stats(&pool, &player.id).expect("load").is_some());

    // A username clash folds to false and seeds nothing for the loser.
    let (dupe, dupe_progress, dupe_stats) = account("vik");
    assert!(
        !db::create_player_account(&pool, &dupe, &dupe_progress, &dupe_stats).expect("create")
    );
    assert!(db::get_progress(&pool, &dupe.id).expect("load").is_none());
}
