// Diesel schema definition for the Shardfall database
use diesel::allow_tables_to_appear_in_same_query;
use diesel::joinable;
use diesel::table;

table! {
    players (id) {
        id -> Text,
        username -> Text,
        display_name -> Text,
        password_hash -> Text,
        is_admin -> Bool,
        created_at -> BigInt,
        last_login -> BigInt,
    }
}

table! {
    player_progress (player_id) {
        player_id -> Text,
        xp -> BigInt,
        coins -> BigInt,
        shards -> BigInt,
    }
}

table! {
    player_stats (player_id) {
        player_id -> Text,
        matches_played -> Integer,
        wins -> Integer,
        kills -> Integer,
        deaths -> Integer,
        score -> BigInt,
        rating -> Integer,
    }
}

table! {
    cosmetic_items (id) {
        id -> Integer,
        name -> Text,
        rarity -> Text,
        slot -> Text,
        unlock_level -> Integer,
    }
}

table! {
    player_cosmetics (id) {
        id -> Text,
        player_id -> Text,
        cosmetic_id -> Integer,
        acquired_via -> Text,
        acquired_at -> BigInt,
    }
}

table! {
    loot_tables (id) {
        id -> Integer,
        name -> Text,
        drop_chance -> Double,
        is_active -> Bool,
    }
}

table! {
    loot_table_entries (id) {
        id -> Integer,
        loot_table_id -> Integer,
        cosmetic_id -> Integer,
        weight -> Integer,
        min_quantity -> Integer,
        max_quantity -> Integer,
    }
}

table! {
    matches (id) {
        id -> Text,
        server_id -> Text,
        mode -> Text,
        map_name -> Text,
        started_at -> BigInt,
        ended_at -> Nullable<BigInt>,
    }
}

table! {
    match_results (id) {
        id -> Text,
        match_id -> Text,
        player_id -> Text,
        placement -> Integer,
        kills -> Integer,
        deaths -> Integer,
        score -> Integer,
    }
}

table! {
    friendships (id) {
        id -> Text,
        requester_id -> Text,
        addressee_id -> Text,
        status -> Text,
        created_at -> BigInt,
    }
}

table! {
    game_servers (id) {
        id -> Text,
        name -> Text,
        region -> Text,
        host -> Text,
        port -> Integer,
        max_players -> Integer,
        current_players -> Integer,
        server_key -> Text,
        last_heartbeat -> BigInt,
        registered_at -> BigInt,
    }
}

table! {
    server_favorites (id) {
        id -> Text,
        player_id -> Text,
        server_id -> Text,
        created_at -> BigInt,
    }
}

table! {
    join_tokens (token) {
        token -> Text,
        player_id -> Text,
        server_id -> Text,
        created_at -> BigInt,
        expires_at -> BigInt,
        used_at -> Nullable<BigInt>,
    }
}

// Join relationships used by the query layer
joinable!(player_stats -> players (player_id));
joinable!(player_cosmetics -> cosmetic_items (cosmetic_id));
joinable!(loot_table_entries -> loot_tables (loot_table_id));
joinable!(match_results -> matches (match_id));
joinable!(server_favorites -> game_servers (server_id));

allow_tables_to_appear_in_same_query!(
    players,
    player_progress,
    player_stats,
    cosmetic_items,
    player_cosmetics,
    loot_tables,
    loot_table_entries,
    matches,
    match_results,
    friendships,
    game_servers,
    server_favorites,
    join_tokens,
);
