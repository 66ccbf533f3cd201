// Diesel-backed implementation of the core storage traits
use chrono::Utc;
use uuid::Uuid;

use shardfall::loot::{CosmeticItem, GrantOutcome, LootStore, LootTable, LootTableEntry};
use shardfall::token::{InsertTokenOutcome, JoinToken, TokenStore};
use shardfall::StoreError;

use crate::db::{self, DbPool};

/// Bridges the loot engine and token authority onto the SQLite database.
/// Cheap to clone per request; it only wraps the shared connection handle.
#[derive(Clone)]
pub struct DieselStore {
    db: DbPool,
}

impl DieselStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl LootStore for DieselStore {
    fn active_loot_tables(&self) -> Result<Vec<LootTable>, StoreError> {
        Ok(db::active_loot_tables(&self.db)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    fn entries_for_table(&self, table_id: i32) -> Result<Vec<LootTableEntry>, StoreError> {
        Ok(db::entries_for_table(&self.db, table_id)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    fn cosmetic_item(&self, cosmetic_id: i32) -> Result<Option<CosmeticItem>, StoreError> {
        Ok(db::get_cosmetic(&self.db, cosmetic_id)?.map(Into::into))
    }

    fn grant_cosmetic(
        &self,
        player_id: &str,
        cosmetic_id: i32,
        acquired_via: &str,
    ) -> Result<GrantOutcome, StoreError> {
        let owned = db::PlayerCosmetic {
            id: Uuid::new_v4().to_string(),
            player_id: player_id.to_string(),
            cosmetic_id,
            acquired_via: acquired_via.to_string(),
            acquired_at: Utc::now().timestamp(),
        };
        if db::insert_player_cosmetic(&self.db, &owned)? {
            Ok(GrantOutcome::Granted)
        } else {
            Ok(GrantOutcome::AlreadyOwned)
        }
    }
}

impl TokenStore for DieselStore {
    fn create_join_token(&self, token: &JoinToken) -> Result<InsertTokenOutcome, StoreError> {
        let row: db::JoinToken = token.into();
        if db::insert_join_token(&self.db, &row)? {
            Ok(InsertTokenOutcome::Inserted)
        } else {
            Ok(InsertTokenOutcome::Duplicate)
        }
    }

    fn join_token(&self, token: &str) -> Result<Option<JoinToken>, StoreError> {
        Ok(db::get_join_token(&self.db, token)?.map(Into::into))
    }

    fn mark_token_used(&self, token: &str, now: i64) -> Result<bool, StoreError> {
        Ok(db::mark_token_used(&self.db, token, now)? > 0)
    }

    fn delete_expired_or_used(&self, now: i64) -> Result<usize, StoreError> {
        Ok(db::delete_expired_or_used_tokens(&self.db, now)?)
    }
}
