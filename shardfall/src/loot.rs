use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Acquisition channel recorded when the drop engine grants a cosmetic.
pub const ACQUIRED_VIA_DROP: &str = "loot_drop";

/// A droppable cosmetic as stored in the catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CosmeticItem {
    pub id: i32,
    pub name: String,
    pub rarity: String,     // "common", "rare", "epic", "legendary"
    pub slot: String,       // equipment slot, e.g. "banner", "trail", "skin"
    pub unlock_level: i32,
}

/// A loot table: one Bernoulli gate in front of a weighted pool of entries.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LootTable {
    pub id: i32,
    pub name: String,
    pub drop_chance: f64,   // probability in [0.0, 1.0] that this table fires
    pub is_active: bool,
}

/// One weighted pick inside a loot table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LootTableEntry {
    pub id: i32,
    pub loot_table_id: i32,
    pub cosmetic_id: i32,
    pub weight: i32,        // relative share of the table, must be positive
    pub min_quantity: i32,
    pub max_quantity: i32,
}

/// Outcome of recording an ownership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// First time this player received the cosmetic.
    Granted,
    /// The player already owned it; the grant is a no-op.
    AlreadyOwned,
}

/// A resolved drop, ready to be reported back to the player.
#[derive(Debug, Serialize, Clone)]
pub struct LootDrop {
    pub table_id: i32,
    pub entry_id: i32,
    pub cosmetic: CosmeticItem,
    pub quantity: i32,
    pub newly_granted: bool,
}

#[derive(Debug)]
pub enum LootError {
    /// No loot table is currently active.
    NoActiveTables,
    /// Every active table failed its drop roll.
    NoDrop,
    /// The selected table has no entries.
    EmptyTable { table_id: i32 },
    /// The selected table's total weight is zero or negative.
    InvalidWeights { table_id: i32 },
    /// An entry points at a cosmetic that does not exist.
    CosmeticNotFound { cosmetic_id: i32 },
    /// The storage backend failed.
    Store(StoreError),
}

impl std::fmt::Display for LootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LootError::NoActiveTables => write!(f, "no active loot tables configured"),
            LootError::NoDrop => write!(f, "no loot table cleared its drop roll"),
            LootError::EmptyTable { table_id } => {
                write!(f, "loot table {} has no entries", table_id)
            }
            LootError::InvalidWeights { table_id } => {
                write!(f, "loot table {} has a non-positive total weight", table_id)
            }
            LootError::CosmeticNotFound { cosmetic_id } => {
                write!(f, "loot entry references missing cosmetic {}", cosmetic_id)
            }
            LootError::Store(e) => write!(f, "loot storage error: {}", e),
        }
    }
}

impl std::error::Error for LootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LootError::Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl LootError {
    /// Benign outcomes mean "the roll resolved to nothing" and are not faults.
    pub fn is_no_drop(&self) -> bool {
        matches!(
            self,
            LootError::NoActiveTables | LootError::NoDrop | LootError::EmptyTable { .. }
        )
    }

    /// Stable machine-readable code for API responses.
    pub fn outcome_code(&self) -> &'static str {
        match self {
            LootError::NoActiveTables => "no_active_tables",
            LootError::NoDrop => "no_drop",
            LootError::EmptyTable { .. } => "empty_table",
            LootError::InvalidWeights { .. } => "invalid_weights",
            LootError::CosmeticNotFound { .. } => "missing_cosmetic",
            LootError::Store(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            // A roll that resolves to nothing is still a successful roll.
            LootError::NoActiveTables | LootError::NoDrop | LootError::EmptyTable { .. } => 200,
            LootError::InvalidWeights { .. }
            | LootError::CosmeticNotFound { .. }
            | LootError::Store(_) => 500,
        }
    }

    /// Log the outcome with severity matching what it means operationally.
    pub fn log_drop_event(&self) {
        match self {
            LootError::InvalidWeights { table_id } => {
                tracing::error!(
                    "⚠️  INTEGRITY: loot table {} carries a non-positive total weight - fix the table config",
                    table_id
                );
            }
            LootError::CosmeticNotFound { cosmetic_id } => {
                tracing::error!(
                    "⚠️  INTEGRITY: loot entry references cosmetic {} which no longer exists",
                    cosmetic_id
                );
            }
            LootError::Store(e) => {
                tracing::error!("Loot drop aborted by storage error: {}", e);
            }
            _ => {
                tracing::debug!("Loot roll resolved to nothing: {}", self);
            }
        }
    }
}

/// Storage surface the drop engine needs. The server implements this over
/// diesel; tests use an in-memory substitute.
pub trait LootStore {
    fn active_loot_tables(&self) -> Result<Vec<LootTable>, StoreError>;
    fn entries_for_table(&self, table_id: i32) -> Result<Vec<LootTableEntry>, StoreError>;
    fn cosmetic_item(&self, cosmetic_id: i32) -> Result<Option<CosmeticItem>, StoreError>;
    fn grant_cosmetic(
        &self,
        player_id: &str,
        cosmetic_id: i32,
        acquired_via: &str,
    ) -> Result<GrantOutcome, StoreError>;
}

/// Two-stage weighted drop generator.
///
/// Stage 1 walks the active tables in ascending id order and rolls each one
/// against its drop chance; the first table to clear its roll wins. Stage 2
/// draws an integer below the table's total weight and scans the entries in
/// ascending id order until the cumulative weight passes the draw.
pub struct LootEngine<S> {
    store: S,
}

impl<S: LootStore> LootEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Roll a drop for `player_id`. The randomness source is injected so the
    /// selection logic stays deterministic under a seeded generator.
    pub fn generate_drop<R: Rng>(
        &self,
        player_id: &str,
        rng: &mut R,
    ) -> Result<LootDrop, LootError> {
        let mut tables = self.store.active_loot_tables().map_err(LootError::Store)?;
        if tables.is_empty() {
            return Err(LootError::NoActiveTables);
        }
        tables.sort_unstable_by_key(|t| t.id);

        let mut selected = None;
        for table in &tables {
            let roll: f64 = rng.gen_range(0.0..1.0);
            if roll < table.drop_chance {
                tracing::debug!(
                    "Loot table {} fired (roll {:.4} < chance {:.4})",
                    table.id,
                    roll,
                    table.drop_chance
                );
                selected = Some(table);
                break;
            }
        }
        let table = selected.ok_or(LootError::NoDrop)?;

        let mut entries = self
            .store
            .entries_for_table(table.id)
            .map_err(LootError::Store)?;
        if entries.is_empty() {
            return Err(LootError::EmptyTable { table_id: table.id });
        }
        entries.sort_unstable_by_key(|e| e.id);

        let total_weight: i64 = entries.iter().map(|e| i64::from(e.weight)).sum();
        if total_weight <= 0 {
            return Err(LootError::InvalidWeights { table_id: table.id });
        }

        let draw = rng.gen_range(0..total_weight);
        // Cumulative scan; the last entry doubles as a fallback so a boundary
        // draw can never select nothing.
        let mut chosen = &entries[entries.len() - 1];
        let mut cumulative: i64 = 0;
        for entry in &entries {
            cumulative += i64::from(entry.weight);
            if draw < cumulative {
                chosen = entry;
                break;
            }
        }

        let quantity = if chosen.max_quantity > chosen.min_quantity {
            rng.gen_range(chosen.min_quantity..=chosen.max_quantity)
        } else {
            chosen.min_quantity
        };

        // Resolve the catalog row before touching ownership so a dangling
        // entry never writes a grant.
        let cosmetic = self
            .store
            .cosmetic_item(chosen.cosmetic_id)
            .map_err(LootError::Store)?
            .ok_or(LootError::CosmeticNotFound {
                cosmetic_id: chosen.cosmetic_id,
            })?;

        let outcome = self
            .store
            .grant_cosmetic(player_id, chosen.cosmetic_id, ACQUIRED_VIA_DROP)
            .map_err(LootError::Store)?;

        tracing::debug!(
            "Player {} rolled cosmetic {} x{} from table {} ({:?})",
            player_id,
            cosmetic.id,
            quantity,
            table.id,
            outcome
        );

        Ok(LootDrop {
            table_id: table.id,
            entry_id: chosen.id,
            cosmetic,
            quantity,
            newly_granted: outcome == GrantOutcome::Granted,
        })
    }
}
