//! # Economy Error Types
//!
//! All errors that can occur in the chest economy.

use std::fmt;

use thiserror::Error;

/// The kind of entity a failed lookup was looking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A chest definition.
    Chest,
    /// A player account.
    Player,
    /// An owned item instance.
    ItemInstance,
    /// An item definition in the catalog.
    ItemDefinition,
    /// A rarity tier in the registry.
    Rarity,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chest => "chest",
            Self::Player => "player",
            Self::ItemInstance => "item instance",
            Self::ItemDefinition => "item definition",
            Self::Rarity => "rarity",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the economy system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// A chest, player, item instance or definition does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What was looked up.
        kind: EntityKind,
        /// The key that was looked up.
        key: String,
    },

    /// The chest resolved to a pool with no positive weight.
    #[error("loot table is empty: chest {chest} has nothing to award")]
    EmptyLootTable {
        /// Chest whose pool was empty.
        chest: String,
    },

    /// The item instance is not owned by the claimed player.
    #[error("item instance {instance_id} is not owned by player {player_id}")]
    NotOwned {
        /// The instance that was touched.
        instance_id: u64,
        /// The player that claimed it.
        player_id: u64,
    },

    /// The player cannot afford the chest.
    #[error("insufficient funds: need {required} {currency}, have {available}")]
    InsufficientFunds {
        /// Currency the chest is priced in.
        currency: String,
        /// Price of the chest.
        required: String,
        /// Current balance.
        available: String,
    },

    /// The backing store failed to commit a write.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The opening ledger failed to append a record.
    #[error("audit failure: {0}")]
    AuditFailure(String),

    /// A player with this external identity already exists.
    #[error("duplicate player identity: {0}")]
    DuplicateIdentity(String),

    /// Arithmetic overflow in fixed-point calculation.
    #[error("arithmetic overflow in economic calculation")]
    ArithmeticOverflow,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EconomyError {
    /// Shorthand for a [`EconomyError::NotFound`].
    #[must_use]
    pub fn not_found(kind: EntityKind, key: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;
