//! Runtime settings for the economy system.
//!
//! ```toml
//! auto_provision_players = true
//! charge_on_open = true
//! default_display_name = "Player"
//! starting_coins = "250"
//! starting_gems = 10
//! rng_seed = 42
//! ```
//!
//! Every field is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::FixedPoint;

/// Economy behavior switches and starting balances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EconomyConfig {
    /// Create an account on first contact from an unknown identity.
    pub auto_provision_players: bool,
    /// Deduct the chest cost when opening.
    pub charge_on_open: bool,
    /// Display name given to auto-provisioned accounts.
    pub default_display_name: String,
    /// Coin balance of a new account.
    pub starting_coins: FixedPoint,
    /// Gem balance of a new account.
    pub starting_gems: FixedPoint,
    /// Fixed seed for reproducible draws; entropy when unset.
    pub rng_seed: Option<u64>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            auto_provision_players: true,
            charge_on_open: true,
            default_display_name: "Player".to_string(),
            starting_coins: FixedPoint::ZERO,
            starting_gems: FixedPoint::ZERO,
            rng_seed: None,
        }
    }
}

impl EconomyConfig {
    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` on malformed text or unknown keys.
    pub fn from_toml_str(text: &str) -> EconomyResult<Self> {
        toml::from_str(text).map_err(|e| EconomyError::InvalidConfig(e.to_string()))
    }

    /// Loads settings from a file.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EconomyError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}
