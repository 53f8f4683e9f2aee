//! # Economy Configuration
//!
//! All tuning lives in an external TOML file so operators can retune RTP and
//! rewards without a rebuild. Every section is optional; missing keys fall
//! back to the launch values.
//!
//! ```toml
//! [click]
//! reward = 0.2
//! cooldown_secs = 3600
//!
//! [games.flip]
//! win_chance = 0.49
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::{Amount, Multiplier};

/// Root configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EconomyConfig {
    /// Timed click reward.
    pub click: ClickConfig,
    /// Signup bonus paid on a new referral link.
    pub referral: ReferralConfig,
    /// Withdrawal gating.
    pub withdrawal: WithdrawalConfig,
    /// Per-game probability policies.
    pub games: GamesConfig,
    /// Journal durability.
    pub journal: JournalConfig,
}

/// Click reward settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClickConfig {
    /// STAR credited per successful click.
    pub reward: Amount,
    /// Minimum seconds between two clicks.
    pub cooldown_secs: u64,
    /// Share of every click credited to the clicker's referrer (10000 = 100%).
    pub referral_income_bp: u32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            reward: Amount::from_parts(0, 200_000),
            cooldown_secs: 3600,
            referral_income_bp: 1000,
        }
    }
}

/// Signup bonus settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferralConfig {
    /// Paid to the referrer when a referee links.
    pub referrer_reward: Amount,
    /// Paid to the referee when it links.
    pub referee_reward: Amount,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            referrer_reward: Amount::from_whole(3),
            referee_reward: Amount::from_whole(2),
        }
    }
}

/// Withdrawal settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WithdrawalConfig {
    /// Active referrals required before any withdrawal.
    pub min_active_referrals: u32,
    /// Amounts a request may use. Empty means any positive amount.
    pub allowed_amounts: Vec<Amount>,
    /// Credit the reserved amount back when a request is rejected.
    pub refund_on_reject: bool,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            min_active_referrals: 3,
            allowed_amounts: Vec::new(),
            refund_on_reject: false,
        }
    }
}

/// Game policies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GamesConfig {
    /// Coin flip.
    pub flip: FlipConfig,
    /// Crash-style multiplier.
    pub crash: CrashConfig,
    /// Slot machine.
    pub slot: SlotConfig,
}

/// Coin flip policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlipConfig {
    /// Chance to win once the special event did not fire.
    pub win_chance: f64,
    /// Payout multiplier on a win.
    pub multiplier: Multiplier,
    /// Chance of the forced-loss event, checked before the win roll.
    pub special_event_chance: f64,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            win_chance: 0.49,
            multiplier: Multiplier::from_whole(2),
            special_event_chance: 0.015,
        }
    }
}

/// Crash policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrashConfig {
    /// Chance the round crashes immediately (loss at x1.0).
    pub instant_crash_chance: f64,
    /// Chance a surviving round draws from the high range.
    pub high_multiplier_chance: f64,
    /// Rare high multiplier range, `[low, high]`.
    pub high_multiplier_range: (f64, f64),
    /// Common low multiplier range, `[low, high]`.
    pub low_multiplier_range: (f64, f64),
    /// Simulated cash-out is drawn from `[1.0, multiplier * cashout_fraction]`.
    pub cashout_fraction: f64,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            instant_crash_chance: 0.6,
            high_multiplier_chance: 0.02,
            high_multiplier_range: (1.5, 5.0),
            low_multiplier_range: (1.0, 1.1),
            cashout_fraction: 0.8,
        }
    }
}

/// Slot policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlotConfig {
    /// Winning combinations out of `total_combinations`.
    pub winning_combinations: u32,
    /// Size of the combination space.
    pub total_combinations: u32,
    /// Payout multiplier on a win.
    pub win_multiplier: Multiplier,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            winning_combinations: 1,
            total_combinations: 27,
            win_multiplier: Multiplier::from_whole(20),
        }
    }
}

/// Journal durability settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    /// fsync after every committed unit.
    pub sync_on_commit: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { sync_on_commit: true }
    }
}

impl EconomyConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` on syntax errors, unknown keys,
    /// or values that fail [`EconomyConfig::validate`].
    pub fn from_toml_str(source: &str) -> EconomyResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| EconomyError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` if the file cannot be read or is invalid.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            EconomyError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> EconomyResult<()> {
        let games = &self.games;
        check_chance("games.flip.win_chance", games.flip.win_chance)?;
        check_chance("games.flip.special_event_chance", games.flip.special_event_chance)?;
        check_chance("games.crash.instant_crash_chance", games.crash.instant_crash_chance)?;
        check_chance("games.crash.high_multiplier_chance", games.crash.high_multiplier_chance)?;
        check_range("games.crash.high_multiplier_range", games.crash.high_multiplier_range)?;
        check_range("games.crash.low_multiplier_range", games.crash.low_multiplier_range)?;
        if !(games.crash.cashout_fraction.is_finite() && games.crash.cashout_fraction > 0.0) {
            return Err(invalid("games.crash.cashout_fraction", "must be positive"));
        }
        if games.slot.total_combinations == 0 {
            return Err(invalid("games.slot.total_combinations", "must be positive"));
        }
        if games.slot.winning_combinations > games.slot.total_combinations {
            return Err(invalid(
                "games.slot.winning_combinations",
                "cannot exceed total_combinations",
            ));
        }
        if self.click.referral_income_bp > 10_000 {
            return Err(invalid("click.referral_income_bp", "cannot exceed 10000 (100%)"));
        }
        if self.withdrawal.allowed_amounts.iter().any(|a| a.is_zero()) {
            return Err(invalid("withdrawal.allowed_amounts", "amounts must be positive"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> EconomyError {
    EconomyError::InvalidConfig(format!("{key}: {reason}"))
}

fn check_chance(key: &str, value: f64) -> EconomyResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(key, "must be within [0, 1]"))
    }
}

fn check_range(key: &str, (low, high): (f64, f64)) -> EconomyResult<()> {
    if low.is_finite() && high.is_finite() && low >= 0.0 && low <= high {
        Ok(())
    } else {
        Err(invalid(key, "must be an ordered pair of non-negative numbers"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_launch_values() {
        let config = EconomyConfig::from_toml_str("").unwrap();
        assert_eq!(config, EconomyConfig::default());
        assert_eq!(config.click.reward, Amount::from_parts(0, 200_000));
        assert_eq!(config.withdrawal.min_active_referrals, 3);
    }

    #[test]
    fn test_partial_override() {
        let config = EconomyConfig::from_toml_str(
            r#"
            [click]
            reward = 0.5

            [games.slot]
            winning_combinations = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.click.reward, Amount::from_parts(0, 500_000));
        assert_eq!(config.click.cooldown_secs, 3600);
        assert_eq!(config.games.slot.winning_combinations, 2);
        assert_eq!(config.games.slot.total_combinations, 27);
    }

    #[test]
    fn test_crash_ranges_parse_as_pairs() {
        let config = EconomyConfig::from_toml_str(
            "[games.crash]\nhigh_multiplier_range = [2.0, 10.0]\n",
        )
        .unwrap();
        assert_eq!(config.games.crash.high_multiplier_range, (2.0, 10.0));
    }

    #[test]
    fn test_rejects_bad_probability() {
        let err = EconomyConfig::from_toml_str("[games.flip]\nwin_chance = 1.5\n").unwrap_err();
        assert!(matches!(err, EconomyError::InvalidConfig(msg) if msg.contains("win_chance")));
    }

    #[test]
    fn test_rejects_slot_with_more_wins_than_combinations() {
        let source = "[games.slot]\nwinning_combinations = 30\ntotal_combinations = 27\n";
        assert!(EconomyConfig::from_toml_str(source).is_err());
    }

    #[test]
    fn test_rejects_negative_reward() {
        assert!(EconomyConfig::from_toml_str("[click]\nreward = -1.0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_key() {
        assert!(EconomyConfig::from_toml_str("[click]\nrewrad = 1.0\n").is_err());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let source = include_str!("../../../data/economy.toml");
        assert_eq!(EconomyConfig::from_toml_str(source).unwrap(), EconomyConfig::default());
    }
}
