//! # Stars Economy
//!
//! Reward-economy engine for Monkey Stars: users earn STAR from timed
//! clicks and referrals, wager it on three games, and request withdrawals
//! once they have enough active referrals.
//!
//! ## Design Principles
//!
//! 1. **Zero floating point in balances** - All money is fixed-point (u64 micro-units)
//! 2. **Journal first** - No state changes in memory before its journal unit commits
//! 3. **Per-account serialization** - Same-account mutations never interleave
//! 4. **External configuration** - All rewards and odds in TOML files
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stars_economy::{AllowAll, Economy, EconomyConfig};
//!
//! let config = EconomyConfig::from_toml_file("data/economy.toml")?;
//! let (economy, _recovery) = Economy::open("stars.journal", config, Arc::new(AllowAll))?;
//!
//! economy.register_account(42, "monkey", now)?;
//! let click = economy.claim_click(42, now)?;
//! let round = economy.play(42, "flip", click.reward, now)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod cooldown;
pub mod economy;
pub mod error;
pub mod fixed_point;
pub mod games;
pub mod journal;
pub mod ledger;
pub mod referral;
pub mod subscription;
pub mod withdrawal;

pub use config::EconomyConfig;
pub use cooldown::CooldownGate;
pub use economy::{AccountProfile, ClickReward, Economy, EconomyStats, PlayResult};
pub use error::{EconomyError, EconomyResult};
pub use fixed_point::{Amount, Delta, Multiplier};
pub use games::{GameEngine, GameKind, GameStatistics, Outcome};
pub use journal::{Journal, JournalEntry, MemoryJournal, Recovery, WriteAheadLog};
pub use ledger::{Account, AccountId, AuditDiscrepancy, Ledger, Timestamp, Transaction, TxCategory};
pub use referral::{ReferralCounts, ReferralGraph};
pub use subscription::{AllowAll, EligibilitySet, SubscriptionGate};
pub use withdrawal::{WithdrawalDesk, WithdrawalId, WithdrawalRequest, WithdrawalStatus};
