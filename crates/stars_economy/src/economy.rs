//! # Economy Facade
//!
//! **The single entry point bot and web handlers call.**
//!
//! ```text
//! handler ──> Economy ──┬──> CooldownGate ──┐
//!                       ├──> GameEngine ────┼──> Ledger ──> Journal
//!                       ├──> ReferralGraph ─┤
//!                       └──> WithdrawalDesk ┘
//! ```
//!
//! Construct one `Economy` at process start and share it by reference
//! (`Arc<Economy>`); it holds no global state. Callers pass an already
//! authenticated account id and the current unix time.
//!
//! ## Subscription gating
//!
//! `claim_click`, `register_referral` (for the referee) and
//! `request_withdrawal` require [`SubscriptionGate::is_eligible`]. Games and
//! read-only queries do not.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, warn};

use crate::config::EconomyConfig;
use crate::cooldown::CooldownGate;
use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::{Amount, Delta, Multiplier};
use crate::games::{GameEngine, GameKind};
use crate::journal::{Journal, JournalEntry, MemoryJournal, Recovery, WriteAheadLog};
use crate::ledger::{
    Account, AccountId, AuditDiscrepancy, Ledger, Timestamp, Transaction, TxCategory,
};
use crate::referral::{ReferralCounts, ReferralGraph};
use crate::subscription::SubscriptionGate;
use crate::withdrawal::{WithdrawalDesk, WithdrawalId, WithdrawalRequest, WithdrawalStatus};

// ============================================================================
// Results
// ============================================================================

/// Result of a successful click.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClickReward {
    /// Amount credited.
    pub reward: Amount,
    /// Balance after the credit.
    pub new_balance: Amount,
    /// Referrer and the income it received, if any.
    pub referrer_income: Option<(AccountId, Amount)>,
}

/// Result of one game round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayResult {
    /// The game played.
    pub game: GameKind,
    /// Whether the player won.
    pub win: bool,
    /// Reported multiplier.
    pub multiplier: Multiplier,
    /// Gross payout (zero on a loss).
    pub payout: Amount,
    /// Balance after the round.
    pub new_balance: Amount,
}

/// Everything the profile screen shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountProfile {
    /// Account snapshot.
    pub account: Account,
    /// Who referred this account.
    pub referrer: Option<AccountId>,
    /// Referral counts.
    pub referrals: ReferralCounts,
    /// Seconds until the next click; 0 when ready.
    pub next_click_in_secs: u64,
}

/// Admin panel aggregates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EconomyStats {
    /// Registered accounts.
    pub total_users: u64,
    /// Sum of all balances.
    pub total_balance: Amount,
    /// Signed sum of click and game-loss transactions.
    pub total_income: Delta,
}

// ============================================================================
// Economy
// ============================================================================

/// The reward economy.
pub struct Economy {
    config: EconomyConfig,
    ledger: Ledger,
    referrals: ReferralGraph,
    withdrawals: WithdrawalDesk,
    engine: GameEngine,
    cooldown: CooldownGate,
    gate: Arc<dyn SubscriptionGate>,
    /// Game draws; taken under the player's account lock.
    rng: Mutex<ChaCha20Rng>,
}

impl std::fmt::Debug for Economy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Economy")
            .field("ledger", &self.ledger)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl Economy {
    /// Creates an empty economy writing to `journal`.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` if the config fails validation.
    pub fn new(
        config: EconomyConfig,
        journal: Arc<dyn Journal>,
        gate: Arc<dyn SubscriptionGate>,
    ) -> EconomyResult<Self> {
        config.validate()?;

        Ok(Self {
            ledger: Ledger::new(journal),
            referrals: ReferralGraph::new(config.referral.clone(), config.click.referral_income_bp),
            withdrawals: WithdrawalDesk::new(config.withdrawal.clone()),
            engine: GameEngine::new(config.games.clone()),
            cooldown: CooldownGate::new(config.click.cooldown_secs),
            gate,
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
            config,
        })
    }

    /// Creates an empty economy backed by a [`MemoryJournal`].
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` if the config fails validation.
    pub fn in_memory(
        config: EconomyConfig,
        gate: Arc<dyn SubscriptionGate>,
    ) -> EconomyResult<Self> {
        Self::new(config, Arc::new(MemoryJournal::new()), gate)
    }

    /// Opens (or creates) a journal file and rebuilds the economy from it.
    ///
    /// # Errors
    ///
    /// Returns config, journal I/O or `EconomyError::CorruptJournal` errors.
    pub fn open(
        path: impl AsRef<Path>,
        config: EconomyConfig,
        gate: Arc<dyn SubscriptionGate>,
    ) -> EconomyResult<(Self, Recovery)> {
        let (wal, recovery) = WriteAheadLog::open(path, config.journal.sync_on_commit)?;
        let economy = Self::new(config, Arc::new(wal), gate)?;
        economy.replay(&recovery.entries)?;

        info!(
            units = recovery.committed_units,
            accounts = economy.ledger.account_count(),
            "economy restored from journal"
        );
        Ok((economy, recovery))
    }

    /// Rebuilds an economy from a journal file without writing to it.
    ///
    /// The file is read through [`WriteAheadLog::inspect`], so it may be held
    /// by a live writer. The returned economy records into memory only.
    ///
    /// # Errors
    ///
    /// Returns config, journal I/O or `EconomyError::CorruptJournal` errors.
    pub fn inspect(
        path: impl AsRef<Path>,
        config: EconomyConfig,
        gate: Arc<dyn SubscriptionGate>,
    ) -> EconomyResult<(Self, Recovery)> {
        let recovery = WriteAheadLog::inspect(path)?;
        let economy = Self::in_memory(config, gate)?;
        economy.replay(&recovery.entries)?;
        Ok((economy, recovery))
    }

    /// Reseeds game randomness for reproducible runs.
    #[must_use]
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *self.rng.lock() = ChaCha20Rng::seed_from_u64(seed);
        self
    }

    /// Re-applies committed entries to an empty economy.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::CorruptJournal` on the first entry that cannot apply.
    pub fn replay(&self, entries: &[JournalEntry]) -> EconomyResult<()> {
        for entry in entries {
            self.ledger.restore(entry)?;
            self.referrals.restore(entry)?;
            self.withdrawals.restore(entry)?;
        }
        Ok(())
    }

    fn require_eligible(&self, account: AccountId) -> EconomyResult<()> {
        if self.gate.is_eligible(account) {
            Ok(())
        } else {
            Err(EconomyError::NotEligible(account))
        }
    }

    // ------------------------------------------------------------------------
    // Player operations
    // ------------------------------------------------------------------------

    /// Creates the account on first contact. Returns `false` if it existed.
    ///
    /// # Errors
    ///
    /// Returns a journal error.
    pub fn register_account(
        &self,
        account: AccountId,
        display_name: &str,
        now: Timestamp,
    ) -> EconomyResult<bool> {
        self.ledger.open_account(account, display_name, now)
    }

    /// Claims the timed click reward and pays the referrer its share.
    ///
    /// The cooldown stamp and the reward are one unit; the referrer's income
    /// is a separate unit and a failure there does not undo the click.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotEligible`, `EconomyError::AccountNotFound`,
    /// `EconomyError::CooldownActive` or a journal error.
    pub fn claim_click(&self, account: AccountId, now: Timestamp) -> EconomyResult<ClickReward> {
        self.require_eligible(account)?;
        let display_name = self.ledger.account(account)?.display_name;
        let reward = self.config.click.reward;

        let new_balance = self.ledger.transact(account, now, |tx| {
            self.cooldown.stage(tx)?;
            tx.post(reward.credit()?, TxCategory::Click, "Click")
        })?;

        let referrer_income = self
            .referrals
            .credit_click_income(&self.ledger, account, &display_name, reward, now)
            .unwrap_or_else(|e| {
                warn!(account, error = %e, "click income not paid");
                None
            });

        debug!(account, reward = %reward, balance = %new_balance, "click claimed");
        Ok(ClickReward { reward, new_balance, referrer_income })
    }

    /// Plays one round of `game` ("flip", "crash" or "slot").
    ///
    /// The roll and the ledger posting happen under the account lock, so the
    /// reported outcome always matches the recorded balance.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::UnknownGame`, `EconomyError::InvalidWager`,
    /// `EconomyError::AccountNotFound`, `EconomyError::InsufficientFunds` or
    /// a journal error. On any error the balance is unchanged.
    pub fn play(
        &self,
        account: AccountId,
        game: &str,
        wager: Amount,
        now: Timestamp,
    ) -> EconomyResult<PlayResult> {
        let game: GameKind = game.parse()?;
        if wager.is_zero() {
            return Err(EconomyError::InvalidWager(wager));
        }

        let result = self.ledger.transact(account, now, |tx| {
            if wager > tx.balance() {
                return Err(EconomyError::InsufficientFunds {
                    required: wager,
                    available: tx.balance(),
                });
            }

            let outcome = self.engine.play(game, wager, &mut *self.rng.lock())?;
            let (delta, category) = outcome.posting(wager)?;
            let new_balance = tx.post(delta, category, outcome.note())?;

            Ok(PlayResult {
                game,
                win: outcome.win,
                multiplier: outcome.multiplier,
                payout: outcome.payout,
                new_balance,
            })
        })?;

        debug!(account, game = %game, win = result.win, wager = %wager, "round played");
        Ok(result)
    }

    /// Links `account` to `referrer` and pays the signup bonus once.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for either side,
    /// `EconomyError::SelfReferral`, `EconomyError::NotEligible` for the
    /// referee, `EconomyError::AlreadyLinked` (nothing paid) or a journal error.
    pub fn register_referral(
        &self,
        account: AccountId,
        referrer: AccountId,
        now: Timestamp,
    ) -> EconomyResult<()> {
        if !self.ledger.contains(account) {
            return Err(EconomyError::AccountNotFound(account));
        }
        if account == referrer {
            return Err(EconomyError::SelfReferral(account));
        }
        if !self.ledger.contains(referrer) {
            return Err(EconomyError::AccountNotFound(referrer));
        }
        self.require_eligible(account)?;

        self.referrals.link(&self.ledger, account, referrer, now)?;
        self.referrals.grant_signup_bonus(&self.ledger, account, referrer, now)
    }

    /// Total and active referrals of an account.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for an unknown account.
    pub fn referral_stats(&self, account: AccountId) -> EconomyResult<ReferralCounts> {
        if !self.ledger.contains(account) {
            return Err(EconomyError::AccountNotFound(account));
        }
        Ok(self.referrals.counts(account, self.gate.as_ref()))
    }

    /// Balance, referrals and click readiness in one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for an unknown account.
    pub fn profile(&self, account: AccountId, now: Timestamp) -> EconomyResult<AccountProfile> {
        let snapshot = self.ledger.account(account)?;
        let next_click_in_secs = self.cooldown.remaining(snapshot.last_click, now);
        Ok(AccountProfile {
            referrer: self.referrals.referrer_of(account),
            referrals: self.referrals.counts(account, self.gate.as_ref()),
            next_click_in_secs,
            account: snapshot,
        })
    }

    /// The account's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for an unknown account.
    pub fn history(&self, account: AccountId) -> EconomyResult<Vec<Transaction>> {
        self.ledger.history(account)
    }

    /// Current balance.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for an unknown account.
    pub fn balance(&self, account: AccountId) -> EconomyResult<Amount> {
        self.ledger.get_balance(account)
    }

    /// Requests a withdrawal; the amount is debited immediately.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotEligible`, then in order
    /// `EconomyError::InvalidAmount`, `EconomyError::InsufficientFunds`,
    /// `EconomyError::ReferralThresholdNotMet`, or a journal error.
    pub fn request_withdrawal(
        &self,
        account: AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> EconomyResult<WithdrawalRequest> {
        self.require_eligible(account)?;
        let active = self.referrals.counts(account, self.gate.as_ref()).active;
        self.withdrawals.request(&self.ledger, account, amount, active, now)
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    /// All accounts, newest first.
    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        self.ledger.accounts()
    }

    /// Withdrawal requests, newest first, optionally filtered by status.
    #[must_use]
    pub fn list_withdrawals(&self, status: Option<WithdrawalStatus>) -> Vec<WithdrawalRequest> {
        self.withdrawals.list(status)
    }

    /// One withdrawal request.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::WithdrawalNotFound` for an unknown id.
    pub fn withdrawal(&self, id: WithdrawalId) -> EconomyResult<WithdrawalRequest> {
        self.withdrawals.get(id)
    }

    /// Approves or rejects a pending request.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::WithdrawalNotFound`,
    /// `EconomyError::InvalidStatusTransition` or a journal error.
    pub fn set_withdrawal_status(
        &self,
        id: WithdrawalId,
        status: WithdrawalStatus,
        now: Timestamp,
    ) -> EconomyResult<WithdrawalRequest> {
        self.withdrawals.set_status(&self.ledger, id, status, now)
    }

    /// Admin aggregates.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if a total does not fit.
    pub fn stats(&self) -> EconomyResult<EconomyStats> {
        Ok(EconomyStats {
            total_users: self.ledger.account_count() as u64,
            total_balance: self.ledger.total_balance()?,
            total_income: self
                .ledger
                .category_total(&[TxCategory::Click, TxCategory::GameLose])?,
        })
    }

    /// Accounts whose transactions do not sum to their balance. Empty when healthy.
    #[must_use]
    pub fn audit(&self) -> Vec<AuditDiscrepancy> {
        self.ledger.audit()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// The ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The referral graph.
    #[must_use]
    pub const fn referrals(&self) -> &ReferralGraph {
        &self.referrals
    }

    /// The game engine.
    #[must_use]
    pub const fn engine(&self) -> &GameEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{AllowAll, EligibilitySet};

    fn economy() -> Economy {
        Economy::in_memory(EconomyConfig::default(), Arc::new(AllowAll))
            .unwrap()
            .with_rng_seed(7)
    }

    #[test]
    fn test_click_flow() {
        let eco = economy();
        eco.register_account(1, "alice", 0).unwrap();

        let click = eco.claim_click(1, 100).unwrap();
        assert_eq!(click.reward, Amount::from_parts(0, 200_000));
        assert_eq!(click.new_balance, click.reward);
        assert_eq!(click.referrer_income, None);

        assert_eq!(
            eco.claim_click(1, 200),
            Err(EconomyError::CooldownActive { remaining_secs: 3500 })
        );
        assert_eq!(eco.profile(1, 200).unwrap().next_click_in_secs, 3500);
        assert!(eco.claim_click(1, 3700).is_ok());
    }

    #[test]
    fn test_click_requires_eligibility() {
        let gate = Arc::new(EligibilitySet::new());
        let eco = Economy::in_memory(EconomyConfig::default(), gate.clone()).unwrap();
        eco.register_account(1, "alice", 0).unwrap();
        assert_eq!(eco.claim_click(1, 0), Err(EconomyError::NotEligible(1)));

        gate.set_eligible(1, true);
        assert!(eco.claim_click(1, 0).is_ok());
    }

    #[test]
    fn test_play_rejections_leave_balance() {
        let eco = economy();
        eco.register_account(1, "alice", 0).unwrap();
        eco.claim_click(1, 0).unwrap();

        assert_eq!(
            eco.play(1, "poker", Amount::ONE, 1),
            Err(EconomyError::UnknownGame("poker".to_string()))
        );
        assert_eq!(
            eco.play(1, "flip", Amount::ZERO, 1),
            Err(EconomyError::InvalidWager(Amount::ZERO))
        );
        assert!(matches!(
            eco.play(1, "slot", Amount::ONE, 1),
            Err(EconomyError::InsufficientFunds { .. })
        ));
        assert_eq!(eco.balance(1).unwrap(), Amount::from_parts(0, 200_000));
        assert_eq!(eco.history(1).unwrap().len(), 1);
    }

    #[test]
    fn test_play_posts_net_result() {
        let eco = economy();
        eco.register_account(1, "alice", 0).unwrap();
        eco.register_account(2, "bob", 0).unwrap();
        eco.register_referral(2, 1, 0).unwrap();

        let wager = Amount::from_parts(0, 500_000);
        for round in 0..50 {
            let before = eco.balance(1).unwrap();
            let Ok(result) = eco.play(1, "flip", wager, round) else {
                break;
            };
            let row = &eco.history(1).unwrap()[0];
            if result.win {
                assert_eq!(row.category, TxCategory::GameWin);
                assert_eq!(row.note, "Win in flip: x2.00");
                assert_eq!(result.payout, Amount::ONE);
            } else {
                assert_eq!(row.category, TxCategory::GameLose);
                assert_eq!(row.amount, wager.debit().unwrap());
            }
            assert_eq!(before.checked_apply(row.amount), Some(result.new_balance));
        }
        assert!(eco.audit().is_empty());
    }

    #[test]
    fn test_referral_requires_both_accounts() {
        let eco = economy();
        eco.register_account(1, "alice", 0).unwrap();
        assert_eq!(eco.register_referral(1, 9, 0), Err(EconomyError::AccountNotFound(9)));
        assert_eq!(eco.register_referral(9, 1, 0), Err(EconomyError::AccountNotFound(9)));
        assert_eq!(eco.register_referral(1, 1, 0), Err(EconomyError::SelfReferral(1)));
    }

    #[test]
    fn test_stats_income() {
        let eco = economy();
        eco.register_account(1, "alice", 0).unwrap();
        eco.register_account(2, "bob", 10).unwrap();
        eco.register_referral(2, 1, 10).unwrap();
        eco.claim_click(2, 20).unwrap();

        let stats = eco.stats().unwrap();
        assert_eq!(stats.total_users, 2);
        // 3 + 2 bonus, 0.2 click, 0.02 referral income
        assert_eq!(stats.total_balance, Amount::from_parts(5, 220_000));
        assert_eq!(stats.total_income, Amount::from_parts(0, 200_000).credit().unwrap());

        let accounts = eco.accounts();
        assert_eq!(accounts[0].id, 2);
    }
}
