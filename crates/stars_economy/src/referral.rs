//! # Referral Graph
//!
//! Referee -> referrer links, set at most once and never overwritten.
//!
//! Two payouts hang off the graph:
//! - **Signup bonus**: paid once, right after a successful [`ReferralGraph::link`]
//! - **Click income**: a share of every click the referee claims, paid to the referrer
//!
//! Each payout leg is its own ledger unit; the pair is not atomic.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::ReferralConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::Amount;
use crate::journal::JournalEntry;
use crate::ledger::{AccountId, Ledger, Timestamp, TxCategory};
use crate::subscription::SubscriptionGate;

/// Referral counts for one account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReferralCounts {
    /// Every referee ever linked.
    pub total: u32,
    /// Referees the subscription gate currently accepts.
    pub active: u32,
}

#[derive(Debug, Default)]
struct Links {
    referrer_of: HashMap<AccountId, AccountId>,
    /// Referees per referrer, in link order.
    referees: HashMap<AccountId, Vec<AccountId>>,
}

impl Links {
    fn insert(&mut self, referee: AccountId, referrer: AccountId) {
        self.referrer_of.insert(referee, referrer);
        self.referees.entry(referrer).or_default().push(referee);
    }
}

/// Referral links and the payouts they drive.
#[derive(Debug)]
pub struct ReferralGraph {
    rewards: ReferralConfig,
    click_income_bp: u32,
    links: RwLock<Links>,
}

impl ReferralGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(rewards: ReferralConfig, click_income_bp: u32) -> Self {
        Self {
            rewards,
            click_income_bp,
            links: RwLock::new(Links::default()),
        }
    }

    /// Links `referee` to `referrer`.
    ///
    /// The check and the link run under the referee's account lock, so two
    /// concurrent registrations of one referee cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::SelfReferral`, `EconomyError::AlreadyLinked`
    /// (existing link kept), `EconomyError::AccountNotFound` for an unknown
    /// referee, or a journal error.
    pub fn link(
        &self,
        ledger: &Ledger,
        referee: AccountId,
        referrer: AccountId,
        now: Timestamp,
    ) -> EconomyResult<()> {
        if referee == referrer {
            return Err(EconomyError::SelfReferral(referee));
        }

        ledger.transact(referee, now, |tx| {
            if let Some(existing) = self.referrer_of(referee) {
                return Err(EconomyError::AlreadyLinked { referee, referrer: existing });
            }
            tx.record(JournalEntry::ReferralLinked { referee, referrer, at: now });
            tx.after_commit(|| self.links.write().insert(referee, referrer));
            Ok(())
        })?;

        info!(referee, referrer, "referral linked");
        Ok(())
    }

    /// Pays the one-time signup bonus to both sides of a fresh link.
    ///
    /// # Errors
    ///
    /// Returns the first ledger error; a referrer leg already paid stays paid.
    pub fn grant_signup_bonus(
        &self,
        ledger: &Ledger,
        referee: AccountId,
        referrer: AccountId,
        now: Timestamp,
    ) -> EconomyResult<()> {
        let referee_name = ledger.account(referee)?.display_name;

        ledger.apply_delta(
            referrer,
            self.rewards.referrer_reward.credit()?,
            TxCategory::ReferralBonus,
            &format!("For inviting {referee_name}"),
            now,
        )?;
        ledger.apply_delta(
            referee,
            self.rewards.referee_reward.credit()?,
            TxCategory::ReferralBonus,
            "For joining via referral link",
            now,
        )?;
        Ok(())
    }

    /// Credits the clicker's referrer its share of `reward`.
    ///
    /// Returns the referrer and the amount paid, or `None` when there is no
    /// referrer or the share rounds to zero.
    ///
    /// # Errors
    ///
    /// Returns a ledger error other than a missing referrer account.
    pub fn credit_click_income(
        &self,
        ledger: &Ledger,
        clicker: AccountId,
        clicker_name: &str,
        reward: Amount,
        now: Timestamp,
    ) -> EconomyResult<Option<(AccountId, Amount)>> {
        let Some(referrer) = self.referrer_of(clicker) else {
            return Ok(None);
        };
        let income = reward.mul_percent_bp(self.click_income_bp);
        if income.is_zero() {
            return Ok(None);
        }

        let note = format!("{} of click by {clicker_name}", percent_label(self.click_income_bp));
        let credit = income.credit()?;
        match ledger.apply_delta(referrer, credit, TxCategory::ReferralIncome, &note, now) {
            Ok(_) => Ok(Some((referrer, income))),
            Err(EconomyError::AccountNotFound(_)) => {
                warn!(clicker, referrer, "referrer missing, click income skipped");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// The account's referrer, if linked.
    #[must_use]
    pub fn referrer_of(&self, account: AccountId) -> Option<AccountId> {
        self.links.read().referrer_of.get(&account).copied()
    }

    /// Everyone the account referred, in link order.
    #[must_use]
    pub fn referees(&self, account: AccountId) -> Vec<AccountId> {
        self.links.read().referees.get(&account).cloned().unwrap_or_default()
    }

    /// Total and active referral counts.
    #[must_use]
    pub fn counts(&self, account: AccountId, gate: &dyn SubscriptionGate) -> ReferralCounts {
        let links = self.links.read();
        let Some(referees) = links.referees.get(&account) else {
            return ReferralCounts::default();
        };
        let active = referees.iter().filter(|&&r| gate.is_eligible(r)).count();
        ReferralCounts {
            total: saturating_u32(referees.len()),
            active: saturating_u32(active),
        }
    }

    /// Re-applies a committed link during replay. Other entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::CorruptJournal` if the referee is already linked.
    pub fn restore(&self, entry: &JournalEntry) -> EconomyResult<()> {
        if let JournalEntry::ReferralLinked { referee, referrer, .. } = entry {
            let mut links = self.links.write();
            if links.referrer_of.contains_key(referee) {
                return Err(EconomyError::CorruptJournal(format!(
                    "account {referee} linked twice"
                )));
            }
            links.insert(*referee, *referrer);
        }
        Ok(())
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn percent_label(bp: u32) -> String {
    if bp % 100 == 0 {
        format!("{}%", bp / 100)
    } else {
        format!("{}.{:02}%", bp / 100, bp % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryJournal;
    use crate::subscription::{AllowAll, EligibilitySet};
    use std::sync::Arc;

    fn setup() -> (Ledger, ReferralGraph) {
        let ledger = Ledger::new(Arc::new(MemoryJournal::new()));
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            ledger.open_account(id, name, 0).unwrap();
        }
        (ledger, ReferralGraph::new(ReferralConfig::default(), 1000))
    }

    #[test]
    fn test_link_once() {
        let (ledger, graph) = setup();
        graph.link(&ledger, 2, 1, 5).unwrap();
        assert_eq!(graph.referrer_of(2), Some(1));

        let err = graph.link(&ledger, 2, 3, 6).unwrap_err();
        assert_eq!(err, EconomyError::AlreadyLinked { referee: 2, referrer: 1 });
        assert_eq!(graph.referrer_of(2), Some(1));
        assert_eq!(graph.referees(3), Vec::<AccountId>::new());
    }

    #[test]
    fn test_self_referral_rejected() {
        let (ledger, graph) = setup();
        assert_eq!(graph.link(&ledger, 1, 1, 0), Err(EconomyError::SelfReferral(1)));
    }

    #[test]
    fn test_signup_bonus() {
        let (ledger, graph) = setup();
        graph.link(&ledger, 2, 1, 5).unwrap();
        graph.grant_signup_bonus(&ledger, 2, 1, 5).unwrap();
        assert_eq!(ledger.get_balance(1).unwrap(), Amount::from_whole(3));
        assert_eq!(ledger.get_balance(2).unwrap(), Amount::from_whole(2));
        assert_eq!(ledger.history(1).unwrap()[0].note, "For inviting bob");
    }

    #[test]
    fn test_click_income() {
        let (ledger, graph) = setup();
        graph.link(&ledger, 2, 1, 0).unwrap();
        let paid = graph
            .credit_click_income(&ledger, 2, "bob", Amount::from_parts(0, 200_000), 10)
            .unwrap();
        assert_eq!(paid, Some((1, Amount::from_parts(0, 20_000))));

        let row = &ledger.history(1).unwrap()[0];
        assert_eq!(row.category, TxCategory::ReferralIncome);
        assert_eq!(row.note, "10% of click by bob");

        let none = graph.credit_click_income(&ledger, 3, "carol", Amount::ONE, 10).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_counts_follow_gate() {
        let (ledger, graph) = setup();
        graph.link(&ledger, 2, 1, 0).unwrap();
        graph.link(&ledger, 3, 1, 0).unwrap();

        let gate = EligibilitySet::new();
        gate.set_eligible(3, true);
        assert_eq!(graph.counts(1, &gate), ReferralCounts { total: 2, active: 1 });
        assert_eq!(graph.counts(1, &AllowAll), ReferralCounts { total: 2, active: 2 });
        assert_eq!(graph.counts(2, &AllowAll), ReferralCounts::default());
    }

    #[test]
    fn test_percent_label() {
        assert_eq!(percent_label(1000), "10%");
        assert_eq!(percent_label(1250), "12.50%");
    }
}
