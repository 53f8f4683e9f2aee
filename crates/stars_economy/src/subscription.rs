//! Subscription gate: the external "may this account act" predicate.
//!
//! Sponsor-channel membership is checked outside the engine; the engine only
//! asks [`SubscriptionGate::is_eligible`]. Active referrals are the referees
//! for which it returns true.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::ledger::AccountId;

/// Eligibility predicate supplied by the embedding service.
pub trait SubscriptionGate: Send + Sync {
    /// Returns true if the account currently satisfies the subscription requirement.
    fn is_eligible(&self, account: AccountId) -> bool;
}

/// Every account is eligible.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl SubscriptionGate for AllowAll {
    fn is_eligible(&self, _account: AccountId) -> bool {
        true
    }
}

/// Thread-safe set of eligible accounts, updated as subscription checks come in.
#[derive(Debug, Default)]
pub struct EligibilitySet {
    eligible: RwLock<HashSet<AccountId>>,
}

impl EligibilitySet {
    /// Creates an empty set; nobody is eligible.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the account eligible or not.
    pub fn set_eligible(&self, account: AccountId, eligible: bool) {
        let mut set = self.eligible.write();
        if eligible {
            set.insert(account);
        } else {
            set.remove(&account);
        }
    }

    /// Number of eligible accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.eligible.read().len()
    }

    /// Returns true if nobody is eligible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.eligible.read().is_empty()
    }
}

impl SubscriptionGate for EligibilitySet {
    fn is_eligible(&self, account: AccountId) -> bool {
        self.eligible.read().contains(&account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_toggles() {
        let gate = EligibilitySet::new();
        assert!(!gate.is_eligible(1));
        gate.set_eligible(1, true);
        assert!(gate.is_eligible(1));
        assert_eq!(gate.len(), 1);
        gate.set_eligible(1, false);
        assert!(!gate.is_eligible(1));
        assert!(gate.is_empty());
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.is_eligible(u64::MAX));
    }
}
