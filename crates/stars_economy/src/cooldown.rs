//! # Cooldown Gate
//!
//! Rate limit for the click reward. The last-click stamp lives on the
//! account, so check-and-stamp runs under the account's write lock and two
//! concurrent claims inside one window cannot both pass.

use crate::error::{EconomyError, EconomyResult};
use crate::ledger::{AccountId, AccountTx, Ledger, Timestamp};

/// Minimum spacing between two claims of a timed reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownGate {
    cooldown_secs: u64,
}

impl CooldownGate {
    /// Creates a gate with the given window.
    #[inline]
    #[must_use]
    pub const fn new(cooldown_secs: u64) -> Self {
        Self { cooldown_secs }
    }

    /// Seconds until the next claim is allowed; 0 when ready.
    ///
    /// A clock that went backwards counts as no time elapsed.
    #[must_use]
    pub const fn remaining(&self, last_click: Option<Timestamp>, now: Timestamp) -> u64 {
        match last_click {
            None => 0,
            Some(last) => self.cooldown_secs.saturating_sub(now.saturating_sub(last)),
        }
    }

    /// Checks the window without stamping.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::CooldownActive` with the remaining wait.
    pub fn check(&self, last_click: Option<Timestamp>, now: Timestamp) -> EconomyResult<()> {
        match self.remaining(last_click, now) {
            0 => Ok(()),
            remaining_secs => Err(EconomyError::CooldownActive { remaining_secs }),
        }
    }

    /// Checks the window and stages `now` as the new stamp, as part of a
    /// larger unit of work.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::CooldownActive` with the remaining wait.
    pub fn stage(&self, tx: &mut AccountTx<'_>) -> EconomyResult<()> {
        self.check(tx.last_click(), tx.now())?;
        tx.stamp_click();
        Ok(())
    }

    /// Atomically checks the window and records `now` as the last claim.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::CooldownActive` (nothing recorded),
    /// `EconomyError::AccountNotFound`, or a journal error.
    pub fn try_consume(
        &self,
        ledger: &Ledger,
        account: AccountId,
        now: Timestamp,
    ) -> EconomyResult<()> {
        ledger.transact(account, now, |tx| self.stage(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::MemoryJournal;
    use std::sync::Arc;

    #[test]
    fn test_first_claim_always_passes() {
        let gate = CooldownGate::new(3600);
        assert_eq!(gate.check(None, 0), Ok(()));
    }

    #[test]
    fn test_remaining_wait() {
        let gate = CooldownGate::new(3600);
        assert_eq!(
            gate.check(Some(1000), 1600),
            Err(EconomyError::CooldownActive { remaining_secs: 3000 })
        );
        assert_eq!(gate.check(Some(1000), 4600), Ok(()));
        assert_eq!(gate.remaining(Some(1000), 500), 3600);
    }

    #[test]
    fn test_try_consume_stamps_once() {
        let ledger = Ledger::new(Arc::new(MemoryJournal::new()));
        ledger.open_account(1, "a", 0).unwrap();
        let gate = CooldownGate::new(60);

        gate.try_consume(&ledger, 1, 100).unwrap();
        assert_eq!(ledger.account(1).unwrap().last_click, Some(100));

        let err = gate.try_consume(&ledger, 1, 130).unwrap_err();
        assert_eq!(err, EconomyError::CooldownActive { remaining_secs: 30 });
        assert_eq!(ledger.account(1).unwrap().last_click, Some(100));

        gate.try_consume(&ledger, 1, 160).unwrap();
        assert_eq!(ledger.account(1).unwrap().last_click, Some(160));
    }
}
