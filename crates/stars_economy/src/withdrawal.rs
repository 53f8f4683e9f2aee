//! # Withdrawal Workflow
//!
//! ```text
//! request ──> Pending ──(admin approves)──> Approved
//!                │
//!                └──────(admin rejects)───> Rejected
//! ```
//!
//! Funds leave the balance when the request is created: the debit and the
//! pending request are one journal unit. Approval moves no money. Rejection
//! refunds only when `refund_on_reject` is set.
//!
//! Every change to a request runs under its account's lock, then takes the
//! book lock. Nothing takes them in the other order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::info;

use crate::config::WithdrawalConfig;
use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::Amount;
use crate::journal::JournalEntry;
use crate::ledger::{AccountId, Ledger, Timestamp, TxCategory};

/// Withdrawal request identifier.
pub type WithdrawalId = u64;

/// Request status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WithdrawalStatus {
    /// Awaiting an admin decision.
    Pending = 1,
    /// Paid out (terminal).
    Approved = 2,
    /// Declined (terminal).
    Rejected = 3,
}

impl WithdrawalStatus {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Returns true once no further transition is allowed.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Journal tag.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a journal tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Pending),
            2 => Some(Self::Approved),
            3 => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A withdrawal request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalRequest {
    /// Identifier.
    pub id: WithdrawalId,
    /// Requesting account.
    pub account: AccountId,
    /// Amount debited at creation.
    pub amount: Amount,
    /// Current status.
    pub status: WithdrawalStatus,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the terminal transition, if any.
    pub decided_at: Option<Timestamp>,
}

/// The book of withdrawal requests.
#[derive(Debug)]
pub struct WithdrawalDesk {
    config: WithdrawalConfig,
    requests: RwLock<BTreeMap<WithdrawalId, WithdrawalRequest>>,
    next_id: AtomicU64,
}

impl WithdrawalDesk {
    /// Creates an empty book.
    #[must_use]
    pub fn new(config: WithdrawalConfig) -> Self {
        Self {
            config,
            requests: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Validates a request and, if it passes, debits the amount and records
    /// a pending request in one unit.
    ///
    /// Checks run in order: amount, balance, active referrals.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidAmount`, `EconomyError::InsufficientFunds`,
    /// `EconomyError::ReferralThresholdNotMet`, `EconomyError::AccountNotFound`
    /// or a journal error; in every case nothing is changed.
    pub fn request(
        &self,
        ledger: &Ledger,
        account: AccountId,
        amount: Amount,
        active_referrals: u32,
        now: Timestamp,
    ) -> EconomyResult<WithdrawalRequest> {
        let allowed = &self.config.allowed_amounts;
        if amount.is_zero() || (!allowed.is_empty() && !allowed.contains(&amount)) {
            return Err(EconomyError::InvalidAmount(amount));
        }

        let request = ledger.transact(account, now, |tx| {
            if amount > tx.balance() {
                return Err(EconomyError::InsufficientFunds {
                    required: amount,
                    available: tx.balance(),
                });
            }
            let required = self.config.min_active_referrals;
            if active_referrals < required {
                return Err(EconomyError::ReferralThresholdNotMet {
                    active: active_referrals,
                    required,
                });
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            tx.post(amount.debit()?, TxCategory::Withdrawal, format!("Withdrawal #{id}"))?;
            tx.record(JournalEntry::WithdrawalOpened { id, account, amount, at: now });

            let request = WithdrawalRequest {
                id,
                account,
                amount,
                status: WithdrawalStatus::Pending,
                created_at: now,
                decided_at: None,
            };
            let stored = request.clone();
            tx.after_commit(move || {
                self.requests.write().insert(stored.id, stored);
            });
            Ok(request)
        })?;

        info!(id = request.id, account, amount = %amount, "withdrawal requested");
        Ok(request)
    }

    /// Moves a pending request to `Approved` or `Rejected`.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::WithdrawalNotFound`,
    /// `EconomyError::InvalidStatusTransition` if the request is not pending
    /// or `status` is `Pending`, or a journal error.
    pub fn set_status(
        &self,
        ledger: &Ledger,
        id: WithdrawalId,
        status: WithdrawalStatus,
        now: Timestamp,
    ) -> EconomyResult<WithdrawalRequest> {
        let account = self.get(id)?.account;

        let updated = ledger.transact(account, now, |tx| {
            // Re-read under the account lock; a concurrent decision may have landed.
            let current = self.get(id)?;
            if current.status.is_terminal() || !status.is_terminal() {
                return Err(EconomyError::InvalidStatusTransition {
                    id,
                    from: current.status,
                    to: status,
                });
            }

            if status == WithdrawalStatus::Rejected && self.config.refund_on_reject {
                tx.post(
                    current.amount.credit()?,
                    TxCategory::Withdrawal,
                    format!("Refund for withdrawal #{id}"),
                )?;
            }
            tx.record(JournalEntry::WithdrawalStatusSet { id, status, at: now });

            let updated = WithdrawalRequest {
                status,
                decided_at: Some(now),
                ..current
            };
            let stored = updated.clone();
            tx.after_commit(move || {
                self.requests.write().insert(id, stored);
            });
            Ok(updated)
        })?;

        info!(id, account, status = %status, "withdrawal decided");
        Ok(updated)
    }

    /// One request.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::WithdrawalNotFound` for an unknown id.
    pub fn get(&self, id: WithdrawalId) -> EconomyResult<WithdrawalRequest> {
        self.requests
            .read()
            .get(&id)
            .cloned()
            .ok_or(EconomyError::WithdrawalNotFound(id))
    }

    /// Requests, newest first, optionally filtered by status.
    #[must_use]
    pub fn list(&self, status: Option<WithdrawalStatus>) -> Vec<WithdrawalRequest> {
        let mut found: Vec<WithdrawalRequest> = self
            .requests
            .read()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        found
    }

    /// Re-applies a committed withdrawal entry during replay. Other entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::CorruptJournal` if the entry cannot apply.
    pub fn restore(&self, entry: &JournalEntry) -> EconomyResult<()> {
        match entry {
            JournalEntry::WithdrawalOpened { id, account, amount, at } => {
                let mut requests = self.requests.write();
                if requests.contains_key(id) {
                    return Err(EconomyError::CorruptJournal(format!(
                        "withdrawal {id} opened twice"
                    )));
                }
                requests.insert(
                    *id,
                    WithdrawalRequest {
                        id: *id,
                        account: *account,
                        amount: *amount,
                        status: WithdrawalStatus::Pending,
                        created_at: *at,
                        decided_at: None,
                    },
                );
                self.next_id.fetch_max(id + 1, Ordering::Relaxed);
            }
            JournalEntry::WithdrawalStatusSet { id, status, at } => {
                let mut requests = self.requests.write();
                let request = requests
                    .get_mut(id)
                    .filter(|r| !r.status.is_terminal())
                    .ok_or_else(|| {
                        EconomyError::CorruptJournal(format!(
                            "withdrawal {id} cannot become {status}"
                        ))
                    })?;
                request.status = *status;
                request.decided_at = Some(*at);
            }
            _ => {}
        }
        Ok(())
    }
}
