//! # Economy Error Types
//!
//! All errors that can occur in the economy engine.
//!
//! Business rejections (`InsufficientFunds`, `CooldownActive`, ...) are raised
//! before anything is mutated. Journal failures abort the unit of work they
//! happen in, so neither kind ever leaves a balance without its transaction.

use thiserror::Error;

use crate::fixed_point::Amount;
use crate::ledger::AccountId;
use crate::withdrawal::{WithdrawalId, WithdrawalStatus};

/// Errors that can occur in the economy engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Attempted debit exceeds the current balance.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// The amount the operation needed.
        required: Amount,
        /// The balance at the time of the attempt.
        available: Amount,
    },

    /// A click was attempted before the cooldown elapsed.
    #[error("cooldown active: {remaining_secs}s remaining")]
    CooldownActive {
        /// Seconds until the next claim is allowed.
        remaining_secs: u64,
    },

    /// Withdrawal blocked by the active-referral requirement.
    #[error("referral threshold not met: {active} active, {required} required")]
    ReferralThresholdNotMet {
        /// Active referrals the account currently has.
        active: u32,
        /// Active referrals required.
        required: u32,
    },

    /// The referee already has a referrer; links are never overwritten.
    #[error("account {referee} is already linked to referrer {referrer}")]
    AlreadyLinked {
        /// The account that tried to register again.
        referee: AccountId,
        /// The referrer it is already linked to.
        referrer: AccountId,
    },

    /// An account tried to refer itself.
    #[error("account {0} cannot refer itself")]
    SelfReferral(AccountId),

    /// No account with this identifier has been registered.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// The subscription gate rejected the account.
    #[error("account {0} is not eligible to act")]
    NotEligible(AccountId),

    /// Game identifier not recognised.
    #[error("unknown game: {0}")]
    UnknownGame(String),

    /// Wager must be strictly positive.
    #[error("invalid wager: {0}")]
    InvalidWager(Amount),

    /// Withdrawal amount is zero or not one of the allowed amounts.
    #[error("invalid withdrawal amount: {0}")]
    InvalidAmount(Amount),

    /// No withdrawal request with this identifier.
    #[error("withdrawal not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    /// Withdrawal status can only move from pending to a terminal state.
    #[error("withdrawal {id}: cannot move from {from} to {to}")]
    InvalidStatusTransition {
        /// The withdrawal request.
        id: WithdrawalId,
        /// Its current status.
        from: WithdrawalStatus,
        /// The requested status.
        to: WithdrawalStatus,
    },

    /// Arithmetic overflow in fixed-point calculation.
    #[error("arithmetic overflow in economic calculation")]
    ArithmeticOverflow,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The journal could not be written or read.
    #[error("journal I/O failed: {0}")]
    Journal(String),

    /// Replay found a record that cannot apply to the rebuilt state.
    #[error("corrupt journal: {0}")]
    CorruptJournal(String),
}

impl EconomyError {
    /// Returns true for business-rule rejections that leave state untouched
    /// and should be shown to the user; false for storage and config faults.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::ArithmeticOverflow
                | Self::InvalidConfig(_)
                | Self::Journal(_)
                | Self::CorruptJournal(_)
        )
    }
}

impl From<std::io::Error> for EconomyError {
    fn from(e: std::io::Error) -> Self {
        Self::Journal(e.to_string())
    }
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;
