//! # Ledger
//!
//! **THE ONLY AUTHORITY ON BALANCES**
//!
//! Every balance change goes through [`Ledger::transact`]:
//!
//! ```text
//! lock account ──> stage changes ──> journal unit ──> install state
//!      │                │                 │                │
//!   (write)       (validate,        (all-or-nothing)   (balance +
//!                  never < 0)                          transactions)
//! ```
//!
//! Mutations of one account serialize on that account's lock; different
//! accounts proceed in parallel. If staging or the journal fails, memory is
//! untouched, so a balance never moves without its transaction row.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::{Amount, Delta};
use crate::journal::{Journal, JournalEntry};

/// Caller-supplied account identifier.
pub type AccountId = u64;

/// Unix time in seconds.
pub type Timestamp = u64;

/// Transaction category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TxCategory {
    /// Timed click reward.
    Click = 1,
    /// Net gain of a won game.
    GameWin = 2,
    /// Wager lost in a game.
    GameLose = 3,
    /// Signup bonus for either side of a referral link.
    ReferralBonus = 4,
    /// Share of a referee's click.
    ReferralIncome = 5,
    /// Funds reserved (or refunded) by a withdrawal request.
    Withdrawal = 6,
}

impl TxCategory {
    /// All categories.
    pub const ALL: [Self; 6] = [
        Self::Click,
        Self::GameWin,
        Self::GameLose,
        Self::ReferralBonus,
        Self::ReferralIncome,
        Self::Withdrawal,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::GameWin => "game_win",
            Self::GameLose => "game_lose",
            Self::ReferralBonus => "referral_bonus",
            Self::ReferralIncome => "referral_income",
            Self::Withdrawal => "withdrawal",
        }
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
            1 => Some(Self::Click),
            2 => Some(Self::GameWin),
            3 => Some(Self::GameLose),
            4 => Some(Self::ReferralBonus),
            5 => Some(Self::ReferralIncome),
            6 => Some(Self::Withdrawal),
            _ => None,
        }
    }
}

impl fmt::Display for TxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable row of the transaction log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Global sequence number, in journal order.
    pub id: u64,
    /// The account.
    pub account: AccountId,
    /// Signed amount.
    pub amount: Delta,
    /// Category.
    pub category: TxCategory,
    /// Free-text note.
    pub note: String,
    /// Posting time.
    pub created_at: Timestamp,
}

/// Snapshot of an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Identifier.
    pub id: AccountId,
    /// Display name given at first contact.
    pub display_name: String,
    /// Current balance.
    pub balance: Amount,
    /// Time of the last successful click.
    pub last_click: Option<Timestamp>,
    /// First contact time.
    pub created_at: Timestamp,
}

/// An account whose transactions do not sum to its balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditDiscrepancy {
    /// The account.
    pub account: AccountId,
    /// Stored balance.
    pub balance: Amount,
    /// Sum of its transactions, in micro-units.
    pub transaction_sum_micros: i128,
}

struct AccountState {
    account: Account,
    transactions: Vec<Transaction>,
}

type Hook<'a> = Box<dyn FnOnce() + 'a>;

/// Staged changes for one account, applied only if the journal accepts them.
pub struct AccountTx<'a> {
    now: Timestamp,
    staged: Account,
    entries: Vec<JournalEntry>,
    hooks: Vec<Hook<'a>>,
}

impl<'a> AccountTx<'a> {
    /// The account being changed.
    #[must_use]
    pub fn account(&self) -> AccountId {
        self.staged.id
    }

    /// Time of this unit of work.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Balance including changes staged so far.
    #[must_use]
    pub fn balance(&self) -> Amount {
        self.staged.balance
    }

    /// Last click time including changes staged so far.
    #[must_use]
    pub fn last_click(&self) -> Option<Timestamp> {
        self.staged.last_click
    }

    /// Stages a balance change and its transaction row.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InsufficientFunds` if the balance would go
    /// negative, `EconomyError::ArithmeticOverflow` if it would overflow.
    pub fn post(
        &mut self,
        amount: Delta,
        category: TxCategory,
        note: impl Into<String>,
    ) -> EconomyResult<Amount> {
        let balance = self.staged.balance.checked_apply(amount).ok_or_else(|| {
            if amount.is_negative() {
                EconomyError::InsufficientFunds {
                    required: amount.magnitude(),
                    available: self.staged.balance,
                }
            } else {
                EconomyError::ArithmeticOverflow
            }
        })?;

        self.staged.balance = balance;
        self.entries.push(JournalEntry::Posted {
            account: self.staged.id,
            amount,
            category,
            note: note.into(),
            at: self.now,
        });
        Ok(balance)
    }

    /// Stages `now` as the last click time.
    pub fn stamp_click(&mut self) {
        self.staged.last_click = Some(self.now);
        self.entries.push(JournalEntry::ClickStamped {
            account: self.staged.id,
            at: self.now,
        });
    }

    /// Adds a non-ledger entry to the same journal unit.
    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Runs `hook` after the unit commits, still under the account lock.
    pub fn after_commit(&mut self, hook: impl FnOnce() + 'a) {
        self.hooks.push(Box::new(hook));
    }
}

/// Account balances and their transaction log.
pub struct Ledger {
    journal: Arc<dyn Journal>,
    accounts: RwLock<HashMap<AccountId, Arc<RwLock<AccountState>>>>,
    /// Next transaction id; held across the journal write so ids follow journal order.
    next_tx_id: Mutex<u64>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("accounts", &self.accounts.read().len())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Creates an empty ledger writing to `journal`.
    #[must_use]
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            journal,
            accounts: RwLock::new(HashMap::new()),
            next_tx_id: Mutex::new(1),
        }
    }

    /// Creates the account on first contact. Returns `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::Journal` if the creation could not be recorded.
    pub fn open_account(
        &self,
        account: AccountId,
        display_name: &str,
        now: Timestamp,
    ) -> EconomyResult<bool> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account) {
            return Ok(false);
        }

        self.journal.commit(&[JournalEntry::AccountOpened {
            account,
            display_name: display_name.to_string(),
            at: now,
        }])?;
        accounts.insert(account, Self::new_state(account, display_name, now));

        info!(account, display_name, "account registered");
        Ok(true)
    }

    fn new_state(
        account: AccountId,
        display_name: &str,
        now: Timestamp,
    ) -> Arc<RwLock<AccountState>> {
        Arc::new(RwLock::new(AccountState {
            account: Account {
                id: account,
                display_name: display_name.to_string(),
                balance: Amount::ZERO,
                last_click: None,
                created_at: now,
            },
            transactions: Vec::new(),
        }))
    }

    fn cell(&self, account: AccountId) -> EconomyResult<Arc<RwLock<AccountState>>> {
        self.accounts
            .read()
            .get(&account)
            .cloned()
            .ok_or(EconomyError::AccountNotFound(account))
    }

    /// Returns true if the account exists.
    #[must_use]
    pub fn contains(&self, account: AccountId) -> bool {
        self.accounts.read().contains_key(&account)
    }

    /// Number of accounts.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    /// Snapshot of one account.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for an unknown account.
    pub fn account(&self, account: AccountId) -> EconomyResult<Account> {
        Ok(self.cell(account)?.read().account.clone())
    }

    /// Snapshots of all accounts, newest first.
    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        let mut all: Vec<Account> = self
            .cells()
            .iter()
            .map(|cell| cell.read().account.clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }

    fn cells(&self) -> Vec<Arc<RwLock<AccountState>>> {
        self.accounts.read().values().cloned().collect()
    }

    /// Current balance.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for an unknown account.
    pub fn get_balance(&self, account: AccountId) -> EconomyResult<Amount> {
        Ok(self.cell(account)?.read().account.balance)
    }

    /// The account's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound` for an unknown account.
    pub fn history(&self, account: AccountId) -> EconomyResult<Vec<Transaction>> {
        let cell = self.cell(account)?;
        let state = cell.read();
        Ok(state.transactions.iter().rev().cloned().collect())
    }

    /// Applies one balance change with its transaction row.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InsufficientFunds` (nothing mutated) if a
    /// debit exceeds the balance, or any journal error.
    pub fn apply_delta(
        &self,
        account: AccountId,
        amount: Delta,
        category: TxCategory,
        note: &str,
        now: Timestamp,
    ) -> EconomyResult<Amount> {
        self.transact(account, now, |tx| tx.post(amount, category, note))
    }

    /// Runs `stage` against a copy of the account under its write lock, then
    /// journals and installs the staged changes as one unit.
    ///
    /// If `stage` fails or the journal rejects the unit, nothing is applied
    /// and no `after_commit` hook runs.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::AccountNotFound`, the error from `stage`, or a
    /// journal error.
    pub fn transact<'a, R>(
        &self,
        account: AccountId,
        now: Timestamp,
        stage: impl FnOnce(&mut AccountTx<'a>) -> EconomyResult<R>,
    ) -> EconomyResult<R> {
        let cell = self.cell(account)?;
        let mut state = cell.write();

        let mut tx = AccountTx {
            now,
            staged: state.account.clone(),
            entries: Vec::new(),
            hooks: Vec::new(),
        };
        let result = stage(&mut tx)?;

        if !tx.entries.is_empty() {
            let mut next_id = self.next_tx_id.lock();
            self.journal.commit(&tx.entries)?;

            for entry in &tx.entries {
                if let JournalEntry::Posted { account, amount, category, note, at } = entry {
                    debug!(account, amount = %amount, category = %category, "posted");
                    state.transactions.push(Transaction {
                        id: *next_id,
                        account: *account,
                        amount: *amount,
                        category: *category,
                        note: note.clone(),
                        created_at: *at,
                    });
                    *next_id += 1;
                }
            }
            state.account = tx.staged;
        }

        for hook in tx.hooks {
            hook();
        }
        Ok(result)
    }

    /// Re-applies a committed ledger entry during replay. Other entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::CorruptJournal` if the entry cannot apply to
    /// the rebuilt state.
    pub fn restore(&self, entry: &JournalEntry) -> EconomyResult<()> {
        match entry {
            JournalEntry::AccountOpened { account, display_name, at } => {
                let mut accounts = self.accounts.write();
                if accounts.contains_key(account) {
                    return Err(corrupt(format!("account {account} opened twice")));
                }
                accounts.insert(*account, Self::new_state(*account, display_name, *at));
            }
            JournalEntry::Posted { account, amount, category, note, at } => {
                let cell = self.cell(*account).map_err(|_| {
                    corrupt(format!("posting to unknown account {account}"))
                })?;
                let mut state = cell.write();
                state.account.balance = state
                    .account
                    .balance
                    .checked_apply(*amount)
                    .ok_or_else(|| corrupt(format!("posting {amount} breaks account {account}")))?;

                let mut next_id = self.next_tx_id.lock();
                state.transactions.push(Transaction {
                    id: *next_id,
                    account: *account,
                    amount: *amount,
                    category: *category,
                    note: note.clone(),
                    created_at: *at,
                });
                *next_id += 1;
            }
            JournalEntry::ClickStamped { account, at } => {
                let cell = self
                    .cell(*account)
                    .map_err(|_| corrupt(format!("click on unknown account {account}")))?;
                cell.write().account.last_click = Some(*at);
            }
            _ => {}
        }
        Ok(())
    }

    /// Sum of all balances.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if the total does not fit.
    pub fn total_balance(&self) -> EconomyResult<Amount> {
        self.cells()
            .iter()
            .try_fold(Amount::ZERO, |sum, cell| sum.safe_add(cell.read().account.balance))
    }

    /// Signed sum of every transaction in `categories`, across all accounts.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if the total does not fit.
    pub fn category_total(&self, categories: &[TxCategory]) -> EconomyResult<Delta> {
        let mut total = Delta::ZERO;
        for cell in self.cells() {
            let state = cell.read();
            for tx in state.transactions.iter().filter(|tx| categories.contains(&tx.category)) {
                total = total.checked_add(tx.amount).ok_or(EconomyError::ArithmeticOverflow)?;
            }
        }
        Ok(total)
    }

    /// Accounts whose transactions do not sum to their balance.
    #[must_use]
    pub fn audit(&self) -> Vec<AuditDiscrepancy> {
        let mut found: Vec<AuditDiscrepancy> = self
            .cells()
            .iter()
            .filter_map(|cell| {
                let state = cell.read();
                let sum: i128 = state
                    .transactions
                    .iter()
                    .map(|tx| i128::from(tx.amount.micros()))
                    .sum();
                (sum != i128::from(state.account.balance.micros())).then(|| AuditDiscrepancy {
                    account: state.account.id,
                    balance: state.account.balance,
                    transaction_sum_micros: sum,
                })
            })
            .collect();
        found.sort_by_key(|d| d.account);
        found
    }
}

fn corrupt(message: String) -> EconomyError {
    EconomyError::CorruptJournal(message)
}
