use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::types::{Direction, LoanId, TransactionType, UserId};

/// one entry of a wallet's append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub tx_type: TransactionType,
    pub direction: Direction,
    pub amount: Money,
    pub related_loan_id: Option<LoanId>,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

/// per-user balance backed by its transaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: UserId,
    balance: Money,
    transactions: Vec<WalletTransaction>,
}

impl Wallet {
    pub fn new(owner_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: Money::ZERO,
            transactions: Vec::new(),
        }
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    /// add funds and log the movement
    pub fn credit(
        &mut self,
        amount: Money,
        tx_type: TransactionType,
        related_loan_id: Option<LoanId>,
        note: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<&WalletTransaction> {
        if !amount.is_positive() {
            return Err(LendingError::InvalidAmount { amount });
        }
        Ok(self.record(Direction::Credit, amount, tx_type, related_loan_id, note.into(), timestamp))
    }

    /// remove funds and log the movement; the balance never goes negative
    pub fn debit(
        &mut self,
        amount: Money,
        tx_type: TransactionType,
        related_loan_id: Option<LoanId>,
        note: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<&WalletTransaction> {
        self.check_debit(amount)?;
        Ok(self.record(Direction::Debit, amount, tx_type, related_loan_id, note.into(), timestamp))
    }

    fn check_debit(&self, amount: Money) -> Result<()> {
        if !amount.is_positive() {
            return Err(LendingError::InvalidAmount { amount });
        }
        if amount > self.balance {
            return Err(LendingError::InsufficientFunds {
                available: self.balance,
                requested: amount,
            });
        }
        Ok(())
    }

    fn record(
        &mut self,
        direction: Direction,
        amount: Money,
        tx_type: TransactionType,
        related_loan_id: Option<LoanId>,
        note: String,
        timestamp: DateTime<Utc>,
    ) -> &WalletTransaction {
        match direction {
            Direction::Credit => self.balance += amount,
            Direction::Debit => self.balance -= amount,
        }
        self.transactions.push(WalletTransaction {
            id: Uuid::new_v4(),
            tx_type,
            direction,
            amount,
            related_loan_id,
            timestamp,
            note,
        });
        &self.transactions[self.transactions.len() - 1]
    }

    /// sum of logged amounts of one type, regardless of direction
    pub fn total_by_type(&self, tx_type: TransactionType) -> Money {
        self.transactions
            .iter()
            .filter(|t| t.tx_type == tx_type)
            .map(|t| t.amount)
            .sum()
    }

    /// credits minus debits over the whole log
    pub fn log_balance(&self) -> Money {
        self.transactions
            .iter()
            .fold(Money::ZERO, |acc, t| match t.direction {
                Direction::Credit => acc + t.amount,
                Direction::Debit => acc - t.amount,
            })
    }

    pub fn is_reconciled(&self) -> bool {
        self.log_balance() == self.balance
    }
}

/// a single leg of a multi-wallet movement
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub owner_id: UserId,
    pub direction: Direction,
    pub amount: Money,
    pub tx_type: TransactionType,
    pub related_loan_id: Option<LoanId>,
    pub note: String,
}

impl Posting {
    pub fn credit(
        owner_id: UserId,
        amount: Money,
        tx_type: TransactionType,
        related_loan_id: Option<LoanId>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            direction: Direction::Credit,
            amount,
            tx_type,
            related_loan_id,
            note: note.into(),
        }
    }

    pub fn debit(
        owner_id: UserId,
        amount: Money,
        tx_type: TransactionType,
        related_loan_id: Option<LoanId>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            direction: Direction::Debit,
            amount,
            tx_type,
            related_loan_id,
            note: note.into(),
        }
    }
}

/// registry of wallets, one per user, created on first use
///
/// Each wallet sits behind its own mutex. Postings that touch several
/// wallets lock them in ascending owner order and are validated in full
/// before any balance changes, so a batch is applied entirely or not at all.
#[derive(Debug, Default)]
pub struct WalletLedger {
    wallets: RwLock<HashMap<UserId, Arc<Mutex<Wallet>>>>,
}

impl WalletLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, owner_id: UserId) -> Arc<Mutex<Wallet>> {
        if let Some(wallet) = self
            .wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owner_id)
        {
            return Arc::clone(wallet);
        }

        let mut wallets = self.wallets.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(wallets.entry(owner_id).or_insert_with(|| {
            debug!("opening wallet for user {}", owner_id);
            Arc::new(Mutex::new(Wallet::new(owner_id)))
        }))
    }

    fn existing(&self, owner_id: UserId) -> Option<Arc<Mutex<Wallet>>> {
        self.wallets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owner_id)
            .cloned()
    }

    /// credit a wallet, creating it if needed
    pub fn credit(
        &self,
        owner_id: UserId,
        amount: Money,
        tx_type: TransactionType,
        related_loan_id: Option<LoanId>,
        note: impl Into<String>,
        time_provider: &SafeTimeProvider,
    ) -> Result<WalletTransaction> {
        let wallet = self.handle(owner_id);
        let mut wallet = lock(&wallet);
        let tx = wallet.credit(amount, tx_type, related_loan_id, note, time_provider.now())?;
        debug!("credited {} to wallet of {} ({:?})", amount, owner_id, tx_type);
        Ok(tx.clone())
    }

    /// debit a wallet, creating it if needed
    pub fn debit(
        &self,
        owner_id: UserId,
        amount: Money,
        tx_type: TransactionType,
        related_loan_id: Option<LoanId>,
        note: impl Into<String>,
        time_provider: &SafeTimeProvider,
    ) -> Result<WalletTransaction> {
        let wallet = self.handle(owner_id);
        let mut wallet = lock(&wallet);
        let tx = wallet.debit(amount, tx_type, related_loan_id, note, time_provider.now())?;
        debug!("debited {} from wallet of {} ({:?})", amount, owner_id, tx_type);
        Ok(tx.clone())
    }

    /// apply a batch of postings atomically
    ///
    /// Postings for the same wallet are applied in the given order; a debit
    /// may spend a credit earlier in the same batch.
    pub fn apply(&self, postings: &[Posting], time_provider: &SafeTimeProvider) -> Result<()> {
        if let Some(bad) = postings.iter().find(|p| !p.amount.is_positive()) {
            return Err(LendingError::InvalidAmount { amount: bad.amount });
        }
        if postings.is_empty() {
            return Ok(());
        }

        // BTreeMap keeps the lock order stable across callers
        let handles: BTreeMap<UserId, Arc<Mutex<Wallet>>> = postings
            .iter()
            .map(|p| (p.owner_id, self.handle(p.owner_id)))
            .collect();
        let mut guards: BTreeMap<UserId, MutexGuard<'_, Wallet>> = handles
            .iter()
            .map(|(owner, wallet)| (*owner, lock(wallet)))
            .collect();

        let mut projected: HashMap<UserId, Money> = guards
            .iter()
            .map(|(owner, wallet)| (*owner, wallet.balance()))
            .collect();
        for posting in postings {
            let balance = projected.entry(posting.owner_id).or_insert(Money::ZERO);
            match posting.direction {
                Direction::Credit => *balance += posting.amount,
                Direction::Debit => {
                    if posting.amount > *balance {
                        return Err(LendingError::InsufficientFunds {
                            available: *balance,
                            requested: posting.amount,
                        });
                    }
                    *balance -= posting.amount;
                }
            }
        }

        let now = time_provider.now();
        for posting in postings {
            let wallet = guards
                .get_mut(&posting.owner_id)
                .ok_or(LendingError::WalletNotFound {
                    user_id: posting.owner_id,
                })?;
            let note = posting.note.clone();
            match posting.direction {
                Direction::Credit => {
                    wallet.credit(posting.amount, posting.tx_type, posting.related_loan_id, note, now)?;
                }
                Direction::Debit => {
                    wallet.debit(posting.amount, posting.tx_type, posting.related_loan_id, note, now)?;
                }
            }
        }

        debug!("applied {} postings across {} wallets", postings.len(), guards.len());
        Ok(())
    }

    /// current balance; zero for users without a wallet
    pub fn balance(&self, owner_id: UserId) -> Money {
        match self.existing(owner_id) {
            Some(wallet) => {
                let wallet = lock(&wallet);
                wallet.balance()
            }
            None => Money::ZERO,
        }
    }

    /// copy of a wallet and its log
    pub fn snapshot(&self, owner_id: UserId) -> Result<Wallet> {
        let wallet = self
            .existing(owner_id)
            .ok_or(LendingError::WalletNotFound { user_id: owner_id })?;
        let snapshot = lock(&wallet).clone();
        Ok(snapshot)
    }

    pub fn contains(&self, owner_id: UserId) -> bool {
        self.existing(owner_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.wallets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
