/// wire forms of loans and wallets
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::loan::Loan;
use crate::payments::EmiLine;
use crate::types::{Direction, LedgerEntryType, LoanId, LoanStatus, TransactionType, UserId};
use crate::wallet::Wallet;

/// serializable view of a loan; users appear by id only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanView {
    pub id: LoanId,
    pub borrower_id: UserId,
    pub amount_requested: Money,
    pub amount_funded: Money,
    pub tenure_months: u32,
    pub annual_rate_percent: Decimal,
    pub purpose: String,
    pub emi: Money,
    pub total_payment: Money,
    pub schedule: Vec<EmiLine>,
    pub lender_contributions: Vec<ContributionView>,
    pub ledger_entries: Vec<LedgerEntryView>,
    pub status: LoanStatus,
    pub risk_score: u32,
    pub credit_score_snapshot: u16,
    pub outstanding_balance: Money,
    pub next_due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionView {
    pub lender_id: UserId,
    pub amount: Money,
    pub funded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryView {
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    pub amount: Money,
    pub from: Option<UserId>,
    pub to: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

impl LoanView {
    pub fn from_loan(loan: &Loan) -> Self {
        LoanView {
            id: loan.id,
            borrower_id: loan.borrower_id,
            amount_requested: loan.amount_requested,
            amount_funded: loan.amount_funded,
            tenure_months: loan.tenure_months,
            annual_rate_percent: loan.annual_rate.as_percentage(),
            purpose: loan.purpose.clone(),
            emi: loan.emi(),
            total_payment: loan.total_payment(),
            schedule: loan.schedule.lines.clone(),
            lender_contributions: loan
                .lender_contributions
                .iter()
                .map(|c| ContributionView {
                    lender_id: c.lender_id,
                    amount: c.amount,
                    funded_at: c.funded_at,
                })
                .collect(),
            ledger_entries: loan
                .ledger_entries
                .iter()
                .map(|e| LedgerEntryView {
                    entry_type: e.entry_type,
                    amount: e.amount,
                    from: e.from,
                    to: e.to,
                    timestamp: e.timestamp,
                    note: e.note.clone(),
                })
                .collect(),
            status: loan.status,
            risk_score: loan.risk_score,
            credit_score_snapshot: loan.credit_score_snapshot,
            outstanding_balance: loan.outstanding_balance(),
            next_due_date: loan.next_due_date(),
            created_at: loan.created_at,
            updated_at: loan.updated_at,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// serializable view of a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub id: Uuid,
    pub owner_id: UserId,
    pub balance: Money,
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub direction: Direction,
    pub amount: Money,
    pub related_loan_id: Option<LoanId>,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

impl WalletView {
    pub fn from_wallet(wallet: &Wallet) -> Self {
        WalletView {
            id: wallet.id,
            owner_id: wallet.owner_id,
            balance: wallet.balance(),
            transactions: wallet
                .transactions()
                .iter()
                .map(|t| TransactionView {
                    id: t.id,
                    tx_type: t.tx_type,
                    direction: t.direction,
                    amount: t.amount,
                    related_loan_id: t.related_loan_id,
                    timestamp: t.timestamp,
                    note: t.note.clone(),
                })
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
