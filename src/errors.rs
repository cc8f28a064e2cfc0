use thiserror::Error;

use crate::decimal::{Money, Rate};
use crate::types::{LoanId, LoanStatus, OfferId, UserId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LendingError {
    #[error("invalid term: principal {principal}, months {months}")]
    InvalidTerm {
        principal: Money,
        months: u32,
    },

    #[error("invalid interest rate: {rate}")]
    InvalidRate {
        rate: Rate,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("amount below minimum: minimum {minimum}, provided {provided}")]
    BelowMinimum {
        minimum: Money,
        provided: Money,
    },

    #[error("overfunding: remaining {remaining}, requested {requested}")]
    Overfunding {
        remaining: Money,
        requested: Money,
    },

    #[error("premature disbursement: funded {funded} of {requested}")]
    PrematureDisbursement {
        funded: Money,
        requested: Money,
    },

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: LoanStatus,
        to: LoanStatus,
    },

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Money,
        requested: Money,
    },

    #[error("insufficient payment: due {due}, provided {provided}")]
    InsufficientPayment {
        due: Money,
        provided: Money,
    },

    #[error("no outstanding installment on loan {loan_id}")]
    NoOutstandingInstallment {
        loan_id: LoanId,
    },

    #[error("user {user_id} is not authorized for loan {loan_id}")]
    Unauthorized {
        user_id: UserId,
        loan_id: LoanId,
    },

    #[error("schedule locked: {reason}")]
    ScheduleLocked {
        reason: String,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("lend offer not found: {offer_id}")]
    OfferNotFound {
        offer_id: OfferId,
    },

    #[error("wallet not found for user {user_id}")]
    WalletNotFound {
        user_id: UserId,
    },

    #[error("invalid application: {message}")]
    InvalidApplication {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LendingError>;

/// failure reported by a notification sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery {
        recipient: UserId,
        reason: String,
    },
}
