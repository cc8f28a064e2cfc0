use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{LoanId, LoanStatus, UserId};

/// all events that can be emitted by a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanApplied {
        loan_id: LoanId,
        borrower_id: UserId,
        amount: Money,
        tenure_months: u32,
        annual_rate: Rate,
        risk_score: u32,
        credit_score: u16,
        timestamp: DateTime<Utc>,
    },
    LoanAutoRejected {
        loan_id: LoanId,
        risk_score: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    TermsRevised {
        loan_id: LoanId,
        amount: Money,
        tenure_months: u32,
        annual_rate: Rate,
        emi: Money,
        timestamp: DateTime<Utc>,
    },

    // funding events
    ContributionReceived {
        loan_id: LoanId,
        lender_id: UserId,
        amount: Money,
        amount_funded: Money,
        timestamp: DateTime<Utc>,
    },
    LoanDisbursed {
        loan_id: LoanId,
        borrower_id: UserId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },

    // repayment events
    InstallmentPaid {
        loan_id: LoanId,
        month: u32,
        due_date: NaiveDate,
        amount_due: Money,
        amount_paid: Money,
        timestamp: DateTime<Utc>,
    },
    RepaymentDistributed {
        loan_id: LoanId,
        lender_id: UserId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    LoanClosed {
        loan_id: LoanId,
        total_repaid: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
