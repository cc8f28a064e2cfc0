use chrono::{DateTime, Utc};
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::FundingRules;
use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::events::{Event, EventStore};
use crate::payments::{split_pro_rata, AmortizationSchedule, LenderShare};
use crate::state::{GuardContext, LoanStateMachine, TransitionKind};
use crate::types::{LedgerEntryType, LoanId, LoanStatus, UserId};

/// a lender's stake in a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LenderContribution {
    pub lender_id: UserId,
    pub amount: Money,
    pub funded_at: DateTime<Utc>,
}

/// an immutable record of value moving in or out of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_type: LedgerEntryType,
    pub amount: Money,
    pub from: Option<UserId>,
    pub to: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

/// result of a successful contribution
#[derive(Debug, Clone, PartialEq)]
pub struct FundingOutcome {
    pub loan_id: LoanId,
    pub lender_id: UserId,
    pub amount: Money,
    pub amount_funded: Money,
    pub remaining: Money,
    pub status: LoanStatus,
    /// set when this contribution completed funding
    pub disbursed: Option<Money>,
}

/// result of a settled installment
#[derive(Debug, Clone, PartialEq)]
pub struct RepaymentOutcome {
    pub loan_id: LoanId,
    pub month: u32,
    pub amount_paid: Money,
    pub shares: Vec<LenderShare>,
    pub status: LoanStatus,
    pub closed: bool,
}

/// loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower_id: UserId,

    // terms
    pub amount_requested: Money,
    pub tenure_months: u32,
    pub annual_rate: Rate,
    pub purpose: String,
    pub schedule: AmortizationSchedule,

    // funding
    pub amount_funded: Money,
    pub lender_contributions: Vec<LenderContribution>,
    pub ledger_entries: Vec<LedgerEntry>,

    // status
    pub status: LoanStatus,
    pub risk_score: u32,
    pub credit_score_snapshot: u16,

    // dates
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub events: EventStore,
}

impl Loan {
    /// create a loan in its initial status
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: LoanId,
        borrower_id: UserId,
        purpose: String,
        schedule: AmortizationSchedule,
        status: LoanStatus,
        risk_score: u32,
        credit_score_snapshot: u16,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            borrower_id,
            amount_requested: schedule.principal,
            tenure_months: schedule.term_months,
            annual_rate: schedule.annual_rate,
            purpose,
            schedule,
            amount_funded: Money::ZERO,
            lender_contributions: Vec::new(),
            ledger_entries: Vec::new(),
            status,
            risk_score,
            credit_score_snapshot,
            created_at,
            updated_at: created_at,
            events: EventStore::new(),
        }
    }

    pub fn emi(&self) -> Money {
        self.schedule.emi
    }

    pub fn total_payment(&self) -> Money {
        self.schedule.total_payment
    }

    pub fn remaining_to_fund(&self) -> Money {
        self.amount_requested - self.amount_funded
    }

    pub fn paid_installments(&self) -> usize {
        self.schedule.paid_count()
    }

    pub fn next_due_date(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_unpaid().map(|l| l.due_date)
    }

    /// unpaid installments, plus the unfunded gap while funding
    pub fn outstanding_balance(&self) -> Money {
        let pending_funding = if self.status == LoanStatus::Funding {
            self.remaining_to_fund().max(Money::ZERO)
        } else {
            Money::ZERO
        };
        self.schedule.unpaid_total() + pending_funding
    }

    /// total repaid so far
    pub fn total_repaid(&self) -> Money {
        self.ledger_entries
            .iter()
            .filter(|e| e.entry_type == LedgerEntryType::Repayment)
            .map(|e| e.amount)
            .sum()
    }

    /// contributions summed per lender, in order of first contribution
    pub fn lender_totals(&self) -> Vec<(UserId, Money)> {
        let mut totals: Vec<(UserId, Money)> = Vec::new();
        for c in &self.lender_contributions {
            match totals.iter_mut().find(|(id, _)| *id == c.lender_id) {
                Some((_, total)) => *total += c.amount,
                None => totals.push((c.lender_id, c.amount)),
            }
        }
        totals
    }

    /// each lender's fraction of the requested amount
    pub fn lender_ratios(&self) -> Vec<(UserId, Decimal)> {
        if !self.amount_requested.is_positive() {
            return Vec::new();
        }
        self.lender_totals()
            .into_iter()
            .map(|(id, amount)| (id, amount.as_decimal() / self.amount_requested.as_decimal()))
            .collect()
    }

    pub fn contribution_of(&self, lender_id: UserId) -> Money {
        self.lender_contributions
            .iter()
            .filter(|c| c.lender_id == lender_id)
            .map(|c| c.amount)
            .sum()
    }

    pub fn has_lender(&self, lender_id: UserId) -> bool {
        self.lender_contributions.iter().any(|c| c.lender_id == lender_id)
    }

    /// funded amount equals the contributions and never exceeds the request
    pub fn is_consistent(&self) -> bool {
        let contributed: Money = self.lender_contributions.iter().map(|c| c.amount).sum();
        contributed == self.amount_funded && self.amount_funded <= self.amount_requested
    }

    fn guard_context(&self) -> GuardContext {
        GuardContext {
            amount_requested: self.amount_requested,
            amount_funded: self.amount_funded,
            all_installments_paid: self.schedule.is_fully_paid(),
        }
    }

    /// move to `to` if the state machine allows it
    pub fn transition(
        &mut self,
        to: LoanStatus,
        kind: TransitionKind,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let from = self.status;
        LoanStateMachine::check(from, to, kind, &self.guard_context())?;

        let reason = reason.into();
        info!("loan {} {} -> {} ({})", self.id, from, to, reason);

        self.status = to;
        self.updated_at = now;
        self.events.emit(Event::StatusChanged {
            loan_id: self.id,
            old_status: from,
            new_status: to,
            reason,
            timestamp: now,
        });
        Ok(())
    }

    /// record a lender contribution, advancing to funding and disbursed
    ///
    /// Runs against a working copy; the caller commits it only once the
    /// matching wallet postings succeed.
    pub fn add_contribution(
        &mut self,
        lender_id: UserId,
        amount: Money,
        rules: &FundingRules,
        now: DateTime<Utc>,
    ) -> Result<FundingOutcome> {
        if !amount.is_positive() {
            return Err(LendingError::InvalidAmount { amount });
        }
        if !self.status.is_open_for_funding() {
            return Err(LendingError::IllegalTransition {
                from: self.status,
                to: LoanStatus::Funding,
            });
        }
        if lender_id == self.borrower_id {
            return Err(LendingError::Unauthorized {
                user_id: lender_id,
                loan_id: self.id,
            });
        }

        let remaining = self.remaining_to_fund();
        if amount > remaining {
            return Err(LendingError::Overfunding {
                remaining,
                requested: amount,
            });
        }
        if amount < rules.minimum_contribution && amount != remaining {
            return Err(LendingError::BelowMinimum {
                minimum: rules.minimum_contribution,
                provided: amount,
            });
        }

        self.lender_contributions.push(LenderContribution {
            lender_id,
            amount,
            funded_at: now,
        });
        self.amount_funded += amount;
        self.updated_at = now;
        self.events.emit(Event::ContributionReceived {
            loan_id: self.id,
            lender_id,
            amount,
            amount_funded: self.amount_funded,
            timestamp: now,
        });

        if self.status == LoanStatus::Approved {
            self.transition(LoanStatus::Funding, TransitionKind::Automatic, "first contribution", now)?;
        }

        let mut disbursed = None;
        if self.amount_funded == self.amount_requested {
            self.transition(LoanStatus::Disbursed, TransitionKind::Automatic, "fully funded", now)?;
            self.ledger_entries.push(LedgerEntry {
                entry_type: LedgerEntryType::Disbursement,
                amount: self.amount_requested,
                from: None,
                to: Some(self.borrower_id),
                timestamp: now,
                note: "loan fully funded".to_string(),
            });
            self.events.emit(Event::LoanDisbursed {
                loan_id: self.id,
                borrower_id: self.borrower_id,
                amount: self.amount_requested,
                timestamp: now,
            });
            disbursed = Some(self.amount_requested);
        }

        Ok(FundingOutcome {
            loan_id: self.id,
            lender_id,
            amount,
            amount_funded: self.amount_funded,
            remaining: self.remaining_to_fund(),
            status: self.status,
            disbursed,
        })
    }

    /// settle the next installment and split the payment across lenders
    ///
    /// Runs against a working copy like `add_contribution`.
    pub fn settle_installment(
        &mut self,
        payer_id: UserId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<RepaymentOutcome> {
        if !amount.is_positive() {
            return Err(LendingError::InvalidAmount { amount });
        }
        if self.status != LoanStatus::Disbursed {
            return Err(LendingError::IllegalTransition {
                from: self.status,
                to: LoanStatus::Closed,
            });
        }
        if payer_id != self.borrower_id {
            return Err(LendingError::Unauthorized {
                user_id: payer_id,
                loan_id: self.id,
            });
        }

        let line = self
            .schedule
            .next_unpaid()
            .cloned()
            .ok_or(LendingError::NoOutstandingInstallment { loan_id: self.id })?;
        if amount < line.total_amount {
            return Err(LendingError::InsufficientPayment {
                due: line.total_amount,
                provided: amount,
            });
        }

        let shares = split_pro_rata(amount, &self.lender_totals(), self.amount_requested)?;

        let month = self
            .schedule
            .settle_next(now)
            .ok_or(LendingError::NoOutstandingInstallment { loan_id: self.id })?;
        self.updated_at = now;
        self.ledger_entries.push(LedgerEntry {
            entry_type: LedgerEntryType::Repayment,
            amount,
            from: Some(self.borrower_id),
            to: None,
            timestamp: now,
            note: format!("installment {} of {}", month, self.tenure_months),
        });
        self.events.emit(Event::InstallmentPaid {
            loan_id: self.id,
            month,
            due_date: line.due_date.date_naive(),
            amount_due: line.total_amount,
            amount_paid: amount,
            timestamp: now,
        });
        for share in shares.iter().filter(|s| s.amount.is_positive()) {
            self.events.emit(Event::RepaymentDistributed {
                loan_id: self.id,
                lender_id: share.lender_id,
                amount: share.amount,
                timestamp: now,
            });
        }

        let closed = self.schedule.is_fully_paid();
        if closed {
            self.transition(LoanStatus::Closed, TransitionKind::Automatic, "all installments paid", now)?;
            self.events.emit(Event::LoanClosed {
                loan_id: self.id,
                total_repaid: self.total_repaid(),
                timestamp: now,
            });
        }

        Ok(RepaymentOutcome {
            loan_id: self.id,
            month,
            amount_paid: amount,
            shares,
            status: self.status,
            closed,
        })
    }

    /// regenerate the schedule for new terms
    ///
    /// Only allowed before disbursement and before any installment is paid.
    pub fn revise_terms(
        &mut self,
        amount: Money,
        tenure_months: u32,
        annual_rate: Rate,
        anchor_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if matches!(self.status, LoanStatus::Disbursed | LoanStatus::Closed) {
            return Err(LendingError::ScheduleLocked {
                reason: format!("loan is {}", self.status),
            });
        }
        if self.schedule.has_payments() {
            return Err(LendingError::ScheduleLocked {
                reason: "installments already paid".to_string(),
            });
        }
        // a partially funded loan must keep a gap to fund
        if self.amount_funded.is_positive() && amount <= self.amount_funded {
            return Err(LendingError::Overfunding {
                remaining: Money::ZERO,
                requested: self.amount_funded,
            });
        }

        let schedule = AmortizationSchedule::generate(amount, annual_rate, tenure_months, anchor_date)?;

        self.amount_requested = amount;
        self.tenure_months = tenure_months;
        self.annual_rate = annual_rate;
        self.schedule = schedule;
        self.updated_at = now;
        self.events.emit(Event::TermsRevised {
            loan_id: self.id,
            amount,
            tenure_months,
            annual_rate,
            emi: self.schedule.emi,
            timestamp: now,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn approved_loan(amount: i64, months: u32) -> Loan {
        let schedule = AmortizationSchedule::generate(
            Money::from_major(amount),
            Rate::from_percentage(12),
            months,
            now(),
        )
        .unwrap();
        Loan::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "education".to_string(),
            schedule,
            LoanStatus::Approved,
            0,
            750,
            now(),
        )
    }

    #[test]
    fn test_contributions_advance_status() {
        let mut loan = approved_loan(10_000, 6);
        let rules = FundingRules::standard();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = loan.add_contribution(a, Money::from_major(6_000), &rules, now()).unwrap();
        assert_eq!(first.status, LoanStatus::Funding);
        assert_eq!(first.disbursed, None);
        assert_eq!(loan.outstanding_balance(), loan.total_payment() + Money::from_major(4_000));

        let second = loan.add_contribution(b, Money::from_major(4_000), &rules, now()).unwrap();
        assert_eq!(second.status, LoanStatus::Disbursed);
        assert_eq!(second.disbursed, Some(Money::from_major(10_000)));
        assert_eq!(loan.ledger_entries.len(), 1);
        assert_eq!(loan.ledger_entries[0].to, Some(loan.borrower_id));
        assert!(loan.is_consistent());
        assert_eq!(loan.lender_ratios()[0].1, dec!(0.6));
    }

    #[test]
    fn test_overfunding_leaves_loan_unchanged() {
        let mut loan = approved_loan(10_000, 6);
        let rules = FundingRules::standard();
        loan.add_contribution(Uuid::new_v4(), Money::from_major(9_000), &rules, now()).unwrap();
        let before = loan.clone();

        let result = loan.add_contribution(Uuid::new_v4(), Money::from_decimal(dec!(1000.01)), &rules, now());
        assert!(matches!(result, Err(LendingError::Overfunding { .. })));
        assert_eq!(loan, before);
    }

    #[test]
    fn test_minimum_contribution_unless_closing_gap() {
        let mut loan = approved_loan(10_000, 6);
        let rules = FundingRules::standard();
        assert!(matches!(
            loan.add_contribution(Uuid::new_v4(), Money::from_major(50), &rules, now()),
            Err(LendingError::BelowMinimum { .. })
        ));

        loan.add_contribution(Uuid::new_v4(), Money::from_major(9_950), &rules, now()).unwrap();
        let outcome = loan.add_contribution(Uuid::new_v4(), Money::from_major(50), &rules, now()).unwrap();
        assert_eq!(outcome.status, LoanStatus::Disbursed);
    }

    #[test]
    fn test_borrower_cannot_fund_own_loan() {
        let mut loan = approved_loan(10_000, 6);
        let borrower = loan.borrower_id;
        assert!(matches!(
            loan.add_contribution(borrower, Money::from_major(1_000), &FundingRules::standard(), now()),
            Err(LendingError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_settle_requires_disbursed() {
        let mut loan = approved_loan(10_000, 6);
        let borrower = loan.borrower_id;
        assert!(matches!(
            loan.settle_installment(borrower, Money::from_major(2_000), now()),
            Err(LendingError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_settle_until_closed() {
        let mut loan = approved_loan(3_000, 3);
        let rules = FundingRules::standard();
        let lender = Uuid::new_v4();
        loan.add_contribution(lender, Money::from_major(3_000), &rules, now()).unwrap();
        let borrower = loan.borrower_id;

        let stranger = Uuid::new_v4();
        assert!(matches!(
            loan.settle_installment(stranger, Money::from_major(2_000), now()),
            Err(LendingError::Unauthorized { .. })
        ));

        let due = loan.schedule.lines[0].total_amount;
        assert!(matches!(
            loan.settle_installment(borrower, due - Money::MINOR_UNIT, now()),
            Err(LendingError::InsufficientPayment { .. })
        ));

        for month in 1..=3u32 {
            let due = loan.schedule.line(month).unwrap().total_amount;
            let outcome = loan.settle_installment(borrower, due, now()).unwrap();
            assert_eq!(outcome.month, month);
            assert_eq!(outcome.closed, month == 3);
            assert_eq!(outcome.shares.len(), 1);
            assert_eq!(outcome.shares[0].amount, due);
        }

        assert_eq!(loan.status, LoanStatus::Closed);
        assert_eq!(loan.next_due_date(), None);
        assert_eq!(loan.outstanding_balance(), Money::ZERO);
        assert_eq!(loan.total_repaid(), loan.total_payment());
    }

    #[test]
    fn test_revise_terms_before_disbursement() {
        let mut loan = approved_loan(10_000, 6);
        let rules = FundingRules::standard();
        loan.add_contribution(Uuid::new_v4(), Money::from_major(4_000), &rules, now()).unwrap();

        assert!(matches!(
            loan.revise_terms(Money::from_major(3_000), 6, Rate::from_percentage(12), now(), now()),
            Err(LendingError::Overfunding { .. })
        ));

        loan.revise_terms(Money::from_major(8_000), 12, Rate::from_percentage(9), now(), now())
            .unwrap();
        assert_eq!(loan.schedule.lines.len(), 12);
        assert_eq!(loan.amount_requested, Money::from_major(8_000));
        assert_eq!(loan.remaining_to_fund(), Money::from_major(4_000));
    }

    #[test]
    fn test_revise_terms_locked_after_disbursement() {
        let mut loan = approved_loan(10_000, 6);
        loan.add_contribution(Uuid::new_v4(), Money::from_major(10_000), &FundingRules::standard(), now())
            .unwrap();
        assert!(matches!(
            loan.revise_terms(Money::from_major(12_000), 6, Rate::from_percentage(12), now(), now()),
            Err(LendingError::ScheduleLocked { .. })
        ));
    }
}
