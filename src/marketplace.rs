use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::MarketplaceConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::loan::{FundingOutcome, Loan, RepaymentOutcome};
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::offers::{LendOffer, OfferBook};
use crate::payments::AmortizationSchedule;
use crate::risk::{RiskAssessment, RiskEvaluator, RiskInput};
use crate::state::TransitionKind;
use crate::stats::DashboardStats;
use crate::types::{LoanId, LoanStatus, OfferId, OfferStatus, TransactionType, UserId};
use crate::wallet::{lock, Posting, Wallet, WalletLedger, WalletTransaction};

/// a borrower's request for a loan
#[derive(Debug, Clone, PartialEq)]
pub struct LoanApplication {
    pub borrower_id: UserId,
    pub amount: Money,
    pub tenure_months: u32,
    pub annual_rate: Rate,
    pub purpose: String,
    /// bureau score, if the lookup succeeded
    pub credit_score: Option<u16>,
    /// first due date is one month after this; defaults to the application time
    pub anchor_date: Option<DateTime<Utc>>,
}

impl LoanApplication {
    pub fn builder() -> LoanApplicationBuilder {
        LoanApplicationBuilder::new()
    }
}

/// builder for loan applications
#[derive(Debug, Default)]
pub struct LoanApplicationBuilder {
    borrower_id: Option<UserId>,
    amount: Option<Money>,
    tenure_months: Option<u32>,
    annual_rate: Option<Rate>,
    purpose: Option<String>,
    credit_score: Option<u16>,
    anchor_date: Option<DateTime<Utc>>,
}

impl LoanApplicationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrower(mut self, borrower_id: UserId) -> Self {
        self.borrower_id = Some(borrower_id);
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn tenure_months(mut self, months: u32) -> Self {
        self.tenure_months = Some(months);
        self
    }

    pub fn rate(mut self, rate: Rate) -> Self {
        self.annual_rate = Some(rate);
        self
    }

    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn credit_score(mut self, score: u16) -> Self {
        self.credit_score = Some(score);
        self
    }

    pub fn anchor_date(mut self, date: DateTime<Utc>) -> Self {
        self.anchor_date = Some(date);
        self
    }

    pub fn build(self) -> Result<LoanApplication> {
        let missing = |field: &str| LendingError::InvalidApplication {
            message: format!("{} required", field),
        };

        Ok(LoanApplication {
            borrower_id: self.borrower_id.ok_or_else(|| missing("borrower"))?,
            amount: self.amount.ok_or_else(|| missing("amount"))?,
            tenure_months: self.tenure_months.ok_or_else(|| missing("tenure"))?,
            annual_rate: self.annual_rate.ok_or_else(|| missing("interest rate"))?,
            purpose: self.purpose.ok_or_else(|| missing("purpose"))?,
            credit_score: self.credit_score,
            anchor_date: self.anchor_date,
        })
    }
}

/// loan registry plus the funding and repayment distributor
///
/// Each loan sits behind its own mutex; operations on different loans run
/// in parallel. A loan operation locks the loan first and then the wallets
/// it touches, never the other way round. Mutations run on a working copy
/// of the loan that replaces the stored loan only after the wallet postings
/// have been applied, so a failed call changes nothing.
pub struct Marketplace {
    config: MarketplaceConfig,
    evaluator: RiskEvaluator,
    loans: RwLock<HashMap<LoanId, Arc<Mutex<Loan>>>>,
    wallets: WalletLedger,
    offers: OfferBook,
    notifier: Arc<dyn Notifier>,
}

impl Marketplace {
    /// marketplace that logs its notifications
    pub fn new(config: MarketplaceConfig) -> Result<Self> {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: MarketplaceConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            evaluator: RiskEvaluator::new(config.risk.clone()),
            config,
            loans: RwLock::new(HashMap::new()),
            wallets: WalletLedger::new(),
            offers: OfferBook::new(),
            notifier,
        })
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    pub fn wallets(&self) -> &WalletLedger {
        &self.wallets
    }

    fn loan_handle(&self, loan_id: LoanId) -> Result<Arc<Mutex<Loan>>> {
        self.loans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&loan_id)
            .cloned()
            .ok_or(LendingError::LoanNotFound { loan_id })
    }

    fn handles(&self) -> Vec<Arc<Mutex<Loan>>> {
        self.loans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn send(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            if let Err(e) = self.notifier.notify(&notification) {
                warn!(
                    "notification '{}' to {} failed: {}",
                    notification.subject, notification.recipient, e
                );
            }
        }
    }

    /// score, schedule and register a new application
    ///
    /// High-risk applications are stored directly as rejected.
    pub fn apply_for_loan(
        &self,
        application: LoanApplication,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let now = time_provider.now();
        let purpose = application.purpose.trim().to_string();

        if purpose.is_empty() {
            return Err(LendingError::InvalidApplication {
                message: "purpose must not be empty".to_string(),
            });
        }
        if application.amount < self.config.funding.minimum_loan_amount {
            return Err(LendingError::BelowMinimum {
                minimum: self.config.funding.minimum_loan_amount,
                provided: application.amount,
            });
        }
        self.config
            .funding
            .check_tenure(application.amount, application.tenure_months)?;

        let schedule = AmortizationSchedule::generate(
            application.amount,
            application.annual_rate,
            application.tenure_months,
            application.anchor_date.unwrap_or(now),
        )?;

        let (credit_score, defaulted) = self.config.credit_score.resolve(application.credit_score);
        if defaulted {
            warn!(
                "credit score {:?} unusable for {}, using default {}",
                application.credit_score, application.borrower_id, credit_score
            );
        }

        let assessment: RiskAssessment = self.evaluator.evaluate(&RiskInput {
            amount: application.amount,
            tenure_months: application.tenure_months,
            credit_score,
            purpose: &purpose,
        });

        let status = if assessment.rejected {
            LoanStatus::Rejected
        } else {
            LoanStatus::Pending
        };

        let mut loan = Loan::new(
            Uuid::new_v4(),
            application.borrower_id,
            purpose,
            schedule,
            status,
            assessment.score,
            credit_score,
            now,
        );
        loan.events.emit(Event::LoanApplied {
            loan_id: loan.id,
            borrower_id: loan.borrower_id,
            amount: loan.amount_requested,
            tenure_months: loan.tenure_months,
            annual_rate: loan.annual_rate,
            risk_score: assessment.score,
            credit_score,
            timestamp: now,
        });
        if assessment.rejected {
            loan.events.emit(Event::LoanAutoRejected {
                loan_id: loan.id,
                risk_score: assessment.score,
                reason: assessment.reason.clone(),
                timestamp: now,
            });
            info!("loan {} auto-rejected with risk score {}", loan.id, assessment.score);
        } else {
            debug!("loan {} received with risk score {}", loan.id, assessment.score);
        }

        self.loans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(loan.id, Arc::new(Mutex::new(loan.clone())));

        let notification = if assessment.rejected {
            Notification::new(
                loan.borrower_id,
                "Loan Application - Rejected",
                format!(
                    "Your loan application was automatically rejected. Reason: {} (risk score {}).",
                    assessment.reason, assessment.score
                ),
            )
        } else {
            Notification::new(
                loan.borrower_id,
                "Loan Application - Received",
                "Your loan application has been received and is pending review.",
            )
        };
        self.send(vec![notification]);

        Ok(loan)
    }

    /// add a lender contribution; disburses once the loan is fully funded
    pub fn fund(
        &self,
        loan_id: LoanId,
        lender_id: UserId,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<FundingOutcome> {
        let now = time_provider.now();
        let handle = self.loan_handle(loan_id)?;

        let (outcome, borrower_id) = {
            let mut loan = lock(&handle);
            let mut working = loan.clone();
            let outcome = working.add_contribution(lender_id, amount, &self.config.funding, now)?;

            let mut postings = Vec::new();
            if self.config.funding.debit_lender_wallet {
                postings.push(Posting::debit(
                    lender_id,
                    amount,
                    TransactionType::Funding,
                    Some(loan_id),
                    format!("funding loan {}", loan_id),
                ));
            }
            if let Some(disbursed) = outcome.disbursed {
                postings.push(Posting::credit(
                    working.borrower_id,
                    disbursed,
                    TransactionType::LoanDisbursement,
                    Some(loan_id),
                    format!("disbursement of loan {}", loan_id),
                ));
            }
            self.wallets.apply(&postings, time_provider)?;

            *loan = working;
            (outcome, loan.borrower_id)
        };

        debug!(
            "loan {} funded {} by {}, {} remaining",
            loan_id, amount, lender_id, outcome.remaining
        );

        if let Some(disbursed) = outcome.disbursed {
            self.send(vec![Notification::new(
                borrower_id,
                "Loan Disbursed",
                format!("Your loan is fully funded and {} has been credited to your wallet.", disbursed),
            )]);
        }

        Ok(outcome)
    }

    /// pay the next installment and distribute it to the lenders
    pub fn repay(
        &self,
        loan_id: LoanId,
        payer_id: UserId,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<RepaymentOutcome> {
        let now = time_provider.now();
        let handle = self.loan_handle(loan_id)?;

        let outcome = {
            let mut loan = lock(&handle);
            let mut working = loan.clone();
            let outcome = working.settle_installment(payer_id, amount, now)?;

            let mut postings = vec![Posting::debit(
                payer_id,
                amount,
                TransactionType::LoanRepayment,
                Some(loan_id),
                format!("installment {} of loan {}", outcome.month, loan_id),
            )];
            postings.extend(outcome.shares.iter().filter(|s| s.amount.is_positive()).map(|share| {
                Posting::credit(
                    share.lender_id,
                    share.amount,
                    TransactionType::LoanRepayment,
                    Some(loan_id),
                    format!("share of installment {} of loan {}", outcome.month, loan_id),
                )
            }));
            self.wallets.apply(&postings, time_provider)?;

            *loan = working;
            outcome
        };

        debug!(
            "loan {} installment {} paid ({}) across {} lenders",
            loan_id,
            outcome.month,
            amount,
            outcome.shares.len()
        );

        let mut notifications: Vec<Notification> = outcome
            .shares
            .iter()
            .filter(|s| s.amount.is_positive())
            .map(|share| {
                Notification::new(
                    share.lender_id,
                    "Repayment Received",
                    format!(
                        "You received {} from installment {} of loan {}.",
                        share.amount, outcome.month, loan_id
                    ),
                )
            })
            .collect();
        if outcome.closed {
            notifications.push(Notification::new(
                payer_id,
                "Loan Closed",
                format!("All installments of loan {} are paid. The loan is closed.", loan_id),
            ));
        }
        self.send(notifications);

        Ok(outcome)
    }

    /// reviewer-driven status change
    pub fn update_status(
        &self,
        loan_id: LoanId,
        status: LoanStatus,
        reason: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let now = time_provider.now();
        let handle = self.loan_handle(loan_id)?;

        let snapshot = {
            let mut loan = lock(&handle);
            loan.transition(status, TransitionKind::Manual, reason, now)?;
            loan.clone()
        };

        self.send(vec![Notification::new(
            snapshot.borrower_id,
            "Loan Status Updated",
            format!("Your loan {} is now {}.", loan_id, status),
        )]);

        Ok(snapshot)
    }

    pub fn approve(&self, loan_id: LoanId, time_provider: &SafeTimeProvider) -> Result<Loan> {
        self.update_status(loan_id, LoanStatus::Approved, "approved by review", time_provider)
    }

    pub fn reject(&self, loan_id: LoanId, reason: &str, time_provider: &SafeTimeProvider) -> Result<Loan> {
        self.update_status(loan_id, LoanStatus::Rejected, reason, time_provider)
    }

    /// send a rejected loan back for review
    pub fn mark_pending(&self, loan_id: LoanId, time_provider: &SafeTimeProvider) -> Result<Loan> {
        self.update_status(loan_id, LoanStatus::Pending, "returned for review", time_provider)
    }

    /// change amount, tenure or rate and regenerate the schedule
    #[allow(clippy::too_many_arguments)]
    pub fn revise_terms(
        &self,
        loan_id: LoanId,
        requester_id: UserId,
        amount: Money,
        tenure_months: u32,
        annual_rate: Rate,
        anchor_date: DateTime<Utc>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let now = time_provider.now();
        let handle = self.loan_handle(loan_id)?;
        let mut loan = lock(&handle);

        if requester_id != loan.borrower_id {
            return Err(LendingError::Unauthorized {
                user_id: requester_id,
                loan_id,
            });
        }
        if amount < self.config.funding.minimum_loan_amount {
            return Err(LendingError::BelowMinimum {
                minimum: self.config.funding.minimum_loan_amount,
                provided: amount,
            });
        }
        self.config.funding.check_tenure(amount, tenure_months)?;

        let mut working = loan.clone();
        working.revise_terms(amount, tenure_months, annual_rate, anchor_date, now)?;
        *loan = working;

        debug!("loan {} terms revised, emi now {}", loan_id, loan.emi());
        Ok(loan.clone())
    }

    /// add money to a user's wallet
    pub fn deposit(
        &self,
        user_id: UserId,
        amount: Money,
        note: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<WalletTransaction> {
        self.wallets
            .credit(user_id, amount, TransactionType::Deposit, None, note, time_provider)
    }

    /// take money out of a user's wallet
    pub fn withdraw(
        &self,
        user_id: UserId,
        amount: Money,
        note: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<WalletTransaction> {
        self.wallets
            .debit(user_id, amount, TransactionType::Withdrawal, None, note, time_provider)
    }

    /// publish a lender's offer to lend on the given terms
    pub fn post_offer(
        &self,
        lender_id: UserId,
        amount: Money,
        tenure_months: u32,
        annual_rate: Rate,
        remarks: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<LendOffer> {
        let offer = LendOffer::new(
            lender_id,
            amount,
            tenure_months,
            annual_rate,
            remarks,
            &self.config.funding,
            time_provider.now(),
        )?;
        self.offers.insert(offer.clone());
        info!("lender {} offered {} over {} months at {}", lender_id, amount, tenure_months, annual_rate);
        Ok(offer)
    }

    pub fn offer(&self, offer_id: OfferId) -> Result<LendOffer> {
        self.offers.get(offer_id)
    }

    /// every offer, newest first
    pub fn offers(&self) -> Vec<LendOffer> {
        self.offers.list(|_| true)
    }

    pub fn offers_for_lender(&self, lender_id: UserId) -> Vec<LendOffer> {
        self.offers.list(|o| o.lender_id == lender_id)
    }

    /// reviewer action; no transition rules apply to offers
    pub fn update_offer_status(
        &self,
        offer_id: OfferId,
        status: OfferStatus,
        time_provider: &SafeTimeProvider,
    ) -> Result<LendOffer> {
        let offer = self.offers.set_status(offer_id, status, time_provider.now())?;
        info!("lend offer {} now {}", offer_id, status);
        Ok(offer)
    }

    pub fn remove_offer(&self, offer_id: OfferId) -> Result<LendOffer> {
        let offer = self.offers.remove(offer_id)?;
        info!("lend offer {} removed", offer_id);
        Ok(offer)
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<Loan> {
        let handle = self.loan_handle(loan_id)?;
        let snapshot = lock(&handle).clone();
        Ok(snapshot)
    }

    pub fn wallet(&self, user_id: UserId) -> Result<Wallet> {
        self.wallets.snapshot(user_id)
    }

    pub fn balance(&self, user_id: UserId) -> Money {
        self.wallets.balance(user_id)
    }

    /// drain the events recorded on a loan
    pub fn take_events(&self, loan_id: LoanId) -> Result<Vec<Event>> {
        let handle = self.loan_handle(loan_id)?;
        let events = lock(&handle).events.take_events();
        Ok(events)
    }

    /// snapshots of every loan matching `filter`, oldest first
    pub fn loans_where(&self, filter: impl Fn(&Loan) -> bool) -> Vec<Loan> {
        let mut loans: Vec<Loan> = self
            .handles()
            .iter()
            .filter_map(|handle| {
                let loan = lock(handle);
                if filter(&loan) {
                    Some(loan.clone())
                } else {
                    None
                }
            })
            .collect();
        loans.sort_by_key(|l| l.created_at);
        loans
    }

    pub fn loans(&self) -> Vec<Loan> {
        self.loans_where(|_| true)
    }

    pub fn loans_for_borrower(&self, borrower_id: UserId) -> Vec<Loan> {
        self.loans_where(|l| l.borrower_id == borrower_id)
    }

    /// loans the lender has contributed to
    pub fn loans_for_lender(&self, lender_id: UserId) -> Vec<Loan> {
        self.loans_where(|l| l.has_lender(lender_id))
    }

    /// loans lenders may still contribute to
    pub fn open_loans(&self) -> Vec<Loan> {
        self.loans_where(|l| l.status.is_open_for_funding())
    }

    /// mean of the borrower's in-range credit score snapshots
    pub fn average_credit_score(&self, borrower_id: UserId) -> u16 {
        let bounds = &self.config.credit_score;
        let scores: Vec<u32> = self
            .loans_for_borrower(borrower_id)
            .iter()
            .map(|l| l.credit_score_snapshot)
            .filter(|s| (bounds.minimum..=bounds.maximum).contains(s))
            .map(u32::from)
            .collect();

        if scores.is_empty() {
            return bounds.default_score;
        }
        let count = scores.len() as u32;
        let total: u32 = scores.iter().sum();
        // rounded half up
        ((total + count / 2) / count) as u16
    }

    pub fn stats(&self) -> DashboardStats {
        DashboardStats::collect(&self.loans(), self.wallets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        ))
    }

    fn marketplace() -> (Marketplace, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let market = Marketplace::with_notifier(MarketplaceConfig::standard(), notifier.clone()).unwrap();
        (market, notifier)
    }

    fn application(borrower: UserId, amount: i64, months: u32) -> LoanApplication {
        LoanApplication::builder()
            .borrower(borrower)
            .amount(Money::from_major(amount))
            .tenure_months(months)
            .rate(Rate::from_percentage(12))
            .purpose("education")
            .credit_score(760)
            .build()
            .unwrap()
    }

    #[test]
    fn test_application_pending_and_notified() {
        let (market, notifier) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();

        let loan = market.apply_for_loan(application(borrower, 50_000, 12), &t).unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.credit_score_snapshot, 760);
        assert_eq!(loan.schedule.lines.len(), 12);
        assert_eq!(notifier.sent_to(borrower)[0].subject, "Loan Application - Received");
    }

    #[test]
    fn test_high_risk_application_stored_rejected() {
        let (market, notifier) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();

        let app = LoanApplication::builder()
            .borrower(borrower)
            .amount(Money::from_major(600_000))
            .tenure_months(48)
            .rate(Rate::from_percentage(14))
            .purpose("Vacation")
            .credit_score(600)
            .build()
            .unwrap();
        let loan = market.apply_for_loan(app, &t).unwrap();

        assert_eq!(loan.status, LoanStatus::Rejected);
        assert_eq!(loan.risk_score, 9);
        assert_eq!(notifier.sent_to(borrower)[0].subject, "Loan Application - Rejected");
        assert!(matches!(
            market.take_events(loan.id).unwrap()[1],
            Event::LoanAutoRejected { risk_score: 9, .. }
        ));
    }

    #[test]
    fn test_missing_credit_score_uses_default() {
        let (market, _) = marketplace();
        let borrower = Uuid::new_v4();
        let app = LoanApplication::builder()
            .borrower(borrower)
            .amount(Money::from_major(5_000))
            .tenure_months(6)
            .rate(Rate::from_percentage(10))
            .purpose("home repair")
            .build()
            .unwrap();

        let loan = market.apply_for_loan(app, &time()).unwrap();
        assert_eq!(loan.credit_score_snapshot, 700);
        assert_eq!(loan.risk_score, 0);
    }

    #[test]
    fn test_application_validation() {
        let (market, _) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();

        assert!(matches!(
            market.apply_for_loan(application(borrower, 500, 12), &t),
            Err(LendingError::BelowMinimum { .. })
        ));
        assert!(matches!(
            market.apply_for_loan(application(borrower, 5_000, 0), &t),
            Err(LendingError::InvalidTerm { .. })
        ));
        assert!(matches!(
            market.apply_for_loan(application(borrower, 5_000, 361), &t),
            Err(LendingError::InvalidTerm { months: 361, .. })
        ));

        let mut blank = application(borrower, 5_000, 12);
        blank.purpose = "   ".to_string();
        assert!(matches!(
            market.apply_for_loan(blank, &t),
            Err(LendingError::InvalidApplication { .. })
        ));

        assert!(matches!(
            LoanApplication::builder().borrower(borrower).build(),
            Err(LendingError::InvalidApplication { .. })
        ));
        assert!(market.loans().is_empty());
    }

    #[test]
    fn test_unbounded_tenure_rejected() {
        let (market, notifier) = marketplace();
        let t = time();
        let app = LoanApplication::builder()
            .borrower(Uuid::new_v4())
            .amount(Money::from_major(5_000))
            .tenure_months(u32::MAX)
            .rate(Rate::ZERO)
            .purpose("education")
            .credit_score(760)
            .build()
            .unwrap();

        assert!(matches!(
            market.apply_for_loan(app.clone(), &t),
            Err(LendingError::InvalidTerm { months: u32::MAX, .. })
        ));

        // a tiny nonzero rate fails the same way
        let mut slow = app;
        slow.annual_rate = Rate::from_bps(1);
        assert!(matches!(
            market.apply_for_loan(slow, &t),
            Err(LendingError::InvalidTerm { .. })
        ));
        assert!(market.loans().is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn test_review_cycle() {
        let (market, notifier) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();
        let loan = market.apply_for_loan(application(borrower, 10_000, 12), &t).unwrap();

        market.reject(loan.id, "incomplete documents", &t).unwrap();
        assert!(matches!(
            market.approve(loan.id, &t),
            Err(LendingError::IllegalTransition { .. })
        ));
        market.mark_pending(loan.id, &t).unwrap();
        let approved = market.approve(loan.id, &t).unwrap();
        assert_eq!(approved.status, LoanStatus::Approved);

        // received + three status updates
        assert_eq!(notifier.sent_to(borrower).len(), 4);
    }

    #[test]
    fn test_manual_disbursement_is_premature() {
        let (market, _) = marketplace();
        let t = time();
        let loan = market.apply_for_loan(application(Uuid::new_v4(), 10_000, 12), &t).unwrap();
        market.approve(loan.id, &t).unwrap();
        market.fund(loan.id, Uuid::new_v4(), Money::from_major(2_000), &t).unwrap();

        let before = market.loan(loan.id).unwrap();
        assert!(matches!(
            market.update_status(loan.id, LoanStatus::Disbursed, "manual", &t),
            Err(LendingError::PrematureDisbursement { .. })
        ));
        assert_eq!(market.loan(loan.id).unwrap(), before);
    }

    #[test]
    fn test_fund_requires_approval() {
        let (market, _) = marketplace();
        let t = time();
        let loan = market.apply_for_loan(application(Uuid::new_v4(), 10_000, 12), &t).unwrap();

        assert!(matches!(
            market.fund(loan.id, Uuid::new_v4(), Money::from_major(1_000), &t),
            Err(LendingError::IllegalTransition { .. })
        ));
        assert!(matches!(
            market.fund(Uuid::new_v4(), Uuid::new_v4(), Money::from_major(1_000), &t),
            Err(LendingError::LoanNotFound { .. })
        ));
    }

    #[test]
    fn test_debit_lender_wallet_when_configured() {
        let notifier = Arc::new(RecordingNotifier::new());
        let market = Marketplace::with_notifier(MarketplaceConfig::wallet_funded(), notifier).unwrap();
        let t = time();
        let borrower = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let loan = market.apply_for_loan(application(borrower, 10_000, 12), &t).unwrap();
        market.approve(loan.id, &t).unwrap();

        // no funds: nothing moves
        assert!(matches!(
            market.fund(loan.id, lender, Money::from_major(10_000), &t),
            Err(LendingError::InsufficientFunds { .. })
        ));
        assert_eq!(market.loan(loan.id).unwrap().amount_funded, Money::ZERO);

        market.deposit(lender, Money::from_major(12_000), "top up", &t).unwrap();
        let outcome = market.fund(loan.id, lender, Money::from_major(10_000), &t).unwrap();
        assert_eq!(outcome.status, LoanStatus::Disbursed);
        assert_eq!(market.balance(lender), Money::from_major(2_000));
        assert_eq!(market.balance(borrower), Money::from_major(10_000));
        assert_eq!(
            market.wallet(lender).unwrap().total_by_type(TransactionType::Funding),
            Money::from_major(10_000)
        );
    }

    #[test]
    fn test_failed_repayment_changes_nothing() {
        let (market, _) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let loan = market.apply_for_loan(application(borrower, 10_000, 12), &t).unwrap();
        market.approve(loan.id, &t).unwrap();
        market.fund(loan.id, lender, Money::from_major(10_000), &t).unwrap();

        // spend the disbursement so the installment cannot be covered
        market.withdraw(borrower, Money::from_major(9_500), "spent", &t).unwrap();
        let due = market.loan(loan.id).unwrap().schedule.lines[0].total_amount;
        let before = market.loan(loan.id).unwrap();

        assert!(matches!(
            market.repay(loan.id, borrower, due, &t),
            Err(LendingError::InsufficientFunds { .. })
        ));
        assert_eq!(market.loan(loan.id).unwrap(), before);
        assert_eq!(market.balance(lender), Money::ZERO);
        assert_eq!(market.balance(borrower), Money::from_major(500));
    }

    #[test]
    fn test_overpayment_goes_to_lenders() {
        let (market, _) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let loan = market.apply_for_loan(application(borrower, 10_000, 12), &t).unwrap();
        market.approve(loan.id, &t).unwrap();
        market.fund(loan.id, lender, Money::from_major(10_000), &t).unwrap();

        let due = market.loan(loan.id).unwrap().schedule.lines[0].total_amount;
        let paid = due + Money::from_decimal(dec!(100.00));
        let outcome = market.repay(loan.id, borrower, paid, &t).unwrap();

        assert_eq!(outcome.amount_paid, paid);
        assert_eq!(market.balance(lender), paid);
        assert_eq!(market.loan(loan.id).unwrap().paid_installments(), 1);
    }

    #[test]
    fn test_revise_terms_through_marketplace() {
        let (market, _) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();
        let loan = market.apply_for_loan(application(borrower, 10_000, 12), &t).unwrap();

        assert!(matches!(
            market.revise_terms(loan.id, Uuid::new_v4(), Money::from_major(9_000), 6, Rate::from_percentage(8), t.now(), &t),
            Err(LendingError::Unauthorized { .. })
        ));

        assert!(matches!(
            market.revise_terms(loan.id, borrower, Money::from_major(9_000), u32::MAX, Rate::ZERO, t.now(), &t),
            Err(LendingError::InvalidTerm { .. })
        ));

        let revised = market
            .revise_terms(loan.id, borrower, Money::from_major(9_000), 6, Rate::from_percentage(8), t.now(), &t)
            .unwrap();
        assert_eq!(revised.schedule.lines.len(), 6);
        assert_eq!(revised.amount_requested, Money::from_major(9_000));
    }

    #[test]
    fn test_queries_and_average_score() {
        let (market, _) = marketplace();
        let t = time();
        let borrower = Uuid::new_v4();
        let lender = Uuid::new_v4();

        let mut first = application(borrower, 10_000, 12);
        first.credit_score = Some(700);
        let mut second = application(borrower, 20_000, 12);
        second.credit_score = Some(751);
        let a = market.apply_for_loan(first, &t).unwrap();
        market.apply_for_loan(second, &t).unwrap();
        market.apply_for_loan(application(Uuid::new_v4(), 5_000, 6), &t).unwrap();

        market.approve(a.id, &t).unwrap();
        market.fund(a.id, lender, Money::from_major(1_000), &t).unwrap();

        assert_eq!(market.loans_for_borrower(borrower).len(), 2);
        assert_eq!(market.loans_for_lender(lender).len(), 1);
        assert_eq!(market.open_loans().len(), 1);
        // (700 + 751) / 2 = 725.5
        assert_eq!(market.average_credit_score(borrower), 726);
        assert_eq!(market.average_credit_score(Uuid::new_v4()), 700);

        let stats = market.stats();
        assert_eq!(stats.total_loans, 3);
        assert_eq!(stats.pending_loans, 2);
        assert_eq!(stats.funding_loans, 1);
        assert_eq!(stats.total_funded, Money::from_major(1_000));
    }

    #[test]
    fn test_lend_offers() {
        let (market, _) = marketplace();
        let t = time();
        let control = t.test_control().unwrap();
        let lender = Uuid::new_v4();

        let first = market
            .post_offer(lender, Money::from_major(25_000), 12, Rate::from_percentage(11), "salaried only", &t)
            .unwrap();
        control.advance(chrono::Duration::minutes(5));
        let second = market
            .post_offer(lender, Money::from_major(5_000), 6, Rate::ZERO, "", &t)
            .unwrap();
        market
            .post_offer(Uuid::new_v4(), Money::from_major(8_000), 24, Rate::from_percentage(14), "", &t)
            .unwrap();

        assert!(matches!(
            market.post_offer(lender, Money::from_major(500), 12, Rate::from_percentage(10), "", &t),
            Err(LendingError::BelowMinimum { .. })
        ));
        assert!(matches!(
            market.post_offer(lender, Money::from_major(5_000), 0, Rate::from_percentage(10), "", &t),
            Err(LendingError::InvalidTerm { .. })
        ));

        let mine: Vec<OfferId> = market.offers_for_lender(lender).iter().map(|o| o.id).collect();
        assert_eq!(mine, vec![second.id, first.id]);
        assert_eq!(market.offers().len(), 3);

        let funded = market.update_offer_status(first.id, OfferStatus::Funded, &t).unwrap();
        assert_eq!(funded.status, OfferStatus::Funded);
        assert_eq!(market.offer(first.id).unwrap().status, OfferStatus::Funded);

        market.remove_offer(second.id).unwrap();
        assert!(matches!(
            market.offer(second.id),
            Err(LendingError::OfferNotFound { .. })
        ));
        assert!(matches!(
            market.update_offer_status(second.id, OfferStatus::Closed, &t),
            Err(LendingError::OfferNotFound { .. })
        ));
        assert_eq!(market.offers_for_lender(lender).len(), 1);
        // offers never touch loans or wallets
        assert!(market.loans().is_empty());
        assert_eq!(market.balance(lender), Money::ZERO);
    }

    #[test]
    fn test_notifier_failure_does_not_fail_operation() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let market = Marketplace::with_notifier(MarketplaceConfig::standard(), notifier.clone()).unwrap();
        let borrower = Uuid::new_v4();

        let loan = market.apply_for_loan(application(borrower, 10_000, 12), &time()).unwrap();
        assert_eq!(market.loan(loan.id).unwrap().status, LoanStatus::Pending);
        assert_eq!(notifier.sent().len(), 1);
    }
}
