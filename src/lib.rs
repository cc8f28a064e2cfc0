pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod loan;
pub mod marketplace;
pub mod notify;
pub mod offers;
pub mod payments;
pub mod risk;
pub mod serialization;
pub mod state;
pub mod stats;
pub mod types;
pub mod wallet;

// re-export key types
pub use config::{CreditScoreBounds, FundingRules, MarketplaceConfig, RiskPolicy};
pub use decimal::{Money, Rate};
pub use errors::{LendingError, NotifyError, Result};
pub use events::{Event, EventStore};
pub use loan::{FundingOutcome, LedgerEntry, LenderContribution, Loan, RepaymentOutcome};
pub use marketplace::{LoanApplication, LoanApplicationBuilder, Marketplace};
pub use notify::{LogNotifier, Notification, Notifier, NullNotifier, RecordingNotifier};
pub use offers::{LendOffer, OfferBook};
pub use payments::{
    calculate_emi, split_pro_rata, AmortizationSchedule, EmiLine, LenderShare, MAX_TERM_MONTHS,
};
pub use risk::{RiskAssessment, RiskEvaluator, RiskFactor, RiskInput};
pub use serialization::{LoanView, WalletView};
pub use state::{LoanStateMachine, TransitionKind};
pub use stats::DashboardStats;
pub use types::{
    Direction, LedgerEntryType, LoanId, LoanStatus, OfferId, OfferStatus, TransactionType, UserId,
};
pub use wallet::{Posting, Wallet, WalletLedger, WalletTransaction};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
