use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::loan::Loan;
use crate::types::LoanStatus;

/// marketplace-wide aggregates for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_loans: usize,
    pub pending_loans: usize,
    pub approved_loans: usize,
    pub rejected_loans: usize,
    pub funding_loans: usize,
    pub disbursed_loans: usize,
    pub closed_loans: usize,
    /// requested amount of loans currently approved
    pub total_amount_approved: Money,
    /// requested amount of loans currently disbursed
    pub total_amount_disbursed: Money,
    /// funded amount across every loan
    pub total_funded: Money,
    pub total_wallets: usize,
}

impl DashboardStats {
    pub fn collect<'a>(loans: impl IntoIterator<Item = &'a Loan>, total_wallets: usize) -> Self {
        let mut stats = Self {
            total_wallets,
            ..Self::default()
        };

        for loan in loans {
            stats.total_loans += 1;
            stats.total_funded += loan.amount_funded;
            match loan.status {
                LoanStatus::Pending => stats.pending_loans += 1,
                LoanStatus::Approved => {
                    stats.approved_loans += 1;
                    stats.total_amount_approved += loan.amount_requested;
                }
                LoanStatus::Rejected => stats.rejected_loans += 1,
                LoanStatus::Funding => stats.funding_loans += 1,
                LoanStatus::Disbursed => {
                    stats.disbursed_loans += 1;
                    stats.total_amount_disbursed += loan.amount_requested;
                }
                LoanStatus::Closed => stats.closed_loans += 1,
            }
        }

        stats
    }

    pub fn count(&self, status: LoanStatus) -> usize {
        match status {
            LoanStatus::Pending => self.pending_loans,
            LoanStatus::Approved => self.approved_loans,
            LoanStatus::Rejected => self.rejected_loans,
            LoanStatus::Funding => self.funding_loans,
            LoanStatus::Disbursed => self.disbursed_loans,
            LoanStatus::Closed => self.closed_loans,
        }
    }
}
