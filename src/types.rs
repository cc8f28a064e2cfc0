use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a marketplace user (borrower, lender or admin)
pub type UserId = Uuid;

pub type OfferId = Uuid;

/// loan status
///
/// The lowercase names are a wire contract shared with existing consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// application received, awaiting review
    Pending,
    /// open for funding
    Approved,
    /// rejected by review or by the risk check
    Rejected,
    /// partially funded
    Funding,
    /// fully funded and paid out to the borrower
    Disbursed,
    /// every installment paid
    Closed,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 6] = [
        LoanStatus::Pending,
        LoanStatus::Approved,
        LoanStatus::Rejected,
        LoanStatus::Funding,
        LoanStatus::Disbursed,
        LoanStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Funding => "funding",
            LoanStatus::Disbursed => "disbursed",
            LoanStatus::Closed => "closed",
        }
    }

    /// whether lenders may contribute in this status
    pub fn is_open_for_funding(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Funding)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoanStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown loan status: {}", s))
    }
}

/// kind of value movement recorded on a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryType {
    Disbursement,
    Repayment,
    Penalty,
    Refund,
}

/// kind of value movement recorded on a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    LoanDisbursement,
    LoanRepayment,
    Funding,
    Fee,
    Refund,
}

/// direction of a wallet movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// status of a lender's standing offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Available,
    Funded,
    Closed,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Available => "available",
            OfferStatus::Funded => "funded",
            OfferStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [OfferStatus::Available, OfferStatus::Funded, OfferStatus::Closed]
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown offer status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        for status in LoanStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
            assert_eq!(status.as_str().parse::<LoanStatus>().unwrap(), status);
        }
        assert!("settled".parse::<LoanStatus>().is_err());
    }

    #[test]
    fn test_transaction_type_wire_names() {
        let json = serde_json::to_string(&TransactionType::LoanRepayment).unwrap();
        assert_eq!(json, "\"loan_repayment\"");
    }

    #[test]
    fn test_offer_status_names() {
        assert_eq!(serde_json::to_string(&OfferStatus::Funded).unwrap(), "\"funded\"");
        assert_eq!("closed".parse::<OfferStatus>().unwrap(), OfferStatus::Closed);
        assert!("open".parse::<OfferStatus>().is_err());
    }

    #[test]
    fn test_open_for_funding() {
        assert!(LoanStatus::Approved.is_open_for_funding());
        assert!(LoanStatus::Funding.is_open_for_funding());
        assert!(!LoanStatus::Pending.is_open_for_funding());
        assert!(!LoanStatus::Disbursed.is_open_for_funding());
    }
}
