use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::payments::MAX_TERM_MONTHS;

/// marketplace configuration
///
/// Passed explicitly into the marketplace; nothing in the core reads
/// process environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    pub risk: RiskPolicy,
    pub funding: FundingRules,
    pub credit_score: CreditScoreBounds,
}

/// additive risk scoring table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// bands checked in order, first match wins
    pub credit_score_bands: Vec<ScoreBand>,
    /// bands checked in order, first match wins
    pub amount_bands: Vec<AmountBand>,
    /// bands checked in order, first match wins
    pub tenure_bands: Vec<TenureBand>,
    /// purposes compared case-insensitively
    pub risky_purposes: Vec<String>,
    pub risky_purpose_points: u32,
    /// score at or above which an application is rejected
    pub rejection_threshold: u32,
}

/// points when the credit score is strictly below `below`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub below: u16,
    pub points: u32,
}

/// points when the requested amount is strictly above `above`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBand {
    pub above: Money,
    pub points: u32,
}

/// points when the tenure is strictly above `above_months`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenureBand {
    pub above_months: u32,
    pub points: u32,
}

/// funding limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRules {
    pub minimum_loan_amount: Money,
    /// longest tenure a loan application or lend offer may ask for
    #[serde(default = "default_maximum_tenure_months")]
    pub maximum_tenure_months: u32,
    /// smallest lender contribution, except one that exactly closes the gap
    pub minimum_contribution: Money,
    /// debit the lender's wallet (type `funding`) when a contribution is accepted
    pub debit_lender_wallet: bool,
    #[serde(default = "default_minimum_offer_amount")]
    pub minimum_offer_amount: Money,
}

fn default_maximum_tenure_months() -> u32 {
    360
}

fn default_minimum_offer_amount() -> Money {
    Money::from_major(1_000)
}

/// accepted bureau score range and the fallback used outside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditScoreBounds {
    pub minimum: u16,
    pub maximum: u16,
    pub default_score: u16,
}

impl RiskPolicy {
    /// the marketplace's standard scoring table
    pub fn standard() -> Self {
        Self {
            credit_score_bands: vec![
                ScoreBand { below: 650, points: 3 },
                ScoreBand { below: 700, points: 2 },
            ],
            amount_bands: vec![
                AmountBand { above: Money::from_major(500_000), points: 2 },
                AmountBand { above: Money::from_major(200_000), points: 1 },
            ],
            tenure_bands: vec![
                TenureBand { above_months: 36, points: 2 },
                TenureBand { above_months: 24, points: 1 },
            ],
            risky_purposes: ["vacation", "shopping", "wedding", "luxury"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            risky_purpose_points: 2,
            rejection_threshold: 5,
        }
    }
}

impl FundingRules {
    pub fn standard() -> Self {
        Self {
            minimum_loan_amount: Money::from_major(1_000),
            maximum_tenure_months: default_maximum_tenure_months(),
            minimum_contribution: Money::from_major(100),
            debit_lender_wallet: false,
            minimum_offer_amount: default_minimum_offer_amount(),
        }
    }

    /// `InvalidTerm` unless `1 <= months <= maximum_tenure_months`
    pub fn check_tenure(&self, principal: Money, months: u32) -> Result<()> {
        if months == 0 || months > self.maximum_tenure_months {
            return Err(LendingError::InvalidTerm { principal, months });
        }
        Ok(())
    }
}

impl CreditScoreBounds {
    pub fn standard() -> Self {
        Self {
            minimum: 300,
            maximum: 900,
            default_score: 700,
        }
    }

    /// the supplied score if it lies inside the bounds, otherwise the default
    pub fn resolve(&self, score: Option<u16>) -> (u16, bool) {
        match score {
            Some(s) if (self.minimum..=self.maximum).contains(&s) => (s, false),
            _ => (self.default_score, true),
        }
    }
}

impl MarketplaceConfig {
    /// standard marketplace configuration
    pub fn standard() -> Self {
        Self {
            risk: RiskPolicy::standard(),
            funding: FundingRules::standard(),
            credit_score: CreditScoreBounds::standard(),
        }
    }

    /// standard configuration with lender wallets debited on funding
    pub fn wallet_funded() -> Self {
        let mut config = Self::standard();
        config.funding.debit_lender_wallet = true;
        config
    }

    /// parse and validate a json configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            LendingError::InvalidConfiguration {
                message: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let bounds = &self.credit_score;
        if bounds.minimum > bounds.maximum {
            return Err(LendingError::InvalidConfiguration {
                message: format!(
                    "credit score minimum {} exceeds maximum {}",
                    bounds.minimum, bounds.maximum
                ),
            });
        }
        if !(bounds.minimum..=bounds.maximum).contains(&bounds.default_score) {
            return Err(LendingError::InvalidConfiguration {
                message: format!("default credit score {} outside bounds", bounds.default_score),
            });
        }
        if !self.funding.minimum_loan_amount.is_positive() {
            return Err(LendingError::InvalidConfiguration {
                message: "minimum loan amount must be positive".to_string(),
            });
        }
        if !(1..=MAX_TERM_MONTHS).contains(&self.funding.maximum_tenure_months) {
            return Err(LendingError::InvalidConfiguration {
                message: format!(
                    "maximum tenure must be between 1 and {} months",
                    MAX_TERM_MONTHS
                ),
            });
        }
        if !self.funding.minimum_offer_amount.is_positive() {
            return Err(LendingError::InvalidConfiguration {
                message: "minimum offer amount must be positive".to_string(),
            });
        }
        if self.funding.minimum_contribution.is_negative() {
            return Err(LendingError::InvalidConfiguration {
                message: "minimum contribution must not be negative".to_string(),
            });
        }
        if self.risk.rejection_threshold == 0 {
            return Err(LendingError::InvalidConfiguration {
                message: "rejection threshold of zero rejects every application".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self::standard()
    }
}
