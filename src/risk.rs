use serde::{Deserialize, Serialize};

use crate::config::RiskPolicy;
use crate::decimal::Money;

/// inputs to the risk check
#[derive(Debug, Clone, PartialEq)]
pub struct RiskInput<'a> {
    pub amount: Money,
    pub tenure_months: u32,
    pub credit_score: u16,
    pub purpose: &'a str,
}

/// outcome of the risk check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub rejected: bool,
    pub score: u32,
    pub reason: String,
    /// which rules contributed points
    pub factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskFactor {
    CreditScore { points: u32 },
    Amount { points: u32 },
    Tenure { points: u32 },
    Purpose { points: u32 },
}

impl RiskFactor {
    pub fn points(&self) -> u32 {
        match *self {
            RiskFactor::CreditScore { points }
            | RiskFactor::Amount { points }
            | RiskFactor::Tenure { points }
            | RiskFactor::Purpose { points } => points,
        }
    }
}

/// scores loan applications against a fixed policy table
pub struct RiskEvaluator {
    policy: RiskPolicy,
}

impl RiskEvaluator {
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// additive score; rejected when the score reaches the threshold
    pub fn evaluate(&self, input: &RiskInput<'_>) -> RiskAssessment {
        let mut factors = Vec::new();

        if let Some(band) = self
            .policy
            .credit_score_bands
            .iter()
            .find(|b| input.credit_score < b.below)
        {
            factors.push(RiskFactor::CreditScore { points: band.points });
        }

        if let Some(band) = self.policy.amount_bands.iter().find(|b| input.amount > b.above) {
            factors.push(RiskFactor::Amount { points: band.points });
        }

        if let Some(band) = self
            .policy
            .tenure_bands
            .iter()
            .find(|b| input.tenure_months > b.above_months)
        {
            factors.push(RiskFactor::Tenure { points: band.points });
        }

        let purpose = input.purpose.trim().to_lowercase();
        if self
            .policy
            .risky_purposes
            .iter()
            .any(|p| p.to_lowercase() == purpose)
        {
            factors.push(RiskFactor::Purpose {
                points: self.policy.risky_purpose_points,
            });
        }

        let score = factors.iter().map(RiskFactor::points).sum();
        let rejected = score >= self.policy.rejection_threshold;

        RiskAssessment {
            rejected,
            score,
            reason: if rejected {
                "Loan auto-rejected due to high risk factors".to_string()
            } else {
                "Low risk".to_string()
            },
            factors,
        }
    }
}

impl Default for RiskEvaluator {
    fn default() -> Self {
        Self::new(RiskPolicy::standard())
    }
}
