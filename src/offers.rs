use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FundingRules;
use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::types::{OfferId, OfferStatus, UserId};

/// remarks longer than this are cut, not rejected
pub const MAX_REMARKS_CHARS: usize = 500;

/// a lender's standing offer to lend on stated terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LendOffer {
    pub id: OfferId,
    pub lender_id: UserId,
    pub amount: Money,
    pub tenure_months: u32,
    pub annual_rate: Rate,
    pub remarks: String,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LendOffer {
    /// validate terms and open the offer as available
    pub fn new(
        lender_id: UserId,
        amount: Money,
        tenure_months: u32,
        annual_rate: Rate,
        remarks: &str,
        rules: &FundingRules,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if amount < rules.minimum_offer_amount {
            return Err(LendingError::BelowMinimum {
                minimum: rules.minimum_offer_amount,
                provided: amount,
            });
        }
        rules.check_tenure(amount, tenure_months)?;
        if annual_rate.is_negative() {
            return Err(LendingError::InvalidRate { rate: annual_rate });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            lender_id,
            amount,
            tenure_months,
            annual_rate,
            remarks: remarks.chars().take(MAX_REMARKS_CHARS).collect(),
            status: OfferStatus::Available,
            created_at: now,
            updated_at: now,
        })
    }
}

/// registry of lend offers
#[derive(Debug, Default)]
pub struct OfferBook {
    offers: RwLock<HashMap<OfferId, LendOffer>>,
}

impl OfferBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, offer: LendOffer) {
        debug!("lend offer {} posted by {}", offer.id, offer.lender_id);
        self.offers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(offer.id, offer);
    }

    pub fn get(&self, offer_id: OfferId) -> Result<LendOffer> {
        self.offers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&offer_id)
            .cloned()
            .ok_or(LendingError::OfferNotFound { offer_id })
    }

    /// offers matching `filter`, newest first
    pub fn list(&self, filter: impl Fn(&LendOffer) -> bool) -> Vec<LendOffer> {
        let mut offers: Vec<LendOffer> = self
            .offers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|offer| filter(offer))
            .cloned()
            .collect();
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        offers
    }

    /// any status may be set from any other
    pub fn set_status(
        &self,
        offer_id: OfferId,
        status: OfferStatus,
        now: DateTime<Utc>,
    ) -> Result<LendOffer> {
        let mut offers = self.offers.write().unwrap_or_else(PoisonError::into_inner);
        let offer = offers
            .get_mut(&offer_id)
            .ok_or(LendingError::OfferNotFound { offer_id })?;
        offer.status = status;
        offer.updated_at = now;
        Ok(offer.clone())
    }

    pub fn remove(&self, offer_id: OfferId) -> Result<LendOffer> {
        self.offers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&offer_id)
            .ok_or(LendingError::OfferNotFound { offer_id })
    }

    pub fn len(&self) -> usize {
        self.offers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
