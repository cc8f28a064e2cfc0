use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::types::UserId;

/// a lender's part of a repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderShare {
    pub lender_id: UserId,
    pub contribution: Money,
    pub amount: Money,
}

/// split `amount` across contributions in proportion to `contribution / base`
///
/// Each share is rounded to the minor unit; the rounding residue goes to the
/// largest contribution (earliest on ties) so the shares sum exactly to
/// `amount`.
pub fn split_pro_rata(
    amount: Money,
    contributions: &[(UserId, Money)],
    base: Money,
) -> Result<Vec<LenderShare>> {
    if !amount.is_positive() {
        return Err(LendingError::InvalidAmount { amount });
    }
    if !base.is_positive() {
        return Err(LendingError::InvalidAmount { amount: base });
    }
    if contributions.is_empty() {
        return Ok(Vec::new());
    }

    let mut shares: Vec<LenderShare> = contributions
        .iter()
        .map(|&(lender_id, contribution)| LenderShare {
            lender_id,
            contribution,
            amount: amount.mul_ratio(contribution, base),
        })
        .collect();

    let distributed: Money = shares.iter().map(|s| s.amount).sum();
    let residue = amount - distributed;

    if !residue.is_zero() {
        let mut largest = 0;
        for (idx, share) in shares.iter().enumerate() {
            if share.contribution > shares[largest].contribution {
                largest = idx;
            }
        }
        shares[largest].amount += residue;
        if shares[largest].amount.is_negative() {
            return Err(LendingError::InvalidAmount { amount });
        }
    }

    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_sixty_forty_split() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let shares = split_pro_rata(
            Money::from_decimal(dec!(10537.10)),
            &[(a, Money::from_major(60_000)), (b, Money::from_major(40_000))],
            Money::from_major(100_000),
        )
        .unwrap();

        assert_eq!(shares[0].amount, Money::from_decimal(dec!(6322.26)));
        assert_eq!(shares[1].amount, Money::from_decimal(dec!(4214.84)));
    }

    #[test]
    fn test_residue_goes_to_largest_contributor() {
        let lenders: Vec<UserId> = (0..3).map(|_| Uuid::new_v4()).collect();
        // thirds of 100.00 round to 33.33 each, leaving 0.01
        let shares = split_pro_rata(
            Money::from_major(100),
            &[
                (lenders[0], Money::from_major(300)),
                (lenders[1], Money::from_major(300)),
                (lenders[2], Money::from_major(300)),
            ],
            Money::from_major(900),
        )
        .unwrap();

        let total: Money = shares.iter().map(|s| s.amount).sum();
        assert_eq!(total, Money::from_major(100));
        // tie broken by earliest contribution
        assert_eq!(shares[0].amount, Money::from_decimal(dec!(33.34)));
        assert_eq!(shares[1].amount, Money::from_decimal(dec!(33.33)));
    }

    #[test]
    fn test_negative_residue() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // each share rounds 0.005 up, one cent too many overall
        let shares = split_pro_rata(
            Money::from_decimal(dec!(0.03)),
            &[
                (a, Money::from_major(1)),
                (b, Money::from_major(4)),
                (c, Money::from_major(1)),
            ],
            Money::from_major(6),
        )
        .unwrap();

        let total: Money = shares.iter().map(|s| s.amount).sum();
        assert_eq!(total, Money::from_decimal(dec!(0.03)));
        assert_eq!(shares[0].amount, Money::from_decimal(dec!(0.01)));
        assert_eq!(shares[1].amount, Money::from_decimal(dec!(0.01)));
        assert_eq!(shares[2].amount, Money::from_decimal(dec!(0.01)));
    }

    #[test]
    fn test_rejects_non_positive() {
        let a = Uuid::new_v4();
        assert!(split_pro_rata(Money::ZERO, &[(a, Money::from_major(1))], Money::from_major(1)).is_err());
        assert!(split_pro_rata(Money::from_major(1), &[(a, Money::from_major(1))], Money::ZERO).is_err());
        assert!(split_pro_rata(Money::from_major(1), &[], Money::from_major(1)).unwrap().is_empty());
    }
}
