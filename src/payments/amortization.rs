use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};

/// longest schedule the engine will build (100 years)
pub const MAX_TERM_MONTHS: u32 = 1_200;

/// one installment of an amortization schedule
///
/// Field names on the wire (`month, dueDate, principal, interest, amount,
/// paid, paidOn`) are shared with existing consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmiLine {
    pub month: u32,
    pub due_date: DateTime<Utc>,
    #[serde(rename = "principal")]
    pub principal_portion: Money,
    #[serde(rename = "interest")]
    pub interest_portion: Money,
    #[serde(rename = "amount")]
    pub total_amount: Money,
    pub paid: bool,
    pub paid_on: Option<DateTime<Utc>>,
}

/// amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_months: u32,
    pub anchor_date: DateTime<Utc>,
    pub emi: Money,
    pub total_payment: Money,
    pub total_interest: Money,
    pub lines: Vec<EmiLine>,
}

impl AmortizationSchedule {
    /// generate an equal-installment schedule
    ///
    /// Line `i` falls due `i` calendar months after `anchor_date`. The final
    /// line absorbs the remaining balance so principal portions sum exactly
    /// to `principal`; `total_payment` is the sum of the line amounts.
    pub fn generate(
        principal: Money,
        annual_rate: Rate,
        term_months: u32,
        anchor_date: DateTime<Utc>,
    ) -> Result<Self> {
        let emi = calculate_emi(principal, annual_rate, term_months)?;
        let monthly_rate = annual_rate.monthly_fraction();

        let mut lines = Vec::with_capacity(term_months as usize);
        let mut remaining = principal;

        for month in 1..=term_months {
            let due_date = add_months(anchor_date, month).ok_or(LendingError::InvalidTerm {
                principal,
                months: term_months,
            })?;
            let interest_portion = Money::from_decimal(remaining.as_decimal() * monthly_rate);

            let principal_portion = if month == term_months {
                remaining
            } else {
                (emi - interest_portion).min(remaining).max(Money::ZERO)
            };

            lines.push(EmiLine {
                month,
                due_date,
                principal_portion,
                interest_portion,
                total_amount: principal_portion + interest_portion,
                paid: false,
                paid_on: None,
            });

            remaining -= principal_portion;
        }

        let total_interest = lines.iter().map(|l| l.interest_portion).sum();
        let total_payment = lines.iter().map(|l| l.total_amount).sum();

        Ok(Self {
            principal,
            annual_rate,
            term_months,
            anchor_date,
            emi,
            total_payment,
            total_interest,
            lines,
        })
    }

    /// get line for a given month (1-based)
    pub fn line(&self, month: u32) -> Option<&EmiLine> {
        month
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx as usize))
    }

    /// outstanding principal after the given month's installment
    pub fn balance_after(&self, month: u32) -> Money {
        let repaid: Money = self
            .lines
            .iter()
            .take(month as usize)
            .map(|l| l.principal_portion)
            .sum();
        self.principal - repaid
    }

    /// first unpaid line in month order
    pub fn next_unpaid(&self) -> Option<&EmiLine> {
        self.lines.iter().find(|l| !l.paid)
    }

    pub fn paid_count(&self) -> usize {
        self.lines.iter().filter(|l| l.paid).count()
    }

    pub fn has_payments(&self) -> bool {
        self.lines.iter().any(|l| l.paid)
    }

    pub fn is_fully_paid(&self) -> bool {
        self.lines.iter().all(|l| l.paid)
    }

    /// sum of unpaid installment amounts
    pub fn unpaid_total(&self) -> Money {
        self.lines
            .iter()
            .filter(|l| !l.paid)
            .map(|l| l.total_amount)
            .sum()
    }

    /// mark the first unpaid line as paid, returning its month
    pub(crate) fn settle_next(&mut self, paid_on: DateTime<Utc>) -> Option<u32> {
        let line = self.lines.iter_mut().find(|l| !l.paid)?;
        line.paid = true;
        line.paid_on = Some(paid_on);
        Some(line.month)
    }
}

/// calculate EMI amount, rounded to the minor unit
pub fn calculate_emi(principal: Money, annual_rate: Rate, months: u32) -> Result<Money> {
    if months == 0 || months > MAX_TERM_MONTHS || !principal.is_positive() {
        return Err(LendingError::InvalidTerm { principal, months });
    }
    if annual_rate.is_negative() {
        return Err(LendingError::InvalidRate { rate: annual_rate });
    }

    let r = annual_rate.monthly_fraction();

    if r.is_zero() {
        return Ok(principal / Decimal::from(months));
    }

    // EMI = P * r * (1 + r)^n / ((1 + r)^n - 1)
    let compound = compound_factor(r, months).ok_or(LendingError::InvalidTerm {
        principal,
        months,
    })?;

    let numerator = principal
        .as_decimal()
        .checked_mul(r)
        .and_then(|v| v.checked_mul(compound))
        .ok_or(LendingError::InvalidTerm { principal, months })?;
    let denominator = compound - Decimal::ONE;

    Ok(Money::from_decimal(numerator / denominator))
}

/// (1 + r)^n, `None` on overflow
fn compound_factor(r: Decimal, n: u32) -> Option<Decimal> {
    let base = Decimal::ONE + r;
    let mut compound = Decimal::ONE;
    for _ in 0..n {
        compound = compound.checked_mul(base)?;
    }
    Some(compound)
}

/// add calendar months, clamping to the end of shorter months
fn add_months(date: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    date.checked_add_months(Months::new(months))
}
