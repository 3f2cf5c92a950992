use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::TransactionType;

/// Zero, never null, when the underlying set of amounts is empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountBreakdown {
    pub total: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub average: Decimal,
}

impl AmountBreakdown {
    pub fn zero() -> Self {
        Self {
            total: Decimal::ZERO,
            min: Decimal::ZERO,
            max: Decimal::ZERO,
            average: Decimal::ZERO,
        }
    }

    pub fn from_amounts(amounts: &[Decimal]) -> Self {
        if amounts.is_empty() {
            return Self::zero();
        }
        let total: Decimal = amounts.iter().copied().sum();
        let min = amounts.iter().copied().fold(amounts[0], Decimal::min);
        let max = amounts.iter().copied().fold(amounts[0], Decimal::max);
        let average = total / Decimal::from(amounts.len() as u64);
        Self {
            total,
            min,
            max,
            average,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStats {
    pub account_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_transactions: u64,
    pub completed_transactions: u64,
    pub pending_transactions: u64,
    pub failed_transactions: u64,
    pub reversed_transactions: u64,
    pub amount_in: AmountBreakdown,
    pub amount_out: AmountBreakdown,
    pub counts_by_type: HashMap<TransactionType, u64>,
    pub success_rate_percent: Decimal,
    pub rolling_daily_total: Decimal,
    pub rolling_monthly_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_transactions: u64,
    pub completed_transactions: u64,
    pub pending_transactions: u64,
    pub failed_transactions: u64,
    pub reversed_transactions: u64,
    pub amount: AmountBreakdown,
    pub counts_by_type: HashMap<TransactionType, u64>,
    pub success_rate_percent: Decimal,
    pub rolling_daily_total: Decimal,
    pub rolling_monthly_total: Decimal,
}

/// Computes `completed / total * 100`, zero when there are no transactions at all
/// (never a division-by-zero panic, never null in the response).
pub fn success_rate_percent(total: u64, completed: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(completed) * Decimal::ONE_HUNDRED / Decimal::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_of_empty_amounts_is_zero_not_panic() {
        let breakdown = AmountBreakdown::from_amounts(&[]);
        assert_eq!(breakdown.total, Decimal::ZERO);
        assert_eq!(breakdown.average, Decimal::ZERO);
    }

    #[test]
    fn breakdown_computes_min_max_average() {
        let amounts = vec![Decimal::new(100, 0), Decimal::new(300, 0), Decimal::new(200, 0)];
        let breakdown = AmountBreakdown::from_amounts(&amounts);
        assert_eq!(breakdown.total, Decimal::new(600, 0));
        assert_eq!(breakdown.min, Decimal::new(100, 0));
        assert_eq!(breakdown.max, Decimal::new(300, 0));
        assert_eq!(breakdown.average, Decimal::new(200, 0));
    }

    #[test]
    fn success_rate_is_zero_when_no_transactions() {
        assert_eq!(success_rate_percent(0, 0), Decimal::ZERO);
    }

    #[test]
    fn success_rate_is_a_percentage() {
        assert_eq!(success_rate_percent(4, 3), Decimal::new(75, 0));
    }
}
