//! Pure fee math over exact decimal amounts.
//!
//! §4.3: `platform_fee + processing_fee + net_amount == amount` must hold
//! after rounding. Rounding residuals are absorbed into `net_amount`, never
//! into the two fee components, so the platform's and processor's own
//! percentages are always exactly what was configured before rounding.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Deployment-time fee configuration, loaded via `jobflow-config`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub platform_fee_percent: Decimal,
    pub processing_fee_percent: Decimal,
    pub processing_fee_fixed: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_fee_percent: dec!(10.0),
            processing_fee_percent: dec!(2.6),
            processing_fee_fixed: dec!(0.10),
        }
    }
}

/// The three-way split of a gross amount.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub platform_fee: Decimal,
    pub processing_fee: Decimal,
    pub net_amount: Decimal,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Splits `amount` per `schedule`. `platform_fee` and `processing_fee` are
/// each rounded independently; `net_amount` is computed as the remainder so
/// the three always sum back to `amount` exactly, never re-rounded itself.
pub fn calculate(amount: Decimal, schedule: &FeeSchedule) -> FeeBreakdown {
    let platform_fee = round2(amount * schedule.platform_fee_percent / dec!(100));
    let processing_fee = round2(
        amount * schedule.processing_fee_percent / dec!(100) + schedule.processing_fee_fixed,
    );
    let net_amount = amount - platform_fee - processing_fee;

    FeeBreakdown {
        platform_fee,
        processing_fee,
        net_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_spec_worked_example() {
        let breakdown = calculate(dec!(100.00), &FeeSchedule::default());
        assert_eq!(breakdown.platform_fee, dec!(10.00));
        assert_eq!(breakdown.processing_fee, dec!(2.70));
        assert_eq!(breakdown.net_amount, dec!(87.30));
    }

    #[test]
    fn components_always_sum_to_the_gross_amount() {
        let schedule = FeeSchedule::default();
        for amount in [dec!(0.01), dec!(1.00), dec!(33.33), dec!(9999.99)] {
            let breakdown = calculate(amount, &schedule);
            assert_eq!(
                breakdown.platform_fee + breakdown.processing_fee + breakdown.net_amount,
                amount
            );
        }
    }

    #[test]
    fn rounding_residual_is_absorbed_into_net_amount() {
        // 33.335% of platform fee would land exactly on a rounding
        // midpoint; half-away-from-zero must round up, and the residual
        // stays out of the two fee fields entirely.
        let schedule = FeeSchedule {
            platform_fee_percent: dec!(33.335),
            processing_fee_percent: dec!(0),
            processing_fee_fixed: dec!(0),
        };
        let breakdown = calculate(dec!(100.00), &schedule);
        assert_eq!(breakdown.platform_fee, dec!(33.34));
        assert_eq!(breakdown.processing_fee, dec!(0.00));
        assert_eq!(breakdown.net_amount, dec!(66.66));
    }

    #[test]
    fn custom_schedule_is_honored() {
        let schedule = FeeSchedule {
            platform_fee_percent: dec!(15.0),
            processing_fee_percent: dec!(3.0),
            processing_fee_fixed: dec!(0.30),
        };
        let breakdown = calculate(dec!(200.00), &schedule);
        assert_eq!(breakdown.platform_fee, dec!(30.00));
        assert_eq!(breakdown.processing_fee, dec!(6.30));
        assert_eq!(breakdown.net_amount, dec!(163.70));
    }
}
