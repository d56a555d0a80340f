//! Turning external signal into an automatic leaf score.

use rand::Rng;
use rust_decimal::Decimal;

use crate::model::{AutomationKind, AutomationRule};

const MINUTES_PER_HOUR: i64 = 60;
const ROLL_RESOLUTION: u32 = 100_000;

/// Raw signal measured for one subject over one milestone window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A roll in `[0, 1)`.
    Roll(Decimal),
    Minutes(Decimal),
    NetLines(i64),
}

/// Uniform roll in `[0, 1)` with five decimal places.
pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    Decimal::new(i64::from(rng.gen_range(0..ROLL_RESOLUTION)), 5)
}

/// `min(1, raw / amount_needed)`, floored at zero.
///
/// A non-positive `amount_needed` has no meaningful ratio and yields zero.
#[must_use]
pub fn clamped_ratio(raw: Decimal, amount_needed: i64) -> Decimal {
    if amount_needed <= 0 || raw <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    raw.checked_div(Decimal::from(amount_needed))
        .map_or(Decimal::ONE, |ratio| ratio.min(Decimal::ONE))
}

/// Score a rule against its signal, scaled to the category total.
///
/// Time is compared in hours, lines as a plain count. A signal that does
/// not match the rule kind scores zero.
#[must_use]
pub fn automatic_value(rule: &AutomationRule, total: Decimal, signal: Signal) -> Decimal {
    let ratio = match (rule.kind, signal) {
        (AutomationKind::Random, Signal::Roll(roll)) => roll,
        (AutomationKind::TimeSpent, Signal::Minutes(minutes)) => {
            clamped_ratio(minutes / Decimal::from(MINUTES_PER_HOUR), rule.amount_needed)
        }
        (AutomationKind::LinesChanged, Signal::NetLines(lines)) => {
            clamped_ratio(Decimal::from(lines), rule.amount_needed)
        }
        (kind, signal) => {
            tracing::warn!(%kind, ?signal, "signal does not match automation kind");
            Decimal::ZERO
        }
    };
    total.checked_mul(ratio).unwrap_or(total)
}
