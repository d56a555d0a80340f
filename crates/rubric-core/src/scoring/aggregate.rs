//! Aggregation of child scores into a parent value.

use rust_decimal::Decimal;

use crate::model::AssessmentType;

/// Fold selected by a parent's [`AssessmentType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Sum,
    Max,
    Min,
}

impl Aggregator {
    /// `None` for custom and automatic categories, which never aggregate.
    #[must_use]
    pub const fn for_type(assessment_type: AssessmentType) -> Option<Self> {
        match assessment_type {
            AssessmentType::Sum => Some(Self::Sum),
            AssessmentType::Max => Some(Self::Max),
            AssessmentType::Min => Some(Self::Min),
            AssessmentType::Custom | AssessmentType::Automatic => None,
        }
    }

    /// Fold the values; `None` when there are none.
    pub fn fold(self, values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
        let mut values = values.into_iter();
        let first = values.next()?;
        Some(values.fold(first, |acc, value| match self {
            Self::Sum => acc.saturating_add(value),
            Self::Max => acc.max(value),
            Self::Min => acc.min(value),
        }))
    }
}

/// A child's contribution: its budget and its chosen value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildScore {
    pub total: Decimal,
    pub chosen: Decimal,
}

/// `total * F(chosen) / F(totals)`, or zero when the potential is zero or
/// there are no children.
#[must_use]
pub fn aggregate(aggregator: Aggregator, total: Decimal, children: &[ChildScore]) -> Decimal {
    let potential = aggregator
        .fold(children.iter().map(|child| child.total))
        .unwrap_or(Decimal::ZERO);
    if potential.is_zero() {
        tracing::debug!("aggregate potential is zero; scoring 0");
        return Decimal::ZERO;
    }
    let value = aggregator
        .fold(children.iter().map(|child| child.chosen))
        .unwrap_or(Decimal::ZERO);

    total
        .checked_mul(value)
        .and_then(|scaled| scaled.checked_div(potential))
        .unwrap_or(Decimal::ZERO)
}
