//! Tiered (progressive bracket) rate tables.
//!
//! A table is an ordered list of brackets. Bracket `i` covers usage in
//! `[upper_bound(i-1), upper_bound(i))`, starting from zero, and the last
//! bracket absorbs everything above the previous bound whatever its own bound
//! says. Each unit of usage is charged at the price of the bracket it falls in.
//!
//! Tables arrive from operators as [`RateTable`] and must be turned into a
//! [`ValidatedRateTable`] before they can be charged against.

use crate::domain::types::{Usage, UtilityKind};
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One tier of a rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBracket {
    /// Usage ceiling of this tier. Ignored on the last bracket, where it may be absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<Decimal>,
    /// Price per unit of usage inside this tier.
    pub unit_price: Decimal,
}

impl RateBracket {
    /// Highest accepted unit price. With usage capped at [`Usage::MAX`] every
    /// tier charge and their total stay within `Decimal` range.
    pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

    pub fn bounded(upper_bound: Decimal, unit_price: Decimal) -> Self {
        Self {
            upper_bound: Some(upper_bound),
            unit_price,
        }
    }

    pub fn unbounded(unit_price: Decimal) -> Self {
        Self {
            upper_bound: None,
            unit_price,
        }
    }
}

/// Returns `false` when any bracket's upper bound is not strictly above the
/// bound of the bracket before it.
///
/// An absent bound is accepted on the last bracket only. Tables with a single
/// bracket are always ascending.
pub fn validate_ascending(brackets: &[RateBracket]) -> bool {
    first_ordering_violation(brackets).is_none()
}

/// Index of the first bracket whose bound breaks the ascending order.
fn first_ordering_violation(brackets: &[RateBracket]) -> Option<usize> {
    let last = brackets.len().saturating_sub(1);

    brackets
        .windows(2)
        .enumerate()
        .find_map(|(i, pair)| {
            let index = i + 1;
            let ordered = match (pair[0].upper_bound, pair[1].upper_bound) {
                (Some(previous), Some(current)) => current > previous,
                (Some(_), None) => index == last,
                (None, _) => false,
            };
            (!ordered).then_some(index)
        })
}

/// Operator-supplied rate table, not yet checked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub brackets: Vec<RateBracket>,
}

impl RateTable {
    pub fn new(brackets: Vec<RateBracket>) -> Self {
        Self { brackets }
    }

    /// Check the table for billing `kind`.
    ///
    /// Besides the ascending-bounds rule this rejects empty tables, interior
    /// brackets without a bound, a non-positive first bound and unit prices
    /// outside `0..=MAX_UNIT_PRICE`.
    /// Tier numbers in error messages are 1-based.
    pub fn validate(&self, kind: UtilityKind) -> Result<ValidatedRateTable> {
        let reject = |reason: String| BillingError::InvalidRateTable { kind, reason };

        if self.brackets.is_empty() {
            return Err(reject("table has no tiers".to_string()));
        }

        let last = self.brackets.len() - 1;
        for (i, bracket) in self.brackets.iter().enumerate() {
            if bracket.unit_price.is_sign_negative() && !bracket.unit_price.is_zero() {
                return Err(reject(format!(
                    "tier {} has negative unit price {}",
                    i + 1,
                    bracket.unit_price
                )));
            }
            if bracket.unit_price > RateBracket::MAX_UNIT_PRICE {
                return Err(reject(format!(
                    "tier {} unit price {} exceeds {}",
                    i + 1,
                    bracket.unit_price,
                    RateBracket::MAX_UNIT_PRICE
                )));
            }
            if i < last && bracket.upper_bound.is_none() {
                return Err(reject(format!("tier {} is missing an upper bound", i + 1)));
            }
        }

        if last > 0 {
            if let Some(first) = self.brackets[0].upper_bound {
                if first <= Decimal::ZERO {
                    return Err(reject(format!(
                        "tier 1 upper bound {} must be positive",
                        first
                    )));
                }
            }
        }

        if let Some(index) = first_ordering_violation(&self.brackets) {
            let describe = |b: Option<Decimal>| {
                b.map(|v| v.to_string())
                    .unwrap_or_else(|| "unbounded".to_string())
            };
            return Err(reject(format!(
                "tier {} upper bound {} is not above tier {} upper bound {}",
                index + 1,
                describe(self.brackets[index].upper_bound),
                index,
                describe(self.brackets[index - 1].upper_bound),
            )));
        }

        Ok(ValidatedRateTable {
            brackets: self.brackets.clone(),
        })
    }
}

/// A rate table that passed [`RateTable::validate`]
///
/// Only obtainable through validation, so fee calculation never sees an
/// unordered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedRateTable {
    brackets: Vec<RateBracket>,
}

impl ValidatedRateTable {
    pub fn brackets(&self) -> &[RateBracket] {
        &self.brackets
    }

    pub fn into_rate_table(self) -> RateTable {
        RateTable::new(self.brackets)
    }

    /// Progressive charge for `usage`, itemised per tier.
    pub fn breakdown(&self, usage: Usage) -> FeeBreakdown {
        let last = self.brackets.len() - 1;
        let mut remaining = usage.as_decimal();
        let mut previous_bound = Decimal::ZERO;
        let mut total = Decimal::ZERO;
        let mut lines = Vec::new();

        for (i, bracket) in self.brackets.iter().enumerate() {
            let is_last = i == last;
            let tier_usage = match bracket.upper_bound {
                Some(bound) if !is_last => remaining.min(bound - previous_bound),
                _ => remaining,
            };

            if tier_usage <= Decimal::ZERO {
                break;
            }

            let amount = tier_usage * bracket.unit_price;
            total += amount;
            remaining -= tier_usage;

            lines.push(TierCharge {
                tier: i + 1,
                lower: previous_bound,
                upper: if is_last { None } else { bracket.upper_bound },
                quantity: tier_usage,
                unit_price: bracket.unit_price,
                amount,
            });

            if let Some(bound) = bracket.upper_bound {
                previous_bound = bound;
            }
        }

        FeeBreakdown {
            usage,
            lines,
            total,
        }
    }
}

impl TryFrom<(UtilityKind, RateTable)> for ValidatedRateTable {
    type Error = BillingError;

    fn try_from((kind, table): (UtilityKind, RateTable)) -> Result<Self> {
        table.validate(kind)
    }
}

/// Exact progressive charge for `usage` under `table`.
///
/// No rounding is applied; bills round the result once via
/// [`Money::from_decimal`](crate::domain::types::Money::from_decimal).
pub fn calculate_fee(usage: Usage, table: &ValidatedRateTable) -> Decimal {
    table.breakdown(usage).total
}

/// Charge for the part of the usage that fell into one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCharge {
    pub tier: usize,
    pub lower: Decimal,
    /// `None` for the last tier, which has no ceiling.
    pub upper: Option<Decimal>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub usage: Usage,
    pub lines: Vec<TierCharge>,
    pub total: Decimal,
}

impl FeeBreakdown {
    pub fn billed_quantity(&self) -> Decimal {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn table(pairs: &[(i64, i64)]) -> RateTable {
        RateTable::new(
            pairs
                .iter()
                .map(|&(bound, price)| RateBracket::bounded(Decimal::from(bound), Decimal::from(price)))
                .collect(),
        )
    }

    fn validated(pairs: &[(i64, i64)]) -> ValidatedRateTable {
        table(pairs).validate(UtilityKind::Electricity).unwrap()
    }

    fn usage(value: Decimal) -> Usage {
        Usage::new(value).unwrap()
    }

    #[test]
    fn test_two_bracket_table_charges() {
        let t = validated(&[(50, 2), (100, 3)]);

        assert_eq!(calculate_fee(usage(dec!(30)), &t), dec!(60));
        assert_eq!(calculate_fee(usage(dec!(70)), &t), dec!(160));
        // The last tier absorbs everything above 50, its own bound of 100 is ignored.
        assert_eq!(calculate_fee(usage(dec!(150)), &t), dec!(400));
    }

    #[test]
    fn test_zero_usage_costs_nothing() {
        let t = validated(&[(50, 2), (100, 3), (200, 5)]);
        let breakdown = t.breakdown(Usage::zero());
        assert_eq!(breakdown.total, Decimal::ZERO);
        assert!(breakdown.lines.is_empty());
    }

    #[test]
    fn test_usage_on_bracket_boundary() {
        let t = validated(&[(50, 2), (100, 3), (200, 5)]);
        let breakdown = t.breakdown(usage(dec!(50)));
        assert_eq!(breakdown.total, dec!(100));
        assert_eq!(breakdown.lines.len(), 1);

        let breakdown = t.breakdown(usage(dec!(100)));
        assert_eq!(breakdown.total, dec!(250));
        assert_eq!(breakdown.lines.len(), 2);
    }

    #[test]
    fn test_breakdown_lines() {
        let t = RateTable::new(vec![
            RateBracket::bounded(dec!(50), dec!(1.678)),
            RateBracket::bounded(dec!(100), dec!(1.734)),
            RateBracket::unbounded(dec!(2.014)),
        ])
        .validate(UtilityKind::Electricity)
        .unwrap();

        let breakdown = t.breakdown(usage(dec!(120.5)));
        assert_eq!(
            breakdown.lines,
            vec![
                TierCharge {
                    tier: 1,
                    lower: dec!(0),
                    upper: Some(dec!(50)),
                    quantity: dec!(50),
                    unit_price: dec!(1.678),
                    amount: dec!(83.900),
                },
                TierCharge {
                    tier: 2,
                    lower: dec!(50),
                    upper: Some(dec!(100)),
                    quantity: dec!(50),
                    unit_price: dec!(1.734),
                    amount: dec!(86.700),
                },
                TierCharge {
                    tier: 3,
                    lower: dec!(100),
                    upper: None,
                    quantity: dec!(20.5),
                    unit_price: dec!(2.014),
                    amount: dec!(41.2870),
                },
            ]
        );
        assert_eq!(breakdown.total, dec!(211.8870));
        assert_eq!(breakdown.billed_quantity(), dec!(120.5));
    }

    #[test]
    fn test_validate_ascending_orderings() {
        assert!(!validate_ascending(&table(&[(50, 2), (100, 3), (50, 4)]).brackets));
        assert!(validate_ascending(&table(&[(50, 2)]).brackets));
        assert!(validate_ascending(&table(&[(50, 2), (100, 3)]).brackets));
        assert!(!validate_ascending(&table(&[(50, 2), (50, 3), (80, 4)]).brackets));
    }

    #[test]
    fn test_validate_ascending_with_open_last_bracket() {
        let open_ended = vec![
            RateBracket::bounded(dec!(50), dec!(2)),
            RateBracket::unbounded(dec!(3)),
        ];
        assert!(validate_ascending(&open_ended));

        let open_interior = vec![
            RateBracket::unbounded(dec!(2)),
            RateBracket::bounded(dec!(50), dec!(3)),
        ];
        assert!(!validate_ascending(&open_interior));
        assert!(validate_ascending(&[]));
    }

    #[test]
    fn test_validate_reports_offending_tier() {
        let err = table(&[(50, 2), (100, 3), (50, 4)])
            .validate(UtilityKind::Water)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid water rate table: tier 3 upper bound 50 is not above tier 2 upper bound 100"
        );
    }

    #[test]
    fn test_validate_structural_checks() {
        let kind = UtilityKind::Electricity;
        assert!(RateTable::default().validate(kind).is_err());
        assert!(table(&[(0, 2), (100, 3)]).validate(kind).is_err());
        assert!(table(&[(50, -2), (100, 3)]).validate(kind).is_err());

        let missing_bound = RateTable::new(vec![
            RateBracket::unbounded(dec!(2)),
            RateBracket::unbounded(dec!(3)),
        ]);
        let err = missing_bound.validate(kind).unwrap_err();
        assert!(err.to_string().contains("tier 1 is missing an upper bound"));

        // A lone bracket needs no bound at all.
        assert!(RateTable::new(vec![RateBracket::unbounded(dec!(4))])
            .validate(kind)
            .is_ok());
    }

    #[test]
    fn test_unit_price_ceiling() {
        let kind = UtilityKind::Water;
        assert!(RateTable::new(vec![RateBracket::unbounded(RateBracket::MAX_UNIT_PRICE)])
            .validate(kind)
            .is_ok());

        let err = RateTable::new(vec![
            RateBracket::bounded(dec!(50), dec!(2)),
            RateBracket::unbounded(dec!(1000000000.01)),
        ])
        .validate(kind)
        .unwrap_err();
        assert!(err.to_string().contains("tier 2 unit price 1000000000.01 exceeds"));
    }

    #[test]
    fn test_largest_usage_at_highest_price_is_charged() {
        let price = RateBracket::MAX_UNIT_PRICE;
        let single = RateTable::new(vec![RateBracket::unbounded(price)])
            .validate(UtilityKind::Electricity)
            .unwrap();
        assert_eq!(
            calculate_fee(usage(Usage::MAX), &single),
            dec!(99999999999999999999999.999)
        );

        let tiered = RateTable::new(vec![
            RateBracket::bounded(dec!(50), price),
            RateBracket::bounded(dec!(100), price),
            RateBracket::unbounded(price),
        ])
        .validate(UtilityKind::Electricity)
        .unwrap();
        let breakdown = tiered.breakdown(usage(Usage::MAX));
        assert_eq!(breakdown.lines.len(), 3);
        assert_eq!(breakdown.billed_quantity(), Usage::MAX);
        assert_eq!(breakdown.total, dec!(99999999999999999999999.999));
    }

    #[test]
    fn test_rate_table_from_toml() {
        let raw = r#"
            [[brackets]]
            upper_bound = 50
            unit_price = "1.5"

            [[brackets]]
            unit_price = 2
        "#;
        let table: RateTable = toml::from_str(raw).unwrap();
        assert_eq!(
            table.brackets,
            vec![
                RateBracket::bounded(dec!(50), dec!(1.5)),
                RateBracket::unbounded(dec!(2)),
            ]
        );
        assert!(table.validate(UtilityKind::Water).is_ok());
    }

    fn ascending_table() -> impl Strategy<Value = ValidatedRateTable> {
        prop::collection::vec((1i64..500, 0i64..10_000), 1..6).prop_map(|tiers| {
            let mut bound = 0i64;
            let brackets = tiers
                .into_iter()
                .map(|(width, cents)| {
                    bound += width;
                    RateBracket::bounded(Decimal::from(bound), Decimal::new(cents, 2))
                })
                .collect();
            RateTable::new(brackets)
                .validate(UtilityKind::Electricity)
                .unwrap()
        })
    }

    fn any_usage() -> impl Strategy<Value = Usage> {
        (0i64..10_000_000).prop_map(|hundredths| Usage::new(Decimal::new(hundredths, 2)).unwrap())
    }

    proptest! {
        #[test]
        fn prop_zero_usage_is_free(t in ascending_table()) {
            prop_assert_eq!(calculate_fee(Usage::zero(), &t), Decimal::ZERO);
        }

        #[test]
        fn prop_fee_is_monotonic(t in ascending_table(), a in any_usage(), b in any_usage()) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(calculate_fee(low, &t) <= calculate_fee(high, &t));
        }

        #[test]
        fn prop_single_bracket_is_linear(bound in 1i64..1000, cents in 0i64..10_000, u in any_usage()) {
            let t = RateTable::new(vec![RateBracket::bounded(Decimal::from(bound), Decimal::new(cents, 2))])
                .validate(UtilityKind::Water)
                .unwrap();
            prop_assert_eq!(calculate_fee(u, &t), u.as_decimal() * Decimal::new(cents, 2));
        }

        #[test]
        fn prop_billed_quantity_equals_usage(t in ascending_table(), u in any_usage()) {
            let breakdown = t.breakdown(u);
            prop_assert_eq!(breakdown.billed_quantity(), u.as_decimal());
            prop_assert_eq!(breakdown.total, calculate_fee(u, &t));
        }

        #[test]
        fn prop_repeated_calls_agree(t in ascending_table(), u in any_usage()) {
            prop_assert_eq!(calculate_fee(u, &t), calculate_fee(u, &t));
        }
    }
}
