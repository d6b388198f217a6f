use crate::error::{BillingError, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Household identifier, usually the room or apartment number
///
/// Must be 1-32 characters of ASCII alphanumerics, `-`, `_` or `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HouseholdId(String);

impl HouseholdId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<()> {
        let invalid = |message: &str| BillingError::ValidationError {
            field: "household_id".to_string(),
            message: message.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("household id cannot be empty"));
        }
        if id.len() > 32 {
            return Err(invalid("household id too long (max 32 characters)"));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid("household id contains invalid characters"));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HouseholdId {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HouseholdId> for String {
    fn from(id: HouseholdId) -> Self {
        id.0
    }
}

impl fmt::Display for HouseholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rate table version identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateTableId(Uuid);

impl RateTableId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RateTableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RateTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RateTableId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Utility bill identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillId(Uuid);

impl BillId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BillId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BillId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Metered utilities billed with tiered rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityKind {
    Electricity,
    Water,
}

impl UtilityKind {
    pub const ALL: [UtilityKind; 2] = [UtilityKind::Electricity, UtilityKind::Water];

    pub fn unit(&self) -> &'static str {
        match self {
            UtilityKind::Electricity => "kWh",
            UtilityKind::Water => "m³",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UtilityKind::Electricity => "electricity",
            UtilityKind::Water => "water",
        }
    }
}

impl fmt::Display for UtilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UtilityKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "electricity" | "electric" => Ok(UtilityKind::Electricity),
            "water" => Ok(UtilityKind::Water),
            other => Err(BillingError::ValidationError {
                field: "utility_kind".to_string(),
                message: format!("unknown utility kind '{}'", other),
            }),
        }
    }
}

/// Non-negative metered quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Usage(Decimal);

impl Usage {
    /// Largest storable usage, 99 999 999 999 999.999999 (`NUMERIC(20, 6)`).
    pub const MAX: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 6);

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn new(quantity: Decimal) -> Result<Self> {
        if quantity.is_sign_negative() && !quantity.is_zero() {
            return Err(BillingError::InvalidUsage {
                value: quantity,
                reason: "usage cannot be negative".to_string(),
            });
        }
        if quantity > Self::MAX {
            return Err(BillingError::InvalidUsage {
                value: quantity,
                reason: format!("usage cannot exceed {}", Self::MAX),
            });
        }
        Ok(Self(quantity))
    }

    /// Usage between two cumulative meter values.
    pub fn between_readings(previous: Decimal, current: Decimal) -> Result<Self> {
        if current < previous {
            return Err(BillingError::InvalidUsage {
                value: current.saturating_sub(previous),
                reason: format!(
                    "meter reading {} is below the previous reading {}",
                    current, previous
                ),
            });
        }
        let quantity = current
            .checked_sub(previous)
            .ok_or_else(|| BillingError::InvalidUsage {
                value: current,
                reason: format!(
                    "meter readings {} and {} are too far apart",
                    previous, current
                ),
            })?;
        Self::new(quantity)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Usage {
    type Error = BillingError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Usage> for Decimal {
    fn from(usage: Usage) -> Self {
        usage.0
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Currency amount with a fixed number of decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub const DEFAULT_SCALE: u32 = 2;

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Rounds half away from zero to `scale` decimal places.
    pub fn from_decimal(amount: Decimal, scale: u32) -> Self {
        Self(amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero))
    }

    /// An amount that was already rounded when it was billed, kept as is.
    pub fn from_stored(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn add(&self, other: Money) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc.add(m))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One calendar month of metered usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(BillingError::ValidationError {
                field: "period".to_string(),
                message: format!("month {} out of range", month),
            });
        }
        if !(1970..=9999).contains(&year) {
            return Err(BillingError::ValidationError {
                field: "period".to_string(),
                message: format!("year {} out of range", year),
            });
        }
        Ok(Self { year, month })
    }

    /// Period containing `date`; used when reading `DATE` columns back.
    pub fn from_date(date: NaiveDate) -> Result<Self> {
        Self::new(date.year(), date.month())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // Month and year are range-checked on construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day().and_hms_opt(0, 0, 0).unwrap_or_default())
    }

    /// Exclusive end: the start of the following month.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant < self.end()
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BillingPeriod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BillingError::ValidationError {
            field: "period".to_string(),
            message: format!("expected YYYY-MM, got '{}'", s),
        };

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.to_string()
    }
}
