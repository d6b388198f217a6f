pub mod billing_run;
pub mod rate_table;
pub mod tariffs;
pub mod types;

pub use billing_run::{
    BillingRunSummary, BillingRunner, KindRevenue, MeterReading, RevenueReport, UtilityBill,
};
pub use rate_table::{
    calculate_fee, validate_ascending, FeeBreakdown, RateBracket, RateTable, TierCharge,
    ValidatedRateTable,
};
pub use tariffs::{RateTableVersion, TariffOperations, TariffService};
pub use types::{BillId, BillingPeriod, HouseholdId, Money, RateTableId, Usage, UtilityKind};
