use serde::{Deserialize, Serialize};

/// how recorded discount/late-fee adjustments enter the totals.
///
/// the source system stored both but never folded them into the arithmetic;
/// `RecordOnly` keeps that behavior, `Apply` folds them into the effective
/// total before statuses are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentPolicy {
    #[default]
    RecordOnly,
    Apply,
}

/// service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub adjustment_policy: AdjustmentPolicy,
    /// bound on compare-and-swap retries before surfacing contention
    pub max_apply_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            adjustment_policy: AdjustmentPolicy::RecordOnly,
            max_apply_retries: 5,
        }
    }
}

impl LedgerConfig {
    /// record-only adjustments, default retry bound
    pub fn standard() -> Self {
        Self::default()
    }

    /// fold discounts and late fees into the effective total
    pub fn with_applied_adjustments() -> Self {
        Self {
            adjustment_policy: AdjustmentPolicy::Apply,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_apply_retries = retries;
        self
    }
}
