use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::decimal::{Money, Rate};
use crate::types::{
    CategoryKind, CategoryStatus, OverallStatus, PaymentMethod, PaymentStatus, PrincipalId,
    StudentId, Term,
};

/// identity of a ledger: at most one per (student, year, term)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub student: StudentId,
    pub academic_year: String,
    pub term: Term,
}

impl LedgerKey {
    pub fn new(student: StudentId, academic_year: impl Into<String>, term: Term) -> Self {
        Self {
            student,
            academic_year: academic_year.into(),
            term,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.student, self.academic_year, self.term)
    }
}

/// one billable line item within a ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCategory {
    pub kind: CategoryKind,
    pub description: Option<String>,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    // derived by recompute
    pub paid_amount: Money,
    pub remaining_amount: Money,
    pub status: CategoryStatus,
}

impl FeeCategory {
    pub fn new(
        kind: CategoryKind,
        description: Option<String>,
        amount: Money,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            description,
            amount,
            due_date,
            paid_amount: Money::ZERO,
            remaining_amount: amount,
            status: CategoryStatus::Pending,
        }
    }
}

/// immutable entry in the payment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub transaction_id: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub category: CategoryKind,
    pub payment_date: DateTime<Utc>,
    pub received_by: PrincipalId,
    pub receipt_number: String,
    pub status: PaymentStatus,
    pub notes: Option<String>,
    /// for refunded records: the completed transaction being reversed
    pub reverses: Option<String>,
}

/// discount value, percentage of the nominal total or a fixed amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountValue {
    Percentage(Rate),
    Fixed(Money),
}

/// recorded discount with its audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub value: DiscountValue,
    pub reason: Option<String>,
    pub applied_by: PrincipalId,
    pub applied_at: DateTime<Utc>,
}

impl Discount {
    /// amount taken off a given nominal total
    pub fn amount_off(&self, total: Money) -> Money {
        match self.value {
            DiscountValue::Percentage(rate) => total.percentage(rate),
            DiscountValue::Fixed(amount) => amount,
        }
    }
}

/// recorded late fee with its audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LateFee {
    pub amount: Money,
    pub applied_by: PrincipalId,
    pub applied_at: DateTime<Utc>,
}

/// the fee aggregate for one student/year/term. owns its categories and
/// payment history exclusively; read and written as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub key: LedgerKey,
    pub categories: Vec<FeeCategory>,
    /// append-only audit trail; records are never edited or deleted
    pub payments: Vec<PaymentRecord>,
    /// nominal total, fixed at creation
    pub total_amount: Money,
    // derived by recompute
    pub total_paid: Money,
    pub total_pending: Money,
    pub overall_status: OverallStatus,
    pub discount: Option<Discount>,
    pub late_fee: Option<LateFee>,
    pub notes: Option<String>,
    pub created_by: PrincipalId,
    pub updated_by: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// monotonically increasing, bumped by the store on every write
    pub version: u64,
}

impl Ledger {
    /// create a fresh ledger; derived fields start from the zero-payment state
    pub fn new(
        key: LedgerKey,
        categories: Vec<FeeCategory>,
        total_amount: Money,
        created_by: PrincipalId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            categories,
            payments: Vec::new(),
            total_amount,
            total_paid: Money::ZERO,
            total_pending: total_amount,
            overall_status: CategoryStatus::Pending,
            discount: None,
            late_fee: None,
            notes: None,
            created_by,
            updated_by: None,
            created_at,
            updated_at: created_at,
            version: 0,
        }
    }

    /// look up a category by kind
    pub fn category(&self, kind: CategoryKind) -> Option<&FeeCategory> {
        self.categories.iter().find(|c| c.kind == kind)
    }

    /// look up a payment by transaction id
    pub fn payment(&self, transaction_id: &str) -> Option<&PaymentRecord> {
        self.payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
    }

    /// transaction ids of completed records that a later refunded record reverses
    pub fn reversed_transaction_ids(&self) -> HashSet<&str> {
        self.payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Refunded)
            .filter_map(|p| p.reverses.as_deref())
            .collect()
    }

    /// payments that count toward derived sums: completed and not reversed.
    /// pending, failed and refunded records are historical but inert.
    pub fn counted_payments(&self) -> impl Iterator<Item = &PaymentRecord> {
        let reversed = self.reversed_transaction_ids();
        self.payments.iter().filter(move |p| {
            p.status == PaymentStatus::Completed && !reversed.contains(p.transaction_id.as_str())
        })
    }

    /// append a record to the history; the record is immutable from here on
    pub fn append_payment(&mut self, record: PaymentRecord) {
        self.payments.push(record);
    }

    /// persisted representation: the whole aggregate as one JSON document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn future_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn sample_ledger() -> Ledger {
        let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::First);
        let categories = vec![
            FeeCategory::new(
                CategoryKind::Tuition,
                Some("term tuition".to_string()),
                Money::from_major(10_000),
                future_date(),
            ),
            FeeCategory::new(
                CategoryKind::Transport,
                None,
                Money::from_major(2_000),
                future_date(),
            ),
        ];
        Ledger::new(
            key,
            categories,
            Money::from_major(12_000),
            Uuid::new_v4(),
            future_date() - Duration::days(365),
        )
    }

    #[test]
    fn test_new_ledger_starts_pending() {
        let ledger = sample_ledger();
        assert_eq!(ledger.total_paid, Money::ZERO);
        assert_eq!(ledger.total_pending, Money::from_major(12_000));
        assert_eq!(ledger.overall_status, CategoryStatus::Pending);
        assert_eq!(ledger.version, 0);
        assert!(ledger.payments.is_empty());
    }

    #[test]
    fn test_category_lookup() {
        let ledger = sample_ledger();
        assert!(ledger.category(CategoryKind::Tuition).is_some());
        assert!(ledger.category(CategoryKind::Library).is_none());
    }

    #[test]
    fn test_counted_payments_skip_inert_statuses() {
        let mut ledger = sample_ledger();
        let actor = Uuid::new_v4();
        for (id, status) in [
            ("t1", PaymentStatus::Completed),
            ("t2", PaymentStatus::Pending),
            ("t3", PaymentStatus::Failed),
        ] {
            ledger.append_payment(PaymentRecord {
                transaction_id: id.to_string(),
                amount: Money::from_major(100),
                method: PaymentMethod::Cash,
                category: CategoryKind::Tuition,
                payment_date: ledger.created_at,
                received_by: actor,
                receipt_number: format!("r-{id}"),
                status,
                notes: None,
                reverses: None,
            });
        }
        let counted: Vec<_> = ledger.counted_payments().collect();
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].transaction_id, "t1");
    }

    #[test]
    fn test_refund_record_neutralizes_original() {
        let mut ledger = sample_ledger();
        let actor = Uuid::new_v4();
        ledger.append_payment(PaymentRecord {
            transaction_id: "orig".to_string(),
            amount: Money::from_major(500),
            method: PaymentMethod::Card,
            category: CategoryKind::Transport,
            payment_date: ledger.created_at,
            received_by: actor,
            receipt_number: "r-orig".to_string(),
            status: PaymentStatus::Completed,
            notes: None,
            reverses: None,
        });
        ledger.append_payment(PaymentRecord {
            transaction_id: "rev".to_string(),
            amount: Money::from_major(500),
            method: PaymentMethod::Card,
            category: CategoryKind::Transport,
            payment_date: ledger.created_at,
            received_by: actor,
            receipt_number: "r-rev".to_string(),
            status: PaymentStatus::Refunded,
            notes: None,
            reverses: Some("orig".to_string()),
        });
        assert_eq!(ledger.counted_payments().count(), 0);
        // both records remain in the audit trail
        assert_eq!(ledger.payments.len(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let ledger = sample_ledger();
        let json = ledger.to_json().unwrap();
        let back = Ledger::from_json(&json).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn test_discount_amount_off() {
        let pct = Discount {
            value: DiscountValue::Percentage(Rate::from_percentage(10)),
            reason: None,
            applied_by: Uuid::new_v4(),
            applied_at: future_date(),
        };
        assert_eq!(pct.amount_off(Money::from_major(12_000)), Money::from_major(1_200));

        let fixed = Discount {
            value: DiscountValue::Fixed(Money::from_major(750)),
            reason: None,
            applied_by: Uuid::new_v4(),
            applied_at: future_date(),
        };
        assert_eq!(fixed.amount_off(Money::from_major(12_000)), Money::from_major(750));
    }
}
