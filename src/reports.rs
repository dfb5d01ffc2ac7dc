use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::decimal::Money;
use crate::ledger::{Ledger, LedgerKey};
use crate::store::LedgerStore;
use crate::types::{CategoryKind, CategoryStatus, OverallStatus, StudentId};

/// filter shared by all reports. cohort membership is resolved externally
/// and arrives as a plain set of student ids.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub academic_year: Option<String>,
    pub students: Option<HashSet<StudentId>>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl ReportFilter {
    pub fn for_year(year: impl Into<String>) -> Self {
        Self {
            academic_year: Some(year.into()),
            ..Self::default()
        }
    }

    pub fn with_students(mut self, students: HashSet<StudentId>) -> Self {
        self.students = Some(students);
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    fn matches(&self, ledger: &Ledger) -> bool {
        if let Some(year) = &self.academic_year {
            if &ledger.key.academic_year != year {
                return false;
            }
        }
        if let Some(students) = &self.students {
            if !students.contains(&ledger.key.student) {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if ledger.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if ledger.created_at > to {
                return false;
            }
        }
        true
    }
}

/// counted payments grouped by calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCollection {
    pub year: i32,
    pub month: u32,
    pub payment_count: usize,
    pub total_collected: Money,
}

/// one ledger with money still owed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutstandingEntry {
    pub key: LedgerKey,
    pub total_amount: Money,
    pub total_paid: Money,
    pub total_pending: Money,
    pub overall_status: OverallStatus,
}

/// billed and collected totals for one category kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub category: CategoryKind,
    pub total_amount: Money,
    pub total_paid: Money,
    pub ledger_count: usize,
}

/// read-only aggregations over ledger snapshots. every figure comes from the
/// derived fields recompute populates; no payment-sum rule is duplicated here.
pub struct ReportingEngine {
    store: Arc<dyn LedgerStore>,
}

impl ReportingEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// counted payments grouped by (year, month) of payment date, in
    /// chronological order
    pub fn collection_report(&self, filter: &ReportFilter) -> Vec<MonthlyCollection> {
        let mut buckets: BTreeMap<(i32, u32), (usize, Money)> = BTreeMap::new();

        for ledger in self.store.snapshot_all() {
            if !filter.matches(&ledger) {
                continue;
            }
            for payment in ledger.counted_payments() {
                let bucket = buckets
                    .entry((payment.payment_date.year(), payment.payment_date.month()))
                    .or_insert((0, Money::ZERO));
                bucket.0 += 1;
                bucket.1 += payment.amount;
            }
        }

        buckets
            .into_iter()
            .map(|((year, month), (payment_count, total_collected))| MonthlyCollection {
                year,
                month,
                payment_count,
                total_collected,
            })
            .collect()
    }

    /// ledgers with an outstanding balance (pending, partial or overdue)
    pub fn outstanding_report(&self, filter: &ReportFilter) -> Vec<OutstandingEntry> {
        let mut entries: Vec<OutstandingEntry> = self
            .store
            .snapshot_all()
            .into_iter()
            .filter(|ledger| filter.matches(ledger))
            .filter(|ledger| {
                matches!(
                    ledger.overall_status,
                    CategoryStatus::Pending | CategoryStatus::Partial | CategoryStatus::Overdue
                )
            })
            .map(|ledger| OutstandingEntry {
                key: ledger.key.clone(),
                total_amount: ledger.total_amount,
                total_paid: ledger.total_paid,
                total_pending: ledger.total_pending,
                overall_status: ledger.overall_status,
            })
            .collect();

        entries.sort_by(|a, b| b.total_pending.cmp(&a.total_pending));
        entries
    }

    /// billed and collected amounts grouped by category kind
    pub fn category_report(&self, filter: &ReportFilter) -> Vec<CategoryTotals> {
        let mut buckets: BTreeMap<CategoryKind, (Money, Money, usize)> = BTreeMap::new();

        for ledger in self.store.snapshot_all() {
            if !filter.matches(&ledger) {
                continue;
            }
            for category in &ledger.categories {
                let bucket = buckets
                    .entry(category.kind)
                    .or_insert((Money::ZERO, Money::ZERO, 0));
                bucket.0 += category.amount;
                bucket.1 += category.paid_amount;
                bucket.2 += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(category, (total_amount, total_paid, ledger_count))| CategoryTotals {
                category,
                total_amount,
                total_paid,
                ledger_count,
            })
            .collect()
    }
}
