use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::decimal::Money;
use crate::ledger::LedgerKey;
use crate::types::{CategoryKind, CategoryStatus, OverallStatus, PrincipalId};

/// events handed to the notification subsystem. delivery, formatting and
/// channel selection happen on the other side of this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    LedgerCreated {
        key: LedgerKey,
        total_amount: Money,
        created_by: PrincipalId,
        timestamp: DateTime<Utc>,
    },
    PaymentApplied {
        key: LedgerKey,
        category: CategoryKind,
        amount: Money,
        new_category_status: CategoryStatus,
        new_overall_status: OverallStatus,
        receipt_number: String,
    },
    PaymentRefunded {
        key: LedgerKey,
        category: CategoryKind,
        amount: Money,
        original_transaction_id: String,
        new_overall_status: OverallStatus,
        timestamp: DateTime<Utc>,
    },
    CategoryBecameOverdue {
        key: LedgerKey,
        category: CategoryKind,
        due_date: DateTime<Utc>,
    },
    DiscountRecorded {
        key: LedgerKey,
        applied_by: PrincipalId,
        timestamp: DateTime<Utc>,
    },
    LateFeeRecorded {
        key: LedgerKey,
        amount: Money,
        applied_by: PrincipalId,
        timestamp: DateTime<Utc>,
    },
}

/// boundary to the notification collaborator
pub trait NotificationHook: Send + Sync {
    fn publish(&self, event: LedgerEvent);
}

/// hook that drops everything, for callers without a notification subsystem
#[derive(Debug, Default)]
pub struct NullHook;

impl NotificationHook for NullHook {
    fn publish(&self, _event: LedgerEvent) {}
}

/// hook that collects events for later draining, used in tests and by
/// callers that forward in batches
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Mutex<Vec<LedgerEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_events(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationHook for EventBuffer {
    fn publish(&self, event: LedgerEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}
