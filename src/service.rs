use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result, ValidationError};
use crate::events::{LedgerEvent, NotificationHook};
use crate::ledger::{
    Discount, DiscountValue, FeeCategory, LateFee, Ledger, LedgerKey, PaymentRecord,
};
use crate::recompute::recompute;
use crate::store::LedgerStore;
use crate::types::{
    AccessDecision, CategoryKind, CategoryStatus, PaymentMethod, PaymentStatus, Principal,
    StudentId,
};

/// existence checks against the identity/roster collaborator
pub trait RosterDirectory: Send + Sync {
    fn student_exists(&self, student: StudentId) -> bool;
}

/// roster that accepts every id, for embedders that verify upstream
#[derive(Debug, Default)]
pub struct OpenRoster;

impl RosterDirectory for OpenRoster {
    fn student_exists(&self, _student: StudentId) -> bool {
        true
    }
}

/// one category line supplied at ledger creation
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySpec {
    pub kind: CategoryKind,
    pub description: Option<String>,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
}

/// request to record a payment against one category of a ledger
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Money,
    pub method: PaymentMethod,
    pub category: CategoryKind,
    pub transaction_id: Option<String>,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
}

/// post-commit view handed back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub ledger: Ledger,
    pub payment: PaymentRecord,
}

/// validates and appends payments to ledgers under optimistic concurrency
/// control. every mutation is read-validate-recompute-commit; a failed call
/// leaves the ledger exactly as it was.
pub struct PaymentService {
    store: Arc<dyn LedgerStore>,
    roster: Arc<dyn RosterDirectory>,
    hook: Arc<dyn NotificationHook>,
    config: LedgerConfig,
    token_seq: AtomicU64,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        roster: Arc<dyn RosterDirectory>,
        hook: Arc<dyn NotificationHook>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            roster,
            hook,
            config,
            token_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// create a ledger for a (student, year, term) key
    pub fn create_ledger(
        &self,
        key: LedgerKey,
        categories: Vec<CategorySpec>,
        total_amount: Money,
        notes: Option<String>,
        actor: &Principal,
        decision: AccessDecision,
        time: &SafeTimeProvider,
    ) -> Result<Ledger> {
        self.require_write(actor, decision)?;

        if !self.roster.student_exists(key.student) {
            return Err(ValidationError::UnknownStudent {
                student: key.student,
            }
            .into());
        }
        if categories.is_empty() {
            return Err(ValidationError::EmptyCategories.into());
        }
        for (i, spec) in categories.iter().enumerate() {
            if spec.amount.is_negative() {
                return Err(ValidationError::NegativeCategoryAmount {
                    category: spec.kind,
                    amount: spec.amount,
                }
                .into());
            }
            if categories[..i].iter().any(|c| c.kind == spec.kind) {
                return Err(ValidationError::DuplicateCategory {
                    category: spec.kind,
                }
                .into());
            }
        }

        let breakdown: Money = categories.iter().map(|c| c.amount).sum();
        if breakdown != total_amount {
            tracing::warn!(
                key = %key,
                %breakdown,
                %total_amount,
                "category amounts do not sum to the ledger total"
            );
        }

        let now = time.now();
        let mut ledger = Ledger::new(
            key.clone(),
            categories
                .into_iter()
                .map(|c| FeeCategory::new(c.kind, c.description, c.amount, c.due_date))
                .collect(),
            total_amount,
            actor.id,
            now,
        );
        ledger.notes = notes;
        recompute(&mut ledger, now, self.config.adjustment_policy);

        self.store.create(ledger.clone())?;
        tracing::info!(key = %key, %total_amount, "ledger created");

        self.hook.publish(LedgerEvent::LedgerCreated {
            key,
            total_amount,
            created_by: actor.id,
            timestamp: now,
        });
        Ok(ledger)
    }

    /// read the current snapshot of a ledger
    pub fn get_ledger(
        &self,
        key: &LedgerKey,
        actor: &Principal,
        decision: AccessDecision,
    ) -> Result<Ledger> {
        if !decision.allows_read() {
            return Err(LedgerError::AccessDenied {
                principal: actor.id,
            });
        }
        self.store.get(key)
    }

    /// validate and append a completed payment, recompute, and commit with
    /// compare-and-swap. retried from a fresh read on version conflict, up to
    /// the configured bound; validation runs against each fresh snapshot, so
    /// two racing payments can never oversubscribe a category.
    pub fn apply_payment(
        &self,
        key: &LedgerKey,
        request: PaymentRequest,
        actor: &Principal,
        decision: AccessDecision,
        time: &SafeTimeProvider,
    ) -> Result<PaymentOutcome> {
        self.require_write(actor, decision)?;

        if !request.amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount {
                amount: request.amount,
            }
            .into());
        }

        let (ledger, payment) = self.commit(key, actor, time, |ledger, now| {
            let category = ledger
                .category(request.category)
                .ok_or(ValidationError::UnknownCategory {
                    category: request.category,
                })?;
            if request.amount > category.remaining_amount {
                return Err(ValidationError::AmountExceedsRemaining {
                    category: request.category,
                    remaining: category.remaining_amount,
                    requested: request.amount,
                }
                .into());
            }

            let transaction_id = match &request.transaction_id {
                Some(id) => {
                    if ledger.payment(id).is_some() {
                        return Err(ValidationError::DuplicateTransaction {
                            transaction_id: id.clone(),
                        }
                        .into());
                    }
                    id.clone()
                }
                None => self.fresh_transaction_id(ledger, now),
            };
            let receipt_number = request
                .receipt_number
                .clone()
                .unwrap_or_else(|| self.next_token("RCP", now));

            let record = PaymentRecord {
                transaction_id,
                amount: request.amount,
                method: request.method,
                category: request.category,
                payment_date: now,
                received_by: actor.id,
                receipt_number,
                status: PaymentStatus::Completed,
                notes: request.notes.clone(),
                reverses: None,
            };
            ledger.append_payment(record.clone());
            Ok(record)
        })?;

        let new_category_status = ledger
            .category(payment.category)
            .map(|c| c.status)
            .unwrap_or(CategoryStatus::Pending);

        tracing::info!(
            key = %key,
            category = %payment.category,
            amount = %payment.amount,
            receipt = %payment.receipt_number,
            "payment applied"
        );
        self.hook.publish(LedgerEvent::PaymentApplied {
            key: key.clone(),
            category: payment.category,
            amount: payment.amount,
            new_category_status,
            new_overall_status: ledger.overall_status,
            receipt_number: payment.receipt_number.clone(),
        });

        Ok(PaymentOutcome { ledger, payment })
    }

    /// represent a refund of an earlier completed payment as a new refunded
    /// record; the original record is never touched, the net effect comes out
    /// of recomputation alone
    pub fn record_refund(
        &self,
        key: &LedgerKey,
        transaction_id: &str,
        notes: Option<String>,
        actor: &Principal,
        decision: AccessDecision,
        time: &SafeTimeProvider,
    ) -> Result<PaymentOutcome> {
        self.require_write(actor, decision)?;

        let (ledger, payment) = self.commit(key, actor, time, |ledger, now| {
            let original = ledger
                .payment(transaction_id)
                .ok_or(ValidationError::UnknownTransaction {
                    transaction_id: transaction_id.to_string(),
                })?;
            if original.status != PaymentStatus::Completed {
                return Err(ValidationError::NotRefundable {
                    transaction_id: transaction_id.to_string(),
                }
                .into());
            }
            if ledger.reversed_transaction_ids().contains(transaction_id) {
                return Err(ValidationError::AlreadyRefunded {
                    transaction_id: transaction_id.to_string(),
                }
                .into());
            }

            let record = PaymentRecord {
                transaction_id: self.fresh_transaction_id(ledger, now),
                amount: original.amount,
                method: original.method,
                category: original.category,
                payment_date: now,
                received_by: actor.id,
                receipt_number: self.next_token("RCP", now),
                status: PaymentStatus::Refunded,
                notes: notes.clone(),
                reverses: Some(transaction_id.to_string()),
            };
            ledger.append_payment(record.clone());
            Ok(record)
        })?;

        tracing::info!(key = %key, transaction = transaction_id, "refund recorded");
        self.hook.publish(LedgerEvent::PaymentRefunded {
            key: key.clone(),
            category: payment.category,
            amount: payment.amount,
            original_transaction_id: transaction_id.to_string(),
            new_overall_status: ledger.overall_status,
            timestamp: payment.payment_date,
        });

        Ok(PaymentOutcome { ledger, payment })
    }

    /// record a discount with its audit trail. mathematically inert under the
    /// record-only policy; folded into the effective total under `Apply`.
    pub fn apply_discount(
        &self,
        key: &LedgerKey,
        value: DiscountValue,
        reason: Option<String>,
        actor: &Principal,
        decision: AccessDecision,
        time: &SafeTimeProvider,
    ) -> Result<Ledger> {
        self.require_write(actor, decision)?;

        let (ledger, applied_at) = self.commit(key, actor, time, |ledger, now| {
            ledger.discount = Some(Discount {
                value,
                reason: reason.clone(),
                applied_by: actor.id,
                applied_at: now,
            });
            Ok(now)
        })?;

        self.hook.publish(LedgerEvent::DiscountRecorded {
            key: key.clone(),
            applied_by: actor.id,
            timestamp: applied_at,
        });
        Ok(ledger)
    }

    /// record a late fee with its audit trail; same policy split as discounts
    pub fn apply_late_fee(
        &self,
        key: &LedgerKey,
        amount: Money,
        actor: &Principal,
        decision: AccessDecision,
        time: &SafeTimeProvider,
    ) -> Result<Ledger> {
        self.require_write(actor, decision)?;

        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount { amount }.into());
        }

        let (ledger, applied_at) = self.commit(key, actor, time, |ledger, now| {
            ledger.late_fee = Some(LateFee {
                amount,
                applied_by: actor.id,
                applied_at: now,
            });
            Ok(now)
        })?;

        self.hook.publish(LedgerEvent::LateFeeRecorded {
            key: key.clone(),
            amount,
            applied_by: actor.id,
            timestamp: applied_at,
        });
        Ok(ledger)
    }

    /// recompute every stored ledger against the current clock and persist
    /// status transitions, so overdue detection does not depend on an
    /// unrelated write happening to occur. emits `CategoryBecameOverdue` for
    /// each pending category that crossed its due date. a version conflict
    /// skips that ledger: whoever won the race has already recomputed it.
    /// returns the number of ledgers updated.
    pub fn sweep_overdue(&self, time: &SafeTimeProvider) -> usize {
        let now = time.now();
        let mut swept = 0;

        for snapshot in self.store.snapshot_all() {
            let mut work = snapshot.clone();
            recompute(&mut work, now, self.config.adjustment_policy);
            if work == snapshot {
                continue;
            }
            work.updated_at = now;

            match self.store.update(work.clone(), snapshot.version) {
                Ok(written) => {
                    swept += 1;
                    for (before, after) in snapshot.categories.iter().zip(&written.categories) {
                        if before.status == CategoryStatus::Pending
                            && after.status == CategoryStatus::Overdue
                        {
                            self.hook.publish(LedgerEvent::CategoryBecameOverdue {
                                key: written.key.clone(),
                                category: after.kind,
                                due_date: after.due_date,
                            });
                        }
                    }
                }
                Err(LedgerError::Conflict { .. }) => {
                    tracing::debug!(key = %snapshot.key, "sweep skipped contended ledger");
                }
                Err(err) => {
                    tracing::warn!(key = %snapshot.key, %err, "sweep write failed");
                }
            }
        }

        swept
    }

    fn require_write(&self, actor: &Principal, decision: AccessDecision) -> Result<()> {
        if decision.allows_write() {
            Ok(())
        } else {
            Err(LedgerError::AccessDenied {
                principal: actor.id,
            })
        }
    }

    /// read-validate-recompute-commit under compare-and-swap, retrying from a
    /// fresh snapshot on conflict up to the configured bound. the mutation
    /// closure re-runs against every fresh snapshot, so its validation always
    /// sees current state. nothing is visible to readers until the write lands.
    fn commit<T>(
        &self,
        key: &LedgerKey,
        actor: &Principal,
        time: &SafeTimeProvider,
        mutate: impl Fn(&mut Ledger, DateTime<Utc>) -> Result<T>,
    ) -> Result<(Ledger, T)> {
        let mut attempts = 0;
        loop {
            let snapshot = self.store.get(key)?;
            let expected = snapshot.version;
            let now = time.now();

            let mut work = snapshot;
            let value = mutate(&mut work, now)?;
            recompute(&mut work, now, self.config.adjustment_policy);
            work.updated_by = Some(actor.id);
            work.updated_at = now;

            match self.store.update(work, expected) {
                Ok(written) => return Ok((written, value)),
                Err(LedgerError::Conflict { .. }) => {
                    attempts += 1;
                    if attempts >= self.config.max_apply_retries {
                        return Err(LedgerError::Contention {
                            key: key.clone(),
                            attempts,
                        });
                    }
                    tracing::warn!(key = %key, attempts, "version conflict, retrying");
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// generated transaction id not already present in the ledger's history.
    /// two services over one store can mint the same millis/sequence token,
    /// so a generated id is checked against the history like a supplied one
    /// and regenerated on collision.
    fn fresh_transaction_id(&self, ledger: &Ledger, now: DateTime<Utc>) -> String {
        loop {
            let id = self.next_token("TXN", now);
            if ledger.payment(&id).is_none() {
                return id;
            }
        }
    }

    /// time-ordered token from the clock millis and a per-service sequence
    fn next_token(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", prefix, now.timestamp_millis(), seq)
    }
}
