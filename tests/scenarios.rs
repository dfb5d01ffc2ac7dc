//! end-to-end scenarios against the service, store and recompute engine

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use fee_ledger::{
    AccessDecision, CategoryKind, CategorySpec, CategoryStatus, EventBuffer, InMemoryLedgerStore,
    LedgerConfig, LedgerError, LedgerEvent, LedgerKey, LedgerStore, Money, OpenRoster,
    PaymentMethod,
    PaymentRequest, PaymentService, Principal, ReportFilter, ReportingEngine, Role, RosterDirectory,
    SafeTimeProvider, StudentId, Term, TimeSource, Uuid, ValidationError,
};

fn fixed_time() -> SafeTimeProvider {
    SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap(),
    ))
}

fn finance() -> Principal {
    Principal::new(Uuid::new_v4(), Role::Finance)
}

fn service() -> (Arc<PaymentService>, Arc<EventBuffer>, Arc<InMemoryLedgerStore>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let buffer = Arc::new(EventBuffer::new());
    let service = Arc::new(PaymentService::new(
        store.clone(),
        Arc::new(OpenRoster),
        buffer.clone(),
        LedgerConfig::default(),
    ));
    (service, buffer, store)
}

fn term_fees(time: &SafeTimeProvider) -> Vec<CategorySpec> {
    vec![
        CategorySpec {
            kind: CategoryKind::Tuition,
            description: Some("term tuition".to_string()),
            amount: Money::from_major(10_000),
            due_date: time.now() + Duration::days(30),
        },
        CategorySpec {
            kind: CategoryKind::Transport,
            description: None,
            amount: Money::from_major(2_000),
            due_date: time.now() + Duration::days(30),
        },
    ]
}

fn payment(amount: i64, category: CategoryKind) -> PaymentRequest {
    PaymentRequest {
        amount: Money::from_major(amount),
        method: PaymentMethod::Cash,
        category,
        transaction_id: None,
        receipt_number: None,
        notes: None,
    }
}

#[test]
fn round_trip_new_ledger_is_pending() {
    let (service, _, _) = service();
    let time = fixed_time();
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::First);

    let ledger = service
        .create_ledger(
            key,
            term_fees(&time),
            Money::from_major(12_000),
            None,
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();

    assert_eq!(ledger.overall_status, CategoryStatus::Pending);
    assert_eq!(ledger.total_pending, Money::from_major(12_000));
    assert!(ledger
        .categories
        .iter()
        .all(|c| c.status == CategoryStatus::Pending));
}

#[test]
fn partial_payment_drives_partial_status() {
    // tuition 10000, pay 4000 -> partial, remaining 6000, overall partial
    let (service, _, _) = service();
    let time = fixed_time();
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::First);

    service
        .create_ledger(
            key.clone(),
            term_fees(&time),
            Money::from_major(12_000),
            None,
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();

    let outcome = service
        .apply_payment(
            &key,
            payment(4_000, CategoryKind::Tuition),
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();

    let tuition = outcome.ledger.category(CategoryKind::Tuition).unwrap();
    assert_eq!(tuition.status, CategoryStatus::Partial);
    assert_eq!(tuition.remaining_amount, Money::from_major(6_000));
    assert_eq!(outcome.ledger.overall_status, CategoryStatus::Partial);
}

#[test]
fn two_installments_settle_a_category() {
    let (service, _, _) = service();
    let time = fixed_time();
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::Second);

    service
        .create_ledger(
            key.clone(),
            vec![CategorySpec {
                kind: CategoryKind::Examination,
                description: None,
                amount: Money::from_major(5_000),
                due_date: time.now() + Duration::days(14),
            }],
            Money::from_major(5_000),
            None,
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();

    service
        .apply_payment(
            &key,
            payment(3_000, CategoryKind::Examination),
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();
    let outcome = service
        .apply_payment(
            &key,
            payment(2_000, CategoryKind::Examination),
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();

    let exam = outcome.ledger.category(CategoryKind::Examination).unwrap();
    assert_eq!(exam.status, CategoryStatus::Paid);
    assert_eq!(exam.remaining_amount, Money::ZERO);
    assert_eq!(outcome.ledger.overall_status, CategoryStatus::Paid);
}

#[test]
fn overpayment_fails_and_ledger_is_unchanged() {
    let (service, _, store) = service();
    let time = fixed_time();
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::First);

    service
        .create_ledger(
            key.clone(),
            vec![CategorySpec {
                kind: CategoryKind::Tuition,
                description: None,
                amount: Money::from_major(5_000),
                due_date: time.now() + Duration::days(30),
            }],
            Money::from_major(5_000),
            None,
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();
    let before = store.get(&key).unwrap();

    let err = service
        .apply_payment(
            &key,
            payment(6_000, CategoryKind::Tuition),
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::AmountExceedsRemaining { .. })
    ));
    assert_eq!(store.get(&key).unwrap(), before);
}

#[test]
fn due_date_crossing_is_seen_on_next_recompute() {
    let (service, _, _) = service();
    let time = fixed_time();
    let controller = time.test_control().unwrap();
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::Third);

    service
        .create_ledger(
            key.clone(),
            vec![
                CategorySpec {
                    kind: CategoryKind::Tuition,
                    description: None,
                    amount: Money::from_major(9_000),
                    due_date: time.now() + Duration::days(7),
                },
                CategorySpec {
                    kind: CategoryKind::Lunch,
                    description: None,
                    amount: Money::from_major(600),
                    due_date: time.now() + Duration::days(90),
                },
            ],
            Money::from_major(9_600),
            None,
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();

    // cross tuition's due date, then trigger a recompute with a small
    // payment against the other category
    controller.advance(Duration::days(10));
    let outcome = service
        .apply_payment(
            &key,
            payment(100, CategoryKind::Lunch),
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();

    let tuition = outcome.ledger.category(CategoryKind::Tuition).unwrap();
    assert_eq!(tuition.status, CategoryStatus::Overdue);
}

#[test]
fn concurrent_payments_never_oversubscribe_a_category() {
    // remaining 5000, two concurrent 3000 payments: exactly one lands
    let (service, _, store) = service();
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::First);
    {
        let time = fixed_time();
        service
            .create_ledger(
                key.clone(),
                vec![CategorySpec {
                    kind: CategoryKind::Tuition,
                    description: None,
                    amount: Money::from_major(5_000),
                    due_date: time.now() + Duration::days(30),
                }],
                Money::from_major(5_000),
                None,
                &actor,
                AccessDecision::AllowWrite,
                &time,
            )
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = service.clone();
        let key = key.clone();
        let actor = finance();
        handles.push(std::thread::spawn(move || {
            let time = fixed_time();
            service.apply_payment(
                &key,
                payment(3_000, CategoryKind::Tuition),
                &actor,
                AccessDecision::AllowWrite,
                &time,
            )
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    for result in &results {
        if let Err(err) = result {
            // the loser revalidated against the fresh snapshot
            assert!(matches!(
                err,
                LedgerError::Validation(ValidationError::AmountExceedsRemaining { .. })
                    | LedgerError::Contention { .. }
            ));
        }
    }

    let ledger = store.get(&key).unwrap();
    let tuition = ledger.category(CategoryKind::Tuition).unwrap();
    assert_eq!(tuition.remaining_amount, Money::from_major(2_000));
    assert_eq!(tuition.status, CategoryStatus::Partial);
    assert!(!tuition.remaining_amount.is_negative());
}

#[test]
fn no_payment_is_lost_under_contention() {
    let threads = 8;
    let store = Arc::new(InMemoryLedgerStore::new());
    let service = Arc::new(PaymentService::new(
        store.clone(),
        Arc::new(OpenRoster),
        Arc::new(EventBuffer::new()),
        // generous retry bound so every individually-valid payment lands
        LedgerConfig::default().with_max_retries(64),
    ));
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::Annual);
    {
        let time = fixed_time();
        service
            .create_ledger(
                key.clone(),
                vec![CategorySpec {
                    kind: CategoryKind::Tuition,
                    description: None,
                    amount: Money::from_major(10_000),
                    due_date: time.now() + Duration::days(30),
                }],
                Money::from_major(10_000),
                None,
                &actor,
                AccessDecision::AllowWrite,
                &time,
            )
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..threads {
        let service = service.clone();
        let key = key.clone();
        let actor = finance();
        handles.push(std::thread::spawn(move || {
            let time = fixed_time();
            service.apply_payment(
                &key,
                payment(100, CategoryKind::Tuition),
                &actor,
                AccessDecision::AllowWrite,
                &time,
            )
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let ledger = store.get(&key).unwrap();
    assert_eq!(ledger.total_paid, Money::from_major(100 * threads as i64));
    assert_eq!(ledger.payments.len(), threads);
    // every receipt number is distinct
    let receipts: HashSet<_> = ledger
        .payments
        .iter()
        .map(|p| p.receipt_number.clone())
        .collect();
    assert_eq!(receipts.len(), threads);
}

#[test]
fn sweep_then_report_shows_overdue_cohort() {
    let (service, buffer, store) = service();
    let time = fixed_time();
    let controller = time.test_control().unwrap();
    let actor = finance();
    let student = Uuid::new_v4();
    let key = LedgerKey::new(student, "2025/2026", Term::First);

    service
        .create_ledger(
            key.clone(),
            vec![CategorySpec {
                kind: CategoryKind::Tuition,
                description: None,
                amount: Money::from_major(7_000),
                due_date: time.now() + Duration::days(5),
            }],
            Money::from_major(7_000),
            None,
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap();
    buffer.take_events();

    controller.advance(Duration::days(6));
    assert_eq!(service.sweep_overdue(&time), 1);
    assert!(matches!(
        buffer.take_events()[0],
        LedgerEvent::CategoryBecameOverdue { .. }
    ));

    let reports = ReportingEngine::new(store);
    let filter = ReportFilter::for_year("2025/2026").with_students(HashSet::from([student]));
    let rows = reports.outstanding_report(&filter);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].overall_status, CategoryStatus::Overdue);
}

#[test]
fn unknown_student_rejected_at_creation() {
    struct EmptyRoster;
    impl RosterDirectory for EmptyRoster {
        fn student_exists(&self, _student: StudentId) -> bool {
            false
        }
    }

    let store = Arc::new(InMemoryLedgerStore::new());
    let service = PaymentService::new(
        store,
        Arc::new(EmptyRoster),
        Arc::new(EventBuffer::new()),
        LedgerConfig::default(),
    );
    let time = fixed_time();
    let actor = finance();
    let key = LedgerKey::new(Uuid::new_v4(), "2025/2026", Term::First);

    let err = service
        .create_ledger(
            key,
            term_fees(&time),
            Money::from_major(12_000),
            None,
            &actor,
            AccessDecision::AllowWrite,
            &time,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Validation(ValidationError::UnknownStudent { .. })
    ));
}
