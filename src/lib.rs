pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod recompute;
pub mod reports;
pub mod service;
pub mod store;
pub mod types;

// re-export key types
pub use config::{AdjustmentPolicy, LedgerConfig};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result, ValidationError};
pub use events::{EventBuffer, LedgerEvent, NotificationHook, NullHook};
pub use ledger::{
    Discount, DiscountValue, FeeCategory, LateFee, Ledger, LedgerKey, PaymentRecord,
};
pub use recompute::{effective_total, recompute};
pub use reports::{
    CategoryTotals, MonthlyCollection, OutstandingEntry, ReportFilter, ReportingEngine,
};
pub use service::{
    CategorySpec, OpenRoster, PaymentOutcome, PaymentRequest, PaymentService, RosterDirectory,
};
pub use store::{InMemoryLedgerStore, LedgerStore};
pub use types::{
    AccessDecision, CategoryKind, CategoryStatus, OverallStatus, PaymentMethod, PaymentStatus,
    Principal, PrincipalId, Role, StudentId, Term,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
