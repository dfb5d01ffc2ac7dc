use thiserror::Error;

use crate::decimal::Money;
use crate::ledger::LedgerKey;
use crate::types::CategoryKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("ledger not found: {key}")]
    NotFound { key: LedgerKey },

    #[error("ledger already exists: {key}")]
    DuplicateLedger { key: LedgerKey },

    #[error("version conflict: expected {expected}, stored {stored}")]
    Conflict { expected: u64, stored: u64 },

    #[error("contention: {attempts} write attempts exhausted for {key}")]
    Contention { key: LedgerKey, attempts: u32 },

    #[error("access denied for principal {principal}")]
    AccessDenied { principal: uuid::Uuid },
}

/// bad input shape or semantics; the caller fixes and resubmits, no retry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("payment amount must be positive: {amount}")]
    NonPositiveAmount { amount: Money },

    #[error("category {category} not present in ledger")]
    UnknownCategory { category: CategoryKind },

    #[error("payment {requested} exceeds remaining {remaining} for {category}")]
    AmountExceedsRemaining {
        category: CategoryKind,
        remaining: Money,
        requested: Money,
    },

    #[error("unknown student: {student}")]
    UnknownStudent { student: uuid::Uuid },

    #[error("a ledger needs at least one fee category")]
    EmptyCategories,

    #[error("duplicate category {category} in ledger definition")]
    DuplicateCategory { category: CategoryKind },

    #[error("category amount must not be negative: {category} {amount}")]
    NegativeCategoryAmount {
        category: CategoryKind,
        amount: Money,
    },

    #[error("transaction {transaction_id} not found in payment history")]
    UnknownTransaction { transaction_id: String },

    #[error("transaction {transaction_id} already present in payment history")]
    DuplicateTransaction { transaction_id: String },

    #[error("transaction {transaction_id} is not a completed payment")]
    NotRefundable { transaction_id: String },

    #[error("transaction {transaction_id} is already refunded")]
    AlreadyRefunded { transaction_id: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
