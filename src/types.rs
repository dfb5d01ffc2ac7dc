use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a student
pub type StudentId = Uuid;

/// unique identifier for a principal (any authenticated account)
pub type PrincipalId = Uuid;

/// academic term a ledger is billed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    First,
    Second,
    Third,
    Annual,
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Term::First => "1st Term",
            Term::Second => "2nd Term",
            Term::Third => "3rd Term",
            Term::Annual => "Annual",
        };
        write!(f, "{}", s)
    }
}

/// billable fee category kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Tuition,
    Library,
    Laboratory,
    Sports,
    Transport,
    Lunch,
    Examination,
    Development,
    Other,
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CategoryKind::Tuition => "tuition",
            CategoryKind::Library => "library",
            CategoryKind::Laboratory => "laboratory",
            CategoryKind::Sports => "sports",
            CategoryKind::Transport => "transport",
            CategoryKind::Lunch => "lunch",
            CategoryKind::Examination => "examination",
            CategoryKind::Development => "development",
            CategoryKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// payment methods accepted by the finance office
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Online,
    Cheque,
}

/// derived status of a single fee category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    /// nothing paid, due date not reached
    Pending,
    /// partly paid
    Partial,
    /// fully paid
    Paid,
    /// nothing paid and past due date
    Overdue,
}

/// derived status of a whole ledger, same domain as the category status
pub type OverallStatus = CategoryStatus;

/// lifecycle status of a payment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// counted toward all derived sums
    Completed,
    /// recorded but not yet confirmed, inert
    Pending,
    /// rejected by the payment channel, inert
    Failed,
    /// reversal of an earlier completed record, inert itself
    Refunded,
}

/// role of a principal, resolved by the identity collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Parent,
    Staff,
    Finance,
    Admin,
}

/// identity of the caller, passed explicitly into every service call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: PrincipalId, role: Role) -> Self {
        Self { id, role }
    }
}

/// authorization decision resolved by the external authorization component.
/// the core trusts this verdict and never re-derives role semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    AllowRead,
    AllowWrite,
    Deny,
}

impl AccessDecision {
    pub fn allows_read(&self) -> bool {
        matches!(self, AccessDecision::AllowRead | AccessDecision::AllowWrite)
    }

    pub fn allows_write(&self) -> bool {
        matches!(self, AccessDecision::AllowWrite)
    }
}
