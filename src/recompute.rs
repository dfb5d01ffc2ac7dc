use chrono::{DateTime, Utc};

use crate::config::AdjustmentPolicy;
use crate::decimal::Money;
use crate::ledger::Ledger;
use crate::types::CategoryStatus;

/// derive every status and total on the ledger from its raw payment history.
///
/// pure and idempotent: the output depends only on the category definitions,
/// the counted payments, `now` and the adjustment policy. never fails on a
/// well-formed ledger; unrecognized category tags on payment records are a
/// precondition violation caught at application time, not here.
pub fn recompute(ledger: &mut Ledger, now: DateTime<Utc>, policy: AdjustmentPolicy) {
    let counted: Vec<(crate::types::CategoryKind, Money)> = ledger
        .counted_payments()
        .map(|p| (p.category, p.amount))
        .collect();

    for category in &mut ledger.categories {
        let paid: Money = counted
            .iter()
            .filter(|(kind, _)| *kind == category.kind)
            .map(|(_, amount)| *amount)
            .sum();

        category.paid_amount = paid;
        // no floor at zero: a negative remaining is itself an invariant breach
        // worth detecting, not masking
        category.remaining_amount = category.amount - paid;
        category.status = if category.remaining_amount <= Money::ZERO {
            CategoryStatus::Paid
        } else if paid > Money::ZERO {
            CategoryStatus::Partial
        } else if category.due_date < now {
            CategoryStatus::Overdue
        } else {
            CategoryStatus::Pending
        };
    }

    ledger.total_paid = counted.iter().map(|(_, amount)| *amount).sum();
    ledger.total_pending = effective_total(ledger, policy) - ledger.total_paid;

    ledger.overall_status = if ledger.total_pending <= Money::ZERO {
        CategoryStatus::Paid
    } else if ledger.total_paid > Money::ZERO {
        CategoryStatus::Partial
    } else if ledger
        .categories
        .iter()
        .any(|c| c.status == CategoryStatus::Overdue)
    {
        CategoryStatus::Overdue
    } else {
        CategoryStatus::Pending
    };
}

/// nominal total, adjusted by discount and late fee only under `Apply`
pub fn effective_total(ledger: &Ledger, policy: AdjustmentPolicy) -> Money {
    match policy {
        AdjustmentPolicy::RecordOnly => ledger.total_amount,
        AdjustmentPolicy::Apply => {
            let mut total = ledger.total_amount;
            if let Some(discount) = &ledger.discount {
                total -= discount.amount_off(ledger.total_amount);
            }
            if let Some(late_fee) = &ledger.late_fee {
                total += late_fee.amount;
            }
            total
        }
    }
}
