//! Table active-order derivation and repair
//!
//! A table "has an active order" when at least one of its orders is
//! pending, preparing, ready or served. The `tables` row caches that fact in
//! `has_active_order` and reflects it in `status`; both drift when a write
//! path forgets to update them. Everything that needs the truth (the `fix`
//! and `check` commands, the order-status hook in `db.rs`) goes through this
//! module.

use crate::db::{DbError, Result};
use crate::models::{Order, OrderStatus, TableState, TableStatus};
use crate::store::FloorStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How the reconciler treats `reserved` and `maintenance` tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StatusPolicy {
    /// Only the flag is compared; a repair always writes occupied/available.
    Overwrite,
    /// Flag and status are both compared; holds survive when no order is active.
    #[default]
    PreserveHolds,
}

/// Outcome of reconciling (or checking) one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairResult {
    pub table_id: i32,
    pub table_number: String,
    /// For `check_*`, whether a repair would change the table
    pub changed: bool,
    pub before: TableState,
    pub after: TableState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub table_id: i32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub tables_scanned: usize,
    pub tables_fixed: usize,
    pub results: Vec<RepairResult>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn changed(&self) -> impl Iterator<Item = &RepairResult> {
        self.results.iter().filter(|r| r.changed)
    }
}

/// True iff the table has an order in an active status
pub fn has_active_order<S: FloorStore>(store: &mut S, table_id: i32) -> Result<bool> {
    store.any_order_in(table_id, &OrderStatus::ACTIVE)
}

/// The order a table is currently working on.
///
/// A table can hold several active orders at once (a served round plus a new
/// pending one). The oldest `order_time` wins; equal times fall back to the
/// lowest id, and unparseable times sort last.
pub fn active_order<S: FloorStore>(store: &mut S, table_id: i32) -> Result<Option<Order>> {
    Ok(select_active(store.orders_for_table(table_id)?))
}

pub fn select_active<I>(orders: I) -> Option<Order>
where
    I: IntoIterator<Item = Order>,
{
    orders
        .into_iter()
        .filter(Order::is_active)
        .min_by_key(|order| {
            let placed = order.placed_at();
            (placed.is_none(), placed, order.id)
        })
}

/// Target state for a table, or `None` when it already matches the truth
pub fn plan_repair(current: TableState, truth: bool, policy: StatusPolicy) -> Option<TableState> {
    let status = if truth {
        TableStatus::Occupied
    } else if policy == StatusPolicy::PreserveHolds && current.status.is_hold() {
        current.status
    } else {
        TableStatus::Available
    };

    let drifted = match policy {
        StatusPolicy::Overwrite => current.has_active_order != truth,
        StatusPolicy::PreserveHolds => {
            current.has_active_order != truth || current.status != status
        }
    };

    drifted.then_some(TableState {
        has_active_order: truth,
        status,
    })
}

/// Read-only: what `reconcile_table` would do
pub fn check_table<S: FloorStore>(
    store: &mut S,
    table_id: i32,
    policy: StatusPolicy,
) -> Result<RepairResult> {
    let table = store
        .find_table(table_id)?
        .ok_or(DbError::TableNotFound(table_id))?;
    let truth = has_active_order(store, table_id)?;
    let before = table.state();
    let planned = plan_repair(before, truth, policy);

    Ok(RepairResult {
        table_id,
        table_number: table.table_number,
        changed: planned.is_some(),
        before,
        after: planned.unwrap_or(before),
    })
}

/// Recompute the truth for one table and write the two fields if they drifted.
///
/// Read, compare and write happen inside one [`FloorStore::atomically`] unit.
/// A missing table is reported as [`DbError::TableNotFound`] and nothing is
/// written.
pub fn reconcile_table<S: FloorStore>(
    store: &mut S,
    table_id: i32,
    policy: StatusPolicy,
) -> Result<RepairResult> {
    store.atomically(|store| repair_table(store, table_id, policy))
}

/// Body of [`reconcile_table`] without its own transaction.
///
/// For callers that already hold an [`FloorStore::atomically`] unit and need
/// the repair to commit or roll back together with their own writes.
pub fn repair_table<S: FloorStore>(
    store: &mut S,
    table_id: i32,
    policy: StatusPolicy,
) -> Result<RepairResult> {
    let result = check_table(store, table_id, policy)?;
    if result.changed {
        store.write_table_state(table_id, result.after)?;
        info!(
            table_id,
            table_number = %result.table_number,
            before = %result.before,
            after = %result.after,
            "repaired table state"
        );
    } else {
        debug!(table_id, "table state consistent");
    }
    Ok(result)
}

/// Reconcile every table; one table's failure never stops the rest
pub fn reconcile_all<S: FloorStore>(store: &mut S, policy: StatusPolicy) -> Result<SweepReport> {
    let report = sweep(store, |store, id| reconcile_table(store, id, policy))?;
    info!(
        scanned = report.tables_scanned,
        fixed = report.tables_fixed,
        failed = report.failures.len(),
        "reconcile sweep finished"
    );
    Ok(report)
}

/// Read-only sweep; `tables_fixed` counts tables that would change
pub fn check_all<S: FloorStore>(store: &mut S, policy: StatusPolicy) -> Result<SweepReport> {
    sweep(store, |store, id| check_table(store, id, policy))
}

fn sweep<S, F>(store: &mut S, mut step: F) -> Result<SweepReport>
where
    S: FloorStore,
    F: FnMut(&mut S, i32) -> Result<RepairResult>,
{
    let mut report = SweepReport::default();

    for table_id in store.table_ids()? {
        report.tables_scanned += 1;
        match step(store, table_id) {
            Ok(result) => {
                if result.changed {
                    report.tables_fixed += 1;
                }
                report.results.push(result);
            }
            Err(e) => {
                warn!(table_id, error = %e, "table reconciliation failed");
                report.failures.push(SweepFailure {
                    table_id,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
