//! Persistence operations the reconciler depends on
//!
//! The reconciler only needs five lookups/writes plus a way to run them as
//! one atomic unit. [`FloorStore`] names exactly those, so reconciliation
//! logic stays independent of the storage engine. The SQLite implementation
//! lives on diesel's [`SqliteConnection`].

use crate::db::{DbError, Result};
use crate::models::{DiningTable, Order, OrderRow, OrderStatus, TableRow, TableState};
use crate::schema::{orders, tables};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

pub trait FloorStore {
    /// Find a table by id, `None` if it does not exist
    fn find_table(&mut self, table_id: i32) -> Result<Option<DiningTable>>;

    /// Every table id, ascending
    fn table_ids(&mut self) -> Result<Vec<i32>>;

    /// Whether the table has at least one order in one of `statuses`
    fn any_order_in(&mut self, table_id: i32, statuses: &[OrderStatus]) -> Result<bool>;

    /// All orders of a table regardless of status
    fn orders_for_table(&mut self, table_id: i32) -> Result<Vec<Order>>;

    /// Overwrite the table's denormalized fields
    fn write_table_state(&mut self, table_id: i32, state: TableState) -> Result<()>;

    /// Run `f` holding the store's write lock; an `Err` rolls back every write `f` made
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>;
}

impl FloorStore for SqliteConnection {
    fn find_table(&mut self, table_id: i32) -> Result<Option<DiningTable>> {
        let row = tables::table
            .find(table_id)
            .select(TableRow::as_select())
            .first::<TableRow>(self)
            .optional()?;
        row.map(DiningTable::try_from).transpose()
    }

    fn table_ids(&mut self) -> Result<Vec<i32>> {
        let ids = tables::table
            .select(tables::id)
            .order(tables::id.asc())
            .load::<i32>(self)?;
        Ok(ids)
    }

    fn any_order_in(&mut self, table_id: i32, statuses: &[OrderStatus]) -> Result<bool> {
        let values: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let found = diesel::select(diesel::dsl::exists(
            orders::table
                .filter(orders::table_id.eq(table_id))
                .filter(orders::status.eq_any(values)),
        ))
        .get_result::<bool>(self)?;
        Ok(found)
    }

    fn orders_for_table(&mut self, table_id: i32) -> Result<Vec<Order>> {
        orders::table
            .filter(orders::table_id.eq(table_id))
            .order(orders::id.asc())
            .select(OrderRow::as_select())
            .load::<OrderRow>(self)?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }

    fn write_table_state(&mut self, table_id: i32, state: TableState) -> Result<()> {
        let now = chrono::Local::now().to_rfc3339();

        let updated = diesel::update(tables::table.find(table_id))
            .set((
                tables::has_active_order.eq(state.has_active_order),
                tables::status.eq(state.status.as_str()),
                tables::updated_at.eq(&now),
            ))
            .execute(self)?;

        if updated == 0 {
            return Err(DbError::TableNotFound(table_id));
        }
        Ok(())
    }

    // BEGIN IMMEDIATE takes the write lock before the first read, so a
    // concurrent order-status write cannot slip between read and write.
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.immediate_transaction(f)
    }
}
