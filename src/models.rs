//! Floor domain types
//!
//! Diesel row structs mirror `schema.rs` one-to-one and keep statuses as
//! text. The domain types (`DiningTable`, `Order`) carry parsed enums; a row
//! whose status text is not recognised converts to [`DbError::Corrupt`].

use crate::db::DbError;
use crate::schema::{orders, tables};
use chrono::{DateTime, FixedOffset};
use diesel::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Status enums
// ============================================================================

/// Seating status of a dining table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Available,
    Reserved,
    Occupied,
    Maintenance,
}

impl TableStatus {
    pub const ALL: [TableStatus; 4] = [
        TableStatus::Available,
        TableStatus::Reserved,
        TableStatus::Occupied,
        TableStatus::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Available => "available",
            TableStatus::Reserved => "reserved",
            TableStatus::Occupied => "occupied",
            TableStatus::Maintenance => "maintenance",
        }
    }

    /// Statuses set by the reservation and maintenance workflows
    pub fn is_hold(&self) -> bool {
        matches!(self, TableStatus::Reserved | TableStatus::Maintenance)
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown table status '{}'", s))
    }
}

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Served,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Statuses that keep a table busy
    pub const ACTIVE: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Preparing => 1,
            OrderStatus::Ready => 2,
            OrderStatus::Served => 3,
            OrderStatus::Completed | OrderStatus::Cancelled => 4,
        }
    }

    /// Forward moves along pending → preparing → ready → served → completed
    /// (steps may be skipped), or cancellation of a non-terminal order.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == OrderStatus::Cancelled || next.rank() > self.rank()
    }

    /// SQL text values of [`OrderStatus::ACTIVE`]
    pub fn active_strs() -> [&'static str; 4] {
        Self::ACTIVE.map(|status| status.as_str())
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status '{}'", s))
    }
}

// ============================================================================
// Diesel rows
// ============================================================================

/// Insertable table row
#[derive(Insertable)]
#[diesel(table_name = tables)]
pub struct NewTableRow<'a> {
    pub table_number: &'a str,
    pub capacity: i32,
    pub min_capacity: i32,
    pub status: &'a str,
    pub has_active_order: bool,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Queryable table row
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = tables)]
pub struct TableRow {
    pub id: i32,
    pub table_number: String,
    pub capacity: i32,
    pub min_capacity: i32,
    pub status: String,
    pub has_active_order: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Insertable order row
#[derive(Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow<'a> {
    pub order_number: &'a str,
    pub table_id: i32,
    pub status: &'a str,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub order_time: &'a str,
    pub updated_at: &'a str,
}

/// Queryable order row
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = orders)]
pub struct OrderRow {
    pub id: i32,
    pub order_number: String,
    pub table_id: i32,
    pub status: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub order_time: String,
    pub updated_at: String,
}

// ============================================================================
// Domain types
// ============================================================================

/// The two denormalized fields the reconciler owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableState {
    pub has_active_order: bool,
    pub status: TableStatus,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "has_active_order={} status={}", self.has_active_order, self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiningTable {
    pub id: i32,
    pub table_number: String,
    pub capacity: i32,
    pub min_capacity: i32,
    pub status: TableStatus,
    pub has_active_order: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl DiningTable {
    pub fn state(&self) -> TableState {
        TableState {
            has_active_order: self.has_active_order,
            status: self.status,
        }
    }
}

impl TryFrom<TableRow> for DiningTable {
    type Error = DbError;

    fn try_from(row: TableRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|detail| DbError::Corrupt {
            table: "tables",
            id: row.id,
            detail,
        })?;
        Ok(DiningTable {
            id: row.id,
            table_number: row.table_number,
            capacity: row.capacity,
            min_capacity: row.min_capacity,
            status,
            has_active_order: row.has_active_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: i32,
    pub order_number: String,
    pub table_id: i32,
    pub status: OrderStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub order_time: String,
    pub updated_at: String,
}

impl Order {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Parsed `order_time`, `None` if the stored text is not RFC 3339
    pub fn placed_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.order_time).ok()
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|detail| DbError::Corrupt {
            table: "orders",
            id: row.id,
            detail,
        })?;
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            table_id: row.table_id,
            status,
            subtotal_cents: row.subtotal_cents,
            tax_cents: row.tax_cents,
            discount_cents: row.discount_cents,
            total_cents: row.total_cents,
            order_time: row.order_time,
            updated_at: row.updated_at,
        })
    }
}

/// Format minor units as a decimal amount, e.g. `1250` → `12.50`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_text() {
        for status in TableStatus::ALL {
            assert_eq!(status.as_str().parse::<TableStatus>().unwrap(), status);
        }
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("seated".parse::<TableStatus>().is_err());
        assert!("PENDING".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_active_set_excludes_terminal_statuses() {
        assert!(OrderStatus::Pending.is_active());
        assert!(OrderStatus::Preparing.is_active());
        assert!(OrderStatus::Ready.is_active());
        assert!(OrderStatus::Served.is_active());
        assert!(!OrderStatus::Completed.is_active());
        assert!(!OrderStatus::Cancelled.is_active());
        assert_eq!(OrderStatus::active_strs(), ["pending", "preparing", "ready", "served"]);
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Preparing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Served));
        assert!(OrderStatus::Served.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Cancelled));

        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Served.can_transition_to(OrderStatus::Served));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_hold_statuses() {
        assert!(TableStatus::Reserved.is_hold());
        assert!(TableStatus::Maintenance.is_hold());
        assert!(!TableStatus::Available.is_hold());
        assert!(!TableStatus::Occupied.is_hold());
    }

    #[test]
    fn test_corrupt_status_row_is_rejected() {
        let row = TableRow {
            id: 7,
            table_number: "T7".to_string(),
            capacity: 4,
            min_capacity: 1,
            status: "seated".to_string(),
            has_active_order: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        match DiningTable::try_from(row) {
            Err(DbError::Corrupt { table, id, .. }) => {
                assert_eq!(table, "tables");
                assert_eq!(id, 7);
            }
            other => panic!("expected corrupt row error, got {:?}", other),
        }
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(1250), "12.50");
        assert_eq!(format_cents(7), "0.07");
        assert_eq!(format_cents(-305), "-3.05");
    }
}
