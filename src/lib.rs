//! tablestate - Dining table state tooling for restaurant floors
//!
//! Derive which tables have active orders, audit the stored flags, repair drift.
//!
//! # Overview
//!
//! Each dining table caches two fields: `has_active_order` and `status`.
//! Both can be derived from the table's orders, and both drift when a write
//! path forgets to keep them in step. tablestate owns a small SQLite floor
//! database and one reconciliation routine that every caller goes through.
//!
//! # Order Statuses
//!
//! | Status | Active |
//! |--------|--------|
//! | `pending` | yes |
//! | `preparing` | yes |
//! | `ready` | yes |
//! | `served` | yes |
//! | `completed` | no |
//! | `cancelled` | no |
//!
//! # Quick Start
//!
//! ```no_run
//! use tablestate::{Database, NewOrder, StatusPolicy};
//!
//! let db = Database::open_at("floor.db").unwrap();
//!
//! let table_id = db.create_table("T1", 4, 1).unwrap();
//! let (order, _) = db
//!     .create_order(table_id, &NewOrder::default(), StatusPolicy::default())
//!     .unwrap();
//!
//! // Repair every table whose stored state drifted
//! let report = db.reconcile_all(StatusPolicy::default()).unwrap();
//! println!("scanned {}, fixed {}", report.tables_scanned, report.tables_fixed);
//! # let _ = order;
//! ```

pub mod config;
pub mod db;
pub mod init;
pub mod models;
pub mod reconcile;
pub mod schema;
pub mod store;

pub use config::Config;
pub use db::{Database, DbError, NewOrder, OrderUpdate, TableDetail, CURRENT_SCHEMA};
pub use models::{DiningTable, Order, OrderStatus, TableState, TableStatus};
pub use reconcile::{
    active_order, check_all, check_table, has_active_order, plan_repair, reconcile_all,
    reconcile_table, repair_table, RepairResult, StatusPolicy, SweepFailure, SweepReport,
};
pub use store::FloorStore;
