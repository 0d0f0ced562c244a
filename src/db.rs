//! SQLite database with Diesel ORM
//!
//! Stores dining tables and their orders. Schema is created on open; the
//! reconciliation logic itself lives in `reconcile.rs` and reaches the
//! database through the [`FloorStore`] implementation in `store.rs`.

use crate::models::{
    DiningTable, NewOrderRow, NewTableRow, Order, OrderRow, OrderStatus, TableRow, TableStatus,
};
use crate::reconcile::{self, RepairResult, StatusPolicy, SweepReport};
use crate::schema::*;
use crate::store::FloorStore;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Name of the per-project data directory
pub const DATA_DIR: &str = ".tablestate";

/// Database file name inside [`DATA_DIR`]
pub const DB_FILE: &str = "tablestate.db";

/// Walk up directory tree to find .tablestate folder (like git finds .git)
/// Can be overridden with TABLESTATE_DB_PATH env var
fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("TABLESTATE_DB_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let data_dir = dir.join(DATA_DIR);
            if data_dir.is_dir() {
                return data_dir.join(DB_FILE);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    // Nothing found - `tablestate init` creates it here
    PathBuf::from(DATA_DIR).join(DB_FILE)
}

/// Current schema version for tablestate
pub const CURRENT_SCHEMA: FloorSchema = FloorSchema {
    major: 1,
    minor: 1,
    patch: 0,
    name: "floor-state",
    features: &["tables", "orders", "order_money_cents"],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct FloorSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl FloorSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&feature)
    }
}

impl std::fmt::Display for FloorSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

/// Insertable schema version
#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
struct NewSchemaVersion<'a> {
    version: &'a str,
    name: &'a str,
    features: &'a str,
    introduced_at: &'a str,
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("Pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("{0}")]
    Validation(String),
    #[error("Table {0} does not exist. Run 'tablestate table list' to see existing tables.")]
    TableNotFound(i32),
    #[error("Order {0} does not exist. Run 'tablestate order list' to see existing orders.")]
    OrderNotFound(i32),
    #[error("Corrupt row {table}#{id}: {detail}")]
    Corrupt {
        table: &'static str,
        id: i32,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, DbError>;

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Applies per-connection pragmas when the pool hands out a connection
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        diesel::sql_query("PRAGMA busy_timeout = 5000")
            .execute(conn)
            .and_then(|_| diesel::sql_query("PRAGMA foreign_keys = ON").execute(conn))
            .map(|_| ())
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
}

/// Fields for a new order; money in minor units
#[derive(Debug, Clone, Default)]
pub struct NewOrder<'a> {
    pub order_number: Option<&'a str>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_rate_percent: f64,
}

/// Table with its orders and the derived view of them
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableDetail {
    pub table: DiningTable,
    pub derived_has_active_order: bool,
    pub active_order: Option<Order>,
    pub orders: Vec<Order>,
}

/// An order-status change together with the table repair it triggered
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrderUpdate {
    pub order: Order,
    pub previous_status: OrderStatus,
    pub table: RepairResult,
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        get_db_path()
    }

    /// Open database at default path (respects TABLESTATE_DB_PATH env var)
    pub fn open() -> Result<Self> {
        let path = get_db_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::Connection(format!("{}: {}", parent.display(), e)))?;
            }
        }
        Self::open_at(&path)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        debug!(path = %path_str, "opening database");

        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(5)
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS tables (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                table_number TEXT NOT NULL UNIQUE,
                capacity INTEGER NOT NULL,
                min_capacity INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'available',
                has_active_order BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                order_number TEXT NOT NULL UNIQUE,
                table_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                subtotal_cents BIGINT NOT NULL DEFAULT 0,
                tax_cents BIGINT NOT NULL DEFAULT 0,
                discount_cents BIGINT NOT NULL DEFAULT 0,
                total_cents BIGINT NOT NULL DEFAULT 0,
                order_time TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (table_id) REFERENCES tables(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_orders_table ON orders(table_id)")
            .execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)")
            .execute(&mut conn)?;

        self.register_schema(&mut conn, &CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(&self, conn: &mut SqliteConnection, schema: &FloorSchema) -> Result<()> {
        let now = chrono::Local::now().to_rfc3339();
        let features_json = serde_json::to_string(&schema.features).unwrap_or_default();

        let inserted = diesel::insert_or_ignore_into(schema_versions::table)
            .values(&NewSchemaVersion {
                version: &schema.version_string(),
                name: schema.name,
                features: &features_json,
                introduced_at: &now,
            })
            .execute(conn)?;

        if inserted > 0 {
            info!(schema = %schema, "registered schema version");
        }
        Ok(())
    }

    /// Schema versions recorded in this database, oldest first
    pub fn schema_versions(&self) -> Result<Vec<String>> {
        let mut conn = self.get_conn()?;
        let versions = schema_versions::table
            .select(schema_versions::version)
            .order(schema_versions::id.asc())
            .load::<String>(&mut conn)?;
        Ok(versions)
    }

    /// Run reconciler operations on one pooled connection
    pub fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        let mut conn = self.get_conn()?;
        f(&mut conn)
    }

    // ========================================================================
    // Table Operations
    // ========================================================================

    /// Create a new dining table; starts available with no active order
    pub fn create_table(
        &self,
        table_number: &str,
        capacity: i32,
        min_capacity: i32,
    ) -> Result<i32> {
        let table_number = table_number.trim();
        if table_number.is_empty() {
            return Err(DbError::Validation("Table number must not be empty".to_string()));
        }
        if capacity <= 0 {
            return Err(DbError::Validation(format!("Capacity must be positive, got {}", capacity)));
        }
        if min_capacity < 1 || min_capacity > capacity {
            return Err(DbError::Validation(format!(
                "Minimum capacity must be between 1 and {}, got {}",
                capacity, min_capacity
            )));
        }

        let mut conn = self.get_conn()?;
        let now = chrono::Local::now().to_rfc3339();

        let taken = diesel::select(diesel::dsl::exists(
            tables::table.filter(tables::table_number.eq(table_number)),
        ))
        .get_result::<bool>(&mut conn)?;
        if taken {
            return Err(DbError::Validation(format!("Table '{}' already exists", table_number)));
        }

        diesel::insert_into(tables::table)
            .values(&NewTableRow {
                table_number,
                capacity,
                min_capacity,
                status: TableStatus::Available.as_str(),
                has_active_order: false,
                created_at: &now,
                updated_at: &now,
            })
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;

        info!(table_id = id, table_number, "created table");
        Ok(id)
    }

    /// Get all tables ordered by id
    pub fn list_tables(&self) -> Result<Vec<DiningTable>> {
        let mut conn = self.get_conn()?;
        tables::table
            .order(tables::id.asc())
            .select(TableRow::as_select())
            .load::<TableRow>(&mut conn)?
            .into_iter()
            .map(DiningTable::try_from)
            .collect()
    }

    pub fn get_table(&self, table_id: i32) -> Result<DiningTable> {
        let mut conn = self.get_conn()?;
        conn.find_table(table_id)?
            .ok_or(DbError::TableNotFound(table_id))
    }

    pub fn find_table_by_number(&self, table_number: &str) -> Result<Option<DiningTable>> {
        let mut conn = self.get_conn()?;
        tables::table
            .filter(tables::table_number.eq(table_number))
            .select(TableRow::as_select())
            .first::<TableRow>(&mut conn)
            .optional()?
            .map(DiningTable::try_from)
            .transpose()
    }

    /// Table with its orders, the derived flag and the selected active order
    pub fn table_detail(&self, table_id: i32) -> Result<TableDetail> {
        self.with_store(|conn| {
            let table = conn
                .find_table(table_id)?
                .ok_or(DbError::TableNotFound(table_id))?;
            let derived_has_active_order = reconcile::has_active_order(conn, table_id)?;
            let orders = conn.orders_for_table(table_id)?;
            let active_order = reconcile::select_active(orders.iter().cloned());
            Ok(TableDetail {
                table,
                derived_has_active_order,
                active_order,
                orders,
            })
        })
    }

    /// Directly edit a table's status and/or flag.
    ///
    /// This is the path reservation and maintenance workflows use, and an
    /// operator override; it does not reconcile.
    pub fn set_table_fields(
        &self,
        table_id: i32,
        status: Option<TableStatus>,
        has_active_order: Option<bool>,
    ) -> Result<DiningTable> {
        if status.is_none() && has_active_order.is_none() {
            return Err(DbError::Validation(
                "Nothing to update: pass a status and/or has_active_order".to_string(),
            ));
        }

        self.with_store(|conn| {
            conn.atomically(|conn| {
                let mut state = conn
                    .find_table(table_id)?
                    .ok_or(DbError::TableNotFound(table_id))?
                    .state();
                if let Some(status) = status {
                    state.status = status;
                }
                if let Some(flag) = has_active_order {
                    state.has_active_order = flag;
                }
                conn.write_table_state(table_id, state)?;
                conn.find_table(table_id)?
                    .ok_or(DbError::TableNotFound(table_id))
            })
        })
    }

    // ========================================================================
    // Order Operations
    // ========================================================================

    /// Create a pending order on a table and reconcile that table.
    ///
    /// The insert and the table repair commit together or not at all.
    pub fn create_order(
        &self,
        table_id: i32,
        new_order: &NewOrder<'_>,
        policy: StatusPolicy,
    ) -> Result<(Order, RepairResult)> {
        let (tax_cents, total_cents) = order_totals(
            new_order.subtotal_cents,
            new_order.discount_cents,
            new_order.tax_rate_percent,
        )?;
        let generated;
        let order_number = match new_order.order_number {
            Some(number) if !number.trim().is_empty() => number.trim(),
            Some(_) => {
                return Err(DbError::Validation("Order number must not be empty".to_string()))
            }
            None => {
                generated = generate_order_number();
                generated.as_str()
            }
        };

        self.with_store(|conn| {
            conn.atomically(|conn| {
                if conn.find_table(table_id)?.is_none() {
                    return Err(DbError::TableNotFound(table_id));
                }

                let taken = diesel::select(diesel::dsl::exists(
                    orders::table.filter(orders::order_number.eq(order_number)),
                ))
                .get_result::<bool>(conn)?;
                if taken {
                    return Err(DbError::Validation(format!(
                        "Order '{}' already exists",
                        order_number
                    )));
                }

                let now = chrono::Local::now().to_rfc3339();
                diesel::insert_into(orders::table)
                    .values(&NewOrderRow {
                        order_number,
                        table_id,
                        status: OrderStatus::Pending.as_str(),
                        subtotal_cents: new_order.subtotal_cents,
                        tax_cents,
                        discount_cents: new_order.discount_cents,
                        total_cents,
                        order_time: &now,
                        updated_at: &now,
                    })
                    .execute(conn)?;

                let order_id = last_insert_rowid(conn)?;
                let order = load_order(conn, order_id)?;
                let table = reconcile::repair_table(conn, table_id, policy)?;
                info!(
                    order_id = order.id,
                    table_id,
                    order_number = %order.order_number,
                    "created order"
                );
                Ok((order, table))
            })
        })
    }

    pub fn get_order(&self, order_id: i32) -> Result<Order> {
        let mut conn = self.get_conn()?;
        load_order(&mut conn, order_id)
    }

    /// All orders, or one table's orders, ordered by id
    pub fn list_orders(&self, table_id: Option<i32>) -> Result<Vec<Order>> {
        let mut conn = self.get_conn()?;
        let rows = match table_id {
            Some(table_id) => orders::table
                .filter(orders::table_id.eq(table_id))
                .order(orders::id.asc())
                .select(OrderRow::as_select())
                .load::<OrderRow>(&mut conn)?,
            None => orders::table
                .order(orders::id.asc())
                .select(OrderRow::as_select())
                .load::<OrderRow>(&mut conn)?,
        };
        rows.into_iter().map(Order::try_from).collect()
    }

    /// Move an order to a new status and reconcile its table.
    ///
    /// The status change and the table repair commit together or not at all.
    /// Without `force` the move must follow the order lifecycle
    /// (see [`OrderStatus::can_transition_to`]).
    pub fn set_order_status(
        &self,
        order_id: i32,
        status: OrderStatus,
        force: bool,
        policy: StatusPolicy,
    ) -> Result<OrderUpdate> {
        self.with_store(|conn| {
            conn.atomically(|conn| {
                let order = load_order(conn, order_id)?;
                if !force && !order.status.can_transition_to(status) {
                    return Err(DbError::Validation(format!(
                        "Order {} cannot move from {} to {}",
                        order.order_number, order.status, status
                    )));
                }

                let now = chrono::Local::now().to_rfc3339();
                diesel::update(orders::table.find(order_id))
                    .set((
                        orders::status.eq(status.as_str()),
                        orders::updated_at.eq(&now),
                    ))
                    .execute(conn)?;

                let previous_status = order.status;
                let order = load_order(conn, order_id)?;
                let table = reconcile::repair_table(conn, order.table_id, policy)?;
                info!(order_id, from = %previous_status, to = %status, "order status changed");
                Ok(OrderUpdate {
                    order,
                    previous_status,
                    table,
                })
            })
        })
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    pub fn reconcile_table(&self, table_id: i32, policy: StatusPolicy) -> Result<RepairResult> {
        self.with_store(|conn| reconcile::reconcile_table(conn, table_id, policy))
    }

    pub fn reconcile_all(&self, policy: StatusPolicy) -> Result<SweepReport> {
        self.with_store(|conn| reconcile::reconcile_all(conn, policy))
    }

    pub fn check_table(&self, table_id: i32, policy: StatusPolicy) -> Result<RepairResult> {
        self.with_store(|conn| reconcile::check_table(conn, table_id, policy))
    }

    pub fn check_all(&self, policy: StatusPolicy) -> Result<SweepReport> {
        self.with_store(|conn| reconcile::check_all(conn, policy))
    }
}

fn last_insert_rowid(conn: &mut SqliteConnection) -> Result<i32> {
    let id = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .first::<i32>(conn)?;
    Ok(id)
}

fn load_order(conn: &mut SqliteConnection, order_id: i32) -> Result<Order> {
    orders::table
        .find(order_id)
        .select(OrderRow::as_select())
        .first::<OrderRow>(conn)
        .optional()?
        .ok_or(DbError::OrderNotFound(order_id))
        .and_then(Order::try_from)
}

/// `ORD-` followed by 8 hex characters of a v4 UUID
pub fn generate_order_number() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", id[..8].to_uppercase())
}

/// Tax and total for an order: `(tax, subtotal + tax - discount)`.
///
/// Amounts that do not fit in `i64` cents are rejected.
pub fn order_totals(
    subtotal_cents: i64,
    discount_cents: i64,
    tax_rate_percent: f64,
) -> Result<(i64, i64)> {
    if subtotal_cents < 0 || discount_cents < 0 {
        return Err(DbError::Validation("Amounts must not be negative".to_string()));
    }
    if !tax_rate_percent.is_finite() || tax_rate_percent < 0.0 {
        return Err(DbError::Validation(format!("Invalid tax rate {}", tax_rate_percent)));
    }

    let out_of_range = || {
        DbError::Validation(format!(
            "Order amount out of range (subtotal {}, tax rate {}%)",
            subtotal_cents, tax_rate_percent
        ))
    };

    // i64::MAX as f64 rounds up to 2^63, so the bound is exclusive
    let tax = (subtotal_cents as f64 * tax_rate_percent / 100.0).round();
    if !tax.is_finite() || tax >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    let tax_cents = tax as i64;

    let gross_cents = subtotal_cents.checked_add(tax_cents).ok_or_else(out_of_range)?;
    let total_cents = gross_cents - discount_cents;
    if total_cents < 0 {
        return Err(DbError::Validation(format!(
            "Discount {} exceeds subtotal plus tax {}",
            discount_cents, gross_cents
        )));
    }
    Ok((tax_cents, total_cents))
}
