use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use tablestate::models::format_cents;
use tablestate::{
    Config, Database, DiningTable, NewOrder, Order, OrderStatus, RepairResult, StatusPolicy,
    SweepReport, TableStatus,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tablestate")]
#[command(
    author,
    version,
    about = "Dining table state tooling: derive active orders, audit and repair table flags"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// How repairs treat reserved/maintenance tables (overrides .tablestate/config.toml)
    #[arg(long, global = true, value_enum)]
    policy: Option<StatusPolicy>,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create .tablestate/ with the database and a default config
    Init,

    /// Manage dining tables
    Table {
        #[command(subcommand)]
        action: TableCommand,
    },

    /// Manage orders
    Order {
        #[command(subcommand)]
        action: OrderCommand,
    },

    /// Report tables whose stored state drifted (read-only)
    Check {
        /// Only check this table id
        #[arg(short, long)]
        table: Option<i32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Repair drifted table state, for one table or all of them
    Fix {
        /// Only repair this table id
        #[arg(short, long)]
        table: Option<i32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
enum TableCommand {
    /// Add a dining table
    Add {
        /// Unique table label, e.g. T12
        number: String,

        /// Seats at the table
        #[arg(short, long, default_value = "4")]
        capacity: i32,

        /// Smallest party seated here
        #[arg(long, default_value = "1")]
        min: i32,
    },

    /// List tables with their stored state and whether it drifted
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one table, its orders and its current active order
    Show {
        /// Table id
        id: i32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set a table's stored status and/or flag directly (no reconciliation)
    Set {
        /// Table id
        id: i32,

        /// New status
        #[arg(short, long, value_enum)]
        status: Option<TableStatus>,

        /// New has_active_order value (true/false)
        #[arg(long)]
        has_active_order: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
    /// Open a pending order on a table
    Add {
        /// Table id
        table_id: i32,

        /// Order number (generated when omitted)
        #[arg(short, long)]
        number: Option<String>,

        /// Subtotal in cents
        #[arg(long, default_value = "0")]
        subtotal: i64,

        /// Discount in cents
        #[arg(long, default_value = "0")]
        discount: i64,
    },

    /// List orders
    List {
        /// Only orders of this table id
        #[arg(short, long)]
        table: Option<i32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move an order to a new status and reconcile its table
    Status {
        /// Order id
        order_id: i32,

        /// New status
        #[arg(value_enum)]
        status: OrderStatus,

        /// Skip the lifecycle check (operator correction)
        #[arg(long)]
        force: bool,
    },
}

/// Exit code when `check` finds drift
const EXIT_DRIFT: i32 = 2;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "tablestate=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::load();
    let policy = cli.policy.unwrap_or(config.reconcile.policy);

    match cli.command {
        Command::Init => {
            tablestate::init::init_project().map_err(anyhow::Error::msg)?;
            Ok(0)
        }
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "tablestate", &mut io::stdout());
            Ok(0)
        }
        Command::Table { action } => run_table(action, &open_db()?, policy),
        Command::Order { action } => run_order(action, &open_db()?, &config, policy),
        Command::Check { table, json } => {
            let db = open_db()?;
            let drift = match table {
                Some(id) => {
                    let result = db.check_table(id, policy)?;
                    print_output(&result, json, || print_repair(&result, true))?;
                    result.changed
                }
                None => {
                    let report = db.check_all(policy)?;
                    print_output(&report, json, || print_report(&report, true))?;
                    report.tables_fixed > 0 || !report.failures.is_empty()
                }
            };
            Ok(if drift { EXIT_DRIFT } else { 0 })
        }
        Command::Fix { table, json } => {
            let db = open_db()?;
            match table {
                Some(id) => {
                    let result = db.reconcile_table(id, policy)?;
                    print_output(&result, json, || print_repair(&result, false))?;
                    Ok(0)
                }
                None => {
                    let report = db.reconcile_all(policy)?;
                    print_output(&report, json, || print_report(&report, false))?;
                    Ok(if report.failures.is_empty() { 0 } else { 1 })
                }
            }
        }
    }
}

fn open_db() -> Result<Database> {
    let path = Database::db_path();
    Database::open().with_context(|| format!("Could not open floor database at {}", path.display()))
}

fn run_table(action: TableCommand, db: &Database, policy: StatusPolicy) -> Result<i32> {
    match action {
        TableCommand::Add { number, capacity, min } => {
            let id = db.create_table(&number, capacity, min)?;
            println!("{} table {} (id {})", "Created".green(), number.trim(), id);
        }
        TableCommand::List { json } => {
            let tables = db.list_tables()?;
            let report = db.check_all(policy)?;
            let drift: HashMap<i32, bool> = report
                .results
                .iter()
                .map(|r| (r.table_id, r.changed))
                .collect();

            #[derive(Serialize)]
            struct Entry<'a> {
                #[serde(flatten)]
                table: &'a DiningTable,
                drift: Option<bool>,
            }
            let entries: Vec<Entry> = tables
                .iter()
                .map(|table| Entry {
                    table,
                    drift: drift.get(&table.id).copied(),
                })
                .collect();

            print_output(&entries, json, || {
                if entries.is_empty() {
                    println!("No tables. Add one with {}", "tablestate table add <NUMBER>".cyan());
                    return;
                }
                println!(
                    "{:>4}  {:<10} {:>5}  {:<12} {:<7} {}",
                    "ID", "NUMBER", "SEATS", "STATUS", "ACTIVE", "DRIFT"
                );
                for entry in &entries {
                    let t = entry.table;
                    let seats = format!("{}-{}", t.min_capacity, t.capacity);
                    let drift = match entry.drift {
                        Some(true) => "yes".red().bold(),
                        Some(false) => "no".normal(),
                        None => "error".yellow(),
                    };
                    println!(
                        "{:>4}  {:<10} {:>5}  {:<12} {:<7} {}",
                        t.id,
                        t.table_number,
                        seats,
                        paint_table_status(t.status),
                        t.has_active_order,
                        drift
                    );
                }
            })?;
        }
        TableCommand::Show { id, json } => {
            let detail = db.table_detail(id)?;
            print_output(&detail, json, || {
                let t = &detail.table;
                println!("{} {} (id {})", "Table".bold(), t.table_number.bold(), t.id);
                println!("   Seats:            {}-{}", t.min_capacity, t.capacity);
                println!("   Status:           {}", paint_table_status(t.status));
                println!("   has_active_order: {}", t.has_active_order);
                let derived = if detail.derived_has_active_order == t.has_active_order {
                    detail.derived_has_active_order.to_string().normal()
                } else {
                    format!("{} (stored flag is stale)", detail.derived_has_active_order).red()
                };
                println!("   Derived:          {}", derived);
                match &detail.active_order {
                    Some(order) => println!(
                        "   Active order:     {} ({})",
                        order.order_number,
                        paint_order_status(order.status)
                    ),
                    None => println!("   Active order:     -"),
                }
                if !detail.orders.is_empty() {
                    println!();
                    print_orders(&detail.orders);
                }
            })?;
        }
        TableCommand::Set { id, status, has_active_order } => {
            let table = db.set_table_fields(id, status, has_active_order)?;
            println!(
                "{} table {}: status={} has_active_order={}",
                "Updated".green(),
                table.table_number,
                paint_table_status(table.status),
                table.has_active_order
            );
        }
    }
    Ok(0)
}

fn run_order(
    action: OrderCommand,
    db: &Database,
    config: &Config,
    policy: StatusPolicy,
) -> Result<i32> {
    match action {
        OrderCommand::Add { table_id, number, subtotal, discount } => {
            let new_order = NewOrder {
                order_number: number.as_deref(),
                subtotal_cents: subtotal,
                discount_cents: discount,
                tax_rate_percent: config.billing.tax_rate_percent,
            };
            let (order, repair) = db.create_order(table_id, &new_order, policy)?;
            println!(
                "{} order {} (id {}) on table {}, total {}",
                "Created".green(),
                order.order_number,
                order.id,
                repair.table_number,
                format_cents(order.total_cents)
            );
            if repair.changed {
                println!("   table {}: {} -> {}", repair.table_number, repair.before, repair.after);
            }
        }
        OrderCommand::List { table, json } => {
            let orders = db.list_orders(table)?;
            print_output(&orders, json, || {
                if orders.is_empty() {
                    println!("No orders.");
                } else {
                    print_orders(&orders);
                }
            })?;
        }
        OrderCommand::Status { order_id, status, force } => {
            let update = db.set_order_status(order_id, status, force, policy)?;
            println!(
                "{} order {}: {} -> {}",
                "Updated".green(),
                update.order.order_number,
                paint_order_status(update.previous_status),
                paint_order_status(update.order.status)
            );
            if update.table.changed {
                println!(
                    "   table {}: {} -> {}",
                    update.table.table_number, update.table.before, update.table.after
                );
            }
        }
    }
    Ok(0)
}

/// JSON to stdout when requested, otherwise the human rendering
fn print_output<T, F>(value: &T, json: bool, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(),
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn print_orders(orders: &[Order]) {
    println!(
        "{:>4}  {:<14} {:>5}  {:<10} {:>10}  {}",
        "ID", "NUMBER", "TABLE", "STATUS", "TOTAL", "PLACED"
    );
    for o in orders {
        println!(
            "{:>4}  {:<14} {:>5}  {:<10} {:>10}  {}",
            o.id,
            o.order_number,
            o.table_id,
            paint_order_status(o.status),
            format_cents(o.total_cents),
            o.order_time
        );
    }
}

fn print_repair(result: &RepairResult, dry_run: bool) {
    let label = match (result.changed, dry_run) {
        (true, true) => "DRIFT".red().bold(),
        (true, false) => "FIXED".green().bold(),
        (false, _) => "OK".normal(),
    };
    if result.changed {
        println!(
            "{:<6} table {} (id {}): {} -> {}",
            label, result.table_number, result.table_id, result.before, result.after
        );
    } else {
        println!(
            "{:<6} table {} (id {}): {}",
            label, result.table_number, result.table_id, result.before
        );
    }
}

fn print_report(report: &SweepReport, dry_run: bool) {
    for result in report.changed() {
        print_repair(result, dry_run);
    }
    for failure in &report.failures {
        println!(
            "{:<6} table id {}: {}",
            "FAILED".yellow().bold(),
            failure.table_id,
            failure.error
        );
    }

    let verb = if dry_run { "drifted" } else { "fixed" };
    println!(
        "\n{} tables scanned, {} {}, {} failed",
        report.tables_scanned,
        report.tables_fixed,
        verb,
        report.failures.len()
    );
}

fn paint_table_status(status: TableStatus) -> ColoredString {
    match status {
        TableStatus::Available => status.as_str().green(),
        TableStatus::Reserved => status.as_str().cyan(),
        TableStatus::Occupied => status.as_str().yellow(),
        TableStatus::Maintenance => status.as_str().bright_black(),
    }
}

fn paint_order_status(status: OrderStatus) -> ColoredString {
    match status {
        OrderStatus::Pending | OrderStatus::Preparing => status.as_str().yellow(),
        OrderStatus::Ready | OrderStatus::Served => status.as_str().cyan(),
        OrderStatus::Completed => status.as_str().green(),
        OrderStatus::Cancelled => status.as_str().bright_black(),
    }
}
