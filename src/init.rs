//! Project initialization for tablestate
//!
//! `tablestate init` → creates .tablestate/ with the database and a default config

use crate::config::DEFAULT_CONFIG_TOML;
use crate::db::{Database, DATA_DIR, DB_FILE};
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Initialize tablestate in the current directory
pub fn init_project() -> Result<(), String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Could not get current directory: {}", e))?;
    init_at(&cwd)
}

/// Initialize tablestate in `root`
pub fn init_at(root: &Path) -> Result<(), String> {
    println!("\n{}", "Initializing tablestate...".cyan().bold());
    println!("   Directory: {}\n", root.display());

    // 1. Create .tablestate directory
    let data_dir = root.join(DATA_DIR);
    create_dir_if_missing(&data_dir)?;

    // 2. Create the database (opening it creates the schema)
    let db_path = data_dir.join(DB_FILE);
    let existed = db_path.exists();
    Database::open_at(&db_path).map_err(|e| format!("Could not create database: {}", e))?;
    if existed {
        println!("   {} {}/{} (already exists)", "Skipping".yellow(), DATA_DIR, DB_FILE);
    } else {
        println!("   {} {}/{}", "Creating".green(), DATA_DIR, DB_FILE);
    }

    // 3. Write default config.toml
    let config_path = data_dir.join("config.toml");
    write_file_if_missing(&config_path, DEFAULT_CONFIG_TOML, &format!("{}/config.toml", DATA_DIR))?;

    // 4. Keep the database out of version control
    add_to_gitignore(root)?;

    println!("\n{}", "tablestate initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Add tables with {}", "tablestate table add T1 -c 4".cyan());
    println!("  2. Audit stored table state with {}", "tablestate check".cyan());
    println!("  3. Repair drift with {}", "tablestate fix".cyan());
    println!();

    Ok(())
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
        println!("   {} {}", "Creating".green(), path.display());
    }
    Ok(())
}

fn write_file_if_missing(path: &Path, content: &str, display_name: &str) -> Result<(), String> {
    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), display_name);
    } else {
        fs::write(path, content)
            .map_err(|e| format!("Could not write {}: {}", display_name, e))?;
        println!("   {} {}", "Creating".green(), display_name);
    }
    Ok(())
}

fn add_to_gitignore(root: &Path) -> Result<(), String> {
    let gitignore_path = root.join(".gitignore");
    let entry = format!("{}/", DATA_DIR);

    if gitignore_path.exists() {
        let existing = fs::read_to_string(&gitignore_path)
            .map_err(|e| format!("Could not read .gitignore: {}", e))?;

        if existing.lines().any(|line| line.trim() == entry || line.trim() == DATA_DIR) {
            return Ok(());
        }

        let new_content = format!(
            "{}\n\n# tablestate database (local)\n{}\n",
            existing.trim_end(),
            entry
        );
        fs::write(&gitignore_path, new_content)
            .map_err(|e| format!("Could not update .gitignore: {}", e))?;
        println!("   {} .gitignore (added {})", "Updated".green(), entry);
    } else {
        let content = format!("# tablestate database (local)\n{}\n", entry);
        fs::write(&gitignore_path, content)
            .map_err(|e| format!("Could not create .gitignore: {}", e))?;
        println!("   {} .gitignore", "Creating".green());
    }

    Ok(())
}
