use anyhow::Result;
use rusqlite::Connection;
use std::env;
use std::path::PathBuf;

use pharmacy_platform::{load_pharmacies, load_users, setup_database};

/// Import configuration, built from CLI arguments. Connection settings are
/// passed explicitly; nothing lives in module-level globals.
struct ImportConfig {
    db_path: PathBuf,
    pharmacies_path: PathBuf,
    users_path: PathBuf,
}

impl ImportConfig {
    fn from_args(args: &[String]) -> ImportConfig {
        ImportConfig {
            db_path: args
                .first()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("pharmacy.db")),
            pharmacies_path: args
                .get(1)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/pharmacies.json")),
            users_path: args
                .get(2)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/users.json")),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "import" {
        run_import(ImportConfig::from_args(&args[2..]))
    } else {
        eprintln!("Usage: pharmacy-import import [db_path] [pharmacies.json] [users.json]");
        std::process::exit(1);
    }
}

fn run_import(config: ImportConfig) -> Result<()> {
    println!("Pharmacy Platform - Data Import");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\nSetting up database at {:?}...", config.db_path);
    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode");

    println!("\nImporting pharmacies from {:?}...", config.pharmacies_path);
    let pharmacies = load_pharmacies(&conn, &config.pharmacies_path)?;
    println!(
        "✓ Inserted {} pharmacies ({} already present), {} opening-hours rows, {} masks",
        pharmacies.inserted, pharmacies.skipped, pharmacies.opening_hours, pharmacies.masks
    );

    println!("\nImporting users from {:?}...", config.users_path);
    let users = load_users(&conn, &config.users_path)?;
    println!(
        "✓ Inserted {} users ({} already present), {} purchases ({} skipped)",
        users.inserted, users.skipped, users.purchases, users.skipped_purchases
    );

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Import complete.");

    Ok(())
}
