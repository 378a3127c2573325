// Bulk JSON import: pharmacies.json / users.json into the relational schema
// Best-effort per record: a bad purchase row is logged and skipped, the batch
// continues. Re-runs skip existing pharmacies/users via UNIQUE(name).

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::db::{DATETIME_FMT, TIME_FMT};
use crate::schedule::parse_opening_hours;

// ============================================================================
// INPUT RECORDS
// ============================================================================

/// One record of `pharmacies.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyRecord {
    pub name: String,
    #[serde(default)]
    pub cash_balance: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Free-text schedule, e.g. "Mon - Fri 08:00 - 17:00 / Sat, Sun 08:00 - 12:00"
    #[serde(default)]
    pub opening_hours: String,
    #[serde(default)]
    pub masks: Vec<MaskRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskRecord {
    pub name: String,
    pub price: f64,
}

/// One record of `users.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub name: String,
    #[serde(default)]
    pub cash_balance: f64,
    #[serde(default)]
    pub purchase_histories: Vec<PurchaseRecord>,
}

/// Nested purchase row; the pharmacy is referenced by display name and
/// resolved against already-loaded pharmacies.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub pharmacy_name: String,
    #[serde(default)]
    pub mask_name: String,
    #[serde(default)]
    pub transaction_amount: f64,
    /// `YYYY-MM-DD HH:MM:SS`
    pub transaction_date: String,
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct PharmacyImportSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub opening_hours: usize,
    pub masks: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UserImportSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub purchases: usize,
    pub skipped_purchases: usize,
}

// ============================================================================
// PHARMACIES
// ============================================================================

pub fn load_pharmacies(conn: &Connection, path: &Path) -> Result<PharmacyImportSummary> {
    let records = read_json::<Vec<PharmacyRecord>>(path)?;
    import_pharmacy_records(conn, &records)
}

pub fn import_pharmacy_records(
    conn: &Connection,
    records: &[PharmacyRecord],
) -> Result<PharmacyImportSummary> {
    let mut summary = PharmacyImportSummary::default();

    for record in records {
        let changed = conn.execute(
            "INSERT INTO pharmacies (name, address, phone, cash_balance)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO NOTHING",
            params![
                record.name,
                record.address,
                record.phone,
                record.cash_balance
            ],
        )?;
        if changed == 0 {
            summary.skipped += 1;
        } else {
            summary.inserted += 1;
        }

        let pharmacy_id: i64 = conn.query_row(
            "SELECT id FROM pharmacies WHERE name = ?1",
            [&record.name],
            |row| row.get(0),
        )?;

        for entry in parse_opening_hours(&record.opening_hours) {
            conn.execute(
                "INSERT INTO pharmacy_opening_hours
                 (pharmacy_id, day_of_week, open_time, close_time)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    pharmacy_id,
                    entry.day.as_str(),
                    entry.open_time.format(TIME_FMT).to_string(),
                    entry.close_time.format(TIME_FMT).to_string(),
                ],
            )?;
            summary.opening_hours += 1;
        }

        for mask in &record.masks {
            conn.execute(
                "INSERT INTO masks (pharmacy_id, name, price) VALUES (?1, ?2, ?3)",
                params![pharmacy_id, mask.name, mask.price],
            )?;
            summary.masks += 1;
        }
    }

    Ok(summary)
}

// ============================================================================
// USERS
// ============================================================================

pub fn load_users(conn: &Connection, path: &Path) -> Result<UserImportSummary> {
    let records = read_json::<Vec<UserRecord>>(path)?;
    import_user_records(conn, &records)
}

pub fn import_user_records(
    conn: &Connection,
    records: &[UserRecord],
) -> Result<UserImportSummary> {
    let mut summary = UserImportSummary::default();

    for record in records {
        let changed = conn.execute(
            "INSERT INTO users (name, cash_balance) VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![record.name, record.cash_balance],
        )?;
        if changed == 0 {
            summary.skipped += 1;
        } else {
            summary.inserted += 1;
        }

        let user_id: i64 = conn.query_row(
            "SELECT id FROM users WHERE name = ?1",
            [&record.name],
            |row| row.get(0),
        )?;

        for purchase in &record.purchase_histories {
            let Ok(transaction_date) =
                NaiveDateTime::parse_from_str(&purchase.transaction_date, DATETIME_FMT)
            else {
                warn!(
                    user = %record.name,
                    date = %purchase.transaction_date,
                    "unparsable transaction date, purchase skipped"
                );
                summary.skipped_purchases += 1;
                continue;
            };

            let pharmacy_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM pharmacies WHERE name = ?1",
                    [&purchase.pharmacy_name],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(pharmacy_id) = pharmacy_id else {
                warn!(
                    user = %record.name,
                    pharmacy = %purchase.pharmacy_name,
                    "pharmacy not found, purchase skipped"
                );
                summary.skipped_purchases += 1;
                continue;
            };

            conn.execute(
                "INSERT INTO purchase_histories
                 (user_id, pharmacy_id, mask_name, transaction_amount, transaction_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    pharmacy_id,
                    purchase.mask_name,
                    purchase.transaction_amount,
                    transaction_date.format(DATETIME_FMT).to_string(),
                ],
            )?;
            summary.purchases += 1;
        }
    }

    Ok(summary)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON: {:?}", path))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn pharmacy_records(json: &str) -> Vec<PharmacyRecord> {
        serde_json::from_str(json).unwrap()
    }

    fn user_records(json: &str) -> Vec<UserRecord> {
        serde_json::from_str(json).unwrap()
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    const PHARMACIES: &str = r#"[
        {
            "name": "DFW Wellness",
            "cashBalance": 328.41,
            "address": "117 Chung-Hsiao East Road",
            "phone": "(02) 2345-6789",
            "openingHours": "Mon - Fri 08:00 - 17:00 / Sat, Sun 08:00 - 12:00",
            "masks": [
                {"name": "True Barrier (green) (3 per pack)", "price": 13.7},
                {"name": "Second Smile (black) (10 per pack)", "price": 31.98}
            ]
        },
        {
            "name": "Carepoint",
            "cashBalance": 0.0,
            "openingHours": "Tue, Thur 14:00 - 18:00"
        }
    ]"#;

    #[test]
    fn test_import_pharmacies_expands_opening_hours() {
        let conn = test_conn();

        let summary = import_pharmacy_records(&conn, &pharmacy_records(PHARMACIES)).unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 0);
        // 7 rows from the range+list schedule, 2 from "Tue, Thur"
        assert_eq!(summary.opening_hours, 9);
        assert_eq!(summary.masks, 2);

        let thur_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pharmacy_opening_hours WHERE day_of_week = 'Thur'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(thur_rows, 2);
    }

    #[test]
    fn test_import_pharmacies_rerun_skips_existing_roots() {
        let conn = test_conn();
        let records = pharmacy_records(PHARMACIES);

        import_pharmacy_records(&conn, &records).unwrap();
        let rerun = import_pharmacy_records(&conn, &records).unwrap();

        assert_eq!(rerun.inserted, 0);
        assert_eq!(rerun.skipped, 2);
        assert_eq!(count(&conn, "pharmacies"), 2);
    }

    #[test]
    fn test_import_users_resolves_pharmacy_by_name() {
        let conn = test_conn();
        import_pharmacy_records(&conn, &pharmacy_records(PHARMACIES)).unwrap();

        let users = user_records(
            r#"[
                {
                    "name": "Yvonne Guerrero",
                    "cashBalance": 191.83,
                    "purchaseHistories": [
                        {
                            "pharmacyName": "DFW Wellness",
                            "maskName": "True Barrier (green) (3 per pack)",
                            "transactionAmount": 13.7,
                            "transactionDate": "2021-01-04 15:18:51"
                        },
                        {
                            "pharmacyName": "No Such Pharmacy",
                            "maskName": "Phantom",
                            "transactionAmount": 5.0,
                            "transactionDate": "2021-01-05 09:00:00"
                        }
                    ]
                }
            ]"#,
        );

        let summary = import_user_records(&conn, &users).unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.purchases, 1);
        assert_eq!(summary.skipped_purchases, 1);
        assert_eq!(count(&conn, "purchase_histories"), 1);
    }

    #[test]
    fn test_import_users_skips_bad_dates_but_continues() {
        let conn = test_conn();
        import_pharmacy_records(&conn, &pharmacy_records(PHARMACIES)).unwrap();

        let users = user_records(
            r#"[
                {
                    "name": "Lester Arnold",
                    "cashBalance": 54.0,
                    "purchaseHistories": [
                        {
                            "pharmacyName": "Carepoint",
                            "maskName": "Masquerade",
                            "transactionAmount": 9.0,
                            "transactionDate": "not a date"
                        },
                        {
                            "pharmacyName": "Carepoint",
                            "maskName": "Masquerade",
                            "transactionAmount": 9.0,
                            "transactionDate": "2021-02-14 10:30:00"
                        }
                    ]
                }
            ]"#,
        );

        let summary = import_user_records(&conn, &users).unwrap();

        assert_eq!(summary.purchases, 1);
        assert_eq!(summary.skipped_purchases, 1);
    }

    #[test]
    fn test_import_users_rerun_skips_existing_roots() {
        let conn = test_conn();
        let users = user_records(r#"[{"name": "Ada", "cashBalance": 10.0}]"#);

        import_user_records(&conn, &users).unwrap();
        let rerun = import_user_records(&conn, &users).unwrap();

        assert_eq!(rerun.inserted, 0);
        assert_eq!(rerun.skipped, 1);
        assert_eq!(count(&conn, "users"), 1);
    }

    #[test]
    fn test_pharmacy_record_optional_fields_default() {
        let records = pharmacy_records(r#"[{"name": "Bare", "cashBalance": 1.5}]"#);

        assert_eq!(records[0].name, "Bare");
        assert!(records[0].address.is_none());
        assert!(records[0].opening_hours.is_empty());
        assert!(records[0].masks.is_empty());
    }
}
