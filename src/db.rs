use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::{is_open, DayOfWeek};

/// Storage formats for wall-clock times and purchase timestamps.
pub const TIME_FMT: &str = "%H:%M:%S";
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// ERRORS
// ============================================================================

/// Store-level failures that the HTTP layer maps onto status codes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found")]
    UserNotFound,

    #[error("Pharmacy not found")]
    PharmacyNotFound,

    #[error("Insufficient user balance")]
    InsufficientFunds,

    #[error("Transaction amount must be positive")]
    InvalidAmount,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub cash_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningHour {
    pub id: i64,
    pub pharmacy_id: i64,
    pub day_of_week: DayOfWeek,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mask {
    pub id: i64,
    pub pharmacy_id: i64,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub cash_balance: f64,
}

/// Immutable once written; the timestamp is caller-supplied, not server time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseHistory {
    pub id: i64,
    pub user_id: i64,
    pub pharmacy_id: i64,
    pub mask_name: String,
    pub transaction_amount: f64,
    pub transaction_date: NaiveDateTime,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // WAL mode for crash recovery; foreign keys for the cascade rules
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // UNIQUE(name) on pharmacies and users backs the loader's skip-on-conflict
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pharmacies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            address TEXT,
            phone TEXT,
            cash_balance REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pharmacy_opening_hours (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pharmacy_id INTEGER NOT NULL REFERENCES pharmacies(id) ON DELETE CASCADE,
            day_of_week TEXT NOT NULL,
            open_time TEXT NOT NULL,
            close_time TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS masks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pharmacy_id INTEGER NOT NULL REFERENCES pharmacies(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            price REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            cash_balance REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS purchase_histories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            pharmacy_id INTEGER NOT NULL REFERENCES pharmacies(id),
            mask_name TEXT,
            transaction_amount REAL NOT NULL DEFAULT 0,
            transaction_date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_opening_hours_pharmacy
         ON pharmacy_opening_hours(pharmacy_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_masks_pharmacy_price ON masks(pharmacy_id, price)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_purchases_user ON purchase_histories(user_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn pharmacy_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pharmacy> {
    Ok(Pharmacy {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
        cash_balance: row.get(4)?,
    })
}

fn mask_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mask> {
    Ok(Mask {
        id: row.get(0)?,
        pharmacy_id: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
    })
}

fn opening_hour_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OpeningHour> {
    let day: String = row.get(2)?;
    let open: String = row.get(3)?;
    let close: String = row.get(4)?;

    Ok(OpeningHour {
        id: row.get(0)?,
        pharmacy_id: row.get(1)?,
        day_of_week: DayOfWeek::from_symbol(&day).ok_or(rusqlite::Error::InvalidQuery)?,
        open_time: NaiveTime::parse_from_str(&open, TIME_FMT)
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        close_time: NaiveTime::parse_from_str(&close, TIME_FMT)
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
    })
}

fn purchase_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PurchaseHistory> {
    let date: String = row.get(5)?;

    Ok(PurchaseHistory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        pharmacy_id: row.get(2)?,
        mask_name: row.get(3)?,
        transaction_amount: row.get(4)?,
        transaction_date: NaiveDateTime::parse_from_str(&date, DATETIME_FMT)
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
    })
}

// ============================================================================
// PHARMACY QUERIES
// ============================================================================

pub fn get_all_pharmacies(conn: &Connection) -> Result<Vec<Pharmacy>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, address, phone, cash_balance FROM pharmacies ORDER BY id",
    )?;

    let pharmacies = stmt
        .query_map([], pharmacy_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(pharmacies)
}

pub fn get_pharmacy(conn: &Connection, pharmacy_id: i64) -> Result<Pharmacy, StoreError> {
    conn.query_row(
        "SELECT id, name, address, phone, cash_balance FROM pharmacies WHERE id = ?1",
        [pharmacy_id],
        pharmacy_from_row,
    )
    .optional()?
    .ok_or(StoreError::PharmacyNotFound)
}

pub fn get_opening_hours(
    conn: &Connection,
    pharmacy_id: i64,
) -> Result<Vec<OpeningHour>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, pharmacy_id, day_of_week, open_time, close_time
         FROM pharmacy_opening_hours
         WHERE pharmacy_id = ?1
         ORDER BY id",
    )?;

    let hours = stmt
        .query_map([pharmacy_id], opening_hour_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(hours)
}

/// Pharmacies with at least one schedule entry on `day` containing `probe`.
///
/// Any matching entry wins: the scan over a pharmacy's entries short-circuits
/// on the first hit, so overlapping or conflicting rows for the same day are
/// resolved by insertion order.
pub fn get_open_pharmacies(
    conn: &Connection,
    day: DayOfWeek,
    probe: NaiveTime,
) -> Result<Vec<Pharmacy>, StoreError> {
    let pharmacies = get_all_pharmacies(conn)?;

    let mut open = Vec::new();
    for pharmacy in pharmacies {
        let hours = get_opening_hours(conn, pharmacy.id)?;
        if hours
            .iter()
            .any(|oh| oh.day_of_week == day && is_open(oh.open_time, oh.close_time, probe))
        {
            open.push(pharmacy);
        }
    }

    Ok(open)
}

// ============================================================================
// MASK QUERIES
// ============================================================================

/// Masks sold by one pharmacy. `sort_by` accepts `name` or `price`
/// (ascending); anything else means storage order.
pub fn get_pharmacy_masks(
    conn: &Connection,
    pharmacy_id: i64,
    sort_by: Option<&str>,
) -> Result<Vec<Mask>, StoreError> {
    let order = match sort_by {
        Some("name") => " ORDER BY name",
        Some("price") => " ORDER BY price",
        _ => "",
    };

    let sql =
        format!("SELECT id, pharmacy_id, name, price FROM masks WHERE pharmacy_id = ?1{order}");
    let mut stmt = conn.prepare(&sql)?;

    let masks = stmt
        .query_map([pharmacy_id], mask_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(masks)
}

pub fn get_all_masks(conn: &Connection) -> Result<Vec<Mask>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, pharmacy_id, name, price FROM masks ORDER BY id")?;

    let masks = stmt
        .query_map([], mask_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(masks)
}

/// Comparison operator for the mask-count filter. Strict in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOp {
    Gt,
    Lt,
}

impl CountOp {
    pub fn from_param(param: &str) -> Option<CountOp> {
        match param {
            "gt" => Some(CountOp::Gt),
            "lt" => Some(CountOp::Lt),
            _ => None,
        }
    }
}

/// Pharmacies whose count of masks priced in `[price_min, price_max]` is
/// strictly greater/less than `count_val`.
///
/// The grouped subquery inner-joins back to pharmacies, so a pharmacy with no
/// masks in the band is absent from the result even under `lt`.
pub fn filter_pharmacies_by_mask_count(
    conn: &Connection,
    op: CountOp,
    count_val: i64,
    price_min: f64,
    price_max: f64,
) -> Result<Vec<Pharmacy>, StoreError> {
    let cmp = match op {
        CountOp::Gt => ">",
        CountOp::Lt => "<",
    };

    let sql = format!(
        "SELECT p.id, p.name, p.address, p.phone, p.cash_balance
         FROM pharmacies p
         JOIN (
             SELECT pharmacy_id, COUNT(*) AS cnt
             FROM masks
             WHERE price BETWEEN ?1 AND ?2
             GROUP BY pharmacy_id
         ) m ON m.pharmacy_id = p.id
         WHERE m.cnt {cmp} ?3
         ORDER BY p.id"
    );
    let mut stmt = conn.prepare(&sql)?;

    let pharmacies = stmt
        .query_map(params![price_min, price_max, count_val], pharmacy_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(pharmacies)
}

// ============================================================================
// USER QUERIES
// ============================================================================

pub fn get_all_users(conn: &Connection) -> Result<Vec<User>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, cash_balance FROM users ORDER BY id")?;

    let users = stmt
        .query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                cash_balance: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(users)
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<User, StoreError> {
    conn.query_row(
        "SELECT id, name, cash_balance FROM users WHERE id = ?1",
        [user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                cash_balance: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(StoreError::UserNotFound)
}

/// A user's purchase history in storage order. Missing user is an error, not
/// an empty list.
pub fn get_user_purchases(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<PurchaseHistory>, StoreError> {
    get_user(conn, user_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, user_id, pharmacy_id, mask_name, transaction_amount, transaction_date
         FROM purchase_histories
         WHERE user_id = ?1
         ORDER BY id",
    )?;

    let purchases = stmt
        .query_map([user_id], purchase_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(purchases)
}

// ============================================================================
// PURCHASE TRANSACTION
// ============================================================================

/// Move `amount` from a user to a pharmacy and record the purchase.
///
/// Runs as one SQLite transaction: the two balance updates and the history
/// insert become visible together or not at all. Any early return drops the
/// transaction and rolls back.
pub fn purchase(
    conn: &mut Connection,
    user_id: i64,
    pharmacy_id: i64,
    mask_name: &str,
    amount: f64,
    transaction_date: NaiveDateTime,
) -> Result<i64, StoreError> {
    let tx = conn.transaction()?;

    let balance: f64 = tx
        .query_row(
            "SELECT cash_balance FROM users WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::UserNotFound)?;

    tx.query_row(
        "SELECT id FROM pharmacies WHERE id = ?1",
        [pharmacy_id],
        |row| row.get::<_, i64>(0),
    )
    .optional()?
    .ok_or(StoreError::PharmacyNotFound)?;

    if amount <= 0.0 {
        return Err(StoreError::InvalidAmount);
    }

    if balance < amount {
        return Err(StoreError::InsufficientFunds);
    }

    tx.execute(
        "UPDATE users SET cash_balance = cash_balance - ?1 WHERE id = ?2",
        params![amount, user_id],
    )?;
    tx.execute(
        "UPDATE pharmacies SET cash_balance = cash_balance + ?1 WHERE id = ?2",
        params![amount, pharmacy_id],
    )?;
    tx.execute(
        "INSERT INTO purchase_histories
         (user_id, pharmacy_id, mask_name, transaction_amount, transaction_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            pharmacy_id,
            mask_name,
            amount,
            transaction_date.format(DATETIME_FMT).to_string(),
        ],
    )?;

    let purchase_id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(purchase_id)
}

// ============================================================================
// TESTS
// ============================================================================
