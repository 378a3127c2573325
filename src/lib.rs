// Pharmacy Platform - Core Library
// Exposes schedule parsing, the store, and the bulk loader for the importer,
// the API server, and tests

pub mod db;
pub mod loader;
pub mod schedule;

// Re-export commonly used types
pub use db::{
    filter_pharmacies_by_mask_count, get_all_masks, get_all_pharmacies, get_all_users,
    get_open_pharmacies, get_opening_hours, get_pharmacy, get_pharmacy_masks, get_user,
    get_user_purchases, purchase, setup_database, CountOp, Mask, OpeningHour, Pharmacy,
    PurchaseHistory, StoreError, User,
};
pub use loader::{
    load_pharmacies, load_users, PharmacyImportSummary, PharmacyRecord, UserImportSummary,
    UserRecord,
};
pub use schedule::{is_open, parse_opening_hours, parse_query_time, DayOfWeek, ScheduleEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
