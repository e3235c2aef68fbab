//! Domain module - Core records and value objects
//!
//! This module contains the seance records harvested from the portal,
//! the composite identity used for dedup and matching, the ledger snapshot
//! model and the session state machine.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod ledger;
pub mod seance;
pub mod session;

pub use ledger::{
    LedgerColumns, LedgerRow, LedgerSchemaError, LedgerSnapshot, LedgerTable,
    ReconciliationReport, DATA_ROW_OFFSET,
};
pub use seance::{canonicalize_date, CompositeKey, RawSeanceRow, SeanceRecord, ShowListing};
pub use session::SessionState;
