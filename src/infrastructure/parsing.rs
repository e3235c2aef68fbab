//! Portal page extraction
//!
//! Reads the shows table and each show's seance table through the browser
//! capability. Per-row problems never abort a page scan: they surface as
//! typed outcomes and are tallied in [`ExtractionStats`].

pub mod error;
pub mod field_extractor;
pub mod listing_extractor;

pub use error::{ParsingError, ParsingResult};
pub use field_extractor::{ExtractionStats, FieldExtractor, FieldRead, RowOutcome};
pub use listing_extractor::{ListingExtractor, ShowSeances};
