// Pipeline processing: normalization, deduplication, identifiers and the relational build

pub mod dedup;
pub mod identity;
pub mod normalize;
pub mod relational;
pub mod report;

pub use dedup::{DedupOutcome, Deduplicator};
pub use identity::{IdScheme, IdentifierAssigner};
pub use normalize::RecordNormalizer;
pub use relational::{
    verify_integrity, BuildOutcome, BuildStats, CompanyRow, FacilityRow, IntegrityWarning,
    IntegrityWarningKind, LinkRow, RelationalBuilder, RelationalTables,
};
pub use report::PhaseReport;
