pub mod builder;
pub mod claims;
pub mod consolidate;
pub mod passes;

pub use builder::{observe_document, RelationStats, RelationshipBuilder, Scope};
pub use claims::{corroboration_updates, ClaimExtractor, ClaimStats};
pub use consolidate::{similarity_candidates, ConsolidationStats, Consolidator};
pub use passes::{GraphPasses, NoopRecalibrator, PassReport, RiskRecalibrator};
