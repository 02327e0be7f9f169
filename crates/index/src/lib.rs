pub mod capabilities;
pub mod config;
pub mod context;
pub mod indexer;
pub mod memory;
pub mod neo4j_store;
pub mod registry;
pub mod store;

pub use capabilities::Capabilities;
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use indexer::{BatchStats, DocumentIndexer, DocumentReport};
pub use memory::MemoryStore;
pub use neo4j_store::Neo4jStore;
pub use registry::{EntityRegistry, Link, Linked};
pub use store::{DocumentOutcome, DocumentUnit, GraphStore, RelationWrite, StoreCounts, Upserted};
