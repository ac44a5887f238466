//! Lakegate Core Library
//!
//! Diff-driven validation of changes to a versioned object store:
//! - Revision diff model and paging client
//! - Store abstraction (lakeFS REST client, in-memory store)
//! - Columnar footer reading (Parquet, ORC) with bounded tail reads
//! - Partition classification (full replace / pure addition / dirty)
//! - Acceptance rules and the engine that runs them per hook event

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod event;
pub mod footer;
pub mod memory;
pub mod metadata;
pub mod orc;
pub mod params;
pub mod partition;
pub mod path;
pub mod remote;
pub mod rules;
pub mod store;

pub use config::EngineConfig;
pub use diff::{ChangeType, Diff, DiffClient, DiffEntry};
pub use engine::Engine;
pub use error::{Result, ValidationError};
pub use event::{EventType, HookEvent, ResolvedRefs};
pub use footer::{FooterError, FooterParser, FormatRegistry, ParquetFooterParser};
pub use memory::MemoryStore;
pub use metadata::{MetadataAccessor, ObjectMetadata};
pub use orc::OrcFooterParser;
pub use params::Params;
pub use partition::{PartitionClassifier, PartitionGroup, PartitionReport, PartitionVerdict};
pub use remote::{LakeFsClient, LakeFsSettings};
pub use rules::{Rule, RuleContext, RuleSet, Verdict, Violation};
pub use store::{ObjectStat, PathType, StoreError, VersionedStore};
