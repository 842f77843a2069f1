//! # Bulkport - bulk metadata import and export
//!
//! Bulkport moves repository resources (items, item sets, media,
//! annotations) between a resource store and tabular or structured files.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV / ODS  │────▶│   Reader    │────▶│   Automap   │────▶│  Processor  │
//! │  TSV / JSON │     │  (entries)  │     │  (mapping)  │     │ (resolver)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//! ┌─────────────┐     ┌─────────────┐                          ┌──────▼──────┐
//! │ CSV / JSON  │◀────│  Formatter  │◀──────── Exporter ◀──────│    Store    │
//! │ ODS / text  │     │  (writer)   │                          │             │
//! └─────────────┘     └─────────────┘                          └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulkport::{CancellationToken, ImportJob, ImportOptions, Job, JobLogger, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::open("store.json")?);
//! let mut job = ImportJob::new(store.clone(), "books.csv", ImportOptions::default());
//! let status = job.perform(&CancellationToken::new(), &JobLogger::new());
//! store.save()?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Resources, values and vocabularies
//! - [`entry`] - Normalized input records
//! - [`reader`] - CSV, TSV, ODS and JSON sources
//! - [`mapping`] - Field targets, automap and field mappings
//! - [`registry`] - Stored mappings
//! - [`store`] - Resource storage
//! - [`resolver`] - Identifier resolution
//! - [`processor`] - Import runs
//! - [`writer`] - Export and output formats
//! - [`job`] - Background jobs, cancellation and logs

// Core modules
pub mod error;
pub mod models;
pub mod entry;

// Input
pub mod reader;
pub mod mapping;
pub mod registry;

// Storage
pub mod store;
pub mod resolver;

// Import / export
pub mod processor;
pub mod writer;
pub mod job;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    MappingError, ProcessError, ReaderError, RegistryError, StoreError, WriterError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use entry::Entry;
pub use models::{MediaSource, PropertyValue, Resource, ResourceType, VocabularySet};

// =============================================================================
// Re-exports - Readers
// =============================================================================

pub use reader::{Reader, ReaderOptions, ReaderRegistry};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use mapping::{
    Automap, AutomapDictionary, AutomapOptions, FieldMapping, FieldTarget, StructuralField, Target,
};
pub use registry::{MappingRegistry, StoredMapping};

// =============================================================================
// Re-exports - Store & Resolver
// =============================================================================

pub use resolver::{IdentifierKind, IdentifierResolver, IdentifierResult};
pub use store::{MemoryStore, Mutation, ResourceStore};

// =============================================================================
// Re-exports - Import / Export
// =============================================================================

pub use processor::{Action, ImportOptions, ImportSummary, ProcessState, Processor};
pub use writer::{ExportConfig, Exporter, Formatter, FormatterRegistry};

// =============================================================================
// Re-exports - Jobs
// =============================================================================

pub use job::{CancellationToken, ExportJob, ImportJob, Job, JobLogger, JobStatus, LogLevel};
