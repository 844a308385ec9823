//! File Format Schemas
//!
//! Assembles a pool of modular YAML schema fragments into self-contained
//! JSON Schema (draft-07) documents, one per top-level target.
//!
//! ## Pipeline
//!
//! ```text
//! schema/**/*.schema.yaml
//!        │
//!        ▼
//!   FragmentRegistry ──▶ Assembler ──▶ dist/<target>.schema.json
//!                          │              dist/checksums.sha256
//!                          ├─ inline abstract fragments
//!                          ├─ canonicalize references (#<Id>)
//!                          ├─ flatten allOf
//!                          ├─ prune unreachable definitions
//!                          └─ validate against draft-07
//! ```
//!
//! Fragments whose file name contains `abstract` never appear in output;
//! their content is copied into every place that references them.

pub mod assemble;
pub mod checksum;
pub mod config;
pub mod error;
pub mod fragment;
pub mod reference;
pub mod registry;
pub mod validate;

pub use assemble::{AssembledSchema, Assembler, AssemblyOptions, Target};
pub use checksum::{Checksum, ChecksumFile};
pub use config::{AssemblyConfig, OutputFormat};
pub use error::{AssemblyError, Result, Violation};
pub use fragment::{Fragment, FragmentId};
pub use registry::{FragmentRegistry, LoadOptions};
pub use validate::MetaSchemaValidator;
