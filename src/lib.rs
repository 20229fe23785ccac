//! # tokmap
//!
//! Structure indexing and sandboxed collector dispatch over an
//! already-tokenized markup document.
//!
//! The engine consumes a flat token stream from a tokenizer front-end it
//! does not control, builds structural indices over it, and runs pluggable
//! "collector" visitors that extract domain structures (links, tables,
//! headings, ...). Every stage assumes the input may be adversarial:
//! oversized documents are rejected upfront, pathological nesting is
//! capped, hostile token objects are projected onto allow-listed canonical
//! records before anything else touches them, and collector callbacks run
//! under a deadline and a panic trap so one misbehaving collector never
//! takes down a pass.
//!
//! Pipeline:
//!
//! 1. Resource guard: size ceilings, checked before any processing.
//! 2. Canonicalization: foreign tokens become [`CanonicalToken`]s.
//! 3. Index build: type buckets, opener/closer pairs, parent links,
//!    fences, nesting-depth ceiling ([`StructureIndex`]).
//! 4. Section build: hierarchical, non-overlapping sections with a
//!    sorted line index ([`Section`]).
//! 5. Dispatch: deterministic single-pass visitor routing
//!    ([`Dispatcher`], [`Collector`]).
//!
//! The built index is immutable and reusable across any number of
//! dispatch passes with different collector sets. The [`urlnorm`] module
//! is the single source of truth for URL canonicalization shared by
//! collectors and any downstream fetcher.

pub mod config;
pub mod deadline;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod index;
pub mod sections;
pub mod testing;
pub mod token;
pub mod urlnorm;

pub use config::EngineConfig;
pub use deadline::{run_with_deadline, DeadlineExpired};
pub use dispatch::{Collector, DispatchOutcome, Dispatcher, FailureRecord};
pub use error::{BuildError, DispatchError, FailureKind, SizeMeasure};
pub use index::{FenceRecord, StructureIndex};
pub use sections::Section;
pub use token::{CanonicalToken, SourceToken};
pub use urlnorm::{normalize_url, UrlError};
