//! # Defmap Extract
//!
//! The event contract between language extractors and the index, plus the
//! bundled reference extractor.
//!
//! ## Pipeline
//!
//! ```text
//! Sources
//!     │
//!     ├──> Extractor (language plug-in)
//!     │      └─> Writer events (grammar-constrained)
//!     │
//!     └──> BatchWriter (one unit buffered in memory)
//!            └─> UnitSink::store_unit (project store)
//! ```
//!
//! Extraction-side source errors (malformed code, unresolvable names) are
//! not index errors: extractors report them out-of-band, emit valid
//! events for whatever was parseable, and the index proceeds.

mod batch;
mod scan;
mod text;
mod token;
mod writer;

pub use batch::{BatchWriter, DefTree, DocTree, SigTree, UnitSink, UnitTree, UseTree};
pub use scan::FileScanner;
pub use text::TextWriter;
pub use token::TokenExtractor;
pub use writer::Writer;

pub use defmap_model::{Error, Result};
