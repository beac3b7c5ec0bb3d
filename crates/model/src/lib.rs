//! # Defmap Model
//!
//! The data model shared by every defmap crate: sources, hierarchical
//! global names, defs and their payloads (signatures, docs, uses), and the
//! `Project` seam through which a [`Def`] lazily loads related records
//! from the store that owns it.
//!
//! ## Identity
//!
//! ```text
//! Source  ──> compilation unit (file or archive entry)
//!     │
//!     ├──> GlobalRef  (interned hierarchical name, cross-project)
//!     │
//!     └──> Def id     (i64: unitId * 0x10000 + rawDefId, per-project)
//! ```

mod def;
mod element;
mod error;
mod intern;
mod kinds;
mod project;
mod refs;
mod source;

pub use def::{Def, Doc, Sig, Use};
pub use element::Element;
pub use error::{Error, Result, StorageError};
pub use intern::intern;
pub use kinds::{Access, Flavor, Kind, Relation};
pub use project::{Project, ProjectHandle};
pub use refs::{GlobalRef, Ref};
pub use source::Source;
