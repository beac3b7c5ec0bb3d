use crate::def::{Def, Use};
use crate::kinds::Kind;
use crate::refs::Ref;

/// Common surface of source code elements: defs and uses. `visit`
/// delivers elements through this trait so callers can build per-source
/// structures (highlighting, name resolution) without caring which is
/// which.
pub trait Element {
    /// A reference to this element or its referent.
    fn referent(&self) -> Ref;

    /// The offset into the source text at which this element occurs.
    fn offset(&self) -> u32;

    /// The length of this element, in characters.
    fn length(&self) -> u32;

    /// The kind of this element.
    fn kind(&self) -> Kind;

    /// True if this element and `other` refer to the same def: two uses
    /// of one def, a use and the def itself, etc.
    fn same_ref(&self, other: &dyn Element) -> bool {
        self.referent() == other.referent()
    }
}

impl Element for Def {
    fn referent(&self) -> Ref {
        self.to_ref()
    }

    fn offset(&self) -> u32 {
        self.offset
    }

    fn length(&self) -> u32 {
        self.name.chars().count() as u32
    }

    fn kind(&self) -> Kind {
        self.kind
    }
}

impl Element for Use {
    fn referent(&self) -> Ref {
        self.target.clone()
    }

    fn offset(&self) -> u32 {
        self.offset
    }

    fn length(&self) -> u32 {
        self.length
    }

    fn kind(&self) -> Kind {
        self.ref_kind
    }
}
