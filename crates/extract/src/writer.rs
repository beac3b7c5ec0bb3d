use defmap_model::{Access, Flavor, GlobalRef, Kind, Relation, Result, Source};

/// The API through which compilers and other code analyzers emit index
/// metadata while traversing their own ASTs. Calls must occur in the
/// following order:
///
/// ```text
/// [openSession
///   [openUnit
///     [openDef
///       emitSig?  emitSigUse*
///       emitDoc?  emitDocUse*
///       emitRelation*
///       emitUse*
///       [openDef..closeDef]*
///     closeDef]*
///   closeUnit]*
/// closeSession]
/// ```
///
/// `*` marks a call that may occur zero or more times, `?` zero or one
/// times. Calls nested "inside" an omitted call must also be omitted: an
/// `emit_sig_use` without a preceding `emit_sig` is invalid. Validating
/// implementations reject out-of-grammar streams with
/// `Error::Protocol`; the root global ref is never a legal argument.
pub trait Writer {
    fn open_session(&mut self) -> Result<()>;

    fn open_unit(&mut self, source: &Source) -> Result<()>;

    /// Opens a def. `offset` is the character offset of the name token;
    /// `body_start`/`body_end` bound the def's lexical body.
    #[allow(clippy::too_many_arguments)]
    fn open_def(
        &mut self,
        id: &GlobalRef,
        name: &str,
        kind: Kind,
        flavor: Flavor,
        exported: bool,
        access: Access,
        offset: u32,
        body_start: u32,
        body_end: u32,
    ) -> Result<()>;

    /// Sets the current def's signature text; may contain newlines.
    fn emit_sig(&mut self, text: &str) -> Result<()>;

    /// Records a use inside the signature; `offset` is relative to the
    /// start of the sig text.
    fn emit_sig_use(&mut self, target: &GlobalRef, kind: Kind, offset: u32, length: u32)
        -> Result<()>;

    /// Records the current def's doc region; `offset` is absolute in the
    /// source text.
    fn emit_doc(&mut self, offset: u32, length: u32) -> Result<()>;

    /// Records a use inside the doc; `offset` is relative to the doc
    /// region's start.
    fn emit_doc_use(&mut self, target: &GlobalRef, kind: Kind, offset: u32, length: u32)
        -> Result<()>;

    /// Records a directed relation edge from the current def.
    fn emit_relation(&mut self, relation: Relation, target: &GlobalRef) -> Result<()>;

    /// Records a use in the current def's body; `offset` is absolute in
    /// the source text.
    fn emit_use(&mut self, target: &GlobalRef, kind: Kind, offset: u32, length: u32) -> Result<()>;

    fn close_def(&mut self) -> Result<()>;

    fn close_unit(&mut self) -> Result<()>;

    fn close_session(&mut self) -> Result<()>;

    /// Discards any buffered state for the current unit so the stream can
    /// continue with the next one. Drivers call this after a unit fails;
    /// non-buffering writers need not do anything.
    fn abort_unit(&mut self) {}
}
