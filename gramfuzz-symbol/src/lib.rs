//! Symbol identifiers and symbol kinds shared by a gramfuzz grammar.
//!
//! A [`SymbolId`] is only meaningful relative to the [`gramfuzz_grammar::Grammar`]
//! (or other symbol arena) that allocated it; mixing ids from two different
//! grammars produces nonsense rather than a panic, the same tradeoff
//! `cfg_symbol::Symbol` makes for the same reason (grammars are frequently
//! cloned and the id space by itself can't detect the mismatch).

use std::num::NonZeroU32;

/// Dense identifier for a symbol within one grammar's arena.
///
/// Internally one-based (`NonZeroU32`) so that `Option<SymbolId>` is the same
/// size as `SymbolId` itself.
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct SymbolId(NonZeroU32);

impl SymbolId {
    /// Wraps a zero-based index into a `SymbolId`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is `u32::MAX`.
    pub fn from_index(index: u32) -> Self {
        SymbolId(NonZeroU32::new(index + 1).expect("symbol index overflow"))
    }

    /// Returns the zero-based index this id refers to.
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// An interned symbol name.
///
/// Most symbols are named (grammars are built by repeatedly calling
/// `Grammar::name_to_symbol`); the two scope pseudo-symbols and a handful of
/// internal gensyms use the synthetic names documented on [`SymbolKind`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SymbolName(pub(crate) String);

impl SymbolName {
    pub fn new(name: impl Into<String>) -> Self {
        SymbolName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SymbolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SymbolName {
    fn from(s: &str) -> Self {
        SymbolName::new(s)
    }
}

/// One `[min, max]` repeated-charset fragment of a `Regex` symbol.
///
/// Mirrors `regex_pt_t`: a literal byte alphabet to sample from, repeated a
/// random number of times in `[min, max]`.
#[derive(Clone, Debug)]
pub struct RegexPart {
    pub charset: Box<[u8]>,
    pub min: u32,
    pub max: u32,
}

/// A deferred-call-style user function bound to a `Function` symbol.
///
/// Takes the already-generated bytes of each of its argument symbols and
/// returns the bytes that should replace its own span in the output buffer,
/// mirroring `call_func_now`'s `(args: tuple of bytes) -> bytes` contract.
pub type FunctionCallback = std::rc::Rc<dyn Fn(&[&[u8]]) -> Vec<u8>>;

/// The payload specific to each kind of symbol.
///
/// A closed sum type, not a class hierarchy: every variant of `gen_sym_type`
/// in the original becomes one arm here instead of a tagged union plus a
/// `_generate` function pointer.
#[derive(Clone)]
pub enum SymbolKind {
    /// Produces nothing by itself; exists to be defined later via
    /// `define_*`, or to carry `clean`/`recursive_clean`/`tracked` flags.
    Abstract,
    /// Concatenation of children, in order.
    Concat { children: Vec<SymbolId> },
    /// Weighted choice among children; weights live in the owning grammar's
    /// `WeightedChoice` bag, not here.
    Choice { children: Vec<SymbolId> },
    /// Sequence of repeated-charset fragments.
    Regex { parts: Vec<RegexPart> },
    /// Zero-or-more repetitions of a single child.
    Star {
        child: SymbolId,
        recommended_count: f64,
    },
    /// A fixed literal byte string.
    Text { bytes: Box<[u8]> },
    /// Generates by invoking another grammar's root symbol. The peer
    /// grammar object itself lives in the owning `Grammar`'s side table
    /// (keyed by this symbol's id), not here, to avoid a dependency cycle
    /// between the symbol and grammar crates; `grammar` is kept only as a
    /// display name for trace output.
    Foreign {
        grammar: std::rc::Rc<str>,
        start: SymbolId,
    },
    /// Back-reference to a previously generated tracked instance, filled in
    /// during the expand pass.
    Reference { target: SymbolId },
    /// Back-reference to a previously generated instance of `target` still
    /// in a live scope, filled in at generation time.
    ScopedRef { target: SymbolId },
    /// Uniform random integer in `[a, b]`.
    RndInt { a: i64, b: i64 },
    /// Uniform random float in `[a, b]`.
    RndFlt { a: f64, b: f64 },
    /// Pushes a new scope frame. Bound to the literal name `"{"`.
    IncScope,
    /// Pops the innermost scope frame, retiring its instances. Bound to the
    /// literal name `"}"`.
    DecScope,
    /// Invokes a host callback once all of its argument symbols have
    /// generated, deferred until the end of generation.
    Function {
        callback: FunctionCallback,
        args: Vec<SymbolId>,
    },
}

impl SymbolKind {
    /// Name used for debug/trace output, matching the original's
    /// `gen_sym_type` tag names.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SymbolKind::Abstract => "abstract",
            SymbolKind::Concat { .. } => "concat",
            SymbolKind::Choice { .. } => "choice",
            SymbolKind::Regex { .. } => "regex",
            SymbolKind::Star { .. } => "star",
            SymbolKind::Text { .. } => "text",
            SymbolKind::Foreign { .. } => "foreign",
            SymbolKind::Reference { .. } => "reference",
            SymbolKind::ScopedRef { .. } => "scoped_ref",
            SymbolKind::RndInt { .. } => "rndint",
            SymbolKind::RndFlt { .. } => "rndflt",
            SymbolKind::IncScope => "incscope",
            SymbolKind::DecScope => "decscope",
            SymbolKind::Function { .. } => "function",
        }
    }

    /// Whether this kind can legally be the target of `define_*` on an
    /// `Abstract` symbol. Only `Abstract` itself is a valid "undefined"
    /// placeholder; every other kind is already fully defined at
    /// construction.
    pub fn is_abstract(&self) -> bool {
        matches!(self, SymbolKind::Abstract)
    }

    /// The direct children this symbol generates through, in generation
    /// order, for symbols that have any (`Concat`, `Choice`, `Star`,
    /// `Function`). Leaf kinds return an empty slice.
    pub fn children(&self) -> &[SymbolId] {
        match self {
            SymbolKind::Concat { children } | SymbolKind::Choice { children } => children,
            SymbolKind::Star { child, .. } => std::slice::from_ref(child),
            SymbolKind::Function { args, .. } => args,
            _ => &[],
        }
    }
}

/// A single symbol in a grammar's arena.
///
/// Constructed only through a `Grammar`'s interning methods; there is no
/// public bare constructor because `id` must come from the owning grammar's
/// allocation counter.
#[derive(Clone)]
pub struct Symbol {
    id: SymbolId,
    name: Option<SymbolName>,
    line_no: u32,
    kind: SymbolKind,
    terminal: Option<bool>,
    tracked: Option<u32>,
    clean: bool,
    recursive_clean: bool,
}

impl Symbol {
    /// Used only by `gramfuzz_grammar::Grammar`, which owns the id
    /// allocation counter.
    #[doc(hidden)]
    pub fn new_internal(
        id: SymbolId,
        name: Option<SymbolName>,
        line_no: u32,
        kind: SymbolKind,
    ) -> Self {
        Symbol {
            id,
            name,
            line_no,
            kind,
            terminal: None,
            tracked: None,
            clean: false,
            recursive_clean: false,
        }
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> Option<&SymbolName> {
        self.name.as_ref()
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut SymbolKind {
        &mut self.kind
    }

    /// Replaces an `Abstract` symbol's kind in place. Callers (the
    /// `define_*` family in `gramfuzz_grammar`) are responsible for
    /// enforcing "defined exactly once".
    #[doc(hidden)]
    pub fn set_kind(&mut self, kind: SymbolKind) {
        self.kind = kind;
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }

    pub fn children(&self) -> &[SymbolId] {
        self.kind.children()
    }

    /// Tri-state, matching the original's `terminal` attribute: `None`
    /// (unset) and `Some(true)` both read as "always generate, ignore the
    /// depth/size limit"; only an explicit `Some(false)` enables
    /// depth-limiting for this symbol. See [`Self::effective_terminal`].
    pub fn terminal(&self) -> Option<bool> {
        self.terminal
    }

    pub fn set_terminal(&mut self, terminal: Option<bool>) {
        self.terminal = terminal;
    }

    /// Whether generation should proceed past a hit depth/size limit for
    /// this symbol. `true` unless the grammar author explicitly opted this
    /// symbol into depth-limiting with `set_terminal(Some(false))`.
    pub fn effective_terminal(&self) -> bool {
        self.terminal != Some(false)
    }

    /// The maximum byte budget this symbol is allowed to generate, if it is
    /// tracked. `None` means not tracked. Mirrors the original's dual-use
    /// `tracked` field (zero/non-zero flag doubling as the size budget).
    pub fn tracked(&self) -> Option<u32> {
        self.tracked
    }

    pub fn set_tracked(&mut self, budget: Option<u32>) {
        self.tracked = budget;
    }

    pub fn clean(&self) -> bool {
        self.clean
    }

    pub fn set_clean(&mut self, clean: bool) {
        self.clean = clean;
    }

    pub fn recursive_clean(&self) -> bool {
        self.recursive_clean
    }

    pub fn set_recursive_clean(&mut self, recursive_clean: bool) {
        self.recursive_clean = recursive_clean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_roundtrips_through_index() {
        let id = SymbolId::from_index(41);
        assert_eq!(id.index(), 41);
    }

    #[test]
    fn abstract_symbol_has_no_children() {
        let sym = Symbol::new_internal(SymbolId::from_index(0), None, 0, SymbolKind::Abstract);
        assert!(sym.children().is_empty());
        assert!(sym.kind().is_abstract());
    }

    #[test]
    fn concat_reports_its_children() {
        let a = SymbolId::from_index(0);
        let b = SymbolId::from_index(1);
        let kind = SymbolKind::Concat {
            children: vec![a, b],
        };
        assert_eq!(kind.children(), &[a, b]);
        assert_eq!(kind.kind_name(), "concat");
    }
}
