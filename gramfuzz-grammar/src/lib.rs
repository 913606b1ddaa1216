//! A grammar: an arena of [`Symbol`]s plus the name/text interning tables
//! used to build it.
//!
//! Grounded on `grammar.c`'s `GrammarObject`: a flat symbol list indexed by
//! id, a name-to-symbol dict, and a text-to-symbol dict so that identical
//! literal strings share one `Text` symbol.

mod error;

pub use error::GrammarError;
pub use gramfuzz_symbol::{
    FunctionCallback, RegexPart, Symbol, SymbolId, SymbolKind, SymbolName,
};
pub use gramfuzz_weighted::WeightedChoice;

use std::collections::HashMap;

/// Name bound to the scope-push pseudo-symbol, matching the original's
/// literal `"{"` key.
pub const SCOPE_ENTER_NAME: &str = "{";
/// Name bound to the scope-pop pseudo-symbol, matching the original's
/// literal `"}"` key.
pub const SCOPE_EXIT_NAME: &str = "}";

/// A grammar: the arena of symbols plus tunable generation parameters.
///
/// Construction always pre-registers the two scope pseudo-symbols so that
/// `gramfuzz_gen` can look them up by name exactly as `Grammar_init` wires
/// `"{"`/`"}"` straight to `gen_state_inc_scope`/`gen_state_dec_scope`.
pub struct Grammar {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, SymbolId>,
    by_text: HashMap<Box<[u8]>, SymbolId>,
    /// Per-`Choice`-symbol weighted bag, keyed by the choice symbol's own
    /// id. Kept separate from `SymbolKind::Choice`'s `children` (an ordered
    /// list used for introspection) since `WeightedChoice` needs to own its
    /// entries to run `choice()`.
    choice_weights: HashMap<SymbolId, WeightedChoice<SymbolId>>,
    /// Peer grammar behind each `Foreign` symbol, keyed by that symbol's own
    /// id. `SymbolKind::Foreign` can't hold the `Rc<Grammar>` itself without
    /// a dependency cycle between this crate and `gramfuzz_symbol`.
    foreign_grammars: HashMap<SymbolId, std::rc::Rc<Grammar>>,

    /// Depth factor for `Star` symbols. Defaults to `5`, matching
    /// `Grammar_init`. Kept public for interface compatibility; the
    /// generator's `Star` weighting formula does not consult it (see
    /// DESIGN.md, open question 4).
    pub star_depth: i32,
    /// Maximum recursion depth; `0` means unlimited.
    pub max_depth: u32,
    /// Maximum generation size in bytes; `None` means unlimited (replacing
    /// the original's `-1` sentinel).
    pub max_size: Option<usize>,
    /// An atomic rather than a plain field: `generate()` takes `&Grammar`
    /// (generation doesn't otherwise need exclusive access), but still needs
    /// to record `self->last_depth_watermark = g.depth_watermark;` as
    /// `generate_real` does. `AtomicU32` over `Cell` so `Grammar` stays
    /// `Sync` whenever its `Function` callables are.
    last_depth_watermark: std::sync::atomic::AtomicU32,
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::new()
    }
}

impl Grammar {
    pub fn new() -> Self {
        let mut g = Grammar {
            symbols: Vec::new(),
            by_name: HashMap::new(),
            by_text: HashMap::new(),
            choice_weights: HashMap::new(),
            foreign_grammars: HashMap::new(),
            star_depth: 5,
            max_depth: 0,
            max_size: None,
            last_depth_watermark: std::sync::atomic::AtomicU32::new(0),
        };
        let enter = g.push_symbol(Some(SymbolName::new("[scope enter]")), 0, SymbolKind::IncScope);
        g.by_name.insert(SCOPE_ENTER_NAME.to_string(), enter);
        let exit = g.push_symbol(Some(SymbolName::new("[scope exit]")), 0, SymbolKind::DecScope);
        g.by_name.insert(SCOPE_EXIT_NAME.to_string(), exit);
        g
    }

    fn push_symbol(&mut self, name: Option<SymbolName>, line_no: u32, kind: SymbolKind) -> SymbolId {
        let id = SymbolId::from_index(self.symbols.len() as u32);
        self.symbols.push(Symbol::new_internal(id, name, line_no, kind));
        id
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn last_depth_watermark(&self) -> u32 {
        self.last_depth_watermark.load(std::sync::atomic::Ordering::Relaxed)
    }

    #[doc(hidden)]
    pub fn set_last_depth_watermark(&self, watermark: u32) {
        self.last_depth_watermark
            .store(watermark, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn symbol_id(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Allocates a fresh, unnamed `Abstract` symbol. Mirrors `new_symbol`,
    /// minus Python's id-reservation dance (the arena's length is always the
    /// next id, so there is nothing to roll back on failure).
    pub fn new_symbol(&mut self, line_no: u32) -> SymbolId {
        self.push_symbol(None, line_no, SymbolKind::Abstract)
    }

    /// Returns the symbol bound to `name`, creating a fresh `Abstract`
    /// placeholder for it if this is the first time `name` is seen.
    /// Mirrors `name_to_symbol`.
    pub fn name_to_symbol(&mut self, name: &str, line_no: u32) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.push_symbol(Some(SymbolName::new(name)), line_no, SymbolKind::Abstract);
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Returns the `Text` symbol for `bytes`, interning a new one if this
    /// exact byte string hasn't been seen before. Mirrors `text_to_symbol`.
    pub fn text_to_symbol(&mut self, bytes: &[u8], line_no: u32) -> SymbolId {
        if let Some(&id) = self.by_text.get(bytes) {
            return id;
        }
        let id = self.push_symbol(
            Some(SymbolName::new("[text]")),
            line_no,
            SymbolKind::Text {
                bytes: bytes.to_vec().into_boxed_slice(),
            },
        );
        self.by_text.insert(bytes.to_vec().into_boxed_slice(), id);
        id
    }

    /// Replaces an `Abstract` symbol's kind. Returns
    /// [`GrammarError::AlreadyDefined`] if the symbol was already given a
    /// non-`Abstract` kind.
    ///
    /// Mirrors the `terminal`/`clean` side effects the original's
    /// `define_*` family applies for leaf-producing kinds: `Regex`, `Text`,
    /// `Reference`, `ScopedRef`, `RndInt`, and `RndFlt` symbols are always
    /// allowed to generate past a hit depth/size limit (they can't recurse
    /// further regardless), `ScopedRef` is additionally `clean` (never
    /// mutated), and defining a `Reference` also marks its tracked target
    /// terminal.
    pub fn define(&mut self, id: SymbolId, kind: SymbolKind) -> Result<(), GrammarError> {
        {
            let sym = self.get(id);
            if !sym.kind().is_abstract() {
                return Err(GrammarError::AlreadyDefined {
                    name: symbol_label(sym),
                    line_no: sym.line_no(),
                });
            }
        }
        let reference_target = match &kind {
            SymbolKind::Reference { target } => Some(*target),
            _ => None,
        };
        let mark_terminal = matches!(
            kind,
            SymbolKind::Regex { .. }
                | SymbolKind::Text { .. }
                | SymbolKind::Reference { .. }
                | SymbolKind::ScopedRef { .. }
                | SymbolKind::RndInt { .. }
                | SymbolKind::RndFlt { .. }
        );
        let mark_clean = matches!(kind, SymbolKind::ScopedRef { .. });

        let sym = self.get_mut(id);
        sym.set_kind(kind);
        if mark_terminal {
            sym.set_terminal(Some(true));
        }
        if mark_clean {
            sym.set_clean(true);
        }
        if let Some(target) = reference_target {
            self.get_mut(target).set_terminal(Some(true));
        }
        Ok(())
    }

    /// Registers `child` as an alternative of the `Choice` symbol `choice_id`
    /// with the given weight. `weight: None` defaults to `1.0`, except when
    /// `child` is itself a `Choice` symbol, in which case it defaults to
    /// that child's total weight (flattening a nested choice's odds into its
    /// parent the same way the original's `add_choice` does when the caller
    /// passes no explicit weight). Mirrors `add_choice`.
    pub fn add_choice(
        &mut self,
        choice_id: SymbolId,
        child: SymbolId,
        weight: Option<f64>,
        line_no: u32,
    ) -> Result<(), GrammarError> {
        let resolved = match weight {
            Some(w) => w,
            None => {
                let child_sym = self.get(child);
                if child_sym.kind().is_abstract() {
                    return Err(GrammarError::UndefinedSymbol {
                        name: symbol_label(child_sym),
                        line_no,
                    });
                }
                if matches!(child_sym.kind(), SymbolKind::Choice { .. }) {
                    self.choice_weights
                        .get(&child)
                        .map(|wc| wc.total_weight())
                        .unwrap_or(1.0)
                } else {
                    1.0
                }
            }
        };
        self.choice_weights
            .entry(choice_id)
            .or_insert_with(WeightedChoice::new)
            .append(child, Some(resolved));
        if let SymbolKind::Choice { children } = self.get_mut(choice_id).kind_mut() {
            children.push(child);
        }
        Ok(())
    }

    /// The weighted bag backing a `Choice` symbol, if any alternatives have
    /// been registered for it.
    pub fn choice_bag(&self, id: SymbolId) -> Option<&WeightedChoice<SymbolId>> {
        self.choice_weights.get(&id)
    }

    /// Defines `id` as a `Foreign` symbol delegating to `peer`'s `"root"`
    /// symbol. Mirrors `define_foreign`'s eager lookup of the peer's root at
    /// definition time, returning [`GrammarError::ForeignMissingStart`] if
    /// `peer` has no symbol named `"root"`.
    pub fn define_foreign(
        &mut self,
        id: SymbolId,
        name: impl Into<std::rc::Rc<str>>,
        peer: std::rc::Rc<Grammar>,
        line_no: u32,
    ) -> Result<(), GrammarError> {
        let start = peer.symbol_id("root").ok_or_else(|| {
            let sym = self.get(id);
            GrammarError::ForeignMissingStart {
                name: symbol_label(sym),
                line_no,
            }
        })?;
        self.define(
            id,
            SymbolKind::Foreign {
                grammar: name.into(),
                start,
            },
        )?;
        self.foreign_grammars.insert(id, peer);
        Ok(())
    }

    /// The peer grammar behind a `Foreign` symbol, if it was defined via
    /// [`Self::define_foreign`].
    pub fn foreign_grammar(&self, id: SymbolId) -> Option<&std::rc::Rc<Grammar>> {
        self.foreign_grammars.get(&id)
    }

    /// Picks a uniformly random symbol from the arena, excluding symbols
    /// marked `clean`, `recursive_clean`, or `tracked`. Mirrors
    /// `_random_symbol`'s rejection loop.
    ///
    /// # Panics
    ///
    /// Panics if every symbol in the grammar is excluded (an infinite loop
    /// in the original; this crate prefers a clear panic over hanging).
    pub fn random_symbol(&self, mut rnd_index: impl FnMut(usize) -> usize) -> SymbolId {
        assert!(!self.symbols.is_empty(), "grammar has no symbols");
        loop {
            let idx = rnd_index(self.symbols.len());
            let sym = &self.symbols[idx];
            if !(sym.recursive_clean() || sym.clean() || sym.tracked().is_some()) {
                return sym.id();
            }
        }
    }

    /// Validates that every symbol is fully defined and internally
    /// consistent: no leftover `Abstract` placeholders, no empty
    /// `Choice`/`Concat`/`Regex`, `Foreign`/`Function` symbols carry their
    /// required data, and `Reference`/`ScopedRef` symbols point at a
    /// `tracked` symbol. Mirrors `sanity_check`.
    pub fn sanity_check(&self) -> Result<(), GrammarError> {
        for sym in &self.symbols {
            match sym.kind() {
                SymbolKind::Abstract => {
                    return Err(GrammarError::UndefinedSymbol {
                        name: symbol_label(sym),
                        line_no: sym.line_no(),
                    });
                }
                SymbolKind::Choice { children } => {
                    if children.is_empty() {
                        return Err(GrammarError::EmptyChoice {
                            name: symbol_label(sym),
                            line_no: sym.line_no(),
                        });
                    }
                }
                SymbolKind::Concat { children } => {
                    if children.is_empty() {
                        return Err(GrammarError::EmptyConcat {
                            name: symbol_label(sym),
                            line_no: sym.line_no(),
                        });
                    }
                }
                SymbolKind::Foreign { .. } => {
                    if !self.foreign_grammars.contains_key(&sym.id()) {
                        return Err(GrammarError::ForeignMissingGrammar {
                            name: symbol_label(sym),
                            line_no: sym.line_no(),
                        });
                    }
                }
                SymbolKind::Regex { parts } => {
                    if parts.is_empty() {
                        return Err(GrammarError::EmptyRegex {
                            name: symbol_label(sym),
                            line_no: sym.line_no(),
                        });
                    }
                }
                SymbolKind::Reference { target } | SymbolKind::ScopedRef { target } => {
                    let tracked = self.get(*target);
                    if tracked.tracked().is_none() {
                        return Err(GrammarError::ReferenceToUntracked {
                            name: symbol_label(sym),
                            line_no: sym.line_no(),
                            target_name: symbol_label(tracked),
                            target_line_no: tracked.line_no(),
                        });
                    }
                }
                SymbolKind::Star { .. }
                | SymbolKind::Text { .. }
                | SymbolKind::RndInt { .. }
                | SymbolKind::RndFlt { .. }
                | SymbolKind::IncScope
                | SymbolKind::DecScope
                | SymbolKind::Function { .. } => {}
            }
        }
        Ok(())
    }
}

fn symbol_label(sym: &Symbol) -> String {
    sym.name()
        .map(|n| n.as_str().to_string())
        .unwrap_or_else(|| format!("<symbol #{}>", sym.id().index()))
}

impl std::ops::Index<SymbolId> for Grammar {
    type Output = Symbol;

    fn index(&self, id: SymbolId) -> &Symbol {
        self.get(id)
    }
}

impl std::ops::Index<&str> for Grammar {
    type Output = Symbol;

    fn index(&self, name: &str) -> &Symbol {
        let id = self
            .symbol_id(name)
            .unwrap_or_else(|| panic!("no such symbol: {name}"));
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_grammar_has_scope_pseudo_symbols() {
        let g = Grammar::new();
        assert_eq!(g.len(), 2);
        assert!(matches!(g[SCOPE_ENTER_NAME].kind(), SymbolKind::IncScope));
        assert!(matches!(g[SCOPE_EXIT_NAME].kind(), SymbolKind::DecScope));
    }

    #[test]
    fn name_to_symbol_interns() {
        let mut g = Grammar::new();
        let a = g.name_to_symbol("foo", 1);
        let b = g.name_to_symbol("foo", 99);
        assert_eq!(a, b);
    }

    #[test]
    fn text_to_symbol_interns_by_bytes() {
        let mut g = Grammar::new();
        let a = g.text_to_symbol(b"hello", 1);
        let b = g.text_to_symbol(b"hello", 2);
        let c = g.text_to_symbol(b"world", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sanity_check_rejects_undefined_symbol() {
        let mut g = Grammar::new();
        g.name_to_symbol("undefined", 7);
        let err = g.sanity_check().unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedSymbol { .. }));
    }

    #[test]
    fn sanity_check_rejects_empty_choice() {
        let mut g = Grammar::new();
        let id = g.name_to_symbol("c", 1);
        g.define(id, SymbolKind::Choice { children: vec![] }).unwrap();
        let err = g.sanity_check().unwrap_err();
        assert!(matches!(err, GrammarError::EmptyChoice { .. }));
    }

    #[test]
    fn define_twice_errors() {
        let mut g = Grammar::new();
        let id = g.name_to_symbol("x", 1);
        g.define(id, SymbolKind::Text { bytes: Box::from(*b"a") })
            .unwrap();
        let err = g
            .define(id, SymbolKind::Text { bytes: Box::from(*b"b") })
            .unwrap_err();
        assert!(matches!(err, GrammarError::AlreadyDefined { .. }));
    }
}
