//! Grammar-driven test-case generation engine.
//!
//! Thin re-export over the split `gramfuzz-*` crates, the way `pczarn-cfg`'s
//! top-level `cfg` crate re-exports `cfg_grammar`/`cfg_symbol`/etc. Adds one
//! thing the split crates can't provide themselves: [`GenerateExt`], calling
//! generation as a `Grammar` method rather than a free function (the
//! generator crate can't add that method directly without depending back on
//! the grammar crate it already depends on).

pub use gramfuzz_grammar::{
    FunctionCallback, Grammar, GrammarError, RegexPart, Symbol, SymbolId, SymbolKind, SymbolName,
    WeightedChoice, SCOPE_ENTER_NAME, SCOPE_EXIT_NAME,
};
pub use gramfuzz_gen::{generate, DebugFlags, GenError, GenRng, GenRoot, GenState, RandSource};
pub use gramfuzz_weighted::{ChoiceError, RandomDraw};

/// Adds `Grammar::generate` as a method, matching the host interface other
/// gramfuzz-alikes expose.
pub trait GenerateExt {
    fn generate(&self, root: impl Into<GenRoot>, rng: &mut impl RandSource) -> Result<String, GenError>;
}

impl GenerateExt for Grammar {
    fn generate(&self, root: impl Into<GenRoot>, rng: &mut impl RandSource) -> Result<String, GenError> {
        gramfuzz_gen::generate(self, root, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_generate_method_matches_free_function() {
        let mut g = Grammar::new();
        let root = g.name_to_symbol("root", 1);
        g.define(root, SymbolKind::Text { bytes: Box::from(*b"hi") })
            .unwrap();
        let mut rng = GenRng::from_seed(7);
        let out = g.generate(root, &mut rng).unwrap();
        assert_eq!(out, "hi");
    }
}
