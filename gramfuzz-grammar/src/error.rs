use std::fmt;

/// Errors raised while building or validating a [`crate::Grammar`], distinct
/// from the generation-time errors `gramfuzz_gen::GenError` covers.
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// A symbol was referenced (via `name_to_symbol`) but never given a
    /// definition before `sanity_check` ran.
    UndefinedSymbol { name: String, line_no: u32 },
    /// A `Choice` symbol has no alternatives.
    EmptyChoice { name: String, line_no: u32 },
    /// A `Concat` symbol has no children.
    EmptyConcat { name: String, line_no: u32 },
    /// A `Foreign` symbol is missing its target grammar name.
    ForeignMissingGrammar { name: String, line_no: u32 },
    /// A `Foreign` symbol is missing its start symbol.
    ForeignMissingStart { name: String, line_no: u32 },
    /// A `Regex` symbol has no parts.
    EmptyRegex { name: String, line_no: u32 },
    /// A `Reference`/`ScopedRef` symbol points at a symbol that is not
    /// `tracked`.
    ReferenceToUntracked {
        name: String,
        line_no: u32,
        target_name: String,
        target_line_no: u32,
    },
    /// `Grammar::define_*` was called twice on the same symbol.
    AlreadyDefined { name: String, line_no: u32 },
    /// `generate()`/a lookup was given a start-symbol name with no
    /// registered symbol.
    UnknownStartSymbol { name: String },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UndefinedSymbol { name, line_no } => {
                write!(f, "a symbol was used but not defined: {name} (L{line_no})")
            }
            GrammarError::EmptyChoice { name, line_no } => {
                write!(f, "choice symbol with no children: {name} (L{line_no})")
            }
            GrammarError::EmptyConcat { name, line_no } => write!(
                f,
                "concatenation symbol with no children: {name} (L{line_no})"
            ),
            GrammarError::ForeignMissingGrammar { name, line_no } => write!(
                f,
                "foreign grammar symbol without a grammar: {name} (L{line_no})"
            ),
            GrammarError::ForeignMissingStart { name, line_no } => write!(
                f,
                "foreign grammar symbol without a start symbol: {name} (L{line_no})"
            ),
            GrammarError::EmptyRegex { name, line_no } => {
                write!(f, "regex symbol without data: {name} (L{line_no})")
            }
            GrammarError::ReferenceToUntracked {
                name,
                line_no,
                target_name,
                target_line_no,
            } => write!(
                f,
                "reference symbol refers to a non-tracked symbol: {name} (L{line_no}) -> {target_name} (L{target_line_no})"
            ),
            GrammarError::AlreadyDefined { name, line_no } => {
                write!(f, "symbol defined more than once: {name} (L{line_no})")
            }
            GrammarError::UnknownStartSymbol { name } => {
                write!(f, "start symbol not defined: {name}")
            }
        }
    }
}

impl std::error::Error for GrammarError {}
