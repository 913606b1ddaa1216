use std::fmt;

use gramfuzz_grammar::GrammarError;
use gramfuzz_weighted::ChoiceError;

/// Errors that can occur while driving generation, as distinct from the
/// grammar-construction errors in [`GrammarError`].
#[derive(Debug, Clone, PartialEq)]
pub enum GenError {
    /// A symbol in the grammar failed `sanity_check`.
    Grammar(GrammarError),
    /// A `Choice` symbol's weighted bag had nothing to draw.
    Choice(ChoiceError),
    /// Attempted to generate an `Abstract` symbol directly.
    AbstractSymbol { name: String, line_no: u32 },
    /// `gen_state_t.rpoints` overflowed its fixed 6-slot array.
    RpointsOverflow,
    /// Recursion exceeded the hard cap of 10000, regardless of
    /// `max_depth`.
    HardRecursionLimit,
    /// A tracked symbol never converged on a unique instance after 100
    /// retries.
    TrackingExhausted { name: String, line_no: u32 },
    /// `end_tracking_instance` was called while not tracking anything.
    NotTracking { name: String, line_no: u32 },
    /// A tracked symbol generated more bytes than its declared `tracked`
    /// budget.
    TrackedSizeMismatch {
        name: String,
        line_no: u32,
        expected: usize,
        actual: usize,
    },
    /// `sanity_check` caught a `Reference`/`ScopedRef` with no tracked
    /// target, or generation found the same.
    ReferenceToUntracked { name: String, line_no: u32 },
    /// A `ScopedRef` symbol had zero live instances to pick from.
    ScopeEmpty { name: String, line_no: u32 },
    /// `dec_star_depth` was called on a symbol already at depth zero.
    NegativeStarDepth { name: String, line_no: u32 },
    /// Attempted to start tracking a symbol that is already being tracked
    /// (nested tracking of the same symbol).
    NestedTracking { name: String, line_no: u32 },
    /// A `GRAMMAR_DEBUG` value could not be parsed as an integer.
    InvalidDebugFlags { raw: String },
    /// The generated byte sequence was not valid UTF-8.
    NotUtf8,
    /// `generate()` was given a start-symbol name with no registered symbol.
    UnknownStartSymbol { name: String },
    /// The `rstate` slice-duplication state machine reached a combination
    /// that should be unreachable (`OOPS!` in the original).
    InvalidRstateTransition { rstate: u8 },
    /// The recursive-slice-duplication output buffer could not be allocated.
    /// Surfaced as a variant rather than aborting the process, since Rust's
    /// fallible-allocation story differs from the original's
    /// `malloc`-returns-`NULL` check.
    AllocationFailed { requested: usize },
}

impl fmt::Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenError::Grammar(e) => write!(f, "{e}"),
            GenError::Choice(e) => write!(f, "{e}"),
            GenError::AbstractSymbol { name, line_no } => {
                write!(f, "can't generate an abstract symbol: {name} (L{line_no})")
            }
            GenError::RpointsOverflow => write!(f, "gen_state.rpoints overflow"),
            GenError::HardRecursionLimit => write!(f, "hit hard recursion limit"),
            GenError::TrackingExhausted { name, line_no } => write!(
                f,
                "failed to generate unique tracked symbol: {name} (L{line_no})"
            ),
            GenError::NotTracking { name, line_no } => {
                write!(f, "not tracking this symbol: {name} (L{line_no})")
            }
            GenError::TrackedSizeMismatch {
                name,
                line_no,
                expected,
                actual,
            } => write!(
                f,
                "symbol reference is the wrong size, expecting {expected}, got {actual}: {name} (L{line_no})"
            ),
            GenError::ReferenceToUntracked { name, line_no } => write!(
                f,
                "reference symbol refers to a non-tracked symbol: {name} (L{line_no})"
            ),
            GenError::ScopeEmpty { name, line_no } => write!(
                f,
                "no instances in scope to generate: {name} (L{line_no})"
            ),
            GenError::NegativeStarDepth { name, line_no } => write!(
                f,
                "negative star depth for {name} (L{line_no})"
            ),
            GenError::NestedTracking { name, line_no } => {
                write!(f, "can't nest tracked symbols: {name} (L{line_no})")
            }
            GenError::InvalidDebugFlags { raw } => {
                write!(f, "unknown value for GRAMMAR_DEBUG, expecting int: {raw:?}")
            }
            GenError::NotUtf8 => write!(f, "generated output was not valid UTF-8"),
            GenError::UnknownStartSymbol { name } => {
                write!(f, "start symbol not defined: {name}")
            }
            GenError::InvalidRstateTransition { rstate } => {
                write!(f, "OOPS! inconsistent rstate transition: {rstate}")
            }
            GenError::AllocationFailed { requested } => {
                write!(f, "failed to allocate {requested} bytes for the recursive-slice buffer")
            }
        }
    }
}

impl std::error::Error for GenError {}

impl From<GrammarError> for GenError {
    fn from(e: GrammarError) -> Self {
        GenError::Grammar(e)
    }
}

impl From<ChoiceError> for GenError {
    fn from(e: ChoiceError) -> Self {
        GenError::Choice(e)
    }
}
