//! `GRAMMAR_DEBUG`-style tracing bitmask.
//!
//! Mirrors `alf_grammar.h`'s `D_*` bit layout; gates `log::trace!` call
//! sites in [`crate::dispatch`] and [`crate::expand`] instead of raw
//! `fprintf(stderr, ...)`.

use crate::error::GenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugFlags(u32);

impl DebugFlags {
    pub const GEN: DebugFlags = DebugFlags(1 << 0);
    pub const PARSE: DebugFlags = DebugFlags(1 << 1);
    pub const LIMITS: DebugFlags = DebugFlags(1 << 2);
    pub const REFS: DebugFlags = DebugFlags(1 << 3);
    pub const TRACK: DebugFlags = DebugFlags(1 << 4);
    pub const CLEAN: DebugFlags = DebugFlags(1 << 5);
    pub const TERM: DebugFlags = DebugFlags(1 << 6);
    pub const NONE: DebugFlags = DebugFlags(0);

    pub fn contains(self, flag: DebugFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn is_any(self) -> bool {
        self.0 != 0
    }

    /// Reads and parses the `GRAMMAR_DEBUG` environment variable. An unset
    /// variable yields [`DebugFlags::NONE`]; a value that fails to parse as
    /// an integer is a fatal `GenError`, matching `alf_grammar.c`'s
    /// `strtoul`-or-`RuntimeError` behavior at module-init time.
    pub fn from_env() -> Result<Self, GenError> {
        match std::env::var("GRAMMAR_DEBUG") {
            Err(_) => Ok(DebugFlags::NONE),
            Ok(raw) => {
                let trimmed = raw.trim();
                let parsed = if let Some(hex) = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else {
                    trimmed.parse::<u32>().ok()
                };
                parsed
                    .map(DebugFlags)
                    .ok_or(GenError::InvalidDebugFlags { raw })
            }
        }
    }
}

impl std::ops::BitOr for DebugFlags {
    type Output = DebugFlags;

    fn bitor(self, rhs: DebugFlags) -> DebugFlags {
        DebugFlags(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_flags_contain_each_member() {
        let flags = DebugFlags::GEN | DebugFlags::REFS;
        assert!(flags.contains(DebugFlags::GEN));
        assert!(flags.contains(DebugFlags::REFS));
        assert!(!flags.contains(DebugFlags::TRACK));
    }

    #[test]
    fn none_has_no_members() {
        assert!(!DebugFlags::NONE.is_any());
    }
}
