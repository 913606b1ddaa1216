//! The mutable context threaded through one call to `generate()`.
//!
//! Ported from `gen_state_t` and `_sym_state_t` in `gen_state.c`/`gen_state.h`.
//! The original indexes `sym_state` by a dense, pre-sized array (`max_id`
//! known up front) and walks it in descending id order; this port uses a
//! `BTreeMap` populated lazily the same way `_get_sym_state` lazily
//! initializes an entry the first time a symbol id is seen, without needing
//! the grammar's id count ahead of time, while keeping iteration over all
//! tracked symbols (and over each symbol's retired/scoped instances)
//! deterministic for a fixed seed. A `HashMap`/`HashSet` here would let
//! per-process hasher randomization reorder those walks and break
//! reproducibility.

use std::collections::{BTreeMap, BTreeSet};

use gramfuzz_grammar::{FunctionCallback, Grammar, SymbolId};

use crate::error::GenError;
use crate::trace::DebugFlags;

/// Per-symbol bookkeeping: star-repetition depth, tracked-instance scopes,
/// and pending reference offsets. Mirrors `_sym_state_t`.
#[derive(Default)]
struct SymState {
    star_count: u32,
    tracking_start: Option<usize>,
    /// Instances retired from a popped scope; these are never forgotten.
    descoped_instances: BTreeSet<Vec<u8>>,
    /// `scopes[i]` holds instances generated while scope `i` was the
    /// innermost live scope. Lazily allocated the first time this symbol's
    /// tracked instance resolves (mirrors `_init_scopes`).
    scopes: Option<Vec<BTreeSet<Vec<u8>>>>,
    n_scoped_instances: usize,
    tracked_references: Vec<usize>,
}

impl SymState {
    fn ensure_scopes(&mut self, scope: usize) {
        match &mut self.scopes {
            Some(scopes) => {
                while scopes.len() <= scope {
                    scopes.push(BTreeSet::new());
                }
            }
            None => {
                self.scopes = Some((0..=scope).map(|_| BTreeSet::new()).collect());
            }
        }
    }

    fn is_unique(&self, instance: &[u8], scope: usize) -> bool {
        if self.descoped_instances.contains(instance) {
            return false;
        }
        if let Some(scopes) = &self.scopes {
            for s in &scopes[..=scope.min(scopes.len().saturating_sub(1))] {
                if s.contains(instance) {
                    return false;
                }
            }
        }
        true
    }
}

/// One deferred `Function` call, queued until references have resolved.
/// Mirrors `_deferred_func_t`.
struct DeferredFunc {
    callback: FunctionCallback,
    /// `args.len() == nargs + 1`: `args[0]` is the call's start offset,
    /// `args[i+1]` is the end offset of the `i`-th argument.
    args: Vec<usize>,
}

/// Replaces the original's `-1`/`0`/`1` sentinel return value from
/// `gen_state_enter_function` with an explicit cookie (DESIGN.md open
/// question 3).
pub(crate) enum FunctionCookie {
    Outermost,
    Nested { prev_has_reference: bool },
}

/// The generation-time state machine: output buffer, recursion/size limits,
/// the slice-duplication `rstate` machine, scope stack, and deferred
/// functions. Mirrors `gen_state_t`.
pub struct GenState {
    pub(crate) depth: u32,
    depth_watermark: u32,
    pub(crate) rstate: u8,
    pub(crate) rpoints: [usize; 6],
    pub(crate) rpoint: usize,
    pub(crate) rsym: Option<SymbolId>,
    pub(crate) tracking: u32,
    pub(crate) clean: Option<SymbolId>,
    sym_state: BTreeMap<SymbolId, SymState>,
    max_size: Option<usize>,
    buf: Vec<u8>,
    printed_limit: bool,
    printed_depth: bool,
    pub(crate) in_function: bool,
    pub(crate) has_reference: bool,
    funcs: Vec<DeferredFunc>,
    pub(crate) scope: usize,
    debug: DebugFlags,
}

impl GenState {
    pub fn new(max_size: Option<usize>, debug: DebugFlags) -> Self {
        GenState {
            depth: 0,
            depth_watermark: 0,
            rstate: 0,
            rpoints: [0; 6],
            rpoint: 1,
            rsym: None,
            tracking: 0,
            clean: None,
            sym_state: BTreeMap::new(),
            max_size,
            buf: Vec::new(),
            printed_limit: false,
            printed_depth: false,
            in_function: false,
            has_reference: false,
            funcs: Vec::new(),
            scope: 0,
            debug,
        }
    }

    pub(crate) fn debug(&self) -> DebugFlags {
        self.debug
    }

    fn sym_state_mut(&mut self, sym: SymbolId) -> &mut SymState {
        self.sym_state.entry(sym).or_default()
    }

    pub fn tell(&self) -> usize {
        self.buf.len()
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn backtrack(&mut self, pos: usize) {
        self.buf.truncate(pos);
    }

    pub fn slice(&self, from: usize, to: usize) -> Result<&[u8], GenError> {
        if to > self.buf.len() || from > to {
            return Err(GenError::RpointsOverflow);
        }
        Ok(&self.buf[from..to])
    }

    pub fn depth_watermark(&self) -> u32 {
        self.depth_watermark
    }

    pub(crate) fn bump_depth_watermark(&mut self) {
        if self.depth > self.depth_watermark {
            self.depth_watermark = self.depth;
        }
    }

    pub fn hit_depth(&mut self, grammar: &Grammar) -> bool {
        let hit = grammar.max_depth != 0 && self.depth >= grammar.max_depth;
        if hit && !self.printed_depth {
            if self.debug.contains(DebugFlags::LIMITS) {
                log::trace!("hit the depth limit of {} at filesize {}", self.depth, self.tell());
            }
            self.printed_depth = true;
        }
        hit
    }

    pub fn hit_limit(&mut self) -> bool {
        let hit = matches!(self.max_size, Some(max) if self.tell() >= max);
        if hit && !self.printed_limit {
            if self.debug.contains(DebugFlags::LIMITS) {
                log::trace!("hit the size limit at {}", self.tell());
            }
            self.printed_limit = true;
        }
        hit
    }

    pub(crate) fn push_rpoint(&mut self) -> Result<(), GenError> {
        if self.rpoint >= 6 {
            return Err(GenError::RpointsOverflow);
        }
        self.rpoints[self.rpoint] = self.tell();
        self.rpoint += 1;
        Ok(())
    }

    pub(crate) fn enter_function(&mut self) -> FunctionCookie {
        let was_in_function = self.in_function;
        self.in_function = true;
        if !was_in_function {
            return FunctionCookie::Outermost;
        }
        let prev_has_reference = self.has_reference;
        self.has_reference = false;
        FunctionCookie::Nested { prev_has_reference }
    }

    pub(crate) fn leave_function(&mut self, cookie: FunctionCookie) -> bool {
        let has_ref = self.has_reference;
        match cookie {
            FunctionCookie::Outermost => {
                self.has_reference = false;
                self.in_function = false;
            }
            FunctionCookie::Nested {
                prev_has_reference: false,
            } => {
                self.has_reference = has_ref;
            }
            FunctionCookie::Nested {
                prev_has_reference: true,
            } => {
                self.has_reference = true;
            }
        }
        has_ref
    }

    /// Number of functions currently deferred; snapshot this before
    /// generating a `Function` symbol's args so any *nested* deferrals
    /// recorded during that generation land after this one once it is
    /// inserted, keeping innermost-first popping order in [`Self::call_funcs`].
    pub(crate) fn defer_depth(&self) -> usize {
        self.funcs.len()
    }

    pub(crate) fn defer_function(&mut self, callback: FunctionCallback, args: Vec<usize>, defer_depth: usize) {
        self.funcs.insert(defer_depth, DeferredFunc { callback, args });
    }

    pub(crate) fn inc_star_depth(&mut self, sym: SymbolId) {
        self.sym_state_mut(sym).star_count += 1;
    }

    pub(crate) fn get_star_depth(&mut self, sym: SymbolId) -> u32 {
        self.sym_state_mut(sym).star_count
    }

    pub(crate) fn dec_star_depth(&mut self, sym: SymbolId, name: String, line_no: u32) -> Result<(), GenError> {
        let state = self.sym_state_mut(sym);
        if state.star_count == 0 {
            return Err(GenError::NegativeStarDepth { name, line_no });
        }
        state.star_count -= 1;
        Ok(())
    }

    pub(crate) fn start_tracking_instance(
        &mut self,
        sym: SymbolId,
        name: String,
        line_no: u32,
    ) -> Result<(), GenError> {
        let tell = self.tell();
        let state = self.sym_state_mut(sym);
        if state.tracking_start.is_some() {
            return Err(GenError::NestedTracking { name, line_no });
        }
        state.tracking_start = Some(tell);
        self.tracking += 1;
        Ok(())
    }

    /// Returns `true` if the just-generated instance duplicated an existing
    /// one and generation should retry, `false` on success.
    pub(crate) fn end_tracking_instance(
        &mut self,
        sym: SymbolId,
        budget: u32,
        name: String,
        line_no: u32,
    ) -> Result<bool, GenError> {
        if self.tracking == 0 {
            return Err(GenError::NotTracking { name, line_no });
        }
        let scope = self.scope;
        let tell = self.tell();
        let tracking_start = {
            let state = self.sym_state_mut(sym);
            state.tracking_start.ok_or_else(|| GenError::NotTracking {
                name: name.clone(),
                line_no,
            })?
        };
        let sz = tell - tracking_start;
        if sz as u32 > budget {
            return Err(GenError::TrackedSizeMismatch {
                name,
                line_no,
                expected: budget as usize,
                actual: sz,
            });
        }
        let instance = self.buf[tracking_start..tell].to_vec();
        let state = self.sym_state_mut(sym);
        state.ensure_scopes(scope);
        if !state.is_unique(&instance, scope) {
            self.backtrack(tracking_start);
            return Ok(true);
        }
        let state = self.sym_state_mut(sym);
        state.scopes.as_mut().unwrap()[scope].insert(instance);
        state.n_scoped_instances += 1;
        state.tracking_start = None;
        self.tracking -= 1;
        Ok(false)
    }

    pub(crate) fn mark_tracking_reference(&mut self, sym: SymbolId) {
        let tell = self.tell();
        self.sym_state_mut(sym).tracked_references.push(tell);
        if self.in_function {
            self.has_reference = true;
        }
    }

    /// Writes a randomly picked instance of `sym` that is currently live in
    /// some scope. Mirrors `gen_state_generate_scoped_instance`.
    pub(crate) fn generate_scoped_instance<R: crate::rng::RandSource + ?Sized>(
        &mut self,
        sym: SymbolId,
        name: String,
        line_no: u32,
        rng: &mut R,
    ) -> Result<(), GenError> {
        let scope = self.scope;
        let state = self.sym_state_mut(sym);
        let scopes = match &state.scopes {
            Some(scopes) if state.n_scoped_instances > 0 => scopes,
            _ => return Err(GenError::ScopeEmpty { name, line_no }),
        };
        let mut i = rng.rnd(state.n_scoped_instances as u32) as usize;
        let mut chosen = None;
        for s in &scopes[..=scope.min(scopes.len() - 1)] {
            if i < s.len() {
                chosen = Some(s);
                break;
            }
            i -= s.len();
        }
        let bucket = chosen.ok_or_else(|| GenError::ScopeEmpty {
            name: name.clone(),
            line_no,
        })?;
        let idx = rng.rnd(bucket.len() as u32) as usize;
        let bytes = bucket.iter().nth(idx).cloned().ok_or(GenError::ScopeEmpty {
            name,
            line_no,
        })?;
        self.write(&bytes);
        Ok(())
    }

    pub(crate) fn inc_scope(&mut self) {
        for state in self.sym_state.values_mut() {
            if let Some(scopes) = &mut state.scopes {
                scopes.push(BTreeSet::new());
            }
        }
        self.scope += 1;
    }

    pub(crate) fn dec_scope(&mut self) {
        for state in self.sym_state.values_mut() {
            let Some(scopes) = &mut state.scopes else {
                continue;
            };
            if self.scope >= scopes.len() {
                continue;
            }
            let retiring = std::mem::take(&mut scopes[self.scope]);
            state.n_scoped_instances = state.n_scoped_instances.saturating_sub(retiring.len());
            state.descoped_instances.extend(retiring);
            if self.scope > 0 {
                scopes.pop();
            }
        }
        if self.scope > 0 {
            self.scope -= 1;
        }
    }

    pub(crate) fn start_clean(
        &mut self,
        sym: SymbolId,
        clean: bool,
        recursive_clean: bool,
        name: String,
        line_no: u32,
    ) -> Result<(), GenError> {
        if let Some(active) = self.clean {
            if active == sym {
                return Err(GenError::NestedTracking { name, line_no });
            }
            return Ok(());
        }
        if !clean && !recursive_clean {
            return Err(GenError::NotTracking { name, line_no });
        }
        if !recursive_clean {
            return Ok(());
        }
        if self.debug.contains(DebugFlags::CLEAN) {
            log::trace!("entering recursive-clean symbol {name} (L{line_no})");
        }
        self.clean = Some(sym);
        Ok(())
    }

    pub(crate) fn end_clean(&mut self, sym: SymbolId) {
        if self.clean == Some(sym) {
            self.clean = None;
        }
    }

    /// Drains every deferred-function call, innermost (most recently
    /// queued) first, splicing each result into the output buffer and
    /// propagating the size delta to `rpoints` and any outer functions'
    /// pending argument boundaries. Mirrors `gen_state_call_funcs`.
    pub(crate) fn call_funcs(&mut self) {
        while let Some(df) = self.funcs.pop() {
            let argst = df.args[0];
            let argen = *df.args.last().unwrap();
            let arg_slices: Vec<Vec<u8>> = df
                .args
                .windows(2)
                .map(|w| self.buf[w[0]..w[1]].to_vec())
                .collect();
            let arg_refs: Vec<&[u8]> = arg_slices.iter().map(|v| v.as_slice()).collect();
            let result = (df.callback)(&arg_refs);
            let diff = result.len() as isize - (argen - argst) as isize;
            self.buf.splice(argst..argen, result);

            for i in 0..self.rpoint {
                if self.rpoints[i] >= argen {
                    self.rpoints[i] = (self.rpoints[i] as isize + diff) as usize;
                }
            }
            for other in self.funcs.iter_mut() {
                if *other.args.last().unwrap() >= argen {
                    for a in other.args.iter_mut().skip(1) {
                        if *a >= argen {
                            *a = (*a as isize + diff) as usize;
                        }
                    }
                }
            }
        }
    }

    /// Pops every live scope (retiring their instances into
    /// `descoped_instances`) and backfills every pending `Reference` with a
    /// randomly chosen retired instance. Mirrors
    /// `gen_state_expand_references`.
    pub(crate) fn expand_references(&mut self, mut rnd_elem: impl FnMut(usize) -> usize) {
        while self.scope > 0 {
            self.dec_scope();
        }
        self.dec_scope();

        // Descending id order, matching the original's `for (i = max_id - 1;
        // i >= 0; i--)` walk, so the sequence of `rnd_elem` draws consumed
        // here is fixed for a given grammar rather than depending on
        // insertion order.
        let ids: Vec<SymbolId> = self.sym_state.keys().rev().copied().collect();
        for id in ids {
            let state = self.sym_state.get(&id).unwrap();
            if state.tracked_references.is_empty() || state.descoped_instances.is_empty() {
                continue;
            }
            let pool: Vec<Vec<u8>> = state.descoped_instances.iter().cloned().collect();
            let offsets = state.tracked_references.clone();
            for offset in offsets {
                let chosen = &pool[rnd_elem(pool.len())];
                let end = offset + chosen.len();
                if end <= self.buf.len() {
                    self.buf[offset..end].copy_from_slice(chosen);
                }
            }
        }
    }

    /// Unreachable; kept for parity with the original's compile-time
    /// disabled truncation mutation (DESIGN.md open question 2).
    #[allow(dead_code)]
    fn chop_disabled(&mut self, rnd_index: impl FnOnce(usize) -> usize) {
        let used = self.tell();
        self.buf.truncate(rnd_index(used));
    }

    /// Performs the slice-duplication post-pass, synthesizing artificial
    /// deep recursion by re-copying two of the six rpoint-delimited slices
    /// several times over. Mirrors the bulk of `gen_state_expand`.
    pub(crate) fn duplicate_recursive_slices(&mut self) -> Result<(), GenError> {
        const RECURSION_TIMES: usize = 7;

        if !(self.rpoint >= 6 && (self.rstate == 4 || self.rstate == 9)) {
            return Ok(());
        }

        let mut slice_sz = [0usize; 5];
        for i in 0..5 {
            slice_sz[i] = self.rpoints[i + 1] - self.rpoints[i];
        }

        let result_sz = self.tell() + (slice_sz[1] + slice_sz[3]) * RECURSION_TIMES;
        let real_sz = result_sz;

        let mut out: Vec<u8> = Vec::new();
        out.try_reserve_exact(real_sz)
            .map_err(|_| GenError::AllocationFailed { requested: real_sz })?;
        out.resize(real_sz, 0u8);
        let src_buf = self.buf.clone();
        let copy = |out: &mut [u8], to_off: usize, from_off: usize, len: usize, out_sz: usize| {
            let mut len = len;
            if to_off + len > out_sz {
                if to_off >= out_sz {
                    return;
                }
                len = out_sz - to_off;
            }
            out[to_off..to_off + len].copy_from_slice(&src_buf[from_off..from_off + len]);
        };

        let mut src = self.tell() - slice_sz[4];
        let mut dst = result_sz - slice_sz[4];
        copy(&mut out, dst, src, slice_sz[4], real_sz);

        src -= slice_sz[3];
        dst -= slice_sz[3] * RECURSION_TIMES;
        for i in (0..RECURSION_TIMES).rev() {
            copy(&mut out, dst + i * slice_sz[3], src, slice_sz[3], real_sz);
        }

        src -= slice_sz[2];
        dst -= slice_sz[2];
        copy(&mut out, dst, src, slice_sz[2], real_sz);

        src -= slice_sz[1];
        dst -= slice_sz[1] * RECURSION_TIMES;
        for i in (1..RECURSION_TIMES).rev() {
            copy(&mut out, dst + i * slice_sz[1], src, slice_sz[1], real_sz);
        }
        let _ = src;

        // slice 0 (out[..slice_sz[0]]) is already correct: `out` starts
        // zeroed only past it, and dst after the last step lands exactly at
        // slice_sz[0] since the rpoints partition the buffer contiguously
        // from offset 0.
        out[..slice_sz[0]].copy_from_slice(&src_buf[..slice_sz[0]]);

        self.buf = out;
        Ok(())
    }

    /// Finalizes generation: resolves references, calls deferred functions,
    /// performs slice duplication, and returns the output bytes. Mirrors
    /// `gen_state_expand`.
    pub fn expand(&mut self, rnd_elem: impl FnMut(usize) -> usize) -> Result<Vec<u8>, GenError> {
        self.expand_references(rnd_elem);
        self.call_funcs();
        self.duplicate_recursive_slices()?;
        Ok(std::mem::take(&mut self.buf))
    }
}
