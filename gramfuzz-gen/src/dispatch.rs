//! The recursive generator: one function per `SymbolKind`, dispatched from
//! [`generate_symbol`]. Ported from `symbol.c`'s per-type `_generate_*`
//! functions plus the shared entry point `_generate`.

use gramfuzz_grammar::{Grammar, SymbolId, SymbolKind};

use crate::error::GenError;
use crate::rng::RandSource;
use crate::state::GenState;
use crate::trace::DebugFlags;

const SKIP_ENTIRELY: f64 = 0.001;
const EXTRA_SELF_BEFORE: f64 = 0.001;
const EXTRA_RANDOM_BEFORE: f64 = 0.001;
const RANDOM_CHAR: f64 = 0.001;
const RSTATE_START: f64 = 0.03;
const RSTATE_ADVANCE: f64 = 0.3;
const RSTATE_REPEAT_ANYWAY: f64 = 0.01;
const EXTRA_RANDOM_AFTER: f64 = 0.001;
const CONCAT_SKIP: f64 = 0.001;
const STAR_SELF_BEFORE: f64 = 0.1;
const STAR_SELF_AFTER: f64 = 0.09;

fn symbol_label(g: &Grammar, id: SymbolId) -> String {
    let sym = g.get(id);
    sym.name()
        .map(|n| n.as_str().to_string())
        .unwrap_or_else(|| format!("<symbol #{}>", id.index()))
}

fn random_symbol(g: &Grammar, rng: &mut impl RandSource) -> SymbolId {
    g.random_symbol(|max| rng.rnd(max as u32) as usize)
}

/// Generates one instance of `id` into `state`, applying mutation
/// probabilities, tracking/clean bookkeeping, and the slice-duplication
/// `rstate` machine. Mirrors `_generate`.
pub fn generate_symbol(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    id: SymbolId,
) -> Result<(), GenError> {
    let sym = g.get(id);
    if state.debug().contains(DebugFlags::GEN) {
        log::trace!("{} (L{})", symbol_label(g, id), sym.line_no());
    }

    let mut local_rstate = 0u8;

    if sym.tracked().is_some() {
        state.start_tracking_instance(id, symbol_label(g, id), sym.line_no())?;
    } else if sym.clean() || sym.recursive_clean() || state.clean.is_some() {
        state.start_clean(
            id,
            sym.clean(),
            sym.recursive_clean(),
            symbol_label(g, id),
            sym.line_no(),
        )?;
    } else if state.tracking == 0 && !state.hit_depth(g) {
        // pre-generate mutations
        if rng.chance(SKIP_ENTIRELY) {
            return Ok(());
        }

        if !state.hit_limit() && !state.hit_depth(g) {
            if rng.chance(EXTRA_SELF_BEFORE) {
                generate_symbol(g, state, rng, id)?;
            }
            if rng.chance(EXTRA_RANDOM_BEFORE) {
                let other = random_symbol(g, rng);
                generate_symbol(g, state, rng, other)?;
            }
            if rng.chance(RANDOM_CHAR) {
                let c = rng.rnd(128) as u8;
                state.write(&[c]);
            }
        }

        if state.rstate == 0 && rng.chance(RSTATE_START) {
            local_rstate = 1;
            state.rstate = 1;
            state.rsym = Some(id);
            state.push_rpoint()?;
        } else if state.rstate == 1 && state.rsym == Some(id) && rng.chance(RSTATE_ADVANCE) {
            state.rstate = 2;
            state.push_rpoint()?;
            local_rstate = 2;
        }
    }

    let mut reference_tries = 100;
    loop {
        state.depth += 1;
        state.bump_depth_watermark();
        if state.depth > 10000 {
            return Err(GenError::HardRecursionLimit);
        }

        if sym.effective_terminal() || !(state.hit_depth(g) || state.hit_limit()) {
            dispatch_kind(g, state, rng, id)?;
        }
        state.depth -= 1;

        if state.tracking > 0 || sym.clean() || state.clean.is_some() {
            if let Some(budget) = sym.tracked() {
                let retry =
                    state.end_tracking_instance(id, budget, symbol_label(g, id), sym.line_no())?;
                if retry {
                    reference_tries -= 1;
                    if reference_tries == 0 {
                        return Err(GenError::TrackingExhausted {
                            name: symbol_label(g, id),
                            line_no: sym.line_no(),
                        });
                    }
                    continue;
                }
            }
            state.end_clean(id);
            return Ok(());
        } else {
            break;
        }
    }

    // tracking/clean symbols return from inside the loop above.
    if state.hit_depth(g) {
        return Ok(());
    }

    if local_rstate == 1 {
        if state.rstate == 1 {
            if rng.chance(RSTATE_REPEAT_ANYWAY) {
                // No matching inner symbol was chosen, but we can repeat
                // what happened inside this symbol anyway.
                if state.rpoint >= 5 {
                    return Err(GenError::RpointsOverflow);
                }
                state.rpoints[state.rpoint] = state.tell();
                state.rpoint += 1;
                state.rpoints[state.rpoint] = state.tell();
                state.rpoint += 1;
                state.rstate = 9;
            }
        } else {
            if state.rstate != 3 {
                return Err(GenError::InvalidRstateTransition {
                    rstate: state.rstate,
                });
            }
            state.rstate = 4;
        }
        state.push_rpoint()?;
    } else if local_rstate == 2 {
        state.rstate = 3;
        state.push_rpoint()?;
    }

    if !state.hit_limit() && !state.hit_depth(g) && rng.chance(EXTRA_RANDOM_AFTER) {
        let other = random_symbol(g, rng);
        generate_symbol(g, state, rng, other)?;
    }
    Ok(())
}

fn dispatch_kind(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    id: SymbolId,
) -> Result<(), GenError> {
    let sym = g.get(id);
    match sym.kind() {
        SymbolKind::Abstract => Err(GenError::AbstractSymbol {
            name: symbol_label(g, id),
            line_no: sym.line_no(),
        }),
        SymbolKind::Concat { children } => generate_concat(g, state, rng, id, children),
        SymbolKind::Choice { .. } => generate_choice(g, state, rng, id),
        SymbolKind::Regex { parts } => {
            generate_regex(g, state, rng, parts);
            Ok(())
        }
        SymbolKind::Star { child, recommended_count } => {
            generate_star(g, state, rng, id, *child, *recommended_count)
        }
        SymbolKind::Text { bytes } => {
            state.write(bytes);
            Ok(())
        }
        SymbolKind::Foreign { start, .. } => generate_foreign(g, state, rng, id, *start),
        SymbolKind::Reference { target } => generate_reference(g, state, *target),
        SymbolKind::ScopedRef { target } => generate_scoped_ref(g, state, rng, id, *target),
        SymbolKind::RndInt { a, b } => {
            generate_rndint(state, rng, *a, *b);
            Ok(())
        }
        SymbolKind::RndFlt { a, b } => {
            generate_rndflt(state, rng, *a, *b);
            Ok(())
        }
        SymbolKind::IncScope => {
            state.inc_scope();
            Ok(())
        }
        SymbolKind::DecScope => {
            state.dec_scope();
            Ok(())
        }
        SymbolKind::Function { callback, args } => {
            generate_function(g, state, rng, callback.clone(), args.clone())
        }
    }
}

fn generate_concat(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    id: SymbolId,
    children: &[SymbolId],
) -> Result<(), GenError> {
    let sym = g.get(id);
    let allow_skip = state.tracking == 0 && !sym.clean() && state.clean.is_none();
    let n = children.len();
    let mut i = 0usize;
    while i < n {
        if allow_skip && rng.chance(CONCAT_SKIP) {
            i += rng.rnd(n as u32) as usize; // skip part of this concatenation
        } else {
            generate_symbol(g, state, rng, children[i])?;
        }
        i += 1;
    }
    Ok(())
}

fn generate_choice(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    id: SymbolId,
) -> Result<(), GenError> {
    let bag = g.choice_bag(id).ok_or(GenError::Choice(gramfuzz_weighted::ChoiceError))?;
    let chosen = *bag.choice(rng)?;
    generate_symbol(g, state, rng, chosen)
}

fn generate_regex(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    parts: &[gramfuzz_grammar::RegexPart],
) {
    for part in parts {
        let count = if state.hit_limit() || state.hit_depth(g) {
            part.min
        } else {
            let span = rng_inclusive_span(part.min, part.max);
            rng.rnd(rng.rnd(span)) + part.min
        };
        for _ in 0..count {
            let idx = rng.rnd(part.charset.len() as u32) as usize;
            state.write(&part.charset[idx..idx + 1]);
        }
    }
}

fn rng_inclusive_span(min: u32, max: u32) -> u32 {
    max.saturating_sub(min).saturating_add(1)
}

fn generate_star(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    id: SymbolId,
    child: SymbolId,
    recommended_count: f64,
) -> Result<(), GenError> {
    let sym = g.get(id);
    if !(sym.clean() || state.clean.is_some() || (!state.hit_limit() && !state.hit_depth(g))) {
        return Ok(());
    }

    state.inc_star_depth(id);

    let clean = sym.clean() || state.clean.is_some();
    if !clean && rng.chance(STAR_SELF_BEFORE) {
        generate_symbol(g, state, rng, id)?;
        generate_symbol(g, state, rng, child)?;
    } else if !clean && rng.chance(STAR_SELF_AFTER) {
        generate_symbol(g, state, rng, child)?;
        generate_symbol(g, state, rng, id)?;
    } else {
        // sym.star_depth, the pre-halving depth parameter, is a documented
        // no-op under the current formula: depth nesting instead halves the
        // count at each level via repeated `rnd`.
        let mut count = rng.rnd(recommended_count as u32);
        let depth = state.get_star_depth(id);
        for _ in 1..depth {
            count = rng.rnd(count);
        }
        for _ in 0..count {
            if !clean && (state.hit_limit() || state.hit_depth(g)) {
                break;
            }
            generate_symbol(g, state, rng, child)?;
        }
    }

    state.dec_star_depth(id, symbol_label(g, id), sym.line_no())
}

fn generate_foreign(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    id: SymbolId,
    start: SymbolId,
) -> Result<(), GenError> {
    let peer = g
        .foreign_grammar(id)
        .cloned()
        .ok_or_else(|| GenError::Grammar(gramfuzz_grammar::GrammarError::ForeignMissingGrammar {
            name: symbol_label(g, id),
            line_no: g.get(id).line_no(),
        }))?;
    let bytes = crate::generate_bytes(&peer, start, rng, state.debug())?;
    state.write(&bytes);
    Ok(())
}

fn generate_reference(g: &Grammar, state: &mut GenState, target: SymbolId) -> Result<(), GenError> {
    let tracked_sz = g.get(target).tracked().unwrap_or(0);
    state.mark_tracking_reference(target);
    for _ in 0..tracked_sz {
        state.write(b" ");
    }
    Ok(())
}

fn generate_scoped_ref(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    id: SymbolId,
    target: SymbolId,
) -> Result<(), GenError> {
    let sym = g.get(id);
    state.generate_scoped_instance(target, symbol_label(g, id), sym.line_no(), rng)
}

fn generate_rndint(state: &mut GenState, rng: &mut impl RandSource, a: i64, b: i64) {
    let span = (b - a + 1).max(1) as u32;
    let value = rng.rnd(span) as i64 + a;
    state.write(value.to_string().as_bytes());
}

fn generate_rndflt(state: &mut GenState, rng: &mut impl RandSource, a: f64, b: f64) {
    let value = rng.rndl_inc(b - a) + a;
    state.write(format!("{value:.6}").as_bytes());
}

fn generate_function(
    g: &Grammar,
    state: &mut GenState,
    rng: &mut impl RandSource,
    callback: gramfuzz_grammar::FunctionCallback,
    args: Vec<SymbolId>,
) -> Result<(), GenError> {
    let start = state.tell();
    let cookie = state.enter_function();
    let defer_depth = state.defer_depth();

    let mut bounds = Vec::with_capacity(args.len() + 1);
    bounds.push(start);
    for arg in &args {
        generate_symbol(g, state, rng, *arg)?;
        bounds.push(state.tell());
    }

    let has_ref = state.leave_function(cookie);
    if has_ref {
        state.defer_function(callback, bounds, defer_depth);
        Ok(())
    } else {
        let arg_slices: Vec<Vec<u8>> = bounds
            .windows(2)
            .map(|w| state.slice(w[0], w[1]).map(|s| s.to_vec()))
            .collect::<Result<_, _>>()?;
        let arg_refs: Vec<&[u8]> = arg_slices.iter().map(|v| v.as_slice()).collect();
        let result = callback(&arg_refs);
        state.backtrack(start);
        state.write(&result);
        Ok(())
    }
}
