// SPDX-License-Identifier: Apache-2.0

//! Thompson NFA: data model, host simulation, device encoding
//!
//! States live in a contiguous arena and edges are indices, so cyclic graphs
//! (stars, pluses) need no reference cycles. The host matcher is a work-set
//! simulation with an iterative epsilon closure; the device encoding flattens
//! the same arena into three arrays a kernel can walk with a fixed-size
//! working set.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::constants::{BITMAP_WORDS, NFA_MAX_STATES};
use crate::lines::{count_newlines, next_line_start};
use crate::types::{MatchRecord, SubstFlags};

/// Sentinel for an absent outgoing edge.
pub const EDGE_NONE: u16 = 0xFFFF;

/// State discriminant. The numeric values are shared with the device
/// encoding and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StateKind {
    Literal = 0,
    Any = 1,
    Class = 2,
    Split = 3,
    Accept = 4,
    LineStart = 5,
    LineEnd = 6,
    WordBoundary = 7,
}

/// One NFA state: kind, up to two outgoing edges, and kind-specific payload.
///
/// `group` exists to round-trip group membership from the parser; the
/// matcher never reads it.
#[derive(Debug, Clone, Copy)]
pub struct State {
    pub kind: StateKind,
    pub edge0: u16,
    pub edge1: u16,
    pub byte: u8,
    pub fold: bool,
    pub group: u8,
    /// Starting word index into the bitmap bank (class states only).
    pub bitmap_offset: u16,
}

impl State {
    pub fn new(kind: StateKind) -> Self {
        Self {
            kind,
            edge0: EDGE_NONE,
            edge1: EDGE_NONE,
            byte: 0,
            fold: false,
            group: 0,
            bitmap_offset: 0,
        }
    }
}

/// A compiled pattern: the state arena, the packed bitmap bank, and the
/// global flags the matcher and the device header need.
#[derive(Debug, Clone)]
pub struct Nfa {
    pub states: Vec<State>,
    pub bitmaps: Vec<u32>,
    pub start: u16,
    pub anchored_start: bool,
    pub anchored_end: bool,
    pub case_insensitive: bool,
}

impl Nfa {
    #[inline]
    pub fn bitmap_contains(&self, offset: u16, b: u8) -> bool {
        let word = self.bitmaps[offset as usize + (b >> 5) as usize];
        word & (1u32 << (b & 31)) != 0
    }

    /// Whether a match could include a newline byte. The line-parallel
    /// device path never sees line terminators, so such patterns stay on
    /// the host.
    pub fn can_match_newline(&self) -> bool {
        self.states.iter().any(|s| match s.kind {
            StateKind::Literal => s.byte == b'\n',
            StateKind::Class => self.bitmap_contains(s.bitmap_offset, b'\n'),
            _ => false,
        })
    }

    /// Whether the accept state is reachable without consuming input,
    /// treating anchors as satisfiable. Conservative: `true` keeps the
    /// pattern on the host, where zero-length advancement is exact.
    pub fn matches_empty(&self) -> bool {
        let mut seen = [false; NFA_MAX_STATES];
        let mut stack = vec![self.start];
        while let Some(s) = stack.pop() {
            if s == EDGE_NONE || seen[s as usize] {
                continue;
            }
            seen[s as usize] = true;
            let node = &self.states[s as usize];
            match node.kind {
                StateKind::Accept => return true,
                StateKind::Split => {
                    stack.push(node.edge0);
                    stack.push(node.edge1);
                }
                StateKind::LineStart | StateKind::LineEnd | StateKind::WordBoundary => {
                    stack.push(node.edge0);
                }
                _ => {}
            }
        }
        false
    }
}

// =============================================================================
// HOST SIMULATION
// =============================================================================

#[inline]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[inline]
fn fold(b: u8) -> u8 {
    if b.is_ascii_uppercase() {
        b + 0x20
    } else {
        b
    }
}

/// Position context for zero-width anchors. Multiline is always on: `^`
/// matches at buffer start or after `\n`, `$` at buffer end or before `\n`.
struct Context<'a> {
    text: &'a [u8],
}

impl Context<'_> {
    #[inline]
    fn at_line_start(&self, pos: usize) -> bool {
        pos == 0 || self.text[pos - 1] == b'\n'
    }

    #[inline]
    fn at_line_end(&self, pos: usize) -> bool {
        pos == self.text.len() || self.text[pos] == b'\n'
    }

    #[inline]
    fn at_word_boundary(&self, pos: usize) -> bool {
        let before = pos > 0 && is_word_byte(self.text[pos - 1]);
        let after = pos < self.text.len() && is_word_byte(self.text[pos]);
        before != after
    }
}

/// A live simulation thread: the state it sits in and where its match began.
#[derive(Debug, Clone, Copy)]
struct Thread {
    state: u16,
    start: u32,
}

/// Per-step dedup set over state indices. Threads are added in increasing
/// start order, so the first occupant of a state is always the leftmost.
struct Seen {
    words: [u64; 4],
}

impl Seen {
    #[inline]
    fn clear(&mut self) {
        self.words = [0; 4];
    }

    #[inline]
    fn insert(&mut self, state: u16) -> bool {
        let word = &mut self.words[(state >> 6) as usize];
        let bit = 1u64 << (state & 63);
        let fresh = *word & bit == 0;
        *word |= bit;
        fresh
    }
}

/// Leftmost-longest candidate found so far.
#[derive(Debug, Clone, Copy)]
struct Best {
    start: u32,
    end: u32,
}

/// Epsilon-close `state` into `list` at position `pos`. Splits and anchors
/// are expanded iteratively; consuming states and the tracked `best` accept
/// come out the other side.
fn add_thread(
    nfa: &Nfa,
    ctx: &Context,
    list: &mut Vec<Thread>,
    seen: &mut Seen,
    state: u16,
    start: u32,
    pos: usize,
    best: &mut Option<Best>,
) {
    let mut stack = vec![(state, start)];

    while let Some((s, st)) = stack.pop() {
        if s == EDGE_NONE || !seen.insert(s) {
            continue;
        }
        let node = &nfa.states[s as usize];
        match node.kind {
            StateKind::Split => {
                // Push edge1 first so edge0 (the preferred branch) closes first.
                stack.push((node.edge1, st));
                stack.push((node.edge0, st));
            }
            StateKind::LineStart => {
                if ctx.at_line_start(pos) {
                    stack.push((node.edge0, st));
                }
            }
            StateKind::LineEnd => {
                if ctx.at_line_end(pos) {
                    stack.push((node.edge0, st));
                }
            }
            StateKind::WordBoundary => {
                if ctx.at_word_boundary(pos) {
                    stack.push((node.edge0, st));
                }
            }
            StateKind::Accept => {
                let end = pos as u32;
                match best {
                    None => *best = Some(Best { start: st, end }),
                    Some(b) if st < b.start => *best = Some(Best { start: st, end }),
                    Some(b) if st == b.start && end > b.end => b.end = end,
                    _ => {}
                }
            }
            StateKind::Literal | StateKind::Any | StateKind::Class => {
                list.push(Thread { state: s, start: st });
            }
        }
    }
}

/// Leftmost-longest match at or after `from`, or `None`.
fn next_match(nfa: &Nfa, text: &[u8], from: usize) -> Option<(usize, usize)> {
    let ctx = Context { text };
    // Post-consumption targets awaiting closure at the current position.
    let mut pending: Vec<Thread> = Vec::new();
    // Closed, consuming states at the current position.
    let mut active: Vec<Thread> = Vec::new();
    let mut seen = Seen { words: [0; 4] };
    let mut best: Option<Best> = None;

    for pos in from..=text.len() {
        seen.clear();
        active.clear();

        // Close the carried threads first: they hold earlier starts and must
        // win the per-state dedup against a fresh seed.
        for i in 0..pending.len() {
            let t = pending[i];
            add_thread(nfa, &ctx, &mut active, &mut seen, t.state, t.start, pos, &mut best);
        }
        pending.clear();

        // Re-seed the start state each step for find semantics, unless the
        // pattern is globally anchored (then only line starts seed) or a
        // leftmost candidate already exists.
        if best.is_none() && (!nfa.anchored_start || ctx.at_line_start(pos)) {
            add_thread(
                nfa,
                &ctx,
                &mut active,
                &mut seen,
                nfa.start,
                pos as u32,
                pos,
                &mut best,
            );
        }

        if active.is_empty() {
            if let Some(b) = best {
                return Some((b.start as usize, b.end as usize));
            }
            if pos == text.len() {
                break;
            }
            continue;
        }

        if pos == text.len() {
            break;
        }

        // Consume the byte.
        let byte = text[pos];
        for t in &active {
            let node = &nfa.states[t.state as usize];
            let matched = match node.kind {
                StateKind::Literal => {
                    if node.fold {
                        fold(byte) == fold(node.byte)
                    } else {
                        byte == node.byte
                    }
                }
                StateKind::Any => byte != b'\n',
                StateKind::Class => nfa.bitmap_contains(node.bitmap_offset, byte),
                _ => false,
            };
            if matched {
                pending.push(Thread {
                    state: node.edge0,
                    start: t.start,
                });
            }
        }

        // Once a candidate exists, threads that started later can never win
        // leftmost and are dropped; when none precede it, the candidate is
        // final.
        if let Some(b) = best {
            pending.retain(|t| t.start <= b.start);
            if pending.is_empty() {
                return Some((b.start as usize, b.end as usize));
            }
        }
    }

    best.map(|b| (b.start as usize, b.end as usize))
}

/// Find all regex matches in `text`, honoring the same traversal policy as
/// the literal matcher: `global` resumes after the match, otherwise the scan
/// skips to the next line start; zero-length matches advance at least one
/// byte. Records carry 0-based line numbers and are strictly increasing.
pub fn find_regex_matches(text: &[u8], nfa: &Nfa, flags: &SubstFlags) -> Vec<MatchRecord> {
    trace!(
        "FIND_REGEX_MATCHES: text_len={} states={} flags={:?}",
        text.len(),
        nfa.states.len(),
        flags
    );

    // An empty buffer has no lines, hence nothing to match against.
    if text.is_empty() {
        return Vec::new();
    }

    let global = flags.global && !flags.first_only;
    let mut matches = Vec::new();
    let mut pos = 0usize;
    let mut line = 0u32;
    let mut counted = 0usize;

    while pos <= text.len() {
        let Some((s, e)) = next_match(nfa, text, pos) else {
            break;
        };
        // A zero-width match past a trailing terminator belongs to no line.
        if s == text.len() && text[text.len() - 1] == b'\n' {
            break;
        }
        line += count_newlines(text, counted, s) as u32;
        counted = s;
        matches.push(MatchRecord::new(s as u32, e as u32, line));

        pos = if global {
            if e > s {
                e
            } else {
                e + 1
            }
        } else {
            // One match per line; a match spanning '\n' still may not
            // overlap its successor.
            next_line_start(text, s).max(e.max(s + 1))
        };
    }

    matches
}

// =============================================================================
// DEVICE ENCODING
// =============================================================================

/// Header bits shared with the device.
pub mod header_flags {
    pub const ANCHORED_START: u32 = 1 << 0;
    pub const ANCHORED_END: u32 = 1 << 1;
    pub const CASE_INSENSITIVE: u32 = 1 << 2;
}

/// State flag bits inside the packed state words.
pub mod state_flags {
    pub const FOLD: u32 = 1 << 0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedHeader {
    pub num_states: u32,
    pub start_state: u32,
    pub flags: u32,
}

/// The flat, device-consumable form of an [`Nfa`]: three packed `u32` words
/// per state plus the concatenated bitmap bank. Deterministic and produced
/// purely on the host.
#[derive(Debug, Clone)]
pub struct EncodedNfa {
    pub header: EncodedHeader,
    pub states: Vec<u32>,
    pub bitmaps: Vec<u32>,
}

/// Flatten `nfa` for the device.
///
/// Word layout per state:
/// - word 0: kind (8b) | flags (8b) | edge0 (16b)
/// - word 1: edge1 (16b) | literal byte (8b) | group index (8b)
/// - word 2: bitmap word offset (32b)
///
/// Absent edges carry the 0xFFFF sentinel.
pub fn encode_for_device(nfa: &Nfa) -> EncodedNfa {
    debug_assert!(nfa.states.len() <= NFA_MAX_STATES);

    let mut words = Vec::with_capacity(nfa.states.len() * 3);
    for state in &nfa.states {
        let mut flags = 0u32;
        if state.fold {
            flags |= state_flags::FOLD;
        }
        words.push((state.kind as u32) | (flags << 8) | ((state.edge0 as u32) << 16));
        words.push((state.edge1 as u32) | ((state.byte as u32) << 16) | ((state.group as u32) << 24));
        words.push(state.bitmap_offset as u32);
    }

    let mut header_bits = 0u32;
    if nfa.anchored_start {
        header_bits |= header_flags::ANCHORED_START;
    }
    if nfa.anchored_end {
        header_bits |= header_flags::ANCHORED_END;
    }
    if nfa.case_insensitive {
        header_bits |= header_flags::CASE_INSENSITIVE;
    }

    debug_assert_eq!(nfa.bitmaps.len() % BITMAP_WORDS, 0);

    EncodedNfa {
        header: EncodedHeader {
            num_states: nfa.states.len() as u32,
            start_state: nfa.start as u32,
            flags: header_bits,
        },
        states: words,
        bitmaps: nfa.bitmaps.clone(),
    }
}
