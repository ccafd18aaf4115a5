// SPDX-License-Identifier: Apache-2.0

//! Regex compiler
//!
//! Parses the basic and extended dialects and emits a Thompson NFA by
//! structural induction over the parse tree. Character classes are
//! materialised to 256-bit bitmaps at compile time; `{n,m}` repetition is
//! expanded by fragment duplication, which the 256-state cap keeps bounded.
//!
//! Dialect split:
//! - **basic**: `. * ^ $ [ ]` are meta; `\+ \? \| \( \) \{ \}` are the meta
//!   forms of the remaining operators, their bare spellings are literal.
//! - **extended**: `. * + ? | ( ) { } ^ $ [ ]` are meta; the escaped forms
//!   are literal.

use log::trace;

use crate::constants::{BITMAP_WORDS, NFA_MAX_STATES};
use crate::nfa::{Nfa, State, StateKind};
use crate::types::{HwsedError, Pattern, PatternKind, Result};

/// Compile a pattern for the host or device matcher. Literal-kind patterns
/// are accepted and compile as a plain byte chain (the dispatch layer
/// normally routes them to the literal engine instead).
pub fn compile_pattern(pattern: &Pattern, case_insensitive: bool) -> Result<Nfa> {
    trace!(
        "COMPILE_PATTERN: len={} kind={:?} ci={}",
        pattern.bytes.len(),
        pattern.kind,
        case_insensitive
    );
    let extended = pattern.kind == PatternKind::RegexExtended;
    let mut parser = RegexParser {
        bytes: &pattern.bytes,
        pos: 0,
        extended,
    };
    let ast = parser.parse_alternation(0)?;
    if parser.pos < parser.bytes.len() {
        // The only way to stop early is an unmatched group close.
        return Err(HwsedError::UnbalancedGroup);
    }

    let anchored_start = leading_anchor(&ast);
    let anchored_end = trailing_anchor(&ast);

    let mut builder = Builder {
        states: Vec::new(),
        bitmaps: Vec::new(),
        case_insensitive,
        group: 0,
    };
    let frag = builder.build(&ast)?;
    let accept = builder.push(State::new(StateKind::Accept))?;
    builder.patch(&frag.outs, accept);

    Ok(Nfa {
        states: builder.states,
        bitmaps: builder.bitmaps,
        start: frag.start,
        anchored_start,
        anchored_end,
        case_insensitive,
    })
}

// =============================================================================
// PARSE TREE
// =============================================================================

#[derive(Debug, Clone)]
enum Ast {
    Empty,
    Literal(u8),
    Any,
    Class(Box<[u32; BITMAP_WORDS]>),
    LineStart,
    LineEnd,
    WordBoundary,
    Concat(Vec<Ast>),
    Alternate(Vec<Ast>),
    Repeat {
        node: Box<Ast>,
        min: u32,
        max: Option<u32>,
    },
    Group(Box<Ast>),
}

/// Whether every path through the pattern begins with `^`.
fn leading_anchor(ast: &Ast) -> bool {
    match ast {
        Ast::LineStart => true,
        Ast::Concat(items) => items.first().is_some_and(leading_anchor),
        Ast::Alternate(items) => !items.is_empty() && items.iter().all(leading_anchor),
        Ast::Group(inner) => leading_anchor(inner),
        _ => false,
    }
}

/// Whether every path through the pattern ends with `$`.
fn trailing_anchor(ast: &Ast) -> bool {
    match ast {
        Ast::LineEnd => true,
        Ast::Concat(items) => items.last().is_some_and(trailing_anchor),
        Ast::Alternate(items) => !items.is_empty() && items.iter().all(trailing_anchor),
        Ast::Group(inner) => trailing_anchor(inner),
        _ => false,
    }
}

struct RegexParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    extended: bool,
}

impl<'a> RegexParser<'a> {
    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek2(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    /// True when the next bytes spell the dialect's form of `op` (one of
    /// `+ ? | ( ) {`): bare in extended, backslash-escaped in basic.
    fn at_operator(&self, op: u8) -> bool {
        if self.extended {
            self.peek() == Some(op)
        } else {
            self.peek() == Some(b'\\') && self.peek2() == Some(op)
        }
    }

    fn eat_operator(&mut self, op: u8) -> bool {
        if self.at_operator(op) {
            self.pos += if self.extended { 1 } else { 2 };
            true
        } else {
            false
        }
    }

    fn parse_alternation(&mut self, depth: u32) -> Result<Ast> {
        let mut branches = vec![self.parse_concat(depth)?];
        while self.eat_operator(b'|') {
            branches.push(self.parse_concat(depth)?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().unwrap())
        } else {
            Ok(Ast::Alternate(branches))
        }
    }

    fn parse_concat(&mut self, depth: u32) -> Result<Ast> {
        let mut items = Vec::new();
        loop {
            if self.peek().is_none() || self.at_operator(b'|') {
                break;
            }
            if self.at_operator(b')') {
                if depth == 0 {
                    return Err(HwsedError::UnbalancedGroup);
                }
                break;
            }
            items.push(self.parse_repeat(depth)?);
        }
        match items.len() {
            0 => Ok(Ast::Empty),
            1 => Ok(items.pop().unwrap()),
            _ => Ok(Ast::Concat(items)),
        }
    }

    fn parse_repeat(&mut self, depth: u32) -> Result<Ast> {
        let mut node = self.parse_atom(depth)?;
        loop {
            if self.peek() == Some(b'*') {
                self.pos += 1;
                node = Ast::Repeat {
                    node: Box::new(node),
                    min: 0,
                    max: None,
                };
            } else if self.eat_operator(b'+') {
                node = Ast::Repeat {
                    node: Box::new(node),
                    min: 1,
                    max: None,
                };
            } else if self.eat_operator(b'?') {
                node = Ast::Repeat {
                    node: Box::new(node),
                    min: 0,
                    max: Some(1),
                };
            } else if self.at_operator(b'{') && self.brace_is_bound() {
                self.eat_operator(b'{');
                let (min, max) = self.parse_bound()?;
                node = Ast::Repeat {
                    node: Box::new(node),
                    min,
                    max,
                };
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// A `{` only opens a bound when digits follow; otherwise it is literal
    /// (matching historical leniency in both dialects).
    fn brace_is_bound(&self) -> bool {
        let after = self.pos + if self.extended { 1 } else { 2 };
        matches!(self.bytes.get(after), Some(b) if b.is_ascii_digit())
    }

    /// `{n}`, `{n,}`, `{n,m}` — already past the opening brace.
    fn parse_bound(&mut self) -> Result<(u32, Option<u32>)> {
        let min = self.bound_number()?;
        let max = if self.peek() == Some(b',') {
            self.pos += 1;
            if matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                Some(self.bound_number()?)
            } else {
                None
            }
        } else {
            Some(min)
        };

        if !self.eat_operator(b'}') {
            return Err(HwsedError::InvalidRange("unterminated bound".into()));
        }
        if let Some(m) = max {
            if m < min {
                return Err(HwsedError::InvalidRange(format!(
                    "bound {{{},{}}} is inverted",
                    min, m
                )));
            }
        }
        Ok((min, max))
    }

    fn bound_number(&mut self) -> Result<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(HwsedError::InvalidRange("bound requires digits".into()));
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        let n: u32 = text
            .parse()
            .map_err(|_| HwsedError::InvalidRange("bound out of range".into()))?;
        if n as usize > NFA_MAX_STATES {
            return Err(HwsedError::StateLimitExceeded(n as usize));
        }
        Ok(n)
    }

    fn parse_atom(&mut self, depth: u32) -> Result<Ast> {
        if self.eat_operator(b'(') {
            let inner = self.parse_alternation(depth + 1)?;
            if !self.eat_operator(b')') {
                return Err(HwsedError::UnbalancedGroup);
            }
            return Ok(Ast::Group(Box::new(inner)));
        }

        let b = match self.peek() {
            Some(b) => b,
            None => return Ok(Ast::Empty),
        };

        match b {
            b'.' => {
                self.pos += 1;
                Ok(Ast::Any)
            }
            b'^' => {
                self.pos += 1;
                Ok(Ast::LineStart)
            }
            b'$' => {
                self.pos += 1;
                Ok(Ast::LineEnd)
            }
            b'[' => {
                self.pos += 1;
                self.parse_class()
            }
            b'\\' => {
                self.pos += 1;
                let e = self
                    .peek()
                    .ok_or_else(|| HwsedError::InvalidRange("dangling backslash".into()))?;
                self.pos += 1;
                match e {
                    b'd' => Ok(Ast::Class(Box::new(digit_bitmap()))),
                    b'w' => Ok(Ast::Class(Box::new(word_bitmap()))),
                    b's' => Ok(Ast::Class(Box::new(space_bitmap()))),
                    b'b' => Ok(Ast::WordBoundary),
                    _ => Ok(Ast::Literal(e)),
                }
            }
            // Bare repeat operators with nothing to repeat, and the
            // non-meta spellings in the basic dialect, are literal.
            _ => {
                self.pos += 1;
                Ok(Ast::Literal(b))
            }
        }
    }

    /// `[...]` and `[^...]`; the opening `[` is consumed.
    fn parse_class(&mut self) -> Result<Ast> {
        let mut bitmap = [0u32; BITMAP_WORDS];
        let negated = if self.peek() == Some(b'^') {
            self.pos += 1;
            true
        } else {
            false
        };

        let mut first = true;
        loop {
            let b = match self.peek() {
                Some(b) => b,
                None => return Err(HwsedError::UnbalancedClass),
            };
            if b == b']' && !first {
                self.pos += 1;
                break;
            }
            first = false;
            self.pos += 1;

            // Escapes and shorthand inside the class.
            let lo = if b == b'\\' {
                let e = self.peek().ok_or(HwsedError::UnbalancedClass)?;
                self.pos += 1;
                match e {
                    b'd' => {
                        merge_bitmap(&mut bitmap, &digit_bitmap());
                        continue;
                    }
                    b'w' => {
                        merge_bitmap(&mut bitmap, &word_bitmap());
                        continue;
                    }
                    b's' => {
                        merge_bitmap(&mut bitmap, &space_bitmap());
                        continue;
                    }
                    b'b' => 0x08,
                    other => other,
                }
            } else {
                b
            };

            // Range, unless the '-' is trailing.
            if self.peek() == Some(b'-') && self.peek2().is_some() && self.peek2() != Some(b']') {
                self.pos += 1;
                let mut hi = self.peek().ok_or(HwsedError::UnbalancedClass)?;
                self.pos += 1;
                if hi == b'\\' {
                    hi = self.peek().ok_or(HwsedError::UnbalancedClass)?;
                    self.pos += 1;
                }
                if lo > hi {
                    return Err(HwsedError::InvalidRange(format!(
                        "class range {}-{} is inverted",
                        lo as char, hi as char
                    )));
                }
                for v in lo..=hi {
                    set_bit(&mut bitmap, v);
                }
            } else {
                set_bit(&mut bitmap, lo);
            }
        }

        Ok(Ast::Class(Box::new(finish_class(bitmap, negated))))
    }
}

// =============================================================================
// CLASS BITMAPS
// =============================================================================

#[inline]
fn set_bit(bitmap: &mut [u32; BITMAP_WORDS], b: u8) {
    bitmap[(b >> 5) as usize] |= 1u32 << (b & 31);
}

#[inline]
fn get_bit(bitmap: &[u32; BITMAP_WORDS], b: u8) -> bool {
    bitmap[(b >> 5) as usize] & (1u32 << (b & 31)) != 0
}

fn merge_bitmap(into: &mut [u32; BITMAP_WORDS], from: &[u32; BITMAP_WORDS]) {
    for (a, b) in into.iter_mut().zip(from.iter()) {
        *a |= *b;
    }
}

/// Negation happens here, after the positive set is complete; `\n` never
/// joins a negated class so matches stay inside one line unless a literal
/// newline is spelled out.
fn finish_class(mut bitmap: [u32; BITMAP_WORDS], negated: bool) -> [u32; BITMAP_WORDS] {
    if negated {
        for word in bitmap.iter_mut() {
            *word = !*word;
        }
        bitmap[(b'\n' >> 5) as usize] &= !(1u32 << (b'\n' & 31));
    }
    bitmap
}

/// Fold A-Z/a-z pairs into each other. ASCII only; high bytes untouched.
fn fold_class(bitmap: &mut [u32; BITMAP_WORDS]) {
    for b in b'A'..=b'Z' {
        if get_bit(bitmap, b) {
            set_bit(bitmap, b + 0x20);
        }
    }
    for b in b'a'..=b'z' {
        if get_bit(bitmap, b) {
            set_bit(bitmap, b - 0x20);
        }
    }
}

fn digit_bitmap() -> [u32; BITMAP_WORDS] {
    let mut bm = [0u32; BITMAP_WORDS];
    for b in b'0'..=b'9' {
        set_bit(&mut bm, b);
    }
    bm
}

fn word_bitmap() -> [u32; BITMAP_WORDS] {
    let mut bm = digit_bitmap();
    for b in b'A'..=b'Z' {
        set_bit(&mut bm, b);
    }
    for b in b'a'..=b'z' {
        set_bit(&mut bm, b);
    }
    set_bit(&mut bm, b'_');
    bm
}

fn space_bitmap() -> [u32; BITMAP_WORDS] {
    let mut bm = [0u32; BITMAP_WORDS];
    for b in [b' ', b'\t', b'\n', b'\r', 0x0B, 0x0C] {
        set_bit(&mut bm, b);
    }
    bm
}

// =============================================================================
// NFA CONSTRUCTION
// =============================================================================

/// A dangling out-edge to patch: state index plus which of its two slots.
type Out = (u16, u8);

struct Frag {
    start: u16,
    outs: Vec<Out>,
}

struct Builder {
    states: Vec<State>,
    bitmaps: Vec<u32>,
    case_insensitive: bool,
    group: u8,
}

impl Builder {
    fn push(&mut self, mut state: State) -> Result<u16> {
        if self.states.len() >= NFA_MAX_STATES {
            return Err(HwsedError::StateLimitExceeded(self.states.len() + 1));
        }
        state.group = self.group;
        let idx = self.states.len() as u16;
        self.states.push(state);
        Ok(idx)
    }

    fn patch(&mut self, outs: &[Out], target: u16) {
        for &(idx, slot) in outs {
            let state = &mut self.states[idx as usize];
            if slot == 0 {
                state.edge0 = target;
            } else {
                state.edge1 = target;
            }
        }
    }

    fn intern_bitmap(&mut self, bitmap: &[u32; BITMAP_WORDS]) -> u16 {
        let offset = self.bitmaps.len() as u16;
        self.bitmaps.extend_from_slice(bitmap);
        offset
    }

    fn build(&mut self, ast: &Ast) -> Result<Frag> {
        match ast {
            Ast::Empty => {
                // A split with both edges converging acts as an epsilon node.
                let s = self.push(State::new(StateKind::Split))?;
                Ok(Frag {
                    start: s,
                    outs: vec![(s, 0), (s, 1)],
                })
            }
            Ast::Literal(b) => {
                let mut state = State::new(StateKind::Literal);
                state.byte = *b;
                state.fold = self.case_insensitive;
                let s = self.push(state)?;
                Ok(Frag {
                    start: s,
                    outs: vec![(s, 0)],
                })
            }
            Ast::Any => {
                let s = self.push(State::new(StateKind::Any))?;
                Ok(Frag {
                    start: s,
                    outs: vec![(s, 0)],
                })
            }
            Ast::Class(bitmap) => {
                let mut materialised = **bitmap;
                if self.case_insensitive {
                    fold_class(&mut materialised);
                }
                let offset = self.intern_bitmap(&materialised);
                let mut state = State::new(StateKind::Class);
                state.bitmap_offset = offset;
                state.fold = self.case_insensitive;
                let s = self.push(state)?;
                Ok(Frag {
                    start: s,
                    outs: vec![(s, 0)],
                })
            }
            Ast::LineStart => self.anchor(StateKind::LineStart),
            Ast::LineEnd => self.anchor(StateKind::LineEnd),
            Ast::WordBoundary => self.anchor(StateKind::WordBoundary),
            Ast::Concat(items) => {
                let mut iter = items.iter();
                let mut frag = self.build(iter.next().expect("concat is non-empty"))?;
                for item in iter {
                    let next = self.build(item)?;
                    self.patch(&frag.outs, next.start);
                    frag = Frag {
                        start: frag.start,
                        outs: next.outs,
                    };
                }
                Ok(frag)
            }
            Ast::Alternate(branches) => {
                let mut starts = Vec::with_capacity(branches.len());
                let mut outs = Vec::new();
                for branch in branches {
                    let frag = self.build(branch)?;
                    starts.push(frag.start);
                    outs.extend(frag.outs);
                }
                // Chain of splits fanning out to every branch start.
                let mut entry = *starts.last().expect("alternate is non-empty");
                for &start in starts.iter().rev().skip(1) {
                    let mut split = State::new(StateKind::Split);
                    split.edge0 = start;
                    split.edge1 = entry;
                    entry = self.push(split)?;
                }
                Ok(Frag {
                    start: entry,
                    outs,
                })
            }
            Ast::Repeat { node, min, max } => self.build_repeat(node, *min, *max),
            Ast::Group(inner) => {
                let outer = self.group;
                self.group = self.group.saturating_add(1);
                let frag = self.build(inner)?;
                self.group = outer;
                Ok(frag)
            }
        }
    }

    fn anchor(&mut self, kind: StateKind) -> Result<Frag> {
        let s = self.push(State::new(kind))?;
        Ok(Frag {
            start: s,
            outs: vec![(s, 0)],
        })
    }

    fn build_repeat(&mut self, node: &Ast, min: u32, max: Option<u32>) -> Result<Frag> {
        match (min, max) {
            // Star: loop through a split, exit on its second edge.
            (0, None) => {
                let split = self.push(State::new(StateKind::Split))?;
                let frag = self.build(node)?;
                self.states[split as usize].edge0 = frag.start;
                self.patch(&frag.outs, split);
                Ok(Frag {
                    start: split,
                    outs: vec![(split, 1)],
                })
            }
            // Plus: body first, split loops back.
            (1, None) => {
                let frag = self.build(node)?;
                let split = self.push(State::new(StateKind::Split))?;
                self.states[split as usize].edge0 = frag.start;
                self.patch(&frag.outs, split);
                Ok(Frag {
                    start: frag.start,
                    outs: vec![(split, 1)],
                })
            }
            // Question: split straight to the body or past it.
            (0, Some(1)) => {
                let split = self.push(State::new(StateKind::Split))?;
                let frag = self.build(node)?;
                self.states[split as usize].edge0 = frag.start;
                let mut outs = frag.outs;
                outs.push((split, 1));
                Ok(Frag {
                    start: split,
                    outs,
                })
            }
            // {0} collapses to the empty fragment.
            (0, Some(0)) => self.build(&Ast::Empty),
            // General bounds expand to duplicated fragments: `min` required
            // copies, then either a star or `max - min` optional copies.
            (_, _) => {
                let mut frag: Option<Frag> = None;
                for _ in 0..min {
                    let copy = self.build(node)?;
                    frag = Some(match frag {
                        None => copy,
                        Some(prev) => {
                            self.patch(&prev.outs, copy.start);
                            Frag {
                                start: prev.start,
                                outs: copy.outs,
                            }
                        }
                    });
                }

                match max {
                    None => {
                        let tail = self.build_repeat(node, 0, None)?;
                        Ok(match frag {
                            None => tail,
                            Some(prev) => {
                                self.patch(&prev.outs, tail.start);
                                Frag {
                                    start: prev.start,
                                    outs: tail.outs,
                                }
                            }
                        })
                    }
                    Some(m) => {
                        let mut outs = Vec::new();
                        let mut entry: Option<u16> = None;
                        let mut prev_outs: Vec<Out> = Vec::new();
                        for _ in min..m {
                            let split = self.push(State::new(StateKind::Split))?;
                            let copy = self.build(node)?;
                            self.states[split as usize].edge0 = copy.start;
                            outs.push((split, 1));
                            if entry.is_some() {
                                self.patch(&prev_outs, split);
                            } else {
                                entry = Some(split);
                            }
                            prev_outs = copy.outs;
                        }
                        outs.extend(prev_outs);

                        Ok(match (frag, entry) {
                            (Some(prev), Some(e)) => {
                                self.patch(&prev.outs, e);
                                Frag {
                                    start: prev.start,
                                    outs,
                                }
                            }
                            (Some(prev), None) => prev,
                            (None, Some(e)) => Frag { start: e, outs },
                            (None, None) => self.build(&Ast::Empty)?,
                        })
                    }
                }
            }
        }
    }
}
