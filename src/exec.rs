// SPDX-License-Identifier: Apache-2.0

//! Command executor
//!
//! Applies a parsed command pipeline to a byte buffer. Commands compose
//! strictly: the output bytes of command *i* are the input bytes of command
//! *i+1*, and no command observes another's intermediate state.
//!
//! Replacement expansion runs character-by-character with one byte of
//! lookahead, because `&` and `\&` share their first byte.

use std::time::Instant;

use log::trace;

use crate::dispatch::{find_matches, BackendOverride};
use crate::lines::LineIndex;
use crate::types::{
    Address, AddressBound, Command, CommandKind, MatchRecord, Pattern, Result, SubstFlags,
};

/// Pipeline-wide execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Suppress automatic line emission; only `p` writes lines.
    pub quiet: bool,
    /// Backend preference forwarded to the dispatch layer.
    pub backend: BackendOverride,
}

/// Per-command diagnostics for verbose output.
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub backend: &'static str,
    pub matches: usize,
    pub micros: u128,
}

/// Run every command in order over `input`, returning the final bytes and
/// one report per command.
pub fn run_pipeline(
    input: &[u8],
    commands: &[Command],
    opts: &ExecOptions,
) -> Result<(Vec<u8>, Vec<CommandReport>)> {
    trace!(
        "RUN_PIPELINE: input_len={} commands={}",
        input.len(),
        commands.len()
    );

    let mut text = input.to_vec();
    let mut reports = Vec::with_capacity(commands.len());

    for command in commands {
        let started = Instant::now();
        let (next, report) = apply_command(&text, command, opts)?;
        text = next;
        reports.push(CommandReport {
            micros: started.elapsed().as_micros(),
            ..report
        });
    }

    // Suppressed automatic output: only `p` commands contribute bytes, and
    // their selections already flowed through the composition above.
    if opts.quiet
        && !commands
            .iter()
            .any(|c| matches!(c.kind, CommandKind::Print))
    {
        text.clear();
    }

    Ok((text, reports))
}

fn apply_command(
    text: &[u8],
    command: &Command,
    opts: &ExecOptions,
) -> Result<(Vec<u8>, CommandReport)> {
    match &command.kind {
        CommandKind::Substitute {
            pattern,
            replacement,
            flags,
        } => substitute(text, command.address.as_ref(), pattern, replacement, flags, opts),
        CommandKind::Delete => delete(text, command.address.as_ref(), opts),
        CommandKind::Print => print(text, command.address.as_ref(), opts),
        CommandKind::Transliterate { from, to } => {
            transliterate(text, command.address.as_ref(), from, to, opts)
        }
    }
}

// =============================================================================
// ADDRESSING
// =============================================================================

/// Resolve a numeric bound against the buffer's line count; 1-based in,
/// 0-based out.
fn resolve_bound(bound: &AddressBound, line_count: usize) -> usize {
    match bound {
        AddressBound::Line(n) => (*n as usize).saturating_sub(1),
        AddressBound::Last => line_count.saturating_sub(1),
    }
}

/// The set of addressed 0-based lines, as a sorted list.
fn addressed_lines(
    text: &[u8],
    index: &LineIndex,
    address: &Address,
    opts: &ExecOptions,
) -> Result<Vec<usize>> {
    let line_count = index.line_count();
    match address {
        Address::Single(bound) => {
            let line = resolve_bound(bound, line_count);
            Ok(if line < line_count { vec![line] } else { vec![] })
        }
        Address::Range(a, b) => {
            let lo = resolve_bound(a, line_count);
            let hi = resolve_bound(b, line_count).min(line_count.saturating_sub(1));
            Ok(if lo < line_count {
                (lo..=hi).collect()
            } else {
                vec![]
            })
        }
        Address::Pattern(pattern) => pattern_lines(text, pattern, opts),
    }
}

/// Lines on which `pattern` matches anywhere. One match per line suffices,
/// so the non-global policy applies.
fn pattern_lines(text: &[u8], pattern: &Pattern, opts: &ExecOptions) -> Result<Vec<usize>> {
    let flags = SubstFlags::default();
    let (records, _) = find_matches(text, pattern, &flags, opts.backend)?;
    let mut lines: Vec<usize> = records.iter().map(|r| r.line as usize).collect();
    lines.dedup();
    Ok(lines)
}

/// Merge an addressed line list into contiguous byte spans.
fn spans_of_lines(index: &LineIndex, lines: &[usize]) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for &line in lines {
        let (start, end) = index.span(line);
        match spans.last_mut() {
            Some(last) if last.1 == start => last.1 = end,
            _ => spans.push((start, end)),
        }
    }
    spans
}

// =============================================================================
// SUBSTITUTE
// =============================================================================

fn substitute(
    text: &[u8],
    address: Option<&Address>,
    pattern: &Pattern,
    replacement: &[u8],
    flags: &SubstFlags,
    opts: &ExecOptions,
) -> Result<(Vec<u8>, CommandReport)> {
    let spans: Vec<(usize, usize)> = match address {
        None => vec![(0, text.len())],
        Some(address) => {
            let index = LineIndex::build(text);
            let lines = addressed_lines(text, &index, address, opts)?;
            spans_of_lines(&index, &lines)
        }
    };

    let mut out = Vec::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut match_count = 0usize;
    let mut backend_name = "none";

    for &(start, end) in &spans {
        out.extend_from_slice(&text[cursor..start]);
        let span = &text[start..end];
        let (records, backend) = find_matches(span, pattern, flags, opts.backend)?;
        backend_name = backend.name();
        match_count += records.len();
        splice_matches(span, &records, replacement, &mut out);
        cursor = end;
    }
    out.extend_from_slice(&text[cursor..]);

    Ok((
        out,
        CommandReport {
            backend: backend_name,
            matches: match_count,
            micros: 0,
        },
    ))
}

/// Copy `span` into `out`, replacing every match with the expanded
/// replacement.
fn splice_matches(span: &[u8], records: &[MatchRecord], replacement: &[u8], out: &mut Vec<u8>) {
    let mut cursor = 0usize;
    for record in records {
        let (start, end) = (record.start as usize, record.end as usize);
        out.extend_from_slice(&span[cursor..start]);
        expand_replacement(replacement, &span[start..end], out);
        cursor = end;
    }
    out.extend_from_slice(&span[cursor..]);
}

/// The replacement mini-language: `&` is the matched text, `\&` a literal
/// ampersand, `\\` a backslash, `\n`/`\t` control bytes; any other escaped
/// byte keeps both characters.
fn expand_replacement(replacement: &[u8], matched: &[u8], out: &mut Vec<u8>) {
    let mut i = 0usize;
    while i < replacement.len() {
        let b = replacement[i];
        if b == b'&' {
            out.extend_from_slice(matched);
            i += 1;
        } else if b == b'\\' && i + 1 < replacement.len() {
            match replacement[i + 1] {
                b'&' => out.push(b'&'),
                b'\\' => out.push(b'\\'),
                b'n' => out.push(b'\n'),
                b't' => out.push(b'\t'),
                other => {
                    out.push(b'\\');
                    out.push(other);
                }
            }
            i += 2;
        } else {
            out.push(b);
            i += 1;
        }
    }
}

// =============================================================================
// DELETE / PRINT
// =============================================================================

fn delete(
    text: &[u8],
    address: Option<&Address>,
    opts: &ExecOptions,
) -> Result<(Vec<u8>, CommandReport)> {
    let index = LineIndex::build(text);
    let lines = match address {
        // Absent address applies to every line.
        None => (0..index.line_count()).collect(),
        Some(address) => addressed_lines(text, &index, address, opts)?,
    };
    let matches = lines.len();

    let mut doomed = vec![false; index.line_count()];
    for &line in &lines {
        doomed[line] = true;
    }

    let mut out = Vec::with_capacity(text.len());
    for line in 0..index.line_count() {
        if !doomed[line] {
            let (start, end) = index.span(line);
            out.extend_from_slice(&text[start..end]);
        }
    }

    Ok((
        out,
        CommandReport {
            backend: "none",
            matches,
            micros: 0,
        },
    ))
}

fn print(
    text: &[u8],
    address: Option<&Address>,
    opts: &ExecOptions,
) -> Result<(Vec<u8>, CommandReport)> {
    let index = LineIndex::build(text);
    let lines = match address {
        None => (0..index.line_count()).collect(),
        Some(address) => addressed_lines(text, &index, address, opts)?,
    };
    let matches = lines.len();

    let mut selected = vec![false; index.line_count()];
    for &line in &lines {
        selected[line] = true;
    }

    let mut out = Vec::with_capacity(text.len());
    for line in 0..index.line_count() {
        let (start, end) = index.span(line);
        if opts.quiet {
            if selected[line] {
                out.extend_from_slice(&text[start..end]);
            }
        } else {
            // Historical behavior: without suppression the matching line is
            // emitted twice, once by `p` and once by the automatic output.
            out.extend_from_slice(&text[start..end]);
            if selected[line] {
                out.extend_from_slice(&text[start..end]);
            }
        }
    }

    Ok((
        out,
        CommandReport {
            backend: "none",
            matches,
            micros: 0,
        },
    ))
}

// =============================================================================
// TRANSLITERATE
// =============================================================================

fn transliterate(
    text: &[u8],
    address: Option<&Address>,
    from: &[u8],
    to: &[u8],
    opts: &ExecOptions,
) -> Result<(Vec<u8>, CommandReport)> {
    debug_assert_eq!(from.len(), to.len());

    // 256-byte identity table overlaid with the mapping pairs; later pairs
    // win, matching the classic tools.
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = i as u8;
    }
    for (&f, &t) in from.iter().zip(to.iter()) {
        table[f as usize] = t;
    }

    let mut out = text.to_vec();
    let spans: Vec<(usize, usize)> = match address {
        None => vec![(0, text.len())],
        Some(address) => {
            let index = LineIndex::build(text);
            let lines = addressed_lines(text, &index, address, opts)?;
            spans_of_lines(&index, &lines)
        }
    };

    let mut mapped = 0usize;
    for &(start, end) in &spans {
        for b in &mut out[start..end] {
            // Line terminators inside the span keep their identity mapping
            // unless explicitly listed.
            *b = table[*b as usize];
            mapped += 1;
        }
    }

    Ok((
        out,
        CommandReport {
            backend: "none",
            matches: mapped,
            micros: 0,
        },
    ))
}
