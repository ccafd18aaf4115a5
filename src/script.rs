// SPDX-License-Identifier: Apache-2.0

//! Script expression parser
//!
//! Turns editing expressions (`s/…/…/g`, `y/…/…/`, `/…/d`, `2,4d`, …) into
//! typed [`Command`] values. A script is one or more expressions separated by
//! `;`, newlines, or blanks; each expression is parsed independently and the
//! results concatenate into a pipeline.
//!
//! Escape handling follows the classic rules: inside a pattern, `\n` `\t`
//! `\\` `\&` and an escaped delimiter resolve at parse time, every other
//! `\X` is preserved verbatim for the regex compiler. Replacements are kept
//! raw; their mini-language (`&`, `\&`, …) is interpreted at substitution
//! time with one byte of lookahead.

use log::trace;

use crate::types::{
    Address, AddressBound, Command, CommandKind, HwsedError, Pattern, PatternKind, Result,
    SubstFlags,
};

/// Regex dialect applied to every pattern in the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Basic,
    Extended,
}

impl Dialect {
    #[inline]
    fn pattern_kind(self) -> PatternKind {
        match self {
            Dialect::Basic => PatternKind::RegexBasic,
            Dialect::Extended => PatternKind::RegexExtended,
        }
    }
}

/// Parse a whole script into a command pipeline.
pub fn parse_script(script: &str, dialect: Dialect) -> Result<Vec<Command>> {
    trace!(
        "PARSE_SCRIPT: len={} dialect={:?}",
        script.len(),
        dialect
    );
    let mut parser = Parser {
        bytes: script.as_bytes(),
        pos: 0,
        dialect,
    };
    let mut commands = Vec::new();

    loop {
        parser.skip_separators();
        if parser.at_end() {
            break;
        }
        commands.push(parser.expression()?);
        if !parser.at_end() && !parser.at_separator() {
            return Err(parser.malformed("trailing bytes after expression"));
        }
    }

    if commands.is_empty() {
        return Err(HwsedError::MalformedExpression("empty script".into()));
    }
    Ok(commands)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    dialect: Dialect,
}

impl<'a> Parser<'a> {
    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    #[inline]
    fn at_separator(&self) -> bool {
        matches!(
            self.peek(),
            Some(b';') | Some(b'\n') | Some(b' ') | Some(b'\t')
        )
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(b';') | Some(b'\n') | Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn malformed(&self, why: &str) -> HwsedError {
        HwsedError::MalformedExpression(format!(
            "{} at byte {} of {:?}",
            why,
            self.pos,
            String::from_utf8_lossy(self.bytes)
        ))
    }

    /// One expression: optional address prefix, then the command.
    fn expression(&mut self) -> Result<Command> {
        let address = self.address_prefix()?;
        self.skip_blanks();

        match self.peek() {
            Some(b's') => {
                self.pos += 1;
                self.substitute(address)
            }
            Some(b'y') => {
                self.pos += 1;
                self.transliterate(address)
            }
            Some(b'/') => {
                if address.is_some() {
                    return Err(self.malformed("pattern address after numeric address"));
                }
                self.pattern_command()
            }
            Some(b'd') => {
                self.pos += 1;
                if address.is_none() {
                    return Err(HwsedError::EmptyPatternWithNoAddress);
                }
                Ok(Command {
                    address,
                    kind: CommandKind::Delete,
                })
            }
            Some(b'p') => {
                self.pos += 1;
                if address.is_none() {
                    return Err(HwsedError::EmptyPatternWithNoAddress);
                }
                Ok(Command {
                    address,
                    kind: CommandKind::Print,
                })
            }
            _ => Err(self.malformed("expected command character")),
        }
    }

    /// `N`, `$`, `N,M`, `N,$`, `$,$` … or nothing.
    fn address_prefix(&mut self) -> Result<Option<Address>> {
        let first = match self.peek() {
            Some(b'$') => {
                self.pos += 1;
                AddressBound::Last
            }
            Some(b) if b.is_ascii_digit() => AddressBound::Line(self.number()?),
            _ => return Ok(None),
        };

        if self.peek() != Some(b',') {
            return Ok(Some(Address::Single(first)));
        }
        self.pos += 1;

        let second = match self.peek() {
            Some(b'$') => {
                self.pos += 1;
                AddressBound::Last
            }
            Some(b) if b.is_ascii_digit() => AddressBound::Line(self.number()?),
            _ => return Err(self.malformed("expected line number or $ after ,")),
        };

        if let (AddressBound::Line(a), AddressBound::Line(b)) = (first, second) {
            if a > b {
                return Err(self.malformed("address range start exceeds end"));
            }
        }
        Ok(Some(Address::Range(first, second)))
    }

    fn number(&mut self) -> Result<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        let n: u32 = text
            .parse()
            .map_err(|_| self.malformed("line number out of range"))?;
        if n == 0 {
            return Err(self.malformed("line addresses are 1-based"));
        }
        Ok(n)
    }

    /// `s<D>PAT<D>REPL<D>FLAGS` with any non-alphanumeric, non-newline
    /// delimiter byte.
    fn substitute(&mut self, address: Option<Address>) -> Result<Command> {
        let delim = self.delimiter()?;
        let raw_pat = self.delimited(delim)?;
        let raw_repl = self.delimited(delim)?;
        let flags = self.flags();

        if raw_pat.is_empty() {
            return Err(self.malformed("substitute requires a non-empty pattern"));
        }

        let pat_bytes = resolve_pattern_escapes(&raw_pat, delim);
        let (pattern, line_anchor) = classify_pattern(pat_bytes, self.dialect);

        let flags = SubstFlags {
            line_anchor,
            ..flags
        };

        // The replacement keeps its raw escapes except for the delimiter,
        // which has no meaning once the expression is parsed.
        let replacement = resolve_delimiter_escape(&raw_repl, delim);

        Ok(Command {
            address,
            kind: CommandKind::Substitute {
                pattern,
                replacement,
                flags,
            },
        })
    }

    /// `y<D>SRC<D>DST<D>` with |SRC| = |DST| after escape resolution.
    fn transliterate(&mut self, address: Option<Address>) -> Result<Command> {
        let delim = self.delimiter()?;
        let raw_src = self.delimited(delim)?;
        let raw_dst = self.delimited(delim)?;

        let from = resolve_pattern_escapes(&raw_src, delim);
        let to = resolve_pattern_escapes(&raw_dst, delim);

        if from.len() != to.len() {
            return Err(HwsedError::MalformedTransliterate(format!(
                "{} source bytes vs {} destination bytes",
                from.len(),
                to.len()
            )));
        }

        Ok(Command {
            address,
            kind: CommandKind::Transliterate { from, to },
        })
    }

    /// `/PAT/d` or `/PAT/p`.
    fn pattern_command(&mut self) -> Result<Command> {
        debug_assert_eq!(self.peek(), Some(b'/'));
        self.pos += 1;
        let raw_pat = self.delimited(b'/')?;
        if raw_pat.is_empty() {
            return Err(HwsedError::EmptyPatternWithNoAddress);
        }

        let pat_bytes = resolve_pattern_escapes(&raw_pat, b'/');
        let (pattern, _) = classify_pattern(pat_bytes, self.dialect);
        let address = Some(Address::Pattern(pattern));

        match self.bump() {
            Some(b'd') => Ok(Command {
                address,
                kind: CommandKind::Delete,
            }),
            Some(b'p') => Ok(Command {
                address,
                kind: CommandKind::Print,
            }),
            _ => Err(self.malformed("expected d or p after pattern address")),
        }
    }

    /// The byte following `s`/`y` names the delimiter for the expression.
    fn delimiter(&mut self) -> Result<u8> {
        match self.bump() {
            Some(d) if !d.is_ascii_alphanumeric() && d != b'\n' && d != b'\\' => Ok(d),
            Some(_) => Err(self.malformed("delimiter must be non-alphanumeric")),
            None => Err(self.malformed("missing delimiter")),
        }
    }

    /// Consume up to the next unescaped delimiter; the delimiter itself is
    /// consumed but not returned. Escapes stay raw in the returned bytes.
    fn delimited(&mut self, delim: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.malformed("unterminated expression body")),
                Some(b'\n') => return Err(self.malformed("newline inside expression body")),
                Some(b) if b == delim => return Ok(out),
                Some(b'\\') => {
                    out.push(b'\\');
                    match self.bump() {
                        None => return Err(self.malformed("dangling backslash")),
                        Some(e) => out.push(e),
                    }
                }
                Some(b) => out.push(b),
            }
        }
    }

    /// FLAGS over `{g, i, I, 1}`; unknown flag characters up to the next
    /// expression separator are ignored, matching historical behavior.
    /// Substitution applies to every non-overlapping match by default; `1`
    /// restricts it to the first match per line (`g` is accepted for
    /// compatibility).
    fn flags(&mut self) -> SubstFlags {
        let mut flags = SubstFlags {
            global: true,
            ..SubstFlags::default()
        };
        while let Some(b) = self.peek() {
            // Stop at the same separator set the expression loop honors, so
            // a following expression is never swallowed as flag bytes.
            if matches!(b, b';' | b'\n' | b' ' | b'\t') {
                break;
            }
            self.pos += 1;
            match b {
                b'g' => flags.global = true,
                b'i' | b'I' => flags.case_insensitive = true,
                b'1' => flags.first_only = true,
                _ => {}
            }
        }
        flags
    }
}

// =============================================================================
// ESCAPES AND CLASSIFICATION
// =============================================================================

/// Resolve the parse-time escapes inside a pattern: `\n` `\t` `\\` `\&` and
/// the escaped delimiter. Any other `\X` keeps both bytes, which is how
/// basic-regex meta-escapes reach the compiler intact.
fn resolve_pattern_escapes(raw: &[u8], delim: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b == b'\\' && i + 1 < raw.len() {
            let next = raw[i + 1];
            match next {
                b'n' => out.push(b'\n'),
                b't' => out.push(b'\t'),
                b'\\' => out.push(b'\\'),
                b'&' => out.push(b'&'),
                _ if next == delim => out.push(delim),
                _ => {
                    out.push(b'\\');
                    out.push(next);
                }
            }
            i += 2;
        } else {
            out.push(b);
            i += 1;
        }
    }
    out
}

/// In a replacement only the delimiter escape resolves at parse time; the
/// rest of the mini-language (`&`, `\&`, `\\`, `\n`, `\t`) is interpreted
/// during substitution.
fn resolve_delimiter_escape(raw: &[u8], delim: u8) -> Vec<u8> {
    if matches!(delim, b'n' | b't' | b'\\' | b'&') {
        return raw.to_vec();
    }
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() && raw[i + 1] == delim {
            out.push(delim);
            i += 2;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    out
}

/// Decide literal vs regex for a resolved pattern. A pattern with no active
/// metacharacters in its dialect runs on the literal engine; a leading `^`
/// on an otherwise-literal pattern becomes the anchor flag.
fn classify_pattern(bytes: Vec<u8>, dialect: Dialect) -> (Pattern, bool) {
    let (candidate, anchored) = match bytes.split_first() {
        Some((b'^', rest)) => (rest, true),
        _ => (&bytes[..], false),
    };

    // A bare `^` (or an otherwise-empty candidate) is a zero-width pattern
    // and belongs to the regex engine.
    if !candidate.is_empty() && is_literal(candidate, dialect) {
        (
            Pattern::new(candidate.to_vec(), PatternKind::Literal),
            anchored,
        )
    } else {
        (Pattern::new(bytes, dialect.pattern_kind()), false)
    }
}

fn is_literal(bytes: &[u8], dialect: Dialect) -> bool {
    // A backslash always means the regex compiler has work to do.
    bytes.iter().all(|&b| match b {
        b'.' | b'*' | b'^' | b'$' | b'[' | b'\\' => false,
        b'+' | b'?' | b'|' | b'(' | b')' | b'{' | b'}' => dialect == Dialect::Basic,
        _ => true,
    })
}
