// SPDX-License-Identifier: Apache-2.0

// types.rs for hwsed
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwsedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed expression: {0}")]
    MalformedExpression(String),
    #[error("transliterate strings differ in length: {0}")]
    MalformedTransliterate(String),
    #[error("delete/print requires a pattern or an address")]
    EmptyPatternWithNoAddress,
    #[error("unbalanced group in pattern")]
    UnbalancedGroup,
    #[error("unbalanced character class in pattern")]
    UnbalancedClass,
    #[error("invalid range in pattern: {0}")]
    InvalidRange(String),
    #[error("pattern requires {0} NFA states, limit is {max}", max = crate::constants::NFA_MAX_STATES)]
    StateLimitExceeded(usize),
    #[error("compute backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("text of {len} bytes exceeds the device buffer budget of {max} bytes")]
    TextTooLarge { len: usize, max: usize },
    #[error("internal error: {0}")]
    Internal(String),
}

impl HwsedError {
    /// Recoverable errors are converted into a host-matcher call by the
    /// dispatch wrapper; everything else propagates.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HwsedError::BackendUnavailable(_) | HwsedError::TextTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HwsedError>;

/// Which engine a pattern compiles for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    Literal,
    RegexBasic,
    RegexExtended,
}

/// A pattern as raw bytes plus its dialect. The bytes are the post-escape
/// form for literals and the still-escaped form for regex dialects (the
/// regex compiler owns meta-escape interpretation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub bytes: Vec<u8>,
    pub kind: PatternKind,
}

impl Pattern {
    #[inline]
    pub fn new(bytes: Vec<u8>, kind: PatternKind) -> Self {
        Self { bytes, kind }
    }

    #[inline]
    pub fn is_literal(&self) -> bool {
        self.kind == PatternKind::Literal
    }
}

/// Substitution flags parsed from the `s` command's FLAGS field.
///
/// `first_only` collapses with the non-global traversal policy: at most one
/// match per line regardless of `global`. `line_anchor` records a leading
/// `^` that survived literal classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubstFlags {
    pub global: bool,
    pub case_insensitive: bool,
    pub first_only: bool,
    pub line_anchor: bool,
}

/// One end of a numeric address. Line numbers are 1-based here (the external
/// convention); match records are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressBound {
    Line(u32),
    Last,
}

/// Line selector attached to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// A single 1-based line, or `$`.
    Single(AddressBound),
    /// Inclusive range; when both bounds are finite, a <= b holds.
    Range(AddressBound, AddressBound),
    /// Lines on which the pattern matches (`/pat/d`, `/pat/p`).
    Pattern(Pattern),
}

/// Command payload. Delete/print carry no pattern of their own (their
/// pattern, if any, lives in the address); transliterate carries two
/// equal-length byte strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Substitute {
        pattern: Pattern,
        replacement: Vec<u8>,
        flags: SubstFlags,
    },
    Delete,
    Print,
    Transliterate {
        from: Vec<u8>,
        to: Vec<u8>,
    },
}

/// One parsed script expression: an optional address plus the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub address: Option<Address>,
    pub kind: CommandKind,
}

/// A single match. Device-visible: 16 bytes, little-endian u32 fields.
///
/// `line` is 0-based. Matches produced by one command against one buffer are
/// non-overlapping and strictly increasing by `start`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    pub _pad: u32,
}

impl MatchRecord {
    #[inline]
    pub fn new(start: u32, end: u32, line: u32) -> Self {
        Self {
            start,
            end,
            line,
            _pad: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Fixed-width config record shared with the device, padded to 32 bytes.
///
/// Field layout (little-endian): text_len, pattern_len, replacement_len,
/// flags, max_matches, num_threads, 8 bytes padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub text_len: u32,
    pub pattern_len: u32,
    pub replacement_len: u32,
    pub flags: u32,
    pub max_matches: u32,
    pub num_threads: u32,
    pub _pad: [u32; 2],
}

/// Bit positions in [`DeviceConfig::flags`].
pub mod config_flags {
    pub const CASE_INSENSITIVE: u32 = 1 << 0;
    pub const GLOBAL: u32 = 1 << 1;
    pub const FIRST_ONLY: u32 = 1 << 2;
    pub const LINE_MODE: u32 = 1 << 3;
}

impl DeviceConfig {
    pub fn for_literal(
        text_len: usize,
        pattern_len: usize,
        flags: &SubstFlags,
        max_matches: usize,
        num_threads: usize,
    ) -> Self {
        let mut bits = 0u32;
        if flags.case_insensitive {
            bits |= config_flags::CASE_INSENSITIVE;
        }
        if flags.global {
            bits |= config_flags::GLOBAL;
        }
        if flags.first_only {
            bits |= config_flags::FIRST_ONLY;
        }
        if flags.line_anchor {
            bits |= config_flags::LINE_MODE;
        }
        Self {
            text_len: text_len as u32,
            pattern_len: pattern_len as u32,
            replacement_len: 0,
            flags: bits,
            max_matches: max_matches as u32,
            num_threads: num_threads as u32,
            _pad: [0; 2],
        }
    }
}
