// SPDX-License-Identifier: Apache-2.0

//! Compute dispatch
//!
//! Chunked parallel scan over a text buffer with atomic match collection.
//! Two kernels, both in-source PTX JIT-loaded at first use:
//!
//! - `literal_match`: each thread owns a chunk of consecutive candidate start
//!   positions (total threads come out near `text_len / 64`, workgroups of
//!   256) and verifies the pattern byte-wise with optional ASCII folding.
//! - `nfa_match`: one thread per line walks the flattened NFA table over its
//!   line's bytes (workgroups of 64).
//!
//! The only cross-thread synchronisation is the pair of atomic counters:
//! `written` saturates at [`MAX_RESULTS`], `total` keeps the true count.
//! Result ordering is re-established host-side; see [`postprocess_matches`].

use crate::constants::MAX_GPU_BUFFER;
use crate::lines::count_newlines;
use crate::types::{HwsedError, MatchRecord, Result, SubstFlags};

#[cfg(has_cuda)]
use log::debug;

#[cfg(has_cuda)]
use crate::constants::{
    CHUNK_POSITIONS, GPU_MAX_GRID_SIZE, LITERAL_BLOCK_SIZE, MAX_RESULTS, REGEX_BLOCK_SIZE,
};
#[cfg(has_cuda)]
use crate::gpu::{launch_ptx, DeviceBuffer};
#[cfg(has_cuda)]
use crate::lines::LineIndex;
#[cfg(has_cuda)]
use crate::nfa::{encode_for_device, Nfa};
#[cfg(has_cuda)]
use crate::types::DeviceConfig;

/// Counts returned alongside the records: `written` may saturate at
/// [`MAX_RESULTS`]; `total` is exact even past saturation. `total > written`
/// means the result set is truncated and the caller must retry on the host
/// or chunk the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchCounts {
    pub written: usize,
    pub total: usize,
}

impl DispatchCounts {
    #[inline]
    pub fn truncated(&self) -> bool {
        self.total > self.written
    }
}

/// Reject inputs past the device buffer budget before any allocation.
#[inline]
pub(crate) fn ensure_device_budget(len: usize) -> Result<()> {
    if len > MAX_GPU_BUFFER {
        return Err(HwsedError::TextTooLarge {
            len,
            max: MAX_GPU_BUFFER,
        });
    }
    Ok(())
}

// =============================================================================
// HOST POST-PASS
// =============================================================================

/// Re-establish the host matcher's guarantees over raw device records:
/// sort by start, drop overlaps (the device reports every matching position;
/// the host policy keeps the earliest and resumes past its end), assign line
/// numbers with one linear newline scan, and collapse to the first match per
/// line unless the policy is global.
pub(crate) fn postprocess_matches(
    text: &[u8],
    mut records: Vec<MatchRecord>,
    flags: &SubstFlags,
) -> Vec<MatchRecord> {
    records.sort_unstable_by_key(|r| (r.start, r.end));

    let global = flags.global && !flags.first_only;
    let mut out: Vec<MatchRecord> = Vec::with_capacity(records.len());
    let mut line = 0u32;
    let mut counted = 0usize;

    for mut rec in records {
        if let Some(prev) = out.last() {
            if rec.start < prev.end || (rec.start == prev.end && rec.is_empty() && prev.is_empty())
            {
                continue;
            }
        }

        line += count_newlines(text, counted, rec.start as usize) as u32;
        counted = rec.start as usize;
        rec.line = line;

        if !global {
            if let Some(prev) = out.last() {
                if prev.line == rec.line {
                    continue;
                }
            }
        }
        out.push(rec);
    }

    out
}

// =============================================================================
// KERNELS
// =============================================================================

/// Chunked literal scan. Parameters: config record, text, pattern, result
/// slots, and the counter pair. Each thread walks its positions; a full
/// verify bumps `total`, claims a slot index from `written`, and stores
/// `(p, p + pattern_len, 0)` when the slot is within bounds. Line numbers
/// are reconstructed host-side.
pub const PTX_LITERAL_MATCH: &str = r#"
.version 7.5
.target sm_70
.address_size 64

.entry literal_match (
  .param .u64 config,
  .param .u64 text,
  .param .u64 pattern,
  .param .u64 results,
  .param .u64 counters
) {
  .reg .u32 %r<32>;
  .reg .u64 %rd<20>;
  .reg .pred %p<14>;

  ld.param.u64 %rd1, [config];
  ld.param.u64 %rd2, [text];
  ld.param.u64 %rd3, [pattern];
  ld.param.u64 %rd4, [results];
  ld.param.u64 %rd5, [counters];

  // Config record: text_len, pattern_len, replacement_len, flags,
  // max_matches, num_threads.
  ld.global.u32 %r1, [%rd1];
  ld.global.u32 %r2, [%rd1+4];
  ld.global.u32 %r3, [%rd1+12];
  ld.global.u32 %r4, [%rd1+16];
  ld.global.u32 %r5, [%rd1+20];

  // Global thread id.
  mov.u32 %r6, %ctaid.x;
  mov.u32 %r7, %ntid.x;
  mov.u32 %r8, %tid.x;
  mad.lo.u32 %r9, %r6, %r7, %r8;
  setp.ge.u32 %p1, %r9, %r5;
  @%p1 bra L_DONE;

  // This thread's candidate range inside [0, text_len - pattern_len].
  sub.u32 %r10, %r1, %r2;
  add.u32 %r10, %r10, 1;
  mul.lo.u32 %r11, %r9, 64;
  add.u32 %r12, %r11, 64;
  min.u32 %r12, %r12, %r10;

L_POS:
  setp.ge.u32 %p2, %r11, %r12;
  @%p2 bra L_DONE;

  // Line mode: only positions at a line start are candidates.
  and.b32 %r13, %r3, 8;
  setp.eq.u32 %p3, %r13, 0;
  @%p3 bra L_COMPARE;
  setp.eq.u32 %p4, %r11, 0;
  @%p4 bra L_COMPARE;
  sub.u32 %r14, %r11, 1;
  cvt.u64.u32 %rd6, %r14;
  add.u64 %rd7, %rd2, %rd6;
  ld.global.u8 %r15, [%rd7];
  setp.ne.u32 %p5, %r15, 10;
  @%p5 bra L_NEXT;

L_COMPARE:
  mov.u32 %r16, 0;
L_CMP:
  setp.ge.u32 %p6, %r16, %r2;
  @%p6 bra L_RECORD;
  add.u32 %r17, %r11, %r16;
  cvt.u64.u32 %rd8, %r17;
  add.u64 %rd9, %rd2, %rd8;
  ld.global.u8 %r18, [%rd9];
  cvt.u64.u32 %rd10, %r16;
  add.u64 %rd11, %rd3, %rd10;
  ld.global.u8 %r19, [%rd11];

  // ASCII fold when bit0 is set; bytes outside A-Z are untouched.
  and.b32 %r20, %r3, 1;
  setp.eq.u32 %p7, %r20, 0;
  @%p7 bra L_TEST;
  setp.ge.u32 %p8, %r18, 65;
  setp.le.u32 %p9, %r18, 90;
  and.pred %p10, %p8, %p9;
  @%p10 add.u32 %r18, %r18, 32;
  setp.ge.u32 %p8, %r19, 65;
  setp.le.u32 %p9, %r19, 90;
  and.pred %p10, %p8, %p9;
  @%p10 add.u32 %r19, %r19, 32;

L_TEST:
  setp.ne.u32 %p11, %r18, %r19;
  @%p11 bra L_NEXT;
  add.u32 %r16, %r16, 1;
  bra L_CMP;

L_RECORD:
  // total is exact; written hands out slot indices and may run past
  // max_matches, in which case the record is dropped.
  atom.global.add.u32 %r21, [%rd5+4], 1;
  atom.global.add.u32 %r22, [%rd5], 1;
  setp.ge.u32 %p12, %r22, %r4;
  @%p12 bra L_NEXT;
  cvt.u64.u32 %rd12, %r22;
  mul.lo.u64 %rd13, %rd12, 16;
  add.u64 %rd14, %rd4, %rd13;
  st.global.u32 [%rd14], %r11;
  add.u32 %r23, %r11, %r2;
  st.global.u32 [%rd14+4], %r23;
  mov.u32 %r24, 0;
  st.global.u32 [%rd14+8], %r24;
  st.global.u32 [%rd14+12], %r24;

L_NEXT:
  add.u32 %r11, %r11, 1;
  bra L_POS;

L_DONE:
  ret;
}
"#;

/// Line-parallel NFA walk. One thread simulates its whole line: for each
/// search start it epsilon-closes the 256-bit state set held in local
/// memory, consumes bytes, and keeps the longest accepting end; the leftmost
/// accepting start wins. Matches are stored with absolute offsets and the
/// owning 0-based line number.
///
/// State words are the [`crate::nfa::encode_for_device`] layout; kind codes
/// 0..=7 are literal, any, class, split, accept, line-start, line-end, word
/// boundary.
pub const PTX_NFA_MATCH: &str = r#"
.version 7.5
.target sm_70
.address_size 64

.entry nfa_match (
  .param .u64 config,
  .param .u64 text,
  .param .u64 header,
  .param .u64 states,
  .param .u64 bitmaps,
  .param .u64 line_offsets,
  .param .u64 line_lengths,
  .param .u64 results,
  .param .u64 counters
) {
  .local .align 4 .b8 curset[32];
  .local .align 4 .b8 nextset[32];
  .reg .u32 %r<64>;
  .reg .u64 %rd<32>;
  .reg .pred %p<20>;

  ld.param.u64 %rd1, [config];
  ld.param.u64 %rd2, [text];
  ld.param.u64 %rd3, [header];
  ld.param.u64 %rd4, [states];
  ld.param.u64 %rd5, [bitmaps];
  ld.param.u64 %rd6, [line_offsets];
  ld.param.u64 %rd7, [line_lengths];
  ld.param.u64 %rd8, [results];
  ld.param.u64 %rd9, [counters];

  ld.global.u32 %r1, [%rd1+12];    // flags (bit1 global, bit2 first-only)
  ld.global.u32 %r2, [%rd1+16];    // max_matches
  ld.global.u32 %r3, [%rd1+20];    // num_threads == line count
  ld.global.u32 %r4, [%rd3];       // num_states
  ld.global.u32 %r5, [%rd3+4];     // start_state
  ld.global.u32 %r6, [%rd3+8];     // header flags (bit0 anchored-start)

  mov.u32 %r7, %ctaid.x;
  mov.u32 %r8, %ntid.x;
  mov.u32 %r9, %tid.x;
  mad.lo.u32 %r10, %r7, %r8, %r9;  // line index
  setp.ge.u32 %p1, %r10, %r3;
  @%p1 bra N_DONE;

  cvt.u64.u32 %rd10, %r10;
  mul.lo.u64 %rd11, %rd10, 4;
  add.u64 %rd12, %rd6, %rd11;
  ld.global.u32 %r11, [%rd12];     // line start offset
  add.u64 %rd13, %rd7, %rd11;
  ld.global.u32 %r12, [%rd13];     // line length (without terminator)

  mov.u32 %r13, 0;                 // s: search start within the line

N_SEARCH:
  setp.gt.u32 %p2, %r13, %r12;
  @%p2 bra N_DONE;
  and.b32 %r14, %r6, 1;
  setp.ne.u32 %p3, %r14, 0;
  setp.ne.u32 %p4, %r13, 0;
  and.pred %p5, %p3, %p4;
  @%p5 bra N_DONE;

  // Seed: clear the set, insert the start state, then close at pos = s.
  mov.u32 %r15, 0;
N_CLR:
  setp.ge.u32 %p6, %r15, 8;
  @%p6 bra N_SEED;
  mul.lo.u32 %r16, %r15, 4;
  cvt.u64.u32 %rd14, %r16;
  mov.u64 %rd15, curset;
  add.u64 %rd16, %rd15, %rd14;
  mov.u32 %r17, 0;
  st.local.u32 [%rd16], %r17;
  add.u32 %r15, %r15, 1;
  bra N_CLR;

N_SEED:
  shr.u32 %r16, %r5, 5;
  mul.lo.u32 %r16, %r16, 4;
  cvt.u64.u32 %rd14, %r16;
  mov.u64 %rd15, curset;
  add.u64 %rd16, %rd15, %rd14;
  ld.local.u32 %r17, [%rd16];
  and.b32 %r18, %r5, 31;
  mov.u32 %r19, 1;
  shl.b32 %r19, %r19, %r18;
  or.b32 %r17, %r17, %r19;
  st.local.u32 [%rd16], %r17;

  mov.u32 %r20, %r13;              // pos
  mov.u32 %r21, 0xFFFFFFFF;        // best end (sentinel)

N_STEP:
  // Epsilon closure at pos: expand splits and satisfied anchors until the
  // set stops changing; record accepts against the current pos.
  mov.u32 %r22, 0;                 // pass counter
N_CLOSE:
  setp.gt.u32 %p7, %r22, %r4;
  @%p7 bra N_CONSUME;
  mov.u32 %r23, 0;                 // changed
  mov.u32 %r24, 0;                 // state i
N_CLOSE_ST:
  setp.ge.u32 %p8, %r24, %r4;
  @%p8 bra N_CLOSE_END;

  // Skip when state i is absent from curset.
  shr.u32 %r25, %r24, 5;
  mul.lo.u32 %r25, %r25, 4;
  cvt.u64.u32 %rd14, %r25;
  mov.u64 %rd15, curset;
  add.u64 %rd16, %rd15, %rd14;
  ld.local.u32 %r26, [%rd16];
  and.b32 %r27, %r24, 31;
  mov.u32 %r28, 1;
  shl.b32 %r28, %r28, %r27;
  and.b32 %r29, %r26, %r28;
  setp.eq.u32 %p9, %r29, 0;
  @%p9 bra N_CLOSE_NEXT;

  // word0: kind | flags<<8 | edge0<<16
  cvt.u64.u32 %rd17, %r24;
  mul.lo.u64 %rd18, %rd17, 12;
  add.u64 %rd19, %rd4, %rd18;
  ld.global.u32 %r30, [%rd19];
  and.b32 %r31, %r30, 255;         // kind
  shr.u32 %r32, %r30, 16;          // edge0

  setp.eq.u32 %p10, %r31, 3;       // split
  @%p10 bra N_EXP_SPLIT;
  setp.eq.u32 %p10, %r31, 4;       // accept
  @%p10 bra N_EXP_ACCEPT;
  setp.eq.u32 %p10, %r31, 5;       // line start
  @%p10 bra N_EXP_LSTART;
  setp.eq.u32 %p10, %r31, 6;       // line end
  @%p10 bra N_EXP_LEND;
  setp.eq.u32 %p10, %r31, 7;       // word boundary
  @%p10 bra N_EXP_WB;
  bra N_CLOSE_NEXT;

N_EXP_SPLIT:
  // insert edge0 and edge1 (word1 low half), unless 0xFFFF
  ld.global.u32 %r33, [%rd19+4];
  and.b32 %r34, %r33, 0xFFFF;      // edge1
  mov.u32 %r35, %r32;
  bra N_INS2;

N_EXP_LSTART:
  setp.ne.u32 %p11, %r20, 0;
  @%p11 bra N_CLOSE_NEXT;
  mov.u32 %r35, %r32;
  mov.u32 %r34, 0xFFFF;
  bra N_INS2;

N_EXP_LEND:
  setp.ne.u32 %p11, %r20, %r12;
  @%p11 bra N_CLOSE_NEXT;
  mov.u32 %r35, %r32;
  mov.u32 %r34, 0xFFFF;
  bra N_INS2;

N_EXP_WB:
  // before: pos > 0 and word(text[line+pos-1]); after: pos < len and word(text[line+pos])
  mov.u32 %r36, 0;
  setp.eq.u32 %p11, %r20, 0;
  @%p11 bra N_WB_AFTER;
  add.u32 %r37, %r11, %r20;
  sub.u32 %r37, %r37, 1;
  cvt.u64.u32 %rd20, %r37;
  add.u64 %rd21, %rd2, %rd20;
  ld.global.u8 %r38, [%rd21];
  // word byte: [0-9A-Za-z_]
  setp.ge.u32 %p12, %r38, 48;
  setp.le.u32 %p13, %r38, 57;
  and.pred %p14, %p12, %p13;
  setp.ge.u32 %p12, %r38, 65;
  setp.le.u32 %p13, %r38, 90;
  and.pred %p15, %p12, %p13;
  setp.ge.u32 %p12, %r38, 97;
  setp.le.u32 %p13, %r38, 122;
  and.pred %p16, %p12, %p13;
  setp.eq.u32 %p17, %r38, 95;
  or.pred %p14, %p14, %p15;
  or.pred %p14, %p14, %p16;
  or.pred %p14, %p14, %p17;
  @%p14 mov.u32 %r36, 1;
N_WB_AFTER:
  mov.u32 %r39, 0;
  setp.ge.u32 %p11, %r20, %r12;
  @%p11 bra N_WB_TEST;
  add.u32 %r37, %r11, %r20;
  cvt.u64.u32 %rd20, %r37;
  add.u64 %rd21, %rd2, %rd20;
  ld.global.u8 %r38, [%rd21];
  setp.ge.u32 %p12, %r38, 48;
  setp.le.u32 %p13, %r38, 57;
  and.pred %p14, %p12, %p13;
  setp.ge.u32 %p12, %r38, 65;
  setp.le.u32 %p13, %r38, 90;
  and.pred %p15, %p12, %p13;
  setp.ge.u32 %p12, %r38, 97;
  setp.le.u32 %p13, %r38, 122;
  and.pred %p16, %p12, %p13;
  setp.eq.u32 %p17, %r38, 95;
  or.pred %p14, %p14, %p15;
  or.pred %p14, %p14, %p16;
  or.pred %p14, %p14, %p17;
  @%p14 mov.u32 %r39, 1;
N_WB_TEST:
  setp.eq.u32 %p11, %r36, %r39;
  @%p11 bra N_CLOSE_NEXT;
  mov.u32 %r35, %r32;
  mov.u32 %r34, 0xFFFF;
  bra N_INS2;

N_EXP_ACCEPT:
  setp.eq.u32 %p11, %r21, 0xFFFFFFFF;
  @%p11 mov.u32 %r21, %r20;
  max.u32 %r21, %r21, %r20;
  bra N_CLOSE_NEXT;

N_INS2:
  // insert %r35 then %r34 into curset when not the sentinel
  setp.eq.u32 %p11, %r35, 0xFFFF;
  @%p11 bra N_INS_B;
  shr.u32 %r41, %r35, 5;
  mul.lo.u32 %r41, %r41, 4;
  cvt.u64.u32 %rd22, %r41;
  mov.u64 %rd23, curset;
  add.u64 %rd24, %rd23, %rd22;
  ld.local.u32 %r42, [%rd24];
  and.b32 %r43, %r35, 31;
  mov.u32 %r44, 1;
  shl.b32 %r44, %r44, %r43;
  and.b32 %r45, %r42, %r44;
  setp.ne.u32 %p11, %r45, 0;
  @%p11 bra N_INS_B;
  or.b32 %r42, %r42, %r44;
  st.local.u32 [%rd24], %r42;
  mov.u32 %r23, 1;
N_INS_B:
  setp.eq.u32 %p11, %r34, 0xFFFF;
  @%p11 bra N_CLOSE_NEXT;
  shr.u32 %r41, %r34, 5;
  mul.lo.u32 %r41, %r41, 4;
  cvt.u64.u32 %rd22, %r41;
  mov.u64 %rd23, curset;
  add.u64 %rd24, %rd23, %rd22;
  ld.local.u32 %r42, [%rd24];
  and.b32 %r43, %r34, 31;
  mov.u32 %r44, 1;
  shl.b32 %r44, %r44, %r43;
  and.b32 %r45, %r42, %r44;
  setp.ne.u32 %p11, %r45, 0;
  @%p11 bra N_CLOSE_NEXT;
  or.b32 %r42, %r42, %r44;
  st.local.u32 [%rd24], %r42;
  mov.u32 %r23, 1;

N_CLOSE_NEXT:
  add.u32 %r24, %r24, 1;
  bra N_CLOSE_ST;

N_CLOSE_END:
  add.u32 %r22, %r22, 1;
  setp.ne.u32 %p8, %r23, 0;
  @%p8 bra N_CLOSE;

N_CONSUME:
  setp.ge.u32 %p8, %r20, %r12;
  @%p8 bra N_EMIT;

  // Byte at line-relative pos.
  add.u32 %r46, %r11, %r20;
  cvt.u64.u32 %rd20, %r46;
  add.u64 %rd21, %rd2, %rd20;
  ld.global.u8 %r47, [%rd21];

  // nextset = consuming states of curset that accept the byte.
  mov.u32 %r15, 0;
N_NCLR:
  setp.ge.u32 %p9, %r15, 8;
  @%p9 bra N_FEED;
  mul.lo.u32 %r16, %r15, 4;
  cvt.u64.u32 %rd14, %r16;
  mov.u64 %rd15, nextset;
  add.u64 %rd16, %rd15, %rd14;
  mov.u32 %r17, 0;
  st.local.u32 [%rd16], %r17;
  add.u32 %r15, %r15, 1;
  bra N_NCLR;

N_FEED:
  mov.u32 %r24, 0;
N_FEED_ST:
  setp.ge.u32 %p9, %r24, %r4;
  @%p9 bra N_ADVANCE;
  shr.u32 %r25, %r24, 5;
  mul.lo.u32 %r25, %r25, 4;
  cvt.u64.u32 %rd14, %r25;
  mov.u64 %rd15, curset;
  add.u64 %rd16, %rd15, %rd14;
  ld.local.u32 %r26, [%rd16];
  and.b32 %r27, %r24, 31;
  mov.u32 %r28, 1;
  shl.b32 %r28, %r28, %r27;
  and.b32 %r29, %r26, %r28;
  setp.eq.u32 %p9, %r29, 0;
  @%p9 bra N_FEED_NEXT;

  cvt.u64.u32 %rd17, %r24;
  mul.lo.u64 %rd18, %rd17, 12;
  add.u64 %rd19, %rd4, %rd18;
  ld.global.u32 %r30, [%rd19];
  and.b32 %r31, %r30, 255;         // kind
  shr.u32 %r32, %r30, 16;          // edge0
  shr.u32 %r48, %r30, 8;
  and.b32 %r48, %r48, 255;         // state flags (bit0 fold)

  mov.u32 %r49, %r47;              // candidate byte copy

  setp.eq.u32 %p10, %r31, 0;       // literal
  @%p10 bra N_F_LIT;
  setp.eq.u32 %p10, %r31, 1;       // any
  @%p10 bra N_F_ANY;
  setp.eq.u32 %p10, %r31, 2;       // class
  @%p10 bra N_F_CLS;
  bra N_FEED_NEXT;

N_F_LIT:
  ld.global.u32 %r33, [%rd19+4];
  shr.u32 %r50, %r33, 16;
  and.b32 %r50, %r50, 255;         // literal byte
  and.b32 %r51, %r48, 1;
  setp.eq.u32 %p11, %r51, 0;
  @%p11 bra N_F_LIT_TEST;
  setp.ge.u32 %p12, %r49, 65;
  setp.le.u32 %p13, %r49, 90;
  and.pred %p14, %p12, %p13;
  @%p14 add.u32 %r49, %r49, 32;
  setp.ge.u32 %p12, %r50, 65;
  setp.le.u32 %p13, %r50, 90;
  and.pred %p14, %p12, %p13;
  @%p14 add.u32 %r50, %r50, 32;
N_F_LIT_TEST:
  setp.ne.u32 %p11, %r49, %r50;
  @%p11 bra N_FEED_NEXT;
  bra N_F_PUSH;

N_F_ANY:
  setp.eq.u32 %p11, %r49, 10;
  @%p11 bra N_FEED_NEXT;
  bra N_F_PUSH;

N_F_CLS:
  ld.global.u32 %r52, [%rd19+8];   // bitmap word offset
  shr.u32 %r53, %r49, 5;
  add.u32 %r53, %r53, %r52;
  cvt.u64.u32 %rd25, %r53;
  mul.lo.u64 %rd26, %rd25, 4;
  add.u64 %rd27, %rd5, %rd26;
  ld.global.u32 %r54, [%rd27];
  and.b32 %r55, %r49, 31;
  mov.u32 %r56, 1;
  shl.b32 %r56, %r56, %r55;
  and.b32 %r57, %r54, %r56;
  setp.eq.u32 %p11, %r57, 0;
  @%p11 bra N_FEED_NEXT;

N_F_PUSH:
  shr.u32 %r41, %r32, 5;
  mul.lo.u32 %r41, %r41, 4;
  cvt.u64.u32 %rd22, %r41;
  mov.u64 %rd23, nextset;
  add.u64 %rd24, %rd23, %rd22;
  ld.local.u32 %r42, [%rd24];
  and.b32 %r43, %r32, 31;
  mov.u32 %r44, 1;
  shl.b32 %r44, %r44, %r43;
  or.b32 %r42, %r42, %r44;
  st.local.u32 [%rd24], %r42;

N_FEED_NEXT:
  add.u32 %r24, %r24, 1;
  bra N_FEED_ST;

N_ADVANCE:
  // curset <- nextset; stop early when the set is empty.
  mov.u32 %r15, 0;
  mov.u32 %r58, 0;                 // union of words
N_SWAP:
  setp.ge.u32 %p9, %r15, 8;
  @%p9 bra N_SWAP_END;
  mul.lo.u32 %r16, %r15, 4;
  cvt.u64.u32 %rd14, %r16;
  mov.u64 %rd15, nextset;
  add.u64 %rd16, %rd15, %rd14;
  ld.local.u32 %r17, [%rd16];
  or.b32 %r58, %r58, %r17;
  mov.u64 %rd15, curset;
  add.u64 %rd16, %rd15, %rd14;
  st.local.u32 [%rd16], %r17;
  add.u32 %r15, %r15, 1;
  bra N_SWAP;
N_SWAP_END:
  add.u32 %r20, %r20, 1;
  setp.ne.u32 %p9, %r58, 0;
  @%p9 bra N_STEP;

N_EMIT:
  setp.eq.u32 %p9, %r21, 0xFFFFFFFF;
  @%p9 bra N_MISS;

  atom.global.add.u32 %r59, [%rd9+4], 1;
  atom.global.add.u32 %r60, [%rd9], 1;
  setp.ge.u32 %p10, %r60, %r2;
  @%p10 bra N_POLICY;
  cvt.u64.u32 %rd28, %r60;
  mul.lo.u64 %rd29, %rd28, 16;
  add.u64 %rd30, %rd8, %rd29;
  add.u32 %r61, %r11, %r13;
  st.global.u32 [%rd30], %r61;
  add.u32 %r62, %r11, %r21;
  st.global.u32 [%rd30+4], %r62;
  st.global.u32 [%rd30+8], %r10;
  mov.u32 %r63, 0;
  st.global.u32 [%rd30+12], %r63;

N_POLICY:
  // Non-global (or first-only): one match per line.
  and.b32 %r14, %r1, 2;
  setp.eq.u32 %p10, %r14, 0;
  @%p10 bra N_DONE;
  and.b32 %r14, %r1, 4;
  setp.ne.u32 %p10, %r14, 0;
  @%p10 bra N_DONE;
  // Global: resume after the match, at least one byte forward.
  setp.gt.u32 %p10, %r21, %r13;
  @%p10 mov.u32 %r13, %r21;
  @!%p10 add.u32 %r13, %r13, 1;
  bra N_SEARCH;

N_MISS:
  add.u32 %r13, %r13, 1;
  bra N_SEARCH;

N_DONE:
  ret;
}
"#;

// =============================================================================
// DISPATCH ENTRY POINTS
// =============================================================================

/// Run the chunked literal kernel over `text`. Returns the post-processed
/// records plus the raw counters; callers decide what saturation means.
#[cfg(has_cuda)]
pub fn device_literal_matches(
    text: &[u8],
    pattern: &[u8],
    flags: &SubstFlags,
) -> Result<(Vec<MatchRecord>, DispatchCounts)> {
    ensure_device_budget(text.len())?;
    if pattern.is_empty() || pattern.len() > text.len() {
        return Ok((
            Vec::new(),
            DispatchCounts {
                written: 0,
                total: 0,
            },
        ));
    }

    let limit = text.len() - pattern.len() + 1;
    let num_threads = limit.div_ceil(CHUNK_POSITIONS);
    let blocks = num_threads
        .div_ceil(LITERAL_BLOCK_SIZE)
        .min(GPU_MAX_GRID_SIZE) as u32;

    let config = DeviceConfig::for_literal(
        text.len(),
        pattern.len(),
        flags,
        MAX_RESULTS,
        num_threads,
    );

    // Text is padded to a word boundary for coalesced loads.
    let mut padded = text.to_vec();
    while padded.len() % 4 != 0 {
        padded.push(0);
    }

    let d_config = DeviceBuffer::from_slice(std::slice::from_ref(&config))?;
    let d_text = DeviceBuffer::from_slice(&padded)?;
    let d_pattern = DeviceBuffer::from_slice(pattern)?;
    let d_results: DeviceBuffer<MatchRecord> = DeviceBuffer::alloc(MAX_RESULTS)?;
    let d_counters: DeviceBuffer<u32> = DeviceBuffer::zeroed(2)?;

    let params = [
        d_config.device_ptr(),
        d_text.device_ptr(),
        d_pattern.device_ptr(),
        d_results.device_ptr(),
        d_counters.device_ptr(),
    ];
    let args: Vec<*const u8> = params
        .iter()
        .map(|p| p as *const _ as *const u8)
        .collect();

    launch_ptx(
        PTX_LITERAL_MATCH,
        "literal_match",
        blocks,
        LITERAL_BLOCK_SIZE as u32,
        &args,
    )?;

    let counters = d_counters.read(2)?;
    let written = (counters[0] as usize).min(MAX_RESULTS);
    let total = counters[1] as usize;
    debug!(
        "HWSED GPU: literal_match written={} total={}",
        written, total
    );

    let raw = d_results.read(written)?;
    let records = postprocess_matches(text, raw, flags);
    Ok((
        records,
        DispatchCounts {
            written,
            total,
        },
    ))
}

/// Run the line-parallel NFA kernel over `text` with a compiled pattern.
#[cfg(has_cuda)]
pub fn device_regex_matches(
    text: &[u8],
    nfa: &Nfa,
    flags: &SubstFlags,
) -> Result<(Vec<MatchRecord>, DispatchCounts)> {
    ensure_device_budget(text.len())?;
    if text.is_empty() {
        return Ok((
            Vec::new(),
            DispatchCounts {
                written: 0,
                total: 0,
            },
        ));
    }

    let encoded = encode_for_device(nfa);
    let index = LineIndex::build(text);
    let (mut offsets, mut lengths) = index.as_device_arrays();
    // The kernel sees line content only; the terminator stays host-side.
    for (off, len) in offsets.iter_mut().zip(lengths.iter_mut()) {
        let end = (*off + *len) as usize;
        if *len > 0 && text[end - 1] == b'\n' {
            *len -= 1;
        }
    }

    let line_count = offsets.len();
    let blocks = line_count
        .div_ceil(REGEX_BLOCK_SIZE)
        .min(GPU_MAX_GRID_SIZE) as u32;

    let config = DeviceConfig::for_literal(text.len(), 0, flags, MAX_RESULTS, line_count);
    let header = [
        encoded.header.num_states,
        encoded.header.start_state,
        encoded.header.flags,
    ];

    let mut padded = text.to_vec();
    while padded.len() % 4 != 0 {
        padded.push(0);
    }

    let d_config = DeviceBuffer::from_slice(std::slice::from_ref(&config))?;
    let d_text = DeviceBuffer::from_slice(&padded)?;
    let d_header = DeviceBuffer::from_slice(&header)?;
    let d_states = DeviceBuffer::from_slice(&encoded.states)?;
    let bitmaps: &[u32] = if encoded.bitmaps.is_empty() {
        &[0]
    } else {
        &encoded.bitmaps
    };
    let d_bitmaps = DeviceBuffer::from_slice(bitmaps)?;
    let d_offsets = DeviceBuffer::from_slice(&offsets)?;
    let d_lengths = DeviceBuffer::from_slice(&lengths)?;
    let d_results: DeviceBuffer<MatchRecord> = DeviceBuffer::alloc(MAX_RESULTS)?;
    let d_counters: DeviceBuffer<u32> = DeviceBuffer::zeroed(2)?;

    let params = [
        d_config.device_ptr(),
        d_text.device_ptr(),
        d_header.device_ptr(),
        d_states.device_ptr(),
        d_bitmaps.device_ptr(),
        d_offsets.device_ptr(),
        d_lengths.device_ptr(),
        d_results.device_ptr(),
        d_counters.device_ptr(),
    ];
    let args: Vec<*const u8> = params
        .iter()
        .map(|p| p as *const _ as *const u8)
        .collect();

    launch_ptx(
        PTX_NFA_MATCH,
        "nfa_match",
        blocks,
        REGEX_BLOCK_SIZE as u32,
        &args,
    )?;

    let counters = d_counters.read(2)?;
    let written = (counters[0] as usize).min(MAX_RESULTS);
    let total = counters[1] as usize;
    debug!("HWSED GPU: nfa_match written={} total={}", written, total);

    let raw = d_results.read(written)?;
    let records = postprocess_matches(text, raw, flags);
    Ok((
        records,
        DispatchCounts {
            written,
            total,
        },
    ))
}
