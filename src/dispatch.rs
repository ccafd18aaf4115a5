// SPDX-License-Identifier: Apache-2.0

//! # Backend dispatch
//!
//! This module chooses between the host matchers and the CUDA kernels based
//! on target capabilities, input sizes, and pattern shape, and wraps the
//! device path so every recoverable failure (`BackendUnavailable`,
//! `TextTooLarge`, result saturation) degrades into a host-matcher call with
//! no user-visible difference.

use log::{debug, trace};

use crate::constants::{DEVICE_THRESHOLD_TEXT, MAX_GPU_BUFFER};
use crate::literal::find_literal_matches;
use crate::nfa::find_regex_matches;
use crate::regex::compile_pattern;
use crate::types::{MatchRecord, Pattern, PatternKind, Result, SubstFlags};

#[cfg(target_arch = "aarch64")]
use std::arch::is_aarch64_feature_detected;

// =============================================================================
//  HARDWARE DETECTION & SIMD CAPABILITIES
// =============================================================================

/// Hardware capability detection used by the dispatch layer
pub struct HardwareCapabilities {
    pub has_avx512: bool,
    pub has_avx2: bool,
    pub has_neon: bool,
    pub has_cuda: bool,
}

impl HardwareCapabilities {
    #[inline]
    pub fn detect() -> Self {
        HardwareCapabilities {
            has_avx512: Self::detect_avx512(),
            has_avx2: Self::detect_avx2(),
            has_neon: Self::detect_neon(),
            has_cuda: Self::detect_cuda(),
        }
    }

    fn detect_avx512() -> bool {
        #[allow(unused_mut)]
        let mut detected_avx512 = false;

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        #[cfg(feature = "hwsed-nightly")]
        if is_x86_feature_detected!("avx512f") {
            detected_avx512 = true;
        }

        detected_avx512
    }

    fn detect_avx2() -> bool {
        #[allow(unused_mut)]
        let mut detected_avx2 = false;

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        #[cfg(not(feature = "hwsed-nightly"))]
        if is_x86_feature_detected!("avx2") {
            detected_avx2 = true;
        }

        detected_avx2
    }

    fn detect_neon() -> bool {
        #[allow(unused_mut)]
        let mut detected_neon = false;

        #[cfg(target_arch = "aarch64")]
        if is_aarch64_feature_detected!("neon") {
            detected_neon = true;
        }

        detected_neon
    }

    fn detect_cuda() -> bool {
        // One-time probe cached in a static atomic.
        use std::sync::atomic::{AtomicU8, Ordering};
        static CUDA_DETECTED: AtomicU8 = AtomicU8::new(2); // 2 = unknown, 1 = true, 0 = false

        let cached = CUDA_DETECTED.load(Ordering::Relaxed);
        if cached != 2 {
            return cached == 1;
        }

        #[cfg(has_cuda)]
        let has_cuda = crate::gpu::ensure_cuda_initialized().is_ok();
        #[cfg(not(has_cuda))]
        let has_cuda = false;

        CUDA_DETECTED.store(if has_cuda { 1 } else { 0 }, Ordering::Relaxed);
        has_cuda
    }
}

/// Get information about available SIMD capabilities
#[inline]
pub fn get_hw_capabilities() -> HardwareCapabilities {
    HardwareCapabilities::detect()
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// The four execution paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    HostLiteral,
    HostRegex,
    DeviceLiteral,
    DeviceRegex,
}

impl Backend {
    #[inline]
    pub fn is_device(self) -> bool {
        matches!(self, Backend::DeviceLiteral | Backend::DeviceRegex)
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::HostLiteral => "host-literal",
            Backend::HostRegex => "host-regex",
            Backend::DeviceLiteral => "device-literal",
            Backend::DeviceRegex => "device-regex",
        }
    }
}

/// Caller preference from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendOverride {
    /// Apply the size policy.
    #[default]
    Auto,
    /// Never dispatch to the device.
    ForceHost,
    /// Dispatch to the device whenever it can take the workload.
    ForceDevice,
}

/// Pick a backend. Pure and deterministic: depends only on the arguments.
///
/// Policy: regex patterns go to the regex engine and literals to the literal
/// engine; texts under 64 KiB stay on the host (dispatch overhead dominates),
/// texts over the 64 MiB device budget stay on the host, everything else goes
/// to the device when one is available.
pub fn select_backend(
    text_len: usize,
    _pattern_len: usize,
    kind: PatternKind,
    device_available: bool,
) -> Backend {
    let literal = kind == PatternKind::Literal;

    if !device_available || text_len < DEVICE_THRESHOLD_TEXT || text_len > MAX_GPU_BUFFER {
        return if literal {
            Backend::HostLiteral
        } else {
            Backend::HostRegex
        };
    }

    if literal {
        Backend::DeviceLiteral
    } else {
        Backend::DeviceRegex
    }
}

// =============================================================================
// MATCH DISPATCH
// =============================================================================

/// Find every match of `pattern` in `text` under the command's flags, on the
/// backend the policy picks. Device-side failures and saturation fall back
/// to the host transparently; regex compilation errors propagate.
///
/// Returns the records plus the backend that actually produced them.
pub fn find_matches(
    text: &[u8],
    pattern: &Pattern,
    flags: &SubstFlags,
    overrides: BackendOverride,
) -> Result<(Vec<MatchRecord>, Backend)> {
    trace!(
        "FIND_MATCHES DISPATCH: text_len={} pattern_len={} kind={:?} override={:?}",
        text.len(),
        pattern.bytes.len(),
        pattern.kind,
        overrides
    );

    let device_available = match overrides {
        BackendOverride::ForceHost => false,
        _ => get_hw_capabilities().has_cuda,
    };
    let mut backend = select_backend(
        text.len(),
        pattern.bytes.len(),
        pattern.kind,
        device_available,
    );
    if overrides == BackendOverride::ForceDevice
        && device_available
        && text.len() <= MAX_GPU_BUFFER
    {
        backend = if pattern.kind == PatternKind::Literal {
            Backend::DeviceLiteral
        } else {
            Backend::DeviceRegex
        };
    }

    match backend {
        Backend::HostLiteral => Ok((find_literal_matches(text, &pattern.bytes, flags), backend)),
        Backend::HostRegex => {
            let nfa = compile_pattern(pattern, flags.case_insensitive)?;
            Ok((find_regex_matches(text, &nfa, flags), backend))
        }
        Backend::DeviceLiteral => {
            #[cfg(has_cuda)]
            {
                match crate::device::device_literal_matches(text, &pattern.bytes, flags) {
                    Ok((records, counts)) if !counts.truncated() => {
                        return Ok((records, backend));
                    }
                    Ok((_, counts)) => {
                        debug!(
                            "HWSED DISPATCH: device results truncated ({}/{}), host retry",
                            counts.written, counts.total
                        );
                    }
                    Err(e) if e.is_recoverable() => {
                        debug!("HWSED DISPATCH: device literal unavailable: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok((
                find_literal_matches(text, &pattern.bytes, flags),
                Backend::HostLiteral,
            ))
        }
        Backend::DeviceRegex => {
            let nfa = compile_pattern(pattern, flags.case_insensitive)?;

            // The line-parallel kernel never sees terminators and advances
            // zero-length matches differently; such patterns are host-only.
            if nfa.can_match_newline() || nfa.matches_empty() {
                debug!("HWSED DISPATCH: pattern shape requires host regex");
                return Ok((find_regex_matches(text, &nfa, flags), Backend::HostRegex));
            }

            #[cfg(has_cuda)]
            {
                match crate::device::device_regex_matches(text, &nfa, flags) {
                    Ok((records, counts)) if !counts.truncated() => {
                        return Ok((records, backend));
                    }
                    Ok((_, counts)) => {
                        debug!(
                            "HWSED DISPATCH: device results truncated ({}/{}), host retry",
                            counts.written, counts.total
                        );
                    }
                    Err(e) if e.is_recoverable() => {
                        debug!("HWSED DISPATCH: device regex unavailable: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok((find_regex_matches(text, &nfa, flags), Backend::HostRegex))
        }
    }
}
