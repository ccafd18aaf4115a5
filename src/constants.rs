// SPDX-License-Identifier: Apache-2.0

//! Common constants used across implementations
//!
//! This module centralizes lane counts, dispatch thresholds, and device
//! limits used by the scalar/SIMD/CUDA paths.

// =============================================================================
// SIMD Lane Counts by Architecture
// =============================================================================

// AVX-512 Constants (Nightly feature only)
#[cfg(all(
    feature = "hwsed-nightly",
    any(target_arch = "x86", target_arch = "x86_64")
))]
pub use avx512_constants::*;
#[cfg(all(
    feature = "hwsed-nightly",
    any(target_arch = "x86", target_arch = "x86_64")
))]
mod avx512_constants {
    pub const LANES_AVX512_BYTES: usize = 64; // 512/8 = 64 byte elements
}

// x86/x86_64 Stable Constants (AVX2 only)
#[cfg(all(
    any(target_arch = "x86", target_arch = "x86_64"),
    not(feature = "hwsed-nightly")
))]
pub use x86_stable_constants::*;
#[cfg(all(
    any(target_arch = "x86", target_arch = "x86_64"),
    not(feature = "hwsed-nightly")
))]
mod x86_stable_constants {
    pub const LANES_AVX2_BYTES: usize = 32; // 256/8 = 32 byte elements
    pub const LANES_SSE2_BYTES: usize = 16; // 128/8 = 16 byte elements
}

// NEON Constants (ARM64 only)
#[cfg(target_arch = "aarch64")]
pub use neon_constants::*;
#[cfg(target_arch = "aarch64")]
mod neon_constants {
    pub const LANES_NEON_BYTES: usize = 16; // 128/8 = 16 byte elements
}

// =============================================================================
// Matcher Constants
// =============================================================================

/// Width of one candidate-verification vector compare.
pub const VERIFY_WIDTH: usize = 16;

/// Width of one newline-scan chunk.
pub const NEWLINE_SCAN_WIDTH: usize = 32;

/// Hard cap on compiled NFA states. Keeps the per-thread working set of the
/// device simulation fixed and the edge indices within 16 bits.
pub const NFA_MAX_STATES: usize = 256;

/// Words per character-class bitmap (256 bits).
pub const BITMAP_WORDS: usize = 8;

// =============================================================================
// Dispatch Thresholds
// =============================================================================

// When disable-hwsed is enabled, set all thresholds to usize::MAX to force
// the scalar/host implementations.
#[cfg(feature = "disable-hwsed")]
mod thresholds {
    pub const SIMD_THRESHOLD_VERIFY: usize = usize::MAX; // Candidate verification
    pub const SIMD_THRESHOLD_NEWLINE: usize = usize::MAX; // Newline counting
    pub const DEVICE_THRESHOLD_TEXT: usize = usize::MAX; // Device dispatch cutoff
}

#[cfg(not(feature = "disable-hwsed"))]
mod thresholds {
    /// Candidates shorter than this verify scalar; at or above, one vector compare.
    pub const SIMD_THRESHOLD_VERIFY: usize = 4;
    /// Buffers shorter than this count newlines scalar.
    pub const SIMD_THRESHOLD_NEWLINE: usize = 64;
    /// Below this the host always wins: dispatch overhead dominates. 64 KiB.
    pub const DEVICE_THRESHOLD_TEXT: usize = 64 * 1024;
}

pub use thresholds::*;

// =============================================================================
// GPU/CUDA Constants
// =============================================================================

pub use gpu_constants::*;

mod gpu_constants {
    /// Largest text one device dispatch accepts. 64 MiB.
    pub const MAX_GPU_BUFFER: usize = 64 * 1024 * 1024;

    /// Capacity of the device result array. The `written` counter saturates
    /// here; `total` keeps the true count.
    pub const MAX_RESULTS: usize = 1 << 20;

    /// Positions one literal-scan thread owns; total threads come out near
    /// text_len / CHUNK_POSITIONS.
    pub const CHUNK_POSITIONS: usize = 64;

    /// Workgroup size for the literal kernel.
    pub const LITERAL_BLOCK_SIZE: usize = 256;

    /// Workgroup size for the line-parallel regex kernel.
    pub const REGEX_BLOCK_SIZE: usize = 64;

    /// Max blocks per grid dimension.
    pub const GPU_MAX_GRID_SIZE: usize = 65535;
}
