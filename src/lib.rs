// SPDX-License-Identifier: Apache-2.0

//! HWSED library
//!
//! A stream editor core built for bulk throughput: a script parser, a
//! SIMD-accelerated literal matcher, a Thompson-NFA regex engine with both a
//! host matcher and a GPU-consumable encoding, and a dispatch layer that
//! picks between them per workload.
//!
//! ## Hardware support
//! - **AVX2 / NEON** are used on stable Rust where available
//! - **AVX-512** is available behind the `hwsed-nightly` feature (nightly Rust)
//! - **CUDA** is enabled when detected by `build.rs` (requires `nvcc`)
//!
//! ## Usage
//!
//! ```rust
//! use hwsed::{parse_script, run_pipeline, Dialect, ExecOptions};
//!
//! let commands = parse_script("s/world/universe/", Dialect::Basic)?;
//! let (out, _) = run_pipeline(b"hello world", &commands, &ExecOptions::default())?;
//! assert_eq!(out, b"hello universe");
//! # Ok::<(), hwsed::HwsedError>(())
//! ```

pub mod constants;
pub mod device;
pub mod dispatch;
pub mod exec;
#[cfg(has_cuda)]
pub mod gpu;
pub mod lines;
pub mod literal;
pub mod nfa;
pub mod regex;
pub mod script;
pub mod types;

pub use types::*;

pub use dispatch::{find_matches, select_backend, Backend, BackendOverride};
pub use exec::{run_pipeline, CommandReport, ExecOptions};
pub use script::{parse_script, Dialect};

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
#[path = "tests/script_tests.rs"]
mod script_tests;
#[cfg(test)]
#[path = "tests/lines_tests.rs"]
mod lines_tests;
#[cfg(test)]
#[path = "tests/literal_tests.rs"]
mod literal_tests;
#[cfg(test)]
#[path = "tests/regex_tests.rs"]
mod regex_tests;
#[cfg(test)]
#[path = "tests/device_tests.rs"]
mod device_tests;
#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod dispatch_tests;
#[cfg(test)]
#[path = "tests/exec_tests.rs"]
mod exec_tests;
