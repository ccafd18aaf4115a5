// SPDX-License-Identifier: Apache-2.0

//! Test-only helpers shared across the suite.

use crate::types::SubstFlags;

/// Flags for the common "replace everywhere" case.
pub fn global_flags() -> SubstFlags {
    SubstFlags {
        global: true,
        ..SubstFlags::default()
    }
}
