// SPDX-License-Identifier: Apache-2.0

use crate::dispatch::selected_backend;
use crate::types::Backend;

/// Test-only helpers.
///
/// No logger is installed; tests log through `log::debug!` and a downstream
/// logger picks it up if present.
pub fn config_test_logger() {
    // Intentionally a no-op.
}

/// Backends a dual-path test should run: scalar first, then the detected one
/// when it differs.
pub fn test_backends() -> Vec<Backend> {
    let detected = selected_backend();
    if detected == Backend::Scalar {
        vec![Backend::Scalar]
    } else {
        vec![Backend::Scalar, detected]
    }
}
