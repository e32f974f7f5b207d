// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The validation diagnostic channel.
//!
//! Recoverable misuse and backend failures (a rejected pipeline, an
//! allocation that returned nothing, a stale on-disk cache) are reported
//! through [`validation_log!`](crate::validation_log). Messages go to the
//! `log` facade at `error` level under the [`VALIDATION_TARGET`] target, and a
//! process-wide counter records how many were emitted so that tests and
//! tooling can observe them without installing a logger.

use std::sync::atomic::{AtomicU64, Ordering};

#[doc(hidden)]
pub use log;

/// The `log` target used for validation messages.
pub const VALIDATION_TARGET: &str = "impeller::validation";

static VALIDATION_ERRORS: AtomicU64 = AtomicU64::new(0);

/// Increments the validation error counter. Called by [`validation_log!`](crate::validation_log).
#[doc(hidden)]
pub fn record_validation_error() {
    VALIDATION_ERRORS.fetch_add(1, Ordering::Relaxed);
}

/// The number of validation messages emitted by this process so far.
pub fn validation_error_count() -> u64 {
    VALIDATION_ERRORS.load(Ordering::Relaxed)
}

/// Emits a validation diagnostic.
///
/// Accepts the same arguments as [`log::error!`].
///
/// ```
/// use impeller_core::validation_log;
///
/// validation_log!("Could not create texture of size {}x{}.", 0, 0);
/// assert!(impeller_core::validation::validation_error_count() >= 1);
/// ```
#[macro_export]
macro_rules! validation_log {
    ($($arg:tt)+) => {{
        $crate::validation::record_validation_error();
        $crate::validation::log::error!(
            target: $crate::validation::VALIDATION_TARGET,
            $($arg)+
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_log_increments_counter() {
        let before = validation_error_count();
        crate::validation_log!("Test validation message {}", 42);
        assert!(validation_error_count() > before);
    }
}
