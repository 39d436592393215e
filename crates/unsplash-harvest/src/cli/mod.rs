// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Command implementations for the `unsplash-harvest` binary.

pub mod doctor;
pub mod harvest_cmd;
pub mod output;
pub mod prompt;

/// Success, including partial download failures and user cancellation.
pub const EXIT_OK: i32 = 0;
/// A fatal error; the message goes to stderr.
pub const EXIT_FATAL: i32 = 1;
/// The search yielded no images.
pub const EXIT_EMPTY: i32 = 2;
