// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Aliases the service definitions use for built-in types.

use crate::types::date_time::DateTime;

/// Milliseconds as a double
pub type Duration = f64;
pub type UtcTime = DateTime;
pub type IntegerId = u32;
