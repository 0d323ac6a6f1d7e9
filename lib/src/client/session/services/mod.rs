// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Service calls on a [`Session`](super::Session), one module per service set.

mod attributes;
mod session;
