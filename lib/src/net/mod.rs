// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Choosing which local interface a connection leaves from.
//!
//! On a multi-homed host two devices may share the same address on different networks, so the
//! route alone cannot pick the right one. A [`LocalAddress`] names the source address to bind,
//! the [`Dialer`] makes the bound connection and [`available_interfaces`] lists what there is
//! to bind to.

mod dialer;
mod interfaces;
mod local_address;

pub use dialer::{Dialer, DEFAULT_DIAL_TIMEOUT};
pub use interfaces::{available_interfaces, interfaces, InterfaceAddress};
pub use local_address::LocalAddress;
