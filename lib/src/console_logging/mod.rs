// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A console logger for the samples and for anyone who wants one line of setup.

use std::{
    fmt,
    io::Write,
    sync::atomic::{AtomicBool, Ordering},
};

use env_logger::{fmt::Color, Builder, Env};

/// Environment variable holding the log filter, e.g. `RUST_OPCUA_LOG=debug`.
pub const LOG_ENV: &str = "RUST_OPCUA_LOG";

struct Pad<T> {
    value: T,
    width: usize,
}

impl<T: fmt::Display> fmt::Display for Pad<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{: <width$}", self.value, width = self.width)
    }
}

/// Install the logger. The filter comes from `RUST_OPCUA_LOG`, `info` when it is not set.
/// Calls after the first do nothing.
pub fn init() {
    lazy_static! {
        static ref INITIALISED: AtomicBool = AtomicBool::new(false);
    }

    if INITIALISED.swap(true, Ordering::Relaxed) {
        return;
    }

    // RUST_LOG is shared with cargo and every other tool, so it is not used here
    let mut builder = Builder::from_env(Env::default().filter_or(LOG_ENV, "info"));
    builder.format(|f, record| {
        let now = chrono::Utc::now();
        let time_fmt = now.format("%Y-%m-%d %H:%M:%S%.3f");

        let mut style = f.style();
        match record.metadata().level() {
            log::Level::Error => {
                // White on red
                style.set_color(Color::White);
                style.set_bg(Color::Red);
            }
            log::Level::Warn => {
                style.set_color(Color::Yellow);
            }
            log::Level::Info => {
                style.set_color(Color::Cyan);
            }
            log::Level::Debug => {
                style.set_color(Color::Green);
            }
            log::Level::Trace => {
                // Grey
                style.set_color(Color::Ansi256(8));
            }
        }
        let level = style.value(Pad {
            value: record.level(),
            width: 5,
        });

        let mut style = f.style();
        let target = style.set_bold(true).value(Pad {
            value: record.target(),
            width: 40,
        });

        writeln!(f, "{} {} {} {}", time_fmt, level, target, record.args())
    });
    // Another logger may already be installed, e.g. by a test harness
    if builder.try_init().is_ok() {
        info!(
            "Logging is enabled, use {} environment variable to control filtering, logging level",
            LOG_ENV
        );
    }
}
