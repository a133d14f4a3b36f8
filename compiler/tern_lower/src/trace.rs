//! Log output for lowering runs.
//!
//! Passes emit `tracing` events: `debug` once per lowered unit and per
//! rejected construct, `trace` for individual rewrites. Nothing is printed
//! until a subscriber is installed.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INSTALL: Once = Once::new();

/// Filter variable, e.g. `TERN_LOG=tern_lower::generator=trace`.
/// `RUST_LOG` is read when it is unset.
pub const LOG_ENV: &str = "TERN_LOG";

/// Install a stderr subscriber for lowering events.
///
/// Does nothing unless `TERN_LOG` or `RUST_LOG` holds a valid filter. Only
/// the first call in a process has any effect, and a subscriber the host
/// program installed first is left in place.
pub fn init_tracing() {
    INSTALL.call_once(|| {
        let Some(filter) = filter_from_env() else {
            return;
        };
        let installed = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .without_time(),
            )
            .with(filter)
            .try_init();
        if installed.is_err() {
            tracing::debug!("subscriber already installed; keeping it");
        }
    });
}

fn filter_from_env() -> Option<EnvFilter> {
    [LOG_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .find_map(|var| EnvFilter::try_new(std::env::var(var).ok()?).ok())
}
