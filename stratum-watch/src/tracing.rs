//! Logging setup and the crate-wide tracing prelude.
//!
//! Library code only emits events; the subscriber is installed by binaries
//! through [`init`].

use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::{EnvFilter, fmt};

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info`).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let timer = LocalTime::new(time::macros::format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_writer(std::io::stderr)
        .init();
}
