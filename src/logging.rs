//! Log output for tests and the CLI.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `testkit=debug`.
pub const LOG_ENV: &str = "TESTKIT_LOG";

/// Installs a global fmt subscriber filtered by `TESTKIT_LOG` (default `info`).
///
/// Output goes through the test writer so it is captured per test. Calling
/// this more than once is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        tracing::info!("logging initialised twice");
    }
}
