use std::sync::Once;

use tracing_core::Level;

static INIT: Once = Once::new();

/// Installs a global subscriber that prints router logs during tests.
///
/// Records emitted through the `log` facade are forwarded to the subscriber.
pub fn setup_test_environment() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_test_writer()
            .init();
    });
}
