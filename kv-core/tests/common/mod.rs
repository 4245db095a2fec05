use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing-subscriber` `EnvFilter` subscriber once per test
/// binary, active only when `RUST_LOG` is set -- lets a failing replay or
/// recovery test be re-run with logging visible without touching test code.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
