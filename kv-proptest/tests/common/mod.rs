use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing-subscriber` `EnvFilter` subscriber once per test
/// binary, active only when `RUST_LOG` is set -- lets a shrunk reproducer be
/// re-run with the injector's `trace!` events visible.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
