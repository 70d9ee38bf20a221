//! Observability wiring for xmlforge: tracing subscriber setup and a panic
//! hook that routes panics through the log stream.

pub mod logging;
pub mod panic;

/// Top-level observability configuration.
#[derive(Clone, Debug, Default)]
pub struct O11yConfig {
    pub logging: logging::Config,
    pub install_panic_hook: bool,
}

/// Initialize logging and (optionally) the panic hook. Safe to call more
/// than once; later calls are no-ops.
pub fn init_all(cfg: &O11yConfig) {
    logging::init(&cfg.logging);
    if cfg.install_panic_hook {
        panic::install_hook();
    }
}
