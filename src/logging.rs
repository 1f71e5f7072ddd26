/// Initializes the logger with the `env_logger` crate.
///
/// Call once at startup; log levels are controlled through `RUST_LOG`.
pub fn init_logger() {
    env_logger::init();
}
