use std::io::Write;

/// A logger implementation which writes each log message as a json encoded object.
pub mod json;
mod trace_id;

pub use trace_id::*;

/// Install the given json logger as the process-wide logger and set the `log` crate's max level
/// to whatever level the logger itself is configured with.
pub fn configure_logger<W: Write + Send>(logger: &'static json::Logger<W>) {
    log::set_logger(logger)
        .map(|()| log::set_max_level(logger.level().to_level_filter()))
        .expect("logger should only be configured once");
}
