// Re-exported so member crates reach the logging macros through one path.
pub use log::*;

use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

/// Installs the console logger and the panic hook that routes panics through
/// it. Records below `filter` are dropped.
///
/// Only the first call installs anything; later calls (a second device, a
/// parallel test) are no-ops, so callers do not need to coordinate.
pub fn init(filter: LevelFilter) {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({l})} {t} - {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(filter))
        .expect("unable to create logging configuration");

    if log4rs::init_config(config).is_ok() {
        log_panics::init();
    }
}
