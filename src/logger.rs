use std::error::Error;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::configure::AppConfig;

const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {h({l})} {t} - {m}{n}";

fn encoder() -> Box<PatternEncoder> {
    Box::new(PatternEncoder::new(LOG_PATTERN))
}

/// Console logging, plus a file appender when `log_to_file` is set. The level
/// comes from config; unrecognized names fall back to info.
pub fn setup_logger(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let level = config.log_level.parse().unwrap_or(LevelFilter::Info);

    let console = ConsoleAppender::builder().encoder(encoder()).build();
    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if config.log_to_file {
        let file = FileAppender::builder().encoder(encoder()).build(&config.log_file)?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    log4rs::init_config(builder.build(root.build(level))?)?;
    Ok(())
}
