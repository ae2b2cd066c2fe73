// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Log module wires the `log` facade to a file appender, reference
//! https://docs.rs/log4rs

use crate::error::{PopError, Result};
use log::LevelFilter;

#[cfg(feature = "log4rs")]
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

/// init logs system
#[cfg(feature = "log4rs")]
pub fn init_log(level: LevelFilter, file_path: &str) -> Result<()> {
    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l} {t} {m}{n}",
        )))
        .build(file_path)?;
    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(level)))
                .build("logfile", Box::new(logfile)),
        )
        .build(Root::builder().appender("logfile").build(level))
        .map_err(|e| PopError::Log(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| PopError::Log(e.to_string()))?;
    Ok(())
}

/// without a backend only the max level is set
#[cfg(not(feature = "log4rs"))]
pub fn init_log(level: LevelFilter, _file_path: &str) -> Result<()> {
    log::set_max_level(level);
    Ok(())
}
