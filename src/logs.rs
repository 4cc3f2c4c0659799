use log::{LevelFilter, SetLoggerError};
use log4rs::{
    Config,
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            RollingFileAppender,
            policy::compound::{
                CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
            },
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};
use thiserror::Error;

const LOG_SIZE_LIMIT: u64 = 10 * 1024 * 1024; // 10 MB

const LOG_FILE_COUNT: u32 = 3;

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("invalid log archive pattern: {0}")]
    ArchivePattern(String),

    #[error("failed to open log file: {0}")]
    File(#[from] std::io::Error),

    #[error("invalid logger configuration: {0}")]
    Config(String),

    #[error(transparent)]
    AlreadyInitialized(#[from] SetLoggerError),
}

/// Debug and above go to the rolling log file, info and above to stderr.
pub fn init_logger(file_path: &str, archive_pattern: &str) -> Result<(), LogInitError> {
    let stderr_level = LevelFilter::Info;
    let file_level = LevelFilter::Debug;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} {t} - {m}{n}")))
        .build();

    let trigger = SizeTrigger::new(LOG_SIZE_LIMIT);
    let roller = FixedWindowRoller::builder()
        .build(archive_pattern, LOG_FILE_COUNT)
        .map_err(|e| LogInitError::ArchivePattern(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}",
        )))
        .build(file_path, Box::new(policy))?;

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(file_level)))
                .build("logfile", Box::new(logfile)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(stderr_level)))
                .build("stderr", Box::new(stderr)),
        )
        .logger(log4rs::config::Logger::builder().build("sqlx", LevelFilter::Warn))
        .build(
            Root::builder()
                .appender("logfile")
                .appender("stderr")
                .build(LevelFilter::Trace),
        )
        .map_err(|e| LogInitError::Config(e.to_string()))?;

    log4rs::init_config(config)?;
    Ok(())
}
