// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

pub mod logger {
    use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

    pub static ANSI_RESET: &str = "\x1b[0m";
    pub static ANSI_RED: &str = "\x1b[31m";
    pub static ANSI_GREEN: &str = "\x1b[32m";
    pub static ANSI_ORANGE: &str = "\x1b[33m";
    pub static ANSI_YELLOW: &str = "\x1b[33;2m";
    pub static ANSI_BLUE: &str = "\x1b[34m";
    pub static ANSI_GRAY: &str = "\x1b[37m";
    pub static ANSI_MAGENTA: &str = "\x1b[95;1m";

    fn level_color(level: Level) -> &'static str {
        match level {
            Level::Error => ANSI_RED,
            Level::Warn => ANSI_ORANGE,
            Level::Info => ANSI_GREEN,
            Level::Debug => ANSI_BLUE,
            Level::Trace => ANSI_GRAY,
        }
    }

    pub struct DaemonLogger {
        level: LevelFilter,
    }

    impl log::Log for DaemonLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= self.level
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                println!(
                    "{}[{}{}{}{}] :: {}",
                    ANSI_MAGENTA,
                    ANSI_RESET,
                    level_color(record.level()),
                    record.level(),
                    ANSI_MAGENTA,
                    record.args()
                );
            }
        }

        fn flush(&self) {}
    }

    /// Parses the `daemon.toml` `log_level` string, defaulting to `info`
    /// on an absent or unrecognized value.
    fn parse_level(level: Option<&str>) -> LevelFilter {
        match level.map(str::to_lowercase).as_deref() {
            Some("error") => LevelFilter::Error,
            Some("warn") => LevelFilter::Warn,
            Some("debug") => LevelFilter::Debug,
            Some("trace") => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }

    pub fn initialize_logger(configured_level: Option<&str>) -> Result<(), SetLoggerError> {
        let level = parse_level(configured_level);
        let logger = Box::new(DaemonLogger { level });
        log::set_boxed_logger(logger).map(|()| log::set_max_level(level))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn unrecognized_level_falls_back_to_info() {
            assert_eq!(parse_level(Some("bogus")), LevelFilter::Info);
            assert_eq!(parse_level(None), LevelFilter::Info);
        }

        #[test]
        fn recognizes_configured_levels_case_insensitively() {
            assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
            assert_eq!(parse_level(Some("warn")), LevelFilter::Warn);
        }
    }
}
