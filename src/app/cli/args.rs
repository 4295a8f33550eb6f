//! Command-line arguments
//!
//! Global flags override the matching configuration file values; the
//! subcommand picks which side of the relay this process plays.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::core::version::long_version;

#[derive(Parser, Debug, Clone)]
#[command(name = "qrelay")]
#[command(about = "Request/response messaging over one-way queues")]
#[command(version = long_version())]
pub struct Args {
    /// Configuration file path
    #[arg(long = "config-file", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Queue provider (overrides queue.provider)
    #[arg(long = "provider", value_name = "NAME", global = true)]
    pub provider: Option<String>,

    /// Application name used to prefix the response queue
    #[arg(long = "app-name", value_name = "NAME", global = true)]
    pub app_name: Option<String>,

    /// Log level or flexi_logger spec
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"], global = true)]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to log to the console)
    #[arg(long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Force colored output
    #[arg(long = "color", action = ArgAction::SetTrue, global = true)]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color", action = ArgAction::SetTrue, conflicts_with = "color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the coordinate listeners until interrupted
    Listen,

    /// Ask the coordinates service for a city
    Query {
        /// City name (case-sensitive)
        city: String,

        /// Seconds to wait for the reply (defaults to broker.reply_timeout_secs)
        #[arg(long = "timeout", value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Submit coordinates without waiting for an answer
    Submit {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },

    /// Run listeners and client together in this process
    Demo,
}

impl Args {
    /// Log file to use, treating `none` as no file
    pub fn effective_log_file(&self) -> Option<Option<PathBuf>> {
        self.log_file.as_ref().map(|path| {
            if path.as_os_str().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(path.clone())
            }
        })
    }

    /// Whether console output should be colored
    pub fn use_color(&self, is_terminal: bool) -> bool {
        !self.no_color && (self.color || is_terminal)
    }
}
