use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

#[derive(Parser)]
#[command(
    name = "splunk-logging",
    about = "Send application events to a Splunk HTTP Event Collector",
    version,
    after_help = "Config is read from $SPLUNK_LOGGING_CONFIG, ~/.config/splunk-logging/splunk-logging.yaml or ./splunk-logging.yaml"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to splunk-logging.yaml config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an event from key=value fields and deliver it
    Send {
        /// Sourcetype
        #[arg(long, short = 'k', default_value = "Generic")]
        key: String,

        /// Event name
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Print the event instead of sending it
        #[arg(long)]
        dry_run: bool,

        /// Fields as key=value; values that parse as JSON are sent as JSON
        fields: Vec<String>,
    },

    /// Send a heartbeat event synchronously and report the collector's answer
    Check,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'o', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (dot notation)
        key: String,
    },
}
