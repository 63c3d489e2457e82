use colored::*;
use eyre::Result;

use crate::cli::{ConfigAction, OutputFormat};
use splunk_logging::Config;
use splunk_logging::transport::collector_url;

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
        ConfigAction::Get { key } => get(&key, config),
    }
}

/// Token with everything but the last four characters masked
fn masked_token(token: &str) -> String {
    if token.is_empty() {
        return "(not set)".to_string();
    }
    let hidden = token.chars().count().saturating_sub(4);
    let tail: String = token.chars().skip(hidden).collect();
    format!("{}{}", "*".repeat(hidden), tail)
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    let mut redacted = config.clone();
    redacted.splunk.token = masked_token(&config.splunk.token);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&redacted)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(&redacted)?);
        }
        OutputFormat::Text => {
            let splunk = &redacted.splunk;
            println!("{}", "splunk-logging Configuration".bold());
            println!();

            println!("{}:", "collector".cyan());
            println!("  url: {}", collector_url(splunk));
            println!("  token: {}", splunk.token);
            println!("  verify_tls: {}", splunk.verify_tls);
            println!("  timeout_secs: {}", splunk.timeout_secs);
            println!();

            println!("{}:", "delivery".cyan());
            println!("  enabled: {}", splunk.enabled);
            println!("  threaded: {}", splunk.threaded);
            println!("  workers: {}", splunk.workers);
            println!("  queue_capacity: {}", splunk.queue_capacity);
            println!("  version: {}", splunk.version.as_deref().unwrap_or("-"));
            println!();

            println!("log_level: {}", redacted.log_level.as_filter());
        }
    }

    Ok(())
}

fn get(key: &str, config: &Config) -> Result<()> {
    let splunk = &config.splunk;
    let value = match key {
        "splunk.address" => Some(splunk.address.clone()),
        "splunk.port" => Some(splunk.port.to_string()),
        "splunk.https" => Some(splunk.https.to_string()),
        "splunk.token" => Some(masked_token(&splunk.token)),
        "splunk.enabled" => Some(splunk.enabled.to_string()),
        "splunk.threaded" => Some(splunk.threaded.to_string()),
        "splunk.version" => splunk.version.clone(),
        "splunk.url" | "url" => Some(collector_url(splunk)),
        "log_level" | "log-level" => Some(config.log_level.as_filter().to_string()),
        _ => None,
    };

    match value {
        Some(v) => println!("{}", v),
        None => {
            eprintln!("{} Unknown or unset config key: {}", "✗".red(), key);
            std::process::exit(1);
        }
    }

    Ok(())
}
