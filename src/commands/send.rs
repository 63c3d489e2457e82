//! Ad-hoc event delivery from the command line

use colored::*;
use eyre::{Context, Result};
use std::sync::Arc;

use splunk_logging::{Collector, Config, Dispatcher, Field, Obj, SplunkEvent};

/// Parse `key=value`; values that are valid JSON keep their type
pub fn parse_field(raw: &str) -> Result<(String, Field)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| eyre::eyre!("Field '{}' is not in key=value form", raw))?;

    if key.is_empty() {
        eyre::bail!("Field '{}' has an empty key", raw);
    }

    let field = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json) => Field::from(json),
        Err(_) => Field::from(value),
    };
    Ok((key.to_string(), field))
}

pub fn run(key: &str, name: Option<&str>, fields: &[String], dry_run: bool, config: &Config) -> Result<()> {
    let fields = fields
        .iter()
        .map(String::as_str)
        .map(parse_field)
        .collect::<Result<Vec<_>>>()
        .context("Invalid event fields")?;

    let mut event = SplunkEvent::new(key)
        .with_obj(Obj::mapping(fields))
        .with_app_version(config.splunk.version.as_deref());
    if let Some(name) = name {
        event = event.with_name(name);
    }

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&event.build())?);
        return Ok(());
    }

    let collector = Collector::new(&config.splunk);
    if !collector.enabled() {
        println!(
            "{} Delivery is disabled (splunk.enabled = false); nothing will be sent",
            "⚠".yellow()
        );
    }

    let dispatcher = Dispatcher::from_config(&config.splunk, Arc::new(collector));
    event.send(&dispatcher);
    dispatcher.shutdown();

    let stats = dispatcher.stats();
    log::info!("send finished: {:?}", stats);
    if stats.delivered > 0 {
        println!("{} Event delivered", "✓".green());
    } else if stats.failed > 0 || stats.dropped > 0 {
        eyre::bail!("Event was not delivered");
    }

    Ok(())
}
