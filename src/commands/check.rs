//! Collector connectivity check

use colored::*;
use eyre::Result;

use splunk_logging::transport::{Outcome, Sink};
use splunk_logging::{Collector, Config, SplunkEvent};

pub fn run(config: &Config) -> Result<()> {
    let collector = Collector::new(&config.splunk);

    println!("{}", "splunk-logging check".bold());
    println!("{}", "═".repeat(50));
    println!();
    println!("  collector: {}", collector.url().cyan());

    if config.splunk.skips_tls_verification() {
        println!("{} TLS certificate verification is disabled (splunk.verify_tls)", "⚠".yellow());
    }
    if config.splunk.token.is_empty() {
        println!("{} No token configured (splunk.token or SPLUNK_TOKEN)", "⚠".yellow());
    }

    let heartbeat = SplunkEvent::new("heartbeat")
        .with_request(None)
        .with_name("check")
        .with_field("tool", env!("CARGO_PKG_NAME"))
        .with_field("version", env!("CARGO_PKG_VERSION"))
        .build();

    match collector.try_deliver(&heartbeat) {
        Ok(Outcome::Delivered) => {
            println!("{} Collector accepted heartbeat", "✓".green());
            Ok(())
        }
        Ok(Outcome::Disabled) => {
            println!(
                "{} Delivery is disabled (splunk.enabled = false); nothing was sent",
                "⚠".yellow()
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            eyre::bail!("Collector check failed")
        }
    }
}
