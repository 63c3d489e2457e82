//! Delivery to the HTTP Event Collector
//!
//! One POST per event, no retries. Failures go to a [`FailureReporter`],
//! never to the `log` facade, so a broken collector cannot feed back into
//! the logger that produced the event.

use std::sync::Arc;
use std::time::Duration;
use ureq::Agent;
use ureq::tls::TlsConfig;

use crate::config::SplunkConfig;
use crate::error::DeliveryError;
use crate::event::EventDocument;

/// Ingestion path on the collector
pub const COLLECTOR_PATH: &str = "/services/collector/event";

/// Side channel for delivery failures
pub trait FailureReporter: Send + Sync {
    fn report(&self, error: &DeliveryError);
}

/// Writes failures to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrReporter;

impl FailureReporter for StderrReporter {
    fn report(&self, error: &DeliveryError) {
        eprintln!("error sending splunk event to http collector: {}", error);
    }
}

/// What happened to an event handed to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    /// Delivery is switched off in config
    Disabled,
}

/// Somewhere events can be delivered to
pub trait Sink: Send + Sync {
    fn try_deliver(&self, event: &EventDocument) -> Result<Outcome, DeliveryError>;

    fn report(&self, error: &DeliveryError);

    /// Best-effort delivery; errors are reported, never returned
    fn deliver(&self, event: &EventDocument) {
        if let Err(e) = self.try_deliver(event) {
            self.report(&e);
        }
    }
}

/// Build the collector URL from config
pub fn collector_url(config: &SplunkConfig) -> String {
    let scheme = if config.https { "https" } else { "http" };
    format!("{}://{}:{}{}", scheme, config.address, config.port, COLLECTOR_PATH)
}

/// HTTP client for one collector
pub struct Collector {
    url: String,
    auth_header: String,
    enabled: bool,
    agent: Agent,
    reporter: Arc<dyn FailureReporter>,
}

impl Collector {
    pub fn new(config: &SplunkConfig) -> Self {
        Self::with_reporter(config, Arc::new(StderrReporter))
    }

    pub fn with_reporter(config: &SplunkConfig, reporter: Arc<dyn FailureReporter>) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .tls_config(TlsConfig::builder().disable_verification(!config.verify_tls).build())
            .build()
            .into();

        Self {
            url: collector_url(config),
            auth_header: format!("Splunk {}", config.token),
            enabled: config.enabled,
            agent,
            reporter,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auth_header(&self) -> &str {
        &self.auth_header
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn post(&self, body: &str) -> Result<(), DeliveryError> {
        let mut response = self
            .agent
            .post(&self.url)
            .header("Authorization", self.auth_header.as_str())
            .header("Content-Type", "application/json")
            .send(body.as_bytes())
            .map_err(|e| DeliveryError::Transport {
                url: self.url.clone(),
                source: Box::new(e),
            })?;

        let status = response.status().as_u16();
        // Anything above 200 counts as a failure, including the rest of 2xx
        if status > 200 {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }

        Ok(())
    }
}

impl Sink for Collector {
    fn try_deliver(&self, event: &EventDocument) -> Result<Outcome, DeliveryError> {
        if !self.enabled {
            return Ok(Outcome::Disabled);
        }

        let body = serde_json::to_string(event)?;
        self.post(&body)?;
        Ok(Outcome::Delivered)
    }

    fn report(&self, error: &DeliveryError) {
        self.reporter.report(error);
    }
}
