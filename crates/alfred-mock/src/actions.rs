//! Follow-up requests fired after a response has been built.
//!
//! Every action runs in its own task, detached from the inbound connection.
//! Failures are logged and never retried.

use crate::helpers::date::parse_duration;
use crate::helpers::HelperValues;
use crate::mock::{ActionSpec, SEND_REQUEST};
use crate::response::LatencyRange;
use crate::template;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A validated `send-request` action, templates still unrendered
#[derive(Debug, Clone)]
pub struct CompiledAction {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    /// `None` falls back to the scheduler's default
    pub timeout: Option<Duration>,
    pub delay: LatencyRange,
}

impl CompiledAction {
    pub fn compile(spec: &ActionSpec) -> Result<Self, String> {
        if !spec.kind.eq_ignore_ascii_case(SEND_REQUEST) {
            return Err(format!("unsupported action type '{}'", spec.kind));
        }
        if spec.url.trim().is_empty() {
            return Err("action url is required".to_string());
        }

        let method_name = spec.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| format!("invalid action method '{method_name}'"))?;

        let timeout = spec
            .timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| format!("invalid action timeout: {e}"))?;

        Ok(Self {
            method,
            url: spec.url.clone(),
            body: spec.body.clone(),
            headers: spec
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout,
            delay: LatencyRange::new(spec.min_scheduled_time, spec.max_scheduled_time),
        })
    }

    /// Every templated field: url, body and header values
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.url.as_str())
            .chain(self.body.as_deref())
            .chain(self.headers.iter().map(|(_, v)| v.as_str()))
    }

    fn render(&self, values: &HelperValues) -> RenderedAction {
        RenderedAction {
            method: self.method.clone(),
            url: template::render(&self.url, values),
            body: self.body.as_deref().map(|b| template::render(b, values)),
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), template::render(v, values)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RenderedAction {
    method: Method,
    url: String,
    body: Option<String>,
    headers: Vec<(String, String)>,
}

/// Fires actions on the runtime with a shared HTTP client
#[derive(Clone)]
pub struct ActionScheduler {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ActionScheduler {
    pub fn new(default_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    /// Render and spawn every action. The handles are only useful to tests;
    /// dropping them does not cancel anything.
    pub fn schedule(
        &self,
        actions: &[CompiledAction],
        values: &HelperValues,
        mock_name: &str,
    ) -> Vec<JoinHandle<()>> {
        let mock_name: Arc<str> = Arc::from(mock_name);

        actions
            .iter()
            .map(|action| {
                let rendered = action.render(values);
                let delay = action.delay.sample();
                let timeout = action.timeout.unwrap_or(self.default_timeout);
                let client = self.client.clone();
                let mock_name = Arc::clone(&mock_name);

                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    send(&client, rendered, timeout, &mock_name).await;
                })
            })
            .collect()
    }
}

async fn send(client: &reqwest::Client, action: RenderedAction, timeout: Duration, mock_name: &str) {
    let mut request = client
        .request(action.method.clone(), &action.url)
        .timeout(timeout);
    for (name, value) in &action.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = action.body {
        request = request.body(body);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            debug!(
                "Action of {} sent: {} {} -> {}",
                mock_name,
                action.method,
                action.url,
                response.status()
            );
        }
        Ok(response) => {
            warn!(
                "Action of {} got {} from {} {}",
                mock_name,
                response.status(),
                action.method,
                action.url
            );
        }
        Err(e) => {
            warn!(
                "Action of {} failed: {} {}: {}",
                mock_name, action.method, action.url, e
            );
        }
    }
}
