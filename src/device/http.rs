use super::{DeviceClient, DeviceError, ScheduleRequest, StatusReport, StopAck, Telemetry, TelemetrySource};
use crate::config::DeviceConfig;
use crate::production::ManualRunConfig;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::future::Future;
use std::time::Duration;

/// Linear backoff before retry number `attempt`. Saturates instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// HTTP client for the maker's controller board.
///
/// Every request carries the configured timeout. `GET /status` and
/// `POST /stop` are retried on transient failures with linear backoff;
/// `POST /schedule` and `POST /settings` are sent once.
#[derive(Debug, Clone)]
pub struct HttpDeviceClient {
    http: Client,
    base_url: Url,
    retries: u32,
    backoff: Duration,
    stop_attempts: u32,
}

impl HttpDeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| DeviceError::InvalidAddress(format!("{}: {}", config.base_url, e)))?;
        // Url::join drops the last path segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DeviceError::InvalidAddress(e.to_string()))?;
        tracing::info!("Device client targeting {}", base_url);
        Ok(Self {
            http,
            base_url,
            retries: config.retries,
            backoff: config.retry_backoff(),
            stop_attempts: config.emergency_stop_attempts.max(1),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, DeviceError> {
        self.base_url
            .join(path)
            .map_err(|e| DeviceError::InvalidAddress(e.to_string()))
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, attempts: u32, mut op: F) -> Result<T, DeviceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeviceError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!("{} attempt {}/{} failed: {}", what, attempt, attempts, e);
                    tokio::time::sleep(backoff_delay(self.backoff, attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("{} failed after {} attempt(s): {}", what, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_status(&self) -> Result<StatusReport, DeviceError> {
        let url = self.endpoint("status")?;
        tracing::debug!("Device <- GET {}", url);
        let report = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<StatusReport>()
            .await?;
        Ok(report)
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response, DeviceError> {
        let url = self.endpoint(path)?;
        tracing::debug!("Device <- POST {}", url);
        let response = self.http.post(url).json(body).send().await?.error_for_status()?;
        Ok(response)
    }

    async fn stop_once(&self) -> Result<(), DeviceError> {
        let url = self.endpoint("stop")?;
        tracing::debug!("Device <- POST {}", url);
        let ack = self
            .http
            .post(url)
            .send()
            .await?
            .error_for_status()?
            .json::<StopAck>()
            .await?;
        if ack.acknowledged {
            Ok(())
        } else {
            Err(DeviceError::NotAcknowledged)
        }
    }
}

#[async_trait]
impl TelemetrySource for HttpDeviceClient {
    async fn poll(&self) -> Result<Telemetry, DeviceError> {
        let report = self
            .with_retry("Status poll", self.retries + 1, || self.fetch_status())
            .await?;
        Ok(report.received_at(chrono::Utc::now()))
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn send_schedule(&self, request: &ScheduleRequest) -> Result<(), DeviceError> {
        self.post_json("schedule", request).await?;
        Ok(())
    }

    async fn send_settings(&self, settings: &ManualRunConfig) -> Result<(), DeviceError> {
        self.post_json("settings", settings).await?;
        Ok(())
    }

    async fn emergency_stop(&self) -> Result<(), DeviceError> {
        self.with_retry("Emergency stop", self.stop_attempts, || self.stop_once())
            .await
    }
}
