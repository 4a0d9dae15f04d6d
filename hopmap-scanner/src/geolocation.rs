// Rate-limited IP geolocation against the ip-api.com JSON endpoint

use crate::error::{Result, ScanError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "http://ip-api.com/json";
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const LOOKUP_FIELDS: &str =
    "status,message,country,countryCode,region,regionName,city,lat,lon,timezone,isp,org,as,query";
pub const UNKNOWN: &str = "Unknown";

/// Normalized location record. Every text field falls back to [`UNKNOWN`];
/// coordinates stay absent when the service did not provide them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub ip: String,
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub region_name: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: String,
    pub isp: String,
    pub org: String,
    pub as_info: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    status: Option<String>,
    message: Option<String>,
    query: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    isp: Option<String>,
    org: Option<String>,
    #[serde(rename = "as")]
    as_info: Option<String>,
}

impl LookupResponse {
    fn into_location(self) -> GeoLocation {
        let known = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_string());
        GeoLocation {
            ip: known(self.query),
            country: known(self.country),
            country_code: known(self.country_code),
            region: known(self.region),
            region_name: known(self.region_name),
            city: known(self.city),
            latitude: self.lat,
            longitude: self.lon,
            timezone: known(self.timezone),
            isp: known(self.isp),
            org: known(self.org),
            as_info: known(self.as_info),
        }
    }
}

/// Looks up hop locations one at a time, never issuing two requests closer
/// together than `min_interval`. The HTTP client is created on first use and
/// dropped by [`GeoLocator::close`].
pub struct GeoLocator {
    base_url: String,
    min_interval: Duration,
    timeout_secs: u64,
    client: Option<Client>,
    last_request: Option<Instant>,
}

impl GeoLocator {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            client: None,
            last_request: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Locate `ip`, returning `None` on any transport, HTTP or API failure.
    pub async fn locate(&mut self, ip: Ipv4Addr) -> Option<GeoLocation> {
        self.throttle().await;

        let result = self.fetch(ip).await;
        // Failed attempts count too, so a burst of errors stays throttled
        self.last_request = Some(Instant::now());

        match result {
            Ok(location) => {
                debug!(
                    "Got location for {}: {}, {}",
                    ip, location.city, location.country
                );
                Some(location)
            }
            Err(e) => {
                error!("Geolocation lookup for {} failed: {}", ip, e);
                None
            }
        }
    }

    pub fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("Closed geolocation HTTP client");
        }
    }

    async fn throttle(&self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
    }

    async fn fetch(&mut self, ip: Ipv4Addr) -> Result<GeoLocation> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
        let client = self.client()?;

        let response = client
            .get(&url)
            .query(&[("fields", LOOKUP_FIELDS)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::LookupFailed(format!("HTTP {}", status)));
        }

        let body: LookupResponse = response.json().await?;
        if body.status.as_deref() != Some("success") {
            let message = body.message.unwrap_or_else(|| "unknown error".to_string());
            warn!("Geolocation API returned error for {}: {}", ip, message);
            return Err(ScanError::LookupFailed(message));
        }

        Ok(body.into_location())
    }

    fn client(&mut self) -> Result<Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent("hopmap/0.1 (https://github.com/trapdoorsec/hopmap)")
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

impl Default for GeoLocator {
    fn default() -> Self {
        Self::new()
    }
}
