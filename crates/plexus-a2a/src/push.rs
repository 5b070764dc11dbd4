//! Push-notification delivery worker (spec §4.7 "Push notifications", §5
//! "Push delivery queue").

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use url::Url;

use crate::types::PushAuthentication;

const DEFAULT_MAX_QUEUE_DEPTH: usize = 10_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PushJob {
    pub config_id: String,
    pub task_id: String,
    pub event_type: String,
    pub sequence: i64,
    pub created_at: OffsetDateTime,
    pub payload: Value,
    pub metadata: Value,
    pub endpoint: String,
    pub authentication: Option<PushAuthentication>,
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint must use https")]
    NotHttps,
    #[error("endpoint resolves to a loopback or private address")]
    PrivateAddress,
    #[error("endpoint is not a valid URL")]
    Invalid,
}

/// Rejects non-HTTPS endpoints (unless `allow_insecure`) and loopback /
/// private-range hosts, per spec §4.7 step 2.
pub fn validate_endpoint(endpoint: &str, allow_insecure: bool) -> Result<(), EndpointError> {
    let url = Url::parse(endpoint).map_err(|_| EndpointError::Invalid)?;
    if url.scheme() != "https" && !allow_insecure {
        return Err(EndpointError::NotHttps);
    }
    let host = url.host_str().ok_or(EndpointError::Invalid)?;
    if host.eq_ignore_ascii_case("localhost") || host.ends_with(".local") {
        return Err(EndpointError::PrivateAddress);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_or_loopback(ip) {
            return Err(EndpointError::PrivateAddress);
        }
    }
    Ok(())
}

fn is_private_or_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

pub struct PushDeliveryConfig {
    pub allow_insecure_endpoints: bool,
    pub max_queue_depth: usize,
}

impl Default for PushDeliveryConfig {
    fn default() -> Self {
        Self {
            allow_insecure_endpoints: false,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

pub struct PushDeliveryService {
    sender: mpsc::Sender<PushJob>,
    dropped: Arc<AtomicU64>,
}

impl PushDeliveryService {
    /// Spawns the single-consumer worker task and returns a handle whose
    /// `enqueue` is the multi-producer side of the bounded queue (spec §5).
    pub fn spawn(config: PushDeliveryConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_queue_depth.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let client = wreq::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("push delivery http client");
        tokio::spawn(worker_loop(receiver, client, config.allow_insecure_endpoints));
        Self { sender, dropped }
    }

    /// Enqueues a job; when the bounded queue is full the event is dropped
    /// and logged, never blocking the caller (spec §4.7 step 6).
    pub fn enqueue(&self, job: PushJob) {
        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    event = "push_queue_full_dropping_event",
                    task_id = %job.task_id,
                    config_id = %job.config_id,
                    sequence = job.sequence,
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(event = "push_delivery_worker_gone");
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn worker_loop(mut receiver: mpsc::Receiver<PushJob>, client: wreq::Client, allow_insecure: bool) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    loop {
        ticker.tick().await;
        // Drain whatever has queued since the last tick, one at a time —
        // this is the bounded queue's single consumer (spec §5).
        while let Ok(job) = receiver.try_recv() {
            deliver(&client, job, allow_insecure).await;
        }
    }
}

async fn deliver(client: &wreq::Client, job: PushJob, allow_insecure: bool) {
    if let Err(error) = validate_endpoint(&job.endpoint, allow_insecure) {
        tracing::warn!(
            event = "push_endpoint_rejected",
            task_id = %job.task_id,
            config_id = %job.config_id,
            %error,
        );
        return;
    }

    let body = json!({
        "configId": job.config_id,
        "taskId": job.task_id,
        "eventType": job.event_type,
        "sequence": job.sequence,
        "createdAt": job.created_at.unix_timestamp(),
        "payload": job.payload,
        "metadata": job.metadata,
    });
    let body_bytes = match serde_json::to_vec(&body) {
        Ok(b) => b,
        Err(_) => return,
    };

    for attempt in 0..MAX_ATTEMPTS {
        let mut builder = client
            .post(&job.endpoint)
            .header("content-type", "application/json")
            .body(body_bytes.clone());
        builder = apply_authentication(builder, &job.authentication, &body_bytes);

        match builder.send().await {
            Ok(response) if response.status().is_success() => return,
            Ok(response) => {
                tracing::warn!(
                    event = "push_delivery_non_2xx",
                    task_id = %job.task_id,
                    config_id = %job.config_id,
                    status = response.status().as_u16(),
                    attempt,
                );
            }
            Err(error) => {
                tracing::warn!(
                    event = "push_delivery_transport_error",
                    task_id = %job.task_id,
                    config_id = %job.config_id,
                    %error,
                    attempt,
                );
            }
        }
        if attempt + 1 < MAX_ATTEMPTS {
            let backoff_ms = (500u64) * 2u64.pow(attempt);
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
    tracing::error!(
        event = "push_delivery_exhausted_retries",
        task_id = %job.task_id,
        config_id = %job.config_id,
    );
}

fn apply_authentication(
    mut builder: wreq::RequestBuilder,
    authentication: &Option<PushAuthentication>,
    body: &[u8],
) -> wreq::RequestBuilder {
    match authentication {
        None | Some(PushAuthentication::None) => builder,
        Some(PushAuthentication::Bearer { token }) => {
            builder = builder.header("authorization", format!("Bearer {token}"));
            builder
        }
        Some(PushAuthentication::Headers { headers }) => {
            for (name, value) in headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder
        }
        Some(PushAuthentication::HmacSha256 { secret }) => {
            type HmacSha256 = Hmac<Sha256>;
            let mut mac =
                HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
            mac.update(body);
            let signature = hex::encode(mac.finalize().into_bytes());
            builder = builder.header("x-a2a-signature", signature);
            builder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_plain_http_by_default() {
        assert!(matches!(
            validate_endpoint("http://example.com/hook", false),
            Err(EndpointError::NotHttps)
        ));
    }

    #[test]
    fn accepts_https_public_endpoint() {
        assert!(validate_endpoint("https://example.com/hook", false).is_ok());
    }

    #[test]
    fn rejects_loopback_ip_even_over_https() {
        assert!(matches!(
            validate_endpoint("https://127.0.0.1/hook", false),
            Err(EndpointError::PrivateAddress)
        ));
    }

    #[test]
    fn rejects_rfc1918_ranges() {
        assert!(validate_endpoint("https://10.0.0.5/x", false).is_err());
        assert!(validate_endpoint("https://192.168.1.5/x", false).is_err());
        assert!(validate_endpoint("https://172.20.0.5/x", false).is_err());
    }

    #[test]
    fn allow_insecure_flag_permits_plain_http() {
        assert!(validate_endpoint("http://example.com/hook", true).is_ok());
    }

    #[test]
    fn rejects_dot_local_hostnames() {
        assert!(validate_endpoint("https://printer.local/hook", false).is_err());
    }
}
