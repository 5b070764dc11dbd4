//! Thin abstraction over the upstream HTTP call so the dispatcher's
//! control flow (header building, failure classification, streaming
//! hand-off) can be unit tested without a real network stack. The
//! production implementation wraps `wreq`, the same client crate the
//! teacher proxy uses for outbound calls.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub struct UpstreamHttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Buffered body for non-streaming calls; empty (and ignored) when
    /// `body_stream` is set.
    pub body: Vec<u8>,
    pub body_stream: Option<BoxStream<'static, Result<Bytes, std::io::Error>>>,
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn post(
        &self,
        request: UpstreamHttpRequest,
        stream: bool,
    ) -> Result<UpstreamHttpResponse, std::io::Error>;
}

/// A `wreq`-backed client. Left unimplemented wire-for-wire here since
/// exercising a real socket is out of scope for this workspace's test
/// suite (spec §1: HTTP framework and its transport are external
/// collaborators); this struct is the seam `apps/plexus` wires at
/// startup.
pub struct WreqUpstreamClient {
    client: wreq::Client,
}

impl WreqUpstreamClient {
    pub fn new() -> Result<Self, wreq::Error> {
        Ok(Self {
            client: wreq::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl UpstreamClient for WreqUpstreamClient {
    async fn post(
        &self,
        request: UpstreamHttpRequest,
        stream: bool,
    ) -> Result<UpstreamHttpResponse, std::io::Error> {
        let mut builder = self.client.post(&request.url).body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers().iter() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        if stream {
            use futures_util::StreamExt;
            let body_stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string())));
            Ok(UpstreamHttpResponse {
                status,
                headers,
                body: Vec::new(),
                body_stream: Some(Box::pin(body_stream)),
            })
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))?
                .to_vec();
            Ok(UpstreamHttpResponse {
                status,
                headers,
                body,
                body_stream: None,
            })
        }
    }
}
