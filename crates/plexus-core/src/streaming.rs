//! The client-facing half of the streaming engine (spec §4.4, §4.5): owns
//! the async upstream body, taps it for usage metering, and either forwards
//! bytes byte-exact (pass-through) or decodes-and-re-encodes into the
//! client's dialect. `plexus-transform::StreamEngine` only does the
//! upstream-SSE -> unified-chunk half; this module is the other half the
//! teacher's `gproxy-router/src/proxy.rs` owns for its own proxy responses
//! (`wrap_sse_stream_with_heartbeat`, the `mpsc::channel` + `ReceiverStream`
//! + `Body::from_stream` bridge).

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use plexus_protocol::sse::{render_event, render_keepalive_comment};
use plexus_protocol::ApiType;
use plexus_storage::usage::response_status;
use plexus_storage::{UsageRecord, UsageRepository};
use plexus_transform::{transformer_for, PlexusMeta, StreamEngine, UnifiedUsage};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;

const SSE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const CHANNEL_CAPACITY: usize = 32;

pub struct StreamUsageContext {
    pub usage: UsageRepository,
    pub trace_id: String,
    pub key_name: String,
    pub key_attribution: Option<String>,
    pub plexus: PlexusMeta,
}

/// Drives one upstream stream to completion, producing the axum response
/// body. `bypass_transformation` means the client dialect already matches
/// the upstream dialect (spec §4.2 "pass-through"): bytes are forwarded
/// unchanged, but a copy is still decoded through [`StreamEngine`] so usage
/// metering works the same for pass-through and re-encoded streams.
pub fn stream_inference_body(
    upstream: BoxStream<'static, Result<Bytes, std::io::Error>>,
    upstream_api_type: ApiType,
    client_api_type: ApiType,
    bypass_transformation: bool,
    usage_ctx: StreamUsageContext,
) -> Body {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    tokio::spawn(run_stream(
        upstream,
        upstream_api_type,
        client_api_type,
        bypass_transformation,
        usage_ctx,
        tx,
    ));

    let heartbeat_rx = wrap_with_heartbeat(rx);
    let stream = ReceiverStream::new(heartbeat_rx).map(Ok::<_, Infallible>);
    Body::from_stream(stream)
}

async fn run_stream(
    mut upstream: BoxStream<'static, Result<Bytes, std::io::Error>>,
    upstream_api_type: ApiType,
    client_api_type: ApiType,
    bypass_transformation: bool,
    usage_ctx: StreamUsageContext,
    tx: mpsc::Sender<Bytes>,
) {
    let upstream_transformer = transformer_for(upstream_api_type);
    let client_transformer = transformer_for(client_api_type);
    let mut engine = StreamEngine::new(upstream_transformer);
    let mut latest_usage: Option<UnifiedUsage> = None;
    let mut finish_reason: Option<String> = None;
    let mut client_disconnected = false;

    'read: loop {
        let next = upstream.next().await;
        let chunk = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(error)) => {
                tracing::warn!(event = "upstream_stream_read_failed", trace_id = %usage_ctx.trace_id, %error);
                break;
            }
            None => break,
        };

        if bypass_transformation {
            if tx.send(chunk.clone()).await.is_err() {
                client_disconnected = true;
                break 'read;
            }
        }

        let Ok(text) = std::str::from_utf8(&chunk) else {
            continue;
        };
        let decoded = match engine.push_str(text) {
            Ok(decoded) => decoded,
            Err(error) => {
                tracing::warn!(event = "stream_decode_failed", trace_id = %usage_ctx.trace_id, %error);
                continue;
            }
        };
        for unified_chunk in decoded {
            if let Some(usage) = &unified_chunk.usage {
                latest_usage = Some(usage.clone());
            }
            if unified_chunk.finish_reason.is_some() {
                finish_reason = unified_chunk.finish_reason.clone();
            }
            if !bypass_transformation {
                for (event, data) in client_transformer.format_stream_chunk(&unified_chunk) {
                    let frame = render_event(event, &data, None);
                    if tx.send(Bytes::from(frame)).await.is_err() {
                        client_disconnected = true;
                        break;
                    }
                }
            }
            if client_disconnected {
                break;
            }
        }
        if client_disconnected {
            break 'read;
        }
    }

    if !client_disconnected {
        if let Ok(decoded) = engine.finish() {
            'finish: for unified_chunk in decoded {
                if let Some(usage) = &unified_chunk.usage {
                    latest_usage = Some(usage.clone());
                }
                if unified_chunk.finish_reason.is_some() {
                    finish_reason = unified_chunk.finish_reason.clone();
                }
                if !bypass_transformation {
                    for (event, data) in client_transformer.format_stream_chunk(&unified_chunk) {
                        let frame = render_event(event, &data, None);
                        if tx.send(Bytes::from(frame)).await.is_err() {
                            client_disconnected = true;
                            break 'finish;
                        }
                    }
                }
            }
        }
    }

    if !client_disconnected {
        for (event, data) in client_transformer.format_stream_terminator() {
            let frame = render_event(event, &data, None);
            let _ = tx.send(Bytes::from(frame)).await;
        }
    }

    record_usage(
        usage_ctx,
        latest_usage,
        finish_reason,
        client_disconnected,
        engine.time_to_first_token().map(|d| d.as_millis() as i64),
    )
    .await;
}

async fn record_usage(
    ctx: StreamUsageContext,
    usage: Option<UnifiedUsage>,
    finish_reason: Option<String>,
    client_disconnected: bool,
    time_to_first_token_ms: Option<i64>,
) {
    let usage = usage.unwrap_or_default();
    let status = if client_disconnected {
        response_status::CLIENT_DISCONNECT.to_string()
    } else if finish_reason.as_deref() == Some("error") {
        response_status::ERROR.to_string()
    } else {
        response_status::SUCCESS.to_string()
    };
    let cost_micros = ctx.plexus.pricing.map(|pricing| {
        pricing.cost_micros(
            usage.input_tokens,
            usage.output_tokens,
            usage.cached_tokens.unwrap_or(0),
            usage.reasoning_tokens.unwrap_or(0),
        )
    });
    let record = UsageRecord {
        trace_id: ctx.trace_id,
        at: OffsetDateTime::now_utc(),
        key_name: ctx.key_name,
        key_attribution: ctx.key_attribution,
        provider: ctx.plexus.provider,
        model: ctx.plexus.model,
        canonical_model: ctx.plexus.canonical_model,
        api_type: ctx.plexus.api_type.as_str().to_string(),
        streaming: true,
        input_tokens: usage.input_tokens as i64,
        output_tokens: usage.output_tokens as i64,
        cached_tokens: usage.cached_tokens.map(|v| v as i64),
        reasoning_tokens: usage.reasoning_tokens.map(|v| v as i64),
        cost_micros,
        time_to_first_token_ms,
        response_status: status,
        error_code: finish_reason.filter(|r| r == "error"),
    };
    if let Err(error) = ctx.usage.record(record).await {
        tracing::warn!(event = "usage_record_failed", %error);
    }
}

/// Interleaves a 15s keep-alive SSE comment with upstream chunks so
/// intermediaries don't time out an idle connection (spec §4.5 "SSE
/// keep-alive"), the same pattern as the teacher's
/// `wrap_sse_stream_with_heartbeat` in `gproxy-router/src/proxy.rs`.
fn wrap_with_heartbeat(mut upstream_rx: mpsc::Receiver<Bytes>) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SSE_HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                chunk = upstream_rx.recv() => {
                    match chunk {
                        Some(chunk) => {
                            if tx.send(chunk).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(Bytes::from_static(render_keepalive_comment().as_bytes())).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
    rx
}
