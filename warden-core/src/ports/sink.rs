// warden-core/src/ports/sink.rs
//
// Seam for alert delivery. The router builds per-channel payloads; the
// transport owns the wire. The default transport logs the payload, which
// keeps the core free of HTTP machinery while external collaborators plug
// in real webhooks or pagers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WardenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Webhook,
    Pager,
    Email,
}

#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn deliver(
        &self,
        channel_name: &str,
        channel_type: ChannelType,
        payload: &serde_json::Value,
    ) -> Result<(), WardenError>;
}

/// Default transport: structured log line per alert.
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    async fn deliver(
        &self,
        channel_name: &str,
        channel_type: ChannelType,
        payload: &serde_json::Value,
    ) -> Result<(), WardenError> {
        info!(
            channel = channel_name,
            kind = ?channel_type,
            payload = %payload,
            "Alert dispatched"
        );
        Ok(())
    }
}
