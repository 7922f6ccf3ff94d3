//! Delivery channel configuration — normalized once at the boundary.
//!
//! Sites store their channels either as an array
//! (`[{"type": "email", "from_address": "..."}]`) or as a keyed object
//! (`{"email": {"from_address": "..."}}`). Business rules only ever see
//! [`DeliveryChannel`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A configured delivery channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email {
        from_address: String,
        enabled: bool,
    },
    #[serde(rename = "whatsapp")]
    WhatsApp {
        phone_number_id: String,
        access_token: String,
        enabled: bool,
    },
    /// A channel kind this core does not deliver through.
    Other { kind: String, enabled: bool },
}

impl DeliveryChannel {
    pub fn kind(&self) -> &str {
        match self {
            DeliveryChannel::Email { .. } => "email",
            DeliveryChannel::WhatsApp { .. } => "whatsapp",
            DeliveryChannel::Other { kind, .. } => kind,
        }
    }

    /// Enabled, with every field delivery needs.
    pub fn is_valid(&self) -> bool {
        match self {
            DeliveryChannel::Email {
                from_address,
                enabled,
            } => *enabled && from_address.contains('@'),
            DeliveryChannel::WhatsApp {
                phone_number_id,
                access_token,
                enabled,
            } => *enabled && !phone_number_id.trim().is_empty() && !access_token.trim().is_empty(),
            DeliveryChannel::Other { .. } => false,
        }
    }
}

/// Normalize the raw channel value into a flat list.
pub fn normalize_channels(raw: &Value) -> Vec<DeliveryChannel> {
    match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let kind = item
                    .get("type")
                    .or_else(|| item.get("channel"))
                    .and_then(Value::as_str);
                match kind {
                    Some(kind) => Some(channel_from(kind, item)),
                    None => {
                        tracing::warn!("⚠️ Skipping channel entry without a type: {item}");
                        None
                    }
                }
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(kind, cfg)| {
                if cfg.is_object() {
                    Some(channel_from(kind, cfg))
                } else {
                    tracing::warn!("⚠️ Skipping channel '{kind}': expected an object");
                    None
                }
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!("⚠️ Unrecognized channel configuration shape: {other}");
            Vec::new()
        }
    }
}

/// At least one channel can deliver.
pub fn has_valid_channel(raw: &Value) -> bool {
    normalize_channels(raw).iter().any(DeliveryChannel::is_valid)
}

fn channel_from(kind: &str, cfg: &Value) -> DeliveryChannel {
    let text = |key: &str| cfg[key].as_str().unwrap_or("").trim().to_string();
    let enabled = cfg["enabled"].as_bool().unwrap_or(true);
    match kind.trim().to_ascii_lowercase().as_str() {
        "email" => {
            let mut from_address = text("from_address");
            if from_address.is_empty() {
                from_address = text("email");
            }
            DeliveryChannel::Email {
                from_address,
                enabled,
            }
        }
        "whatsapp" => DeliveryChannel::WhatsApp {
            phone_number_id: text("phone_number_id"),
            access_token: text("access_token"),
            enabled,
        },
        other => DeliveryChannel::Other {
            kind: other.to_string(),
            enabled,
        },
    }
}
