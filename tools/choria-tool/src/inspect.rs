//! Layer by layer decoding of protocol messages.
//!
//! Signatures are not checked, this is for looking at messages only.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use choria_protocol::{v1, v2, version_from_json, ProtocolConfig, ProtocolVersion, TransportMessage};
use serde_json::Value;
use tracing::debug;

/// One decoded envelope.
#[derive(Debug)]
pub struct Layer {
    /// Protocol of this envelope
    pub version: ProtocolVersion,
    /// Envelope metadata worth showing
    pub details: Vec<(&'static str, String)>,
    /// The envelope as JSON
    pub document: Value,
}

impl Layer {
    fn new(version: ProtocolVersion, raw: &[u8]) -> Result<Self> {
        Ok(Self {
            version,
            details: Vec::new(),
            document: serde_json::from_slice(raw).context("layer is not JSON")?,
        })
    }

    fn detail(mut self, name: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.details.push((name, value));
        }
        self
    }
}

fn message_field(document: &Value, base64: bool) -> Option<String> {
    let raw = document.get("message")?.as_str()?;

    if !base64 {
        return Some(raw.to_string());
    }

    STANDARD
        .decode(raw)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Decode every envelope nested in `data`, outermost first.
pub fn decode_layers(data: &[u8]) -> Result<Vec<Layer>> {
    let config = ProtocolConfig {
        client_strict_validation: false,
        ..ProtocolConfig::default()
    };

    let mut layers = Vec::new();
    let mut current = data.to_vec();

    loop {
        let version = version_from_json(&current);
        debug!(layer = layers.len(), protocol = %version, "Decoding layer");

        let next = match version {
            ProtocolVersion::TransportV1 | ProtocolVersion::TransportV2 => {
                let transport = TransportMessage::from_json(&config, &current)?;
                layers.push(
                    Layer::new(version, &current)?
                        .detail("sender", transport.sender_id())
                        .detail("reply-to", transport.reply_to())
                        .detail("hops", transport.seen_by().len().to_string()),
                );
                transport.message().to_vec()
            }

            ProtocolVersion::SecureRequestV1 => {
                let secure = v1::SecureRequest::from_json(&current)?;
                layers.push(Layer::new(version, &current)?.detail("pubcert", secure.public_certificate()));
                secure.message().to_vec()
            }

            ProtocolVersion::SecureRequestV2 => {
                let secure = v2::SecureRequest::from_json(&current)?;
                layers.push(
                    Layer::new(version, &current)?
                        .detail("caller", secure.caller_jwt())
                        .detail("signer", secure.signer_jwt()),
                );
                secure.message().to_vec()
            }

            ProtocolVersion::SecureReplyV1 => {
                let secure = v1::SecureReply::from_json(&current)?;
                layers.push(Layer::new(version, &current)?);
                secure.message().to_vec()
            }

            ProtocolVersion::SecureReplyV2 => {
                let secure = v2::SecureReply::from_json(&current)?;
                layers.push(Layer::new(version, &current)?.detail("sender", secure.sender_jwt()));
                secure.message().to_vec()
            }

            ProtocolVersion::RequestV1
            | ProtocolVersion::ReplyV1
            | ProtocolVersion::RequestV2
            | ProtocolVersion::ReplyV2 => {
                let layer = Layer::new(version, &current)?;
                let message = message_field(&layer.document, version.major() == 2).unwrap_or_default();
                layers.push(layer.detail("message", message));
                return Ok(layers);
            }

            ProtocolVersion::Unknown => {
                bail!("layer {} is not a known protocol message", layers.len() + 1)
            }
        };

        current = next;
    }
}
