//! Embedded JSON schemas, compiled once.

use std::collections::HashMap;
use std::sync::LazyLock;

use jsonschema::Validator;
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::version::ProtocolVersion;

const SCHEMAS: [(ProtocolVersion, &str); 10] = [
    (ProtocolVersion::RequestV1, include_str!("schemas/request_v1.json")),
    (ProtocolVersion::ReplyV1, include_str!("schemas/reply_v1.json")),
    (ProtocolVersion::SecureRequestV1, include_str!("schemas/secure_request_v1.json")),
    (ProtocolVersion::SecureReplyV1, include_str!("schemas/secure_reply_v1.json")),
    (ProtocolVersion::TransportV1, include_str!("schemas/transport_v1.json")),
    (ProtocolVersion::RequestV2, include_str!("schemas/request_v2.json")),
    (ProtocolVersion::ReplyV2, include_str!("schemas/reply_v2.json")),
    (ProtocolVersion::SecureRequestV2, include_str!("schemas/secure_request_v2.json")),
    (ProtocolVersion::SecureReplyV2, include_str!("schemas/secure_reply_v2.json")),
    (ProtocolVersion::TransportV2, include_str!("schemas/transport_v2.json")),
];

static VALIDATORS: LazyLock<HashMap<ProtocolVersion, Validator>> = LazyLock::new(|| {
    SCHEMAS
        .iter()
        .map(|(version, text)| {
            let schema: Value = serde_json::from_str(text).expect("embedded schema is valid JSON");
            let validator = jsonschema::validator_for(&schema).expect("embedded schema compiles");
            (*version, validator)
        })
        .collect()
});

/// Validate `data` against the schema of `version`.
pub(crate) fn validate(version: ProtocolVersion, data: &[u8]) -> Result<(), ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidJson {
        target: version,
        reason,
    };

    let validator = VALIDATORS
        .get(&version)
        .ok_or(ProtocolError::UnknownProtocol(version))?;

    let instance: Value = serde_json::from_slice(data).map_err(|e| invalid(e.to_string()))?;

    let errors: Vec<String> = validator.iter_errors(&instance).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(invalid(errors.join(", ")));
    }

    Ok(())
}
