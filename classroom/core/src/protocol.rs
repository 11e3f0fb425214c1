//! Wire Protocol
//!
//! Text frames carrying one JSON object each.
//!
//! # Frame Shapes
//!
//! ```text
//! outbound  {"type":"student_action","data":{student_id, action_type, content, timestamp}}
//! outbound  {"type":"teacher_input","data":{source, teacher_id, student_id, teacher_action, input_type, content}}
//! inbound   {animation, reply_text, emotion, confidence, student_state, decision_trace?, meta?}
//! ```
//!
//! # Security
//!
//! - Inbound frames larger than `MAX_FRAME_SIZE` are rejected before parsing
//! - Decode either yields a complete `DecisionResponse` or an error, never a
//!   partially filled one

use serde_json::Value;
use thiserror::Error;

use crate::events::OutboundAction;
use crate::messages::DecisionResponse;

/// Maximum inbound frame size (1 MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors from encoding or decoding frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds `MAX_FRAME_SIZE`
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual size
        size: usize,
        /// Allowed size
        max: usize,
    },

    /// Payload is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Payload is JSON but not an object
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Object does not have the decision response shape
    #[error("not a decision response: {0}")]
    UnexpectedShape(String),

    /// Confidence outside 0.0 - 1.0
    #[error("confidence out of range: {0}")]
    ConfidenceOutOfRange(f64),
}

/// Serialize an outbound action to a text frame
///
/// # Errors
///
/// Returns `ProtocolError::InvalidJson` if serialization fails.
pub fn encode_action(action: &OutboundAction) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(action)?)
}

/// Decode an inbound text frame as a decision response
///
/// `decision_trace`, `meta`, `emotion`, `confidence` and `student_state` may
/// be absent or `null`. `animation` and a non-empty `reply_text` are
/// required; other room traffic that lacks them is reported as
/// `UnexpectedShape`.
///
/// # Errors
///
/// See [`ProtocolError`].
pub fn decode_response(frame: &str) -> Result<DecisionResponse, ProtocolError> {
    let value = parse_object(frame)?;

    for field in ["animation", "reply_text"] {
        if !value.get(field).is_some_and(Value::is_string) {
            return Err(ProtocolError::UnexpectedShape(format!(
                "missing string field `{field}`"
            )));
        }
    }

    let response: DecisionResponse = serde_json::from_value(value)?;

    if response.reply_text.is_empty() {
        return Err(ProtocolError::UnexpectedShape("empty reply_text".into()));
    }
    if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
        return Err(ProtocolError::ConfidenceOutOfRange(response.confidence));
    }

    Ok(response)
}

/// Check that a caller-supplied frame is a single JSON object
///
/// # Errors
///
/// Returns an error if the frame is too large, not JSON, or not an object.
pub fn validate_raw(frame: &str) -> Result<(), ProtocolError> {
    parse_object(frame).map(|_| ())
}

/// Shorten a frame for log output
#[must_use]
pub fn preview(frame: &str) -> &str {
    const LIMIT: usize = 120;
    if frame.len() <= LIMIT {
        return frame;
    }
    let mut end = LIMIT;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    &frame[..end]
}

fn parse_object(frame: &str) -> Result<Value, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: frame.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let value: Value = serde_json::from_str(frame)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Array(_) => Err(ProtocolError::NotAnObject("array")),
        Value::String(_) => Err(ProtocolError::NotAnObject("string")),
        Value::Number(_) => Err(ProtocolError::NotAnObject("number")),
        Value::Bool(_) => Err(ProtocolError::NotAnObject("bool")),
        Value::Null => Err(ProtocolError::NotAnObject("null")),
    }
}
