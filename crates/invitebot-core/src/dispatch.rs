//! Streaming frame classification.
//!
//! Frames look like `{"stream":["user"],"event":"notification","payload":"{...}"}`
//! where `payload` is itself JSON encoded as a string.

use serde::de::DeserializeOwned;

use crate::{
    domain::{Notification, RawFrame, Status, StreamEvent},
    errors::Error,
    Result,
};

/// Parse the outer `{event, payload}` envelope of a text frame.
pub fn decode_frame(text: &str) -> Result<RawFrame> {
    serde_json::from_str(text).map_err(|e| Error::Decode(format!("invalid frame envelope: {e}")))
}

/// Map a frame to a domain event; `Ok(None)` for event tags the bot does not handle.
pub fn classify(frame: &RawFrame) -> Result<Option<StreamEvent>> {
    let event = match frame.event.as_str() {
        "notification" => StreamEvent::NotificationReceived {
            notification: Box::new(decode_payload::<Notification>(frame)?),
        },
        "update" => StreamEvent::StatusUpdated {
            status: Box::new(decode_payload::<Status>(frame)?),
        },
        "delete" => StreamEvent::StatusDeleted {
            status_id: require_payload(frame)?.trim().to_string(),
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn require_payload(frame: &RawFrame) -> Result<&str> {
    frame
        .payload
        .as_deref()
        .ok_or_else(|| Error::Decode(format!("`{}` frame without payload", frame.event)))
}

fn decode_payload<T: DeserializeOwned>(frame: &RawFrame) -> Result<T> {
    let payload = require_payload(frame)?;
    serde_json::from_str(payload)
        .map_err(|e| Error::Decode(format!("invalid `{}` payload: {e}", frame.event)))
}
