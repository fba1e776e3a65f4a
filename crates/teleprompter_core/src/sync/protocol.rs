//! Cross-context message protocol.
//!
//! Messages travel as plain JSON envelopes, identical on every transport:
//!
//! ```text
//! {"type": "UPDATE_PLAYBACK", "payload": {"speed": 4}}
//! ```
//!
//! The relay transport adds a `timestamp` field to the envelope; decoding
//! ignores it. Unknown kinds decode to `None` and are dropped silently.
//!
//! Partial updates (`SET_STATE`, `UPDATE_TIMER`, `UPDATE_PLAYBACK`) carry a
//! [`StatePatch`] which is shallow-merged into the receiver's state: keys
//! present overwrite, keys absent are left alone.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;
use crate::state::{AppMode, LiveMessage, LiveMessageType, Presenter, PresenterId, SharedState, TimerMode};

/// Closed set of message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Full-state replace.
    SetState,
    /// Timer field update.
    UpdateTimer,
    /// Selection + script update.
    UpdateScript,
    /// Playback field update.
    UpdatePlayback,
    /// Mode set.
    SetMode,
    /// Live message push.
    PushMessage,
    /// Live message clear.
    ClearMessage,
    /// Presenter list replace.
    UpdatePresenters,
    /// Presenter selection.
    SelectPresenter,
}

impl MessageKind {
    /// Every kind, in wire order.
    pub const ALL: [MessageKind; 9] = [
        MessageKind::SetState,
        MessageKind::UpdateTimer,
        MessageKind::UpdateScript,
        MessageKind::UpdatePlayback,
        MessageKind::SetMode,
        MessageKind::PushMessage,
        MessageKind::ClearMessage,
        MessageKind::UpdatePresenters,
        MessageKind::SelectPresenter,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::SetState => "SET_STATE",
            MessageKind::UpdateTimer => "UPDATE_TIMER",
            MessageKind::UpdateScript => "UPDATE_SCRIPT",
            MessageKind::UpdatePlayback => "UPDATE_PLAYBACK",
            MessageKind::SetMode => "SET_MODE",
            MessageKind::PushMessage => "PUSH_MESSAGE",
            MessageKind::ClearMessage => "CLEAR_MESSAGE",
            MessageKind::UpdatePresenters => "UPDATE_PRESENTERS",
            MessageKind::SelectPresenter => "SELECT_PRESENTER",
        }
    }

    /// Parse a wire name. Unknown names return `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// Deserialize a present field (including `null`) as `Some(..)`.
///
/// Combined with `#[serde(default)]` this separates "absent" (`None`)
/// from "explicitly null" (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Shallow patch over [`SharedState`]; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    /// Presenter list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presenters: Option<Vec<Presenter>>,
    /// Selected presenter; `Some(None)` clears it.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub selected_presenter_id: Option<Option<PresenterId>>,
    /// Playback running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    /// Scroll speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Script font size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// Scroll offset; `Some(None)` clears it.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub scroll_position: Option<Option<f64>>,
    /// Timer direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_mode: Option<TimerMode>,
    /// Countdown length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Frozen elapsed time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Timer running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_timer_running: Option<bool>,
    /// Effective start time; `Some(None)` clears it.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub timer_start_time: Option<Option<i64>>,
    /// Operating mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AppMode>,
    /// Live message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_message: Option<LiveMessage>,
}

impl StatePatch {
    /// Patch carrying every field of `state` (a full-state replace).
    pub fn snapshot(state: &SharedState) -> Self {
        Self {
            presenters: Some(state.presenters.clone()),
            selected_presenter_id: Some(state.selected_presenter_id),
            is_playing: Some(state.is_playing),
            speed: Some(state.speed),
            font_size: Some(state.font_size),
            scroll_position: Some(state.scroll_position),
            timer_mode: Some(state.timer_mode),
            duration_ms: Some(state.duration_ms),
            elapsed_ms: Some(state.elapsed_ms),
            is_timer_running: Some(state.is_timer_running),
            timer_start_time: Some(state.timer_start_time),
            mode: Some(state.mode),
            current_message: Some(state.current_message.clone()),
        }
    }

    /// Whether the patch carries no fields.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite every field present in the patch.
    pub fn apply_to(&self, state: &mut SharedState) {
        if let Some(v) = &self.presenters {
            state.presenters = v.clone();
        }
        if let Some(v) = self.selected_presenter_id {
            state.selected_presenter_id = v;
        }
        if let Some(v) = self.is_playing {
            state.is_playing = v;
        }
        if let Some(v) = self.speed {
            state.speed = v;
        }
        if let Some(v) = self.font_size {
            state.font_size = v;
        }
        if let Some(v) = self.scroll_position {
            state.scroll_position = v;
        }
        if let Some(v) = self.timer_mode {
            state.timer_mode = v;
        }
        if let Some(v) = self.duration_ms {
            state.duration_ms = v;
        }
        if let Some(v) = self.elapsed_ms {
            state.elapsed_ms = v;
        }
        if let Some(v) = self.is_timer_running {
            state.is_timer_running = v;
        }
        if let Some(v) = self.timer_start_time {
            state.timer_start_time = v;
        }
        if let Some(v) = self.mode {
            state.mode = v;
        }
        if let Some(v) = &self.current_message {
            state.current_message = v.clone();
        }
    }
}

/// Payload of `UPDATE_SCRIPT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptUpdate {
    /// Presenter to select.
    pub selected_presenter_id: PresenterId,
    /// New script for that presenter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// Payload of `PUSH_MESSAGE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePush {
    /// Message text.
    #[serde(default)]
    pub text: String,
    /// Severity; receivers default to info.
    #[serde(rename = "type", default)]
    pub kind: Option<LiveMessageType>,
    /// Push id; receivers generate one when missing.
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ModePayload {
    mode: AppMode,
}

#[derive(Serialize, Deserialize)]
struct ClearPayload {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct PresentersPayload {
    presenters: Vec<Presenter>,
}

#[derive(Serialize, Deserialize)]
struct SelectPayload {
    id: PresenterId,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    payload: Value,
}

/// A protocol message: kind plus typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    /// `SET_STATE`: merge a (usually complete) snapshot.
    SetState(StatePatch),
    /// `UPDATE_TIMER`: merge timer fields.
    UpdateTimer(StatePatch),
    /// `UPDATE_SCRIPT`: select a presenter and optionally replace its script.
    UpdateScript(ScriptUpdate),
    /// `UPDATE_PLAYBACK`: merge playback fields.
    UpdatePlayback(StatePatch),
    /// `SET_MODE`.
    SetMode(AppMode),
    /// `PUSH_MESSAGE`.
    PushMessage(MessagePush),
    /// `CLEAR_MESSAGE`, optionally targeted at one push id.
    ClearMessage(Option<String>),
    /// `UPDATE_PRESENTERS`: replace the presenter list.
    UpdatePresenters(Vec<Presenter>),
    /// `SELECT_PRESENTER`.
    SelectPresenter(PresenterId),
}

impl ProtocolMessage {
    /// Full-state replace built from `state`.
    pub fn full_state(state: &SharedState) -> Self {
        ProtocolMessage::SetState(StatePatch::snapshot(state))
    }

    /// Kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::SetState(_) => MessageKind::SetState,
            ProtocolMessage::UpdateTimer(_) => MessageKind::UpdateTimer,
            ProtocolMessage::UpdateScript(_) => MessageKind::UpdateScript,
            ProtocolMessage::UpdatePlayback(_) => MessageKind::UpdatePlayback,
            ProtocolMessage::SetMode(_) => MessageKind::SetMode,
            ProtocolMessage::PushMessage(_) => MessageKind::PushMessage,
            ProtocolMessage::ClearMessage(_) => MessageKind::ClearMessage,
            ProtocolMessage::UpdatePresenters(_) => MessageKind::UpdatePresenters,
            ProtocolMessage::SelectPresenter(_) => MessageKind::SelectPresenter,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            ProtocolMessage::SetState(patch)
            | ProtocolMessage::UpdateTimer(patch)
            | ProtocolMessage::UpdatePlayback(patch) => serde_json::to_value(patch),
            ProtocolMessage::UpdateScript(update) => serde_json::to_value(update),
            ProtocolMessage::SetMode(mode) => serde_json::to_value(ModePayload { mode: *mode }),
            ProtocolMessage::PushMessage(push) => serde_json::to_value(push),
            ProtocolMessage::ClearMessage(id) => serde_json::to_value(ClearPayload { id: id.clone() }),
            ProtocolMessage::UpdatePresenters(presenters) => serde_json::to_value(PresentersPayload {
                presenters: presenters.clone(),
            }),
            ProtocolMessage::SelectPresenter(id) => serde_json::to_value(SelectPayload { id: *id }),
        }
    }

    /// Envelope as a JSON value: `{"type": .., "payload": ..}`.
    pub fn to_envelope(&self) -> Result<Value, CodecError> {
        let payload = self.payload().map_err(CodecError::Encode)?;
        let mut envelope = Map::new();
        envelope.insert("type".to_string(), Value::String(self.kind().as_str().to_string()));
        envelope.insert("payload".to_string(), payload);
        Ok(Value::Object(envelope))
    }

    /// Encode as envelope JSON text.
    pub fn encode(&self) -> Result<String, CodecError> {
        let envelope = self.to_envelope()?;
        serde_json::to_string(&envelope).map_err(CodecError::Encode)
    }

    /// Encode as envelope JSON text with a `timestamp` field (relay format).
    pub fn encode_with_timestamp(&self, timestamp_ms: i64) -> Result<String, CodecError> {
        let mut envelope = self.to_envelope()?;
        if let Value::Object(map) = &mut envelope {
            map.insert("timestamp".to_string(), Value::from(timestamp_ms));
        }
        serde_json::to_string(&envelope).map_err(CodecError::Encode)
    }

    /// Decode envelope JSON text.
    ///
    /// Returns `Ok(None)` for envelopes without a type or with an unknown
    /// type. Malformed JSON and payloads of the wrong shape are errors.
    pub fn decode(text: &str) -> Result<Option<Self>, CodecError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(CodecError::Malformed)?;
        Self::from_raw(raw)
    }

    /// Decode an already-parsed envelope value.
    pub fn from_envelope(value: Value) -> Result<Option<Self>, CodecError> {
        let raw: RawEnvelope = serde_json::from_value(value).map_err(CodecError::Malformed)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnvelope) -> Result<Option<Self>, CodecError> {
        let Some(kind) = raw.kind.as_deref().and_then(MessageKind::from_wire) else {
            return Ok(None);
        };
        let payload = match raw.payload {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let invalid = |source| CodecError::InvalidPayload {
            kind: kind.as_str(),
            source,
        };

        let message = match kind {
            MessageKind::SetState => {
                ProtocolMessage::SetState(serde_json::from_value(payload).map_err(invalid)?)
            }
            MessageKind::UpdateTimer => {
                ProtocolMessage::UpdateTimer(serde_json::from_value(payload).map_err(invalid)?)
            }
            MessageKind::UpdatePlayback => {
                ProtocolMessage::UpdatePlayback(serde_json::from_value(payload).map_err(invalid)?)
            }
            MessageKind::UpdateScript => {
                ProtocolMessage::UpdateScript(serde_json::from_value(payload).map_err(invalid)?)
            }
            MessageKind::SetMode => {
                let p: ModePayload = serde_json::from_value(payload).map_err(invalid)?;
                ProtocolMessage::SetMode(p.mode)
            }
            MessageKind::PushMessage => {
                ProtocolMessage::PushMessage(serde_json::from_value(payload).map_err(invalid)?)
            }
            MessageKind::ClearMessage => {
                let p: ClearPayload = serde_json::from_value(payload).map_err(invalid)?;
                ProtocolMessage::ClearMessage(p.id)
            }
            MessageKind::UpdatePresenters => {
                let p: PresentersPayload = serde_json::from_value(payload).map_err(invalid)?;
                ProtocolMessage::UpdatePresenters(p.presenters)
            }
            MessageKind::SelectPresenter => {
                let p: SelectPayload = serde_json::from_value(payload).map_err(invalid)?;
                ProtocolMessage::SelectPresenter(p.id)
            }
        };
        Ok(Some(message))
    }

    /// Reconcile this message into `state`.
    ///
    /// Only fields named by the payload are written.
    pub fn apply_to(&self, state: &mut SharedState) {
        match self {
            ProtocolMessage::SetState(patch)
            | ProtocolMessage::UpdateTimer(patch)
            | ProtocolMessage::UpdatePlayback(patch) => patch.apply_to(state),
            ProtocolMessage::UpdateScript(update) => {
                state.selected_presenter_id = Some(update.selected_presenter_id);
                if let Some(script) = &update.script
                    && let Some(presenter) = state
                        .presenters
                        .iter_mut()
                        .find(|p| p.id == update.selected_presenter_id)
                {
                    presenter.script = script.clone();
                }
            }
            ProtocolMessage::SetMode(mode) => state.mode = *mode,
            ProtocolMessage::PushMessage(push) => {
                let id = push
                    .id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                state.current_message = LiveMessage {
                    text: push.text.clone(),
                    kind: push.kind.unwrap_or_default(),
                    id: Some(id),
                    visible: true,
                };
            }
            ProtocolMessage::ClearMessage(id) => {
                let matches = match id {
                    None => true,
                    Some(id) => state.current_message.id.as_deref() == Some(id.as_str()),
                };
                if matches {
                    state.current_message.visible = false;
                }
            }
            ProtocolMessage::UpdatePresenters(presenters) => {
                state.presenters = presenters.clone();
                state.ensure_selection();
            }
            ProtocolMessage::SelectPresenter(id) => state.selected_presenter_id = Some(*id),
        }
    }
}
