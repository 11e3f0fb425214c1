//! Decision Messages
//!
//! Messages pushed from the classroom backend to front-ends. Each inbound
//! frame carries one decision: which animation to play, what the student
//! says, how they feel, and optionally why the backend decided so.
//!
//! # Soft Interpretation
//!
//! The backend speaks in plain strings (`"happy"`, `"thinking_pose"`, ...).
//! Consumers want closed enums they can `match` on. The helpers here never
//! fail: an unknown string degrades to a documented default (`Neutral`
//! emotion, `Idle` state, `Idle` animation trigger) so a newer backend can
//! never break an older front-end.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A decision pushed by the backend for one student
///
/// Raw string fields are kept exactly as received; use the accessor methods
/// for the interpreted values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    /// Server animation name (e.g. `"happy"`, `"thinking_pose"`)
    pub animation: String,
    /// Text the student says
    pub reply_text: String,
    /// Emotion tag
    #[serde(default, deserialize_with = "null_as_default")]
    pub emotion: String,
    /// Backend confidence in this decision (0.0 - 1.0)
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    /// Behavioral state tag
    #[serde(default, deserialize_with = "null_as_default")]
    pub student_state: String,
    /// Why the backend chose this response (absent for simple replies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_trace: Option<DecisionTrace>,
    /// Response metadata (absent fields default to empty/zero)
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: ResponseMeta,
}

impl DecisionResponse {
    /// Animator trigger for this response's animation
    #[must_use]
    pub fn animation_trigger(&self) -> AnimationTrigger {
        AnimationTrigger::from_server_name(&self.animation)
    }

    /// Interpreted emotion (unknown values become [`Emotion::Neutral`])
    #[must_use]
    pub fn emotion_kind(&self) -> Emotion {
        Emotion::parse(&self.emotion)
    }

    /// Interpreted behavioral state (unknown values become [`StudentState::Idle`])
    #[must_use]
    pub fn behavior_state(&self) -> StudentState {
        StudentState::parse(&self.student_state)
    }

    /// Whether the reply is worth showing in a speech bubble
    ///
    /// The backend uses `"..."` as a placeholder when the student stays silent.
    #[must_use]
    pub fn has_speech(&self) -> bool {
        let text = self.reply_text.trim();
        !text.is_empty() && text != "..."
    }
}

/// Decision trace attached to a response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    /// Intent detected in the teacher's input
    #[serde(default, deserialize_with = "null_as_default")]
    pub intent: String,
    /// Rule the engine applied
    #[serde(default, deserialize_with = "null_as_default")]
    pub rule_applied: String,
    /// Student state before the decision
    #[serde(default, deserialize_with = "null_as_default")]
    pub state_before: StateSnapshot,
    /// Student state after the decision
    #[serde(default, deserialize_with = "null_as_default")]
    pub state_after: StateSnapshot,
}

/// Snapshot of the simulated student's internal state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Mood label
    #[serde(default, deserialize_with = "null_as_default")]
    pub mood: String,
    /// Attention level (0.0 - 1.0)
    #[serde(default, deserialize_with = "null_as_default")]
    pub attention_level: f64,
    /// Energy level (0.0 - 1.0)
    #[serde(default, deserialize_with = "null_as_default")]
    pub energy_level: f64,
    /// What the student is currently doing
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_activity: String,
}

/// Metadata describing how a response was produced
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Backend timestamp (ISO-8601)
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,
    /// Which engine produced the response
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    /// Backend processing latency
    #[serde(default, deserialize_with = "null_as_default")]
    pub latency_ms: u64,
    /// Backend decision identifier
    #[serde(default, deserialize_with = "null_as_default")]
    pub decision_id: String,
}

/// Treat an explicit `null` like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Student emotional states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    /// Default when nothing else applies
    #[default]
    Neutral,
    /// Pleased
    Happy,
    /// Upset
    Sad,
    /// Lost
    Confused,
    /// Eager to work
    Motivated,
    /// Tired
    Sleepy,
    /// Paying sharp attention
    Alert,
}

impl Emotion {
    /// Parse an emotion tag, case-insensitively, falling back to `Neutral`
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "confused" => Self::Confused,
            "motivated" => Self::Motivated,
            "sleepy" => Self::Sleepy,
            "alert" => Self::Alert,
            _ => Self::Neutral,
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Confused => "confused",
            Self::Motivated => "motivated",
            Self::Sleepy => "sleepy",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Student behavioral states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentState {
    /// Following the lesson
    Attentive,
    /// Looking elsewhere
    Distracted,
    /// Dozing off
    Sleepy,
    /// Not following
    Confused,
    /// Default when nothing else applies
    #[default]
    Idle,
}

impl StudentState {
    /// Parse a state tag, case-insensitively, falling back to `Idle`
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "attentive" => Self::Attentive,
            "distracted" => Self::Distracted,
            "sleepy" => Self::Sleepy,
            "confused" => Self::Confused,
            _ => Self::Idle,
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attentive => "attentive",
            Self::Distracted => "distracted",
            Self::Sleepy => "sleepy",
            Self::Confused => "confused",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for StudentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Animator trigger keys understood by character front-ends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnimationTrigger {
    /// Default pose
    #[default]
    Idle,
    /// Smile / cheer
    Happy,
    /// Sit up straight
    Alert,
    /// Wave a hand
    Wave,
    /// Fist pump
    Motivated,
    /// Hand on chin
    Thinking,
    /// Sit down
    Sit,
    /// Stand up
    Stand,
    /// Scratch head
    Confused,
    /// Droop
    Sleepy,
    /// Yawn
    Yawn,
}

impl AnimationTrigger {
    /// Map a server animation name to a trigger, falling back to `Idle`
    ///
    /// Matching is exact: server names are lowercase snake_case.
    #[must_use]
    pub fn from_server_name(name: &str) -> Self {
        match name {
            "happy" => Self::Happy,
            "alert" => Self::Alert,
            "wave" => Self::Wave,
            "motivated" => Self::Motivated,
            "thinking" | "thinking_pose" => Self::Thinking,
            "sit" => Self::Sit,
            "stand" => Self::Stand,
            "idle" => Self::Idle,
            "confused" => Self::Confused,
            "sleepy" => Self::Sleepy,
            "yawn" => Self::Yawn,
            _ => Self::Idle,
        }
    }

    /// Trigger key as used by the animator
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Happy => "Happy",
            Self::Alert => "Alert",
            Self::Wave => "Wave",
            Self::Motivated => "Motivated",
            Self::Thinking => "Thinking",
            Self::Sit => "Sit",
            Self::Stand => "Stand",
            Self::Confused => "Confused",
            Self::Sleepy => "Sleepy",
            Self::Yawn => "Yawn",
        }
    }
}

impl fmt::Display for AnimationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
