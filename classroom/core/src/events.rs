//! Outbound Actions
//!
//! Actions sent from a front-end to the classroom backend. A character
//! client reports what a student did (`student_action`); a teacher console
//! reports what the teacher did to a student (`teacher_input`).
//!
//! Actions are created per send call and never queued or retried.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Input type tag carried by every teacher input
pub const TEXT_INPUT_TYPE: &str = "text";

/// Actions from a front-end to the backend
///
/// Serialized as `{"type": "...", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundAction {
    /// Something a student did in the scene
    StudentAction(StudentActionData),
    /// Something the teacher did to a student
    TeacherInput(TeacherInputData),
}

/// Payload of a `student_action`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentActionData {
    /// Student identifier (must match the backend roster)
    pub student_id: String,
    /// Action type (e.g. `"raise_hand"`)
    pub action_type: String,
    /// Free-text content
    pub content: String,
    /// Generation time, RFC 3339 UTC
    pub timestamp: String,
}

/// Payload of a `teacher_input`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherInputData {
    /// Front-end that produced the input (e.g. `"unity"`)
    pub source: String,
    /// Teacher identifier
    pub teacher_id: String,
    /// Target student
    pub student_id: String,
    /// What the teacher did
    pub teacher_action: TeacherAction,
    /// Input modality (always `"text"` for this client)
    pub input_type: String,
    /// Free-text content
    pub content: String,
}

impl OutboundAction {
    /// Build a `student_action` stamped with the current time
    pub fn student_action(
        student_id: impl Into<String>,
        action_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::StudentAction(StudentActionData {
            student_id: student_id.into(),
            action_type: action_type.into(),
            content: content.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    /// Build a `teacher_input`
    ///
    /// Empty content is replaced with `"Teacher triggered <action>"`.
    pub fn teacher_input(
        source: impl Into<String>,
        teacher_id: impl Into<String>,
        student_id: impl Into<String>,
        action: TeacherAction,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let content = if content.trim().is_empty() {
            format!("Teacher triggered {action}")
        } else {
            content
        };

        Self::TeacherInput(TeacherInputData {
            source: source.into(),
            teacher_id: teacher_id.into(),
            student_id: student_id.into(),
            teacher_action: action,
            input_type: TEXT_INPUT_TYPE.to_string(),
            content,
        })
    }

    /// Wire discriminant
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StudentAction(_) => "student_action",
            Self::TeacherInput(_) => "teacher_input",
        }
    }

    /// Target student
    #[must_use]
    pub fn student_id(&self) -> &str {
        match self {
            Self::StudentAction(data) => &data.student_id,
            Self::TeacherInput(data) => &data.student_id,
        }
    }
}

/// Teacher actions understood by the backend
///
/// Unknown names are preserved in `Custom` so newer backends can be driven
/// without a client release.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TeacherAction {
    /// Praise the student
    Praise,
    /// Warn the student
    Warn,
    /// Encourage the student
    Encourage,
    /// Ask the student a question
    Question,
    /// Tell the student to sit down
    CommandSit,
    /// Tell the student to stand up
    CommandStand,
    /// Deliberately ignore the student
    Ignore,
    /// Greet the student
    Greeting,
    /// Any other action name
    Custom(String),
}

impl TeacherAction {
    /// Every built-in action
    pub const BUILTIN: [TeacherAction; 8] = [
        Self::Praise,
        Self::Warn,
        Self::Encourage,
        Self::Question,
        Self::CommandSit,
        Self::CommandStand,
        Self::Ignore,
        Self::Greeting,
    ];

    /// Parse an action name; never fails
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "praise" => Self::Praise,
            "warn" => Self::Warn,
            "encourage" => Self::Encourage,
            "question" => Self::Question,
            "command_sit" => Self::CommandSit,
            "command_stand" => Self::CommandStand,
            "ignore" => Self::Ignore,
            "greeting" => Self::Greeting,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Praise => "praise",
            Self::Warn => "warn",
            Self::Encourage => "encourage",
            Self::Question => "question",
            Self::CommandSit => "command_sit",
            Self::CommandStand => "command_stand",
            Self::Ignore => "ignore",
            Self::Greeting => "greeting",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for TeacherAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TeacherAction {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<&str> for TeacherAction {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<TeacherAction> for String {
    fn from(action: TeacherAction) -> Self {
        action.as_str().to_string()
    }
}
