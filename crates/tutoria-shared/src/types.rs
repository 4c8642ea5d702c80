use serde::{Deserialize, Serialize};

// Durable identity id, as issued by the account backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CourseId(pub String);

impl CourseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CourseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CourseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for CourseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Tutor => write!(f, "tutor"),
        }
    }
}

/// The logged-in principal. One connection manager exists per principal
/// per process; every component receives it by injection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Principal {
    /// Whether a message author is this principal. Private-thread messages
    /// carry a durable author id; community messages only a display name.
    pub fn matches_author(&self, author_id: Option<&UserId>, author_name: &str) -> bool {
        match author_id {
            Some(id) => *id == self.id,
            None => author_name == self.name,
        }
    }
}

/// One student-tutor pair scoped to a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PrivateThreadId {
    pub course_id: CourseId,
    pub student_id: UserId,
    pub tutor_id: UserId,
}

/// A joinable conversation: the course-wide community room, or one
/// private student-tutor thread.
///
/// Serializes untagged so the wire sees a bare course id for community
/// rooms and the `{courseId, studentId, tutorId}` triple for threads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ConversationId {
    Private(PrivateThreadId),
    Community(CourseId),
}

impl ConversationId {
    pub fn community(course_id: impl Into<CourseId>) -> Self {
        Self::Community(course_id.into())
    }

    pub fn private(
        course_id: impl Into<CourseId>,
        student_id: impl Into<UserId>,
        tutor_id: impl Into<UserId>,
    ) -> Self {
        Self::Private(PrivateThreadId {
            course_id: course_id.into(),
            student_id: student_id.into(),
            tutor_id: tutor_id.into(),
        })
    }

    pub fn course_id(&self) -> &CourseId {
        match self {
            Self::Community(course) => course,
            Self::Private(thread) => &thread.course_id,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// Server-side room key.
    pub fn room_name(&self) -> String {
        match self {
            Self::Community(course) => format!("community:{course}"),
            Self::Private(thread) => format!(
                "private:{}:{}:{}",
                thread.course_id, thread.student_id, thread.tutor_id
            ),
        }
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.room_name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Connecting,
    Up,
}
