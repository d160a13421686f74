use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ProgressionError, Result};

/// Workflow stage of a user on a lecture. The declaration order is the
/// progression order; `Ord` on this enum is how "already past this stage"
/// checks are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LectureStatus {
    Locked,
    Ready,
    Started,
    Watched,
    InitialReflection,
    MasteryTesting,
    Mastered,
}

impl LectureStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            LectureStatus::Locked => "locked",
            LectureStatus::Ready => "ready",
            LectureStatus::Started => "started",
            LectureStatus::Watched => "watched",
            LectureStatus::InitialReflection => "initial_reflection",
            LectureStatus::MasteryTesting => "mastery_testing",
            LectureStatus::Mastered => "mastered",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "locked" => Ok(LectureStatus::Locked),
            "ready" => Ok(LectureStatus::Ready),
            "started" => Ok(LectureStatus::Started),
            "watched" => Ok(LectureStatus::Watched),
            "initial_reflection" => Ok(LectureStatus::InitialReflection),
            "mastery_testing" => Ok(LectureStatus::MasteryTesting),
            "mastered" => Ok(LectureStatus::Mastered),
            other => Err(ProgressionError::Internal(format!(
                "unknown status code '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for LectureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Category of a submitted reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptType {
    PreLecture,
    Initial,
    Mastery,
    Discussion,
}

impl PromptType {
    pub fn as_code(&self) -> &'static str {
        match self {
            PromptType::PreLecture => "pre_lecture",
            PromptType::Initial => "initial",
            PromptType::Mastery => "mastery",
            PromptType::Discussion => "discussion",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "pre_lecture" | "pre-lecture" => Ok(PromptType::PreLecture),
            "initial" => Ok(PromptType::Initial),
            "mastery" => Ok(PromptType::Mastery),
            "discussion" => Ok(PromptType::Discussion),
            other => Err(ProgressionError::Validation(format!(
                "unknown prompt type '{other}'"
            ))),
        }
    }

    /// Minimum word count enforced on submission.
    pub fn min_words(&self) -> usize {
        match self {
            PromptType::PreLecture | PromptType::Initial => 30,
            PromptType::Mastery => 50,
            PromptType::Discussion => 0,
        }
    }
}

impl std::fmt::Display for PromptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_code(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(ProgressionError::Internal(format!(
                "unknown role code '{other}'"
            ))),
        }
    }
}

/// Explicit caller identity passed into every core operation; replaces the
/// source system's ambient session state.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl UserContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

impl UserRecord {
    pub fn context(&self) -> UserContext {
        UserContext {
            user_id: self.id,
            role: self.role,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LectureRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub user_id: Uuid,
    pub lecture_id: Uuid,
    pub status: LectureStatus,
    pub created_at: DateTime<Utc>,
    pub last_viewed: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One declared prerequisite of a lecture, joined with whether this user
/// has mastered it.
#[derive(Debug, Clone)]
pub struct PrerequisiteStanding {
    pub prerequisite_slug: String,
    pub required: bool,
    pub importance: i32,
    pub satisfied: bool,
}

/// Output of the readiness calculator. `satisfied` is the unlocking gate
/// (every required prerequisite mastered); `meets_threshold` is the
/// display-only 70% weighted-score check the source UI shows alongside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessReport {
    pub score: f64,
    pub satisfied: bool,
    pub meets_threshold: bool,
}

#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub slug: String,
    pub title: String,
    pub position: i32,
    pub status: LectureStatus,
    pub readiness: ReadinessReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Philosopher,
    Concept,
}

impl EntityKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            EntityKind::Philosopher => "philosopher",
            EntityKind::Concept => "concept",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "philosopher" => Ok(EntityKind::Philosopher),
            "concept" => Ok(EntityKind::Concept),
            other => Err(ProgressionError::Validation(format!(
                "unknown entity kind '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    pub era: Option<String>,
    pub summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_matches_progression() {
        assert!(LectureStatus::Locked < LectureStatus::Ready);
        assert!(LectureStatus::Started < LectureStatus::Watched);
        assert!(LectureStatus::InitialReflection < LectureStatus::MasteryTesting);
        assert!(LectureStatus::MasteryTesting < LectureStatus::Mastered);
    }

    #[test]
    fn word_floors_per_prompt_type() {
        assert_eq!(PromptType::PreLecture.min_words(), 30);
        assert_eq!(PromptType::Initial.min_words(), 30);
        assert_eq!(PromptType::Mastery.min_words(), 50);
        assert_eq!(PromptType::Discussion.min_words(), 0);
    }

    #[test]
    fn prompt_type_accepts_hyphenated_pre_lecture() {
        assert_eq!(
            PromptType::from_code("pre-lecture").unwrap(),
            PromptType::PreLecture
        );
    }
}
