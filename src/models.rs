use std::collections::BTreeMap;
use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Identity returned by the tracker's `/auth/me` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Task status lifecycle. Each status has at most one permitted successor;
/// `Closed` is terminal. Statuses the server reports that are outside the
/// canonical set (legacy labels such as `"open"`) are carried as
/// `Unrecognized`: displayable, serialized back verbatim, and terminal
/// from the client's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    New,
    InProgress,
    Done,
    Closed,
    Unrecognized(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Closed => "closed",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Total parse: anything outside the canonical set becomes
    /// `Unrecognized` rather than an error.
    pub fn parse(s: &str) -> Self {
        match s {
            "new" => Self::New,
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            "closed" => Self::Closed,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// The single permitted next status, if any.
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::New => Some(Self::InProgress),
            Self::InProgress => Some(Self::Done),
            Self::Done => Some(Self::Closed),
            Self::Closed | Self::Unrecognized(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.successor().is_none()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// One unit of work as the server reports it.
///
/// `id` and `points` are server-owned: `id` is assigned at creation and
/// `points` is awarded server-side when a task first reaches `closed`.
/// Neither ever appears in a client mutation payload.
///
/// The original frontend read a `watchers` field while one of its forms
/// wrote `observers`; the server stores only `watchers`, which is
/// canonical here. `observers` is accepted on input as an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub points: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "observers")]
    pub watchers: Vec<String>,
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default, rename = "branch_assignee_github_login")]
    pub branch_assignee_login: Option<String>,
    #[serde(default)]
    pub github_issue_url: Option<String>,
}

/// Payload for task creation. `title` and `assignee` are required and
/// validated by the workflow engine before the request is issued.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskDraft {
    pub title: String,
    pub assignee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub watchers: Vec<String>,
    pub reviewers: Vec<String>,
    pub image_urls: Vec<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, assignee: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            assignee: assignee.into(),
            ..Self::default()
        }
    }
}

/// Partial update payload. `id` and `points` are excluded by construction;
/// absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assignee.is_none()
            && self.status.is_none()
            && self.watchers.is_none()
            && self.reviewers.is_none()
            && self.image_urls.is_none()
    }

    /// Whether applying this patch can change the statistics snapshot.
    /// Status feeds the per-status counts; assignee feeds the leaderboard.
    pub fn touches_stats(&self) -> bool {
        self.status.is_some() || self.assignee.is_some()
    }
}

/// Pre-aggregated statistics from `/tasks/stats`. Never reconstructed
/// client-side from raw tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub statuses: BTreeMap<String, u64>,
    pub points_leaders: Vec<PointsLeader>,
}

/// Leaderboard row, ordered descending by points by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsLeader {
    pub assignee: String,
    pub points: u64,
}

/// Reference returned by the upload collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub url: String,
}
