use serde::{Serialize, Deserialize};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;

use crate::crawler::stats::Statistics;

/// Lifecycle state of a scrape task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One timestamped progress message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "log_time")]
    pub time: DateTime<Local>,
    pub message: String,
}

/// Everything known about one task. Cloned out of the registry as a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    /// Percentage in [0, 100]
    pub progress: u8,
    pub logs: Vec<LogEntry>,
    #[serde(skip)]
    pub output_file: PathBuf,
    pub statistics: Option<Statistics>,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, output_file: PathBuf) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            progress: 0,
            logs: Vec::new(),
            output_file,
            statistics: None,
        }
    }
}

/// One accepted profile, as stored in the result file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMatch {
    pub name: String,
    pub href: String,
    pub company: String,
    pub keyword: String,
    pub url: String,
}

/// Generate a fresh task identifier
pub fn generate_task_id() -> String {
    format!(
        "task_{}_{}",
        chrono::Utc::now().timestamp(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Log timestamps render as `YYYY-MM-DD HH:MM:SS` for polling clients
mod log_time {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(time: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Local>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| serde::de::Error::custom("ambiguous local time"))
    }
}
