//! Analysis job state machine.

use serde::{Deserialize, Serialize};

/// Status of an analysis job.
///
/// ```text
/// pending → extracting → analyzing → searching → generating → completed
///    │          │            │  └─────────────────────┘
///    │          │            └──────────────────────────────┐
///    └──────────┴──── any non-terminal ────→ error ←────────┘
///                                            │   │
///                                  pending ←─┘   └─→ cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Extracting,
    Analyzing,
    Searching,
    Generating,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Extracting,
        JobStatus::Analyzing,
        JobStatus::Searching,
        JobStatus::Generating,
        JobStatus::Completed,
        JobStatus::Error,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Extracting => "extracting",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Searching => "searching",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.as_str() == s)
    }

    /// Human-readable label shown while polling.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Queued",
            JobStatus::Extracting => "Extracting text",
            JobStatus::Analyzing => "Analyzing content",
            JobStatus::Searching => "Searching the web",
            JobStatus::Generating => "Generating report",
            JobStatus::Completed => "Report ready",
            JobStatus::Error => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// A job in one of these states is owned by a worker.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            JobStatus::Extracting
                | JobStatus::Analyzing
                | JobStatus::Searching
                | JobStatus::Generating
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Extracting | Analyzing | Error) => true,
            (Extracting, Analyzing | Error) => true,
            (Analyzing, Searching | Generating | Error) => true,
            (Searching, Generating | Error) => true,
            (Generating, Completed | Error) => true,
            (Error, Pending | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
