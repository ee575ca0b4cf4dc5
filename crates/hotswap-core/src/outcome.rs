use serde::Serialize;

/// Terminal state of one updater run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    Updated(String),
    SelfReplacementScheduled(String),
    ElevatedRestart,
    DownloadFailed,
    AdminRequired,
    CannotSaveDownload,
    ReplaceFailed,
    UnpackFailed,
    TargetBusy,
}

impl UpdateOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UpToDate
            | Self::Updated(_)
            | Self::SelfReplacementScheduled(_)
            | Self::ElevatedRestart => 0,
            Self::DownloadFailed => 2,
            Self::AdminRequired => 3,
            Self::CannotSaveDownload => 4,
            Self::ReplaceFailed => 5,
            Self::UnpackFailed => 6,
            Self::TargetBusy => 7,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::UpToDate => "up_to_date".to_string(),
            Self::Updated(version) => format!("updated:{version}"),
            Self::SelfReplacementScheduled(version) => format!("self_update_scheduled:{version}"),
            Self::ElevatedRestart => "elevated_restart".to_string(),
            Self::DownloadFailed => "download_failed".to_string(),
            Self::AdminRequired => "admin_required".to_string(),
            Self::CannotSaveDownload => "cannot_save_download".to_string(),
            Self::ReplaceFailed => "replace_failed".to_string(),
            Self::UnpackFailed => "unpack_failed".to_string(),
            Self::TargetBusy => "target_busy".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Process-wide result reported to an automated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitResult {
    pub exit_code: i32,
    pub message: String,
    pub ci_mode: bool,
}

#[derive(Serialize)]
struct ExitRecord<'a> {
    exit: i32,
    message: &'a str,
}

impl ExitResult {
    pub fn from_outcome(outcome: &UpdateOutcome, ci_mode: bool) -> Self {
        Self {
            exit_code: outcome.exit_code(),
            message: outcome.message(),
            ci_mode,
        }
    }

    /// Structured `{exit, message}` line written in CI mode.
    pub fn to_json_line(&self) -> String {
        let record = ExitRecord {
            exit: self.exit_code,
            message: &self.message,
        };
        serde_json::to_string(&record).unwrap_or_else(|_| {
            format!(
                "{{\"exit\":{},\"message\":\"{}\"}}",
                self.exit_code,
                self.message.replace('"', "'")
            )
        })
    }
}
