use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use shipyard_runtime::{BuildArtifact, UploadOutcome};
use shipyard_schema::Version;
use std::path::PathBuf;

/// Mutable state of one controller run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ReleaseSession {
    pub current: Option<Version>,
    pub target: Option<Version>,
    pub confirmed: bool,
    pub updated_manifests: Vec<PathBuf>,
    pub removed_paths: Vec<PathBuf>,
    pub artifacts: Vec<BuildArtifact>,
    pub uploads: Vec<UploadOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRecord {
    pub registry: String,
    pub display_name: String,
    pub elapsed_secs: f64,
    pub links: Vec<String>,
    pub project_url: Option<String>,
    pub install_hint: Option<String>,
}

/// Summary of a completed release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseReport {
    pub package: String,
    pub previous_version: Version,
    pub new_version: Version,
    pub artifacts: Vec<BuildArtifact>,
    pub uploads: Vec<UploadRecord>,
    pub install_hint: Option<String>,
    pub completed_at: String,
}

impl ReleaseReport {
    pub fn timestamp(now: DateTime<Utc>) -> String {
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn total_size(&self) -> u64 {
        self.artifacts.iter().map(|a| a.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(ReleaseReport::timestamp(at), "2026-10-18T09:30:00Z");
    }

    #[test]
    fn report_serializes_versions_as_strings() {
        let report = ReleaseReport {
            package: "SunnyNet".to_owned(),
            previous_version: Version::new(1, 3, 3),
            new_version: Version::new(1, 4, 0),
            artifacts: vec![BuildArtifact {
                file_name: "a.whl".to_owned(),
                path: PathBuf::from("dist/a.whl"),
                size: 10,
            }],
            uploads: Vec::new(),
            install_hint: Some("pip install SunnyNet==1.4.0".to_owned()),
            completed_at: "2026-10-18T09:30:00Z".to_owned(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["previous_version"], "1.3.3");
        assert_eq!(json["new_version"], "1.4.0");
        assert_eq!(json["artifacts"][0]["size"], 10);
        assert_eq!(report.total_size(), 10);
    }
}
