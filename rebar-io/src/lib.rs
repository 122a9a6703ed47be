use std::fs;
use std::path::{Path, PathBuf};

use rebar_core::entity::DrawingSnapshot;
use rebar_core::schedule::{DesignationSummary, Schedule, ScheduleTotals};
use rebar_layout::DiagramLayout;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid drawing snapshot {path:?}: {source}")]
    DecodeError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode schedule: {0}")]
    EncodeError(#[source] serde_json::Error),
}

/// CAD 协作方的替身：读取图元快照。
pub trait SnapshotLoader {
    fn load(&self, path: &Path) -> Result<DrawingSnapshot, IoError>;
}

/// 计料表输出。
pub trait ScheduleSaver {
    fn save(&self, document: &ScheduleDocument, path: &Path) -> Result<(), IoError>;
}

/// JSON 格式的快照读取与计料表写出。
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotFacade {
    pretty: bool,
}

impl JsonSnapshotFacade {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// 紧凑输出，不缩进。
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn parse_snapshot(&self, data: &str, path: &Path) -> Result<DrawingSnapshot, IoError> {
        serde_json::from_str(data).map_err(|source| IoError::DecodeError {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl SnapshotLoader for JsonSnapshotFacade {
    fn load(&self, path: &Path) -> Result<DrawingSnapshot, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = self.parse_snapshot(&data, path)?;
        debug!(
            path = %path.display(),
            entities = snapshot.entities.len(),
            "读取图元快照"
        );
        Ok(snapshot)
    }
}

impl ScheduleSaver for JsonSnapshotFacade {
    fn save(&self, document: &ScheduleDocument, path: &Path) -> Result<(), IoError> {
        let data = if self.pretty {
            serde_json::to_string_pretty(document)
        } else {
            serde_json::to_string(document)
        }
        .map_err(IoError::EncodeError)?;
        fs::write(path, data).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), records = document.schedule.len(), "写出计料表");
        Ok(())
    }
}

/// 单条记录的示意图。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordLayout {
    pub record: u64,
    pub layout: DiagramLayout,
}

/// 交给报表协作方的完整输出。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub fingerprint: String,
    pub schedule: Schedule,
    pub summary: Vec<DesignationSummary>,
    pub totals: ScheduleTotals,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layouts: Vec<RecordLayout>,
}

impl ScheduleDocument {
    pub fn new(schedule: Schedule, layouts: Vec<RecordLayout>) -> Result<Self, IoError> {
        let fingerprint = fingerprint(&schedule)?;
        Ok(Self {
            source: None,
            fingerprint,
            summary: schedule.designation_summary(),
            totals: schedule.totals(),
            schedule,
            layouts,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// 计料表规范 JSON 序列化后的 SHA-256 十六进制摘要。
pub fn fingerprint(schedule: &Schedule) -> Result<String, IoError> {
    let canonical = serde_json::to_vec(schedule).map_err(IoError::EncodeError)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_of_empty_schedule_is_stable_hex() {
        let schedule = Schedule::with_zones(["ALL"]);
        let first = fingerprint(&schedule).expect("fingerprint");
        let second = fingerprint(&schedule.clone()).expect("fingerprint");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

        let other = fingerprint(&Schedule::with_zones(["A"])).expect("fingerprint");
        assert_ne!(first, other);
    }

    #[test]
    fn decode_error_carries_path() {
        let facade = JsonSnapshotFacade::new();
        let err = facade
            .parse_snapshot("{ not json", Path::new("broken.json"))
            .unwrap_err();
        match err {
            IoError::DecodeError { path, .. } => assert_eq!(path, PathBuf::from("broken.json")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
