//! Study configuration: tasks, their boards, and server settings
//!
//! Loaded from TOML at `<config_dir>/senserecord/config.toml` by default.
//! Validation is eager: a config that loads is one every front-end can run.
//!
//! ```toml
//! [server]
//! port = 8000
//!
//! [tasks.rest]
//! output_root = "/data/study"
//! label = "Resting state"
//! modality = "eeg"
//!
//! [tasks.rest.boards.headset]
//! name = "CYTON_BOARD"
//! manufacturer = "OpenBCI"
//! params = { serial_port = "/dev/ttyUSB0" }
//! ```

use crate::catalog;
use crate::params::ConnectionParams;
use crate::paths::RecordingParams;
use crate::sidecar::{BoardMetadata, CapMetadata, RecordingMetadata, TaskMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading or validating a config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid config file {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    #[error("Task {0} is not defined in the config file")]
    UnknownTask(String),
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// REST server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// One board used by a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    /// Catalog identity, e.g. `CYTON_BOARD`
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<CapMetadata>,
    /// Overrides the task's data type for this board
    #[serde(alias = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Overrides the task's modality for this board
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(default)]
    pub params: ConnectionParams,
}

/// One recording task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(alias = "bidsroot")]
    pub output_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(alias = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    /// Session labels keyed by session id, shown to operators
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sessions: BTreeMap<String, String>,
    #[serde(default)]
    pub boards: BTreeMap<String, BoardConfig>,
}

impl TaskConfig {
    /// Sidecar metadata for a recording of this task on `board`
    pub fn metadata_for(&self, board: &BoardConfig) -> RecordingMetadata {
        RecordingMetadata {
            task: TaskMetadata {
                label: self.label.clone(),
                description: self.description.clone(),
                instructions: self.instructions.clone(),
                institution: self.institution.clone(),
            },
            board: BoardMetadata {
                manufacturer: board.manufacturer.clone(),
                modelname: board.modelname.clone(),
                cap: board.cap.clone(),
            },
        }
    }

    /// Recording identifiers for `board` in this task
    ///
    /// `task` is the task's config key. Board-level data type and modality
    /// take precedence over the task's.
    pub fn recording_params(
        &self,
        task: &str,
        board: &BoardConfig,
        sub: &str,
        ses: &str,
        run: &str,
    ) -> RecordingParams {
        let mut params = RecordingParams::new(sub, ses, task, run);
        params.data_type = board.data_type.clone().or_else(|| self.data_type.clone());
        params.modality = board.modality.clone().or_else(|| self.modality.clone());
        params
    }
}

/// Top-level config document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

impl StudyConfig {
    /// Config file path: `<config_dir>/senserecord/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("senserecord")
            .join("config.toml")
    }

    /// Read, parse, and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents, path)?;
        tracing::info!(
            path = %path.display(),
            tasks = config.tasks.len(),
            "Loaded config from disk"
        );
        Ok(config)
    }

    /// Parse and validate TOML; `path` is only used in error messages
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    /// Check every task and board
    pub fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        if self.tasks.is_empty() {
            return Err(invalid("required root key 'tasks' is missing or empty".into()));
        }
        for (task_name, task) in &self.tasks {
            if task.output_root.as_os_str().is_empty() {
                return Err(invalid(format!(
                    "required key 'output_root' is empty in task {task_name}"
                )));
            }
            if task.boards.is_empty() {
                return Err(invalid(format!(
                    "required key 'boards' is missing from task {task_name}"
                )));
            }
            for (board_key, board) in &task.boards {
                if !catalog::is_known(&board.name) {
                    return Err(invalid(format!(
                        "board name {} is unknown in {board_key} section of task {task_name}",
                        board.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn task(&self, name: &str) -> Result<&TaskConfig, ConfigError> {
        self.tasks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTask(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
port = 8123

[tasks.rest]
output_root = "/data/study"
label = "Resting state"
institution = "Lab"
modality = "eeg"
sessions = { "01" = "Baseline", "02" = "Follow-up" }

[tasks.rest.boards.headset]
name = "CYTON_BOARD"
manufacturer = "OpenBCI"
modelname = "Cyton"
params = { serial_port = "/dev/ttyUSB0" }
cap = { manufacturer = "OpenBCI", modelname = "Gel cap" }

[tasks.rest.boards.sim]
name = "SYNTHETIC_BOARD"
type = "beh"
"#;

    fn parse(s: &str) -> Result<StudyConfig, ConfigError> {
        StudyConfig::parse(s, Path::new("test.toml"))
    }

    #[test]
    fn test_parse_sample() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.server.host, "127.0.0.1");
        let task = config.task("rest").unwrap();
        assert_eq!(task.output_root, PathBuf::from("/data/study"));
        assert_eq!(task.boards.len(), 2);
        assert_eq!(task.sessions["02"], "Follow-up");
        let headset = &task.boards["headset"];
        assert_eq!(headset.params.serial_port.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_metadata_and_params_from_task() {
        let config = parse(SAMPLE).unwrap();
        let task = config.task("rest").unwrap();
        let metadata = task.metadata_for(&task.boards["headset"]);
        assert_eq!(metadata.task.label.as_deref(), Some("Resting state"));
        assert_eq!(metadata.board.modelname.as_deref(), Some("Cyton"));
        assert_eq!(
            metadata.board.cap.unwrap().modelname.as_deref(),
            Some("Gel cap")
        );

        let params = task.recording_params("rest", &task.boards["headset"], "01", "02", "3");
        assert_eq!(params.task, "rest");
        assert_eq!(params.modality.as_deref(), Some("eeg"));
        assert_eq!(params.data_type, None);

        let sim = task.recording_params("rest", &task.boards["sim"], "01", "02", "3");
        assert_eq!(sim.data_type.as_deref(), Some("beh"));
        assert_eq!(sim.modality.as_deref(), Some("eeg"));
    }

    #[test]
    fn test_bidsroot_alias() {
        let config = parse(
            r#"
[tasks.t]
bidsroot = "/x"
[tasks.t.boards.b]
name = "SYNTHETIC_BOARD"
"#,
        )
        .unwrap();
        assert_eq!(config.tasks["t"].output_root, PathBuf::from("/x"));
    }

    #[test]
    fn test_missing_tasks_rejected() {
        let err = parse("[server]\nport = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("tasks"));
    }

    #[test]
    fn test_task_without_boards_rejected() {
        let err = parse("[tasks.t]\noutput_root = \"/x\"\n").unwrap_err();
        assert!(err.to_string().contains("boards"));
    }

    #[test]
    fn test_missing_output_root_rejected() {
        let err = parse("[tasks.t.boards.b]\nname = \"SYNTHETIC_BOARD\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_board_rejected() {
        let err = parse(
            r#"
[tasks.t]
output_root = "/x"
[tasks.t.boards.b]
name = "MADE_UP_BOARD"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("MADE_UP_BOARD"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = parse(
            r#"
[tasks.t]
output_root = "/x"
[tasks.t.boards.b]
name = "SYNTHETIC_BOARD"
params = { serial = "/dev/ttyUSB0" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_task_lookup() {
        let config = parse(SAMPLE).unwrap();
        assert!(matches!(
            config.task("nope"),
            Err(ConfigError::UnknownTask(_))
        ));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = StudyConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = StudyConfig::load(&path).unwrap();
        assert!(config.tasks.contains_key("rest"));
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = StudyConfig::default_path();
        assert!(path.ends_with("senserecord/config.toml"));
    }
}
