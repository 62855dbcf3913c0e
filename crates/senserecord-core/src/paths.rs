//! BIDS `sourcedata` path derivation
//!
//! Raw CSV recordings land in
//! `<root>/sourcedata/sub-<sub>/ses-<ses>/<type>/sub-<sub>_ses-<ses>_task-<task>_run-<run>_<modality>.csv`
//! with a `.json` sidecar next to the data file. An existing data file is
//! never overwritten.

use crate::error::{FilesystemError, SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Placeholder data type when neither type nor modality is given
pub const UNKNOWN_DATA_TYPE: &str = "DATA-TYPE-UNKNOWN";

/// Placeholder modality when neither type nor modality is given
pub const UNKNOWN_MODALITY: &str = "MODALITY-UNKNOWN";

/// Identifiers that name a single recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingParams {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "ses")]
    pub session: String,
    pub task: String,
    pub run: String,
    #[serde(rename = "acq", default, skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<String>,
    #[serde(alias = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
}

impl RecordingParams {
    pub fn new(
        subject: impl Into<String>,
        session: impl Into<String>,
        task: impl Into<String>,
        run: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            session: session.into(),
            task: task.into(),
            run: run.into(),
            acquisition: None,
            data_type: None,
            modality: None,
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_modality(mut self, modality: impl Into<String>) -> Self {
        self.modality = Some(modality.into());
        self
    }

    pub fn with_acquisition(mut self, acquisition: impl Into<String>) -> Self {
        self.acquisition = Some(acquisition.into());
        self
    }

    /// Fill in data type and modality from each other, or from placeholders
    ///
    /// Afterwards both are always `Some`. Applying it again changes nothing.
    pub fn resolve_defaults(&mut self) {
        let data_type = non_empty(&self.data_type);
        let modality = non_empty(&self.modality);
        let (data_type, modality) = match (data_type, modality) {
            (Some(t), Some(m)) => (t, m),
            (Some(t), None) => (t.clone(), t),
            (None, Some(m)) => (m.clone(), m),
            (None, None) => (UNKNOWN_DATA_TYPE.to_string(), UNKNOWN_MODALITY.to_string()),
        };
        self.data_type = Some(data_type);
        self.modality = Some(modality);
    }

    /// Copy with defaults resolved
    pub fn resolved(&self) -> Self {
        let mut params = self.clone();
        params.resolve_defaults();
        params
    }

    /// Reject labels that are empty or would escape the output tree
    pub fn validate(&self) -> SessionResult<()> {
        let mut labels = vec![
            ("sub", self.subject.as_str()),
            ("ses", self.session.as_str()),
            ("task", self.task.as_str()),
            ("run", self.run.as_str()),
        ];
        if let Some(t) = self.data_type.as_deref() {
            labels.push(("type", t));
        }
        if let Some(m) = self.modality.as_deref() {
            labels.push(("modality", m));
        }
        for (field, value) in labels {
            if value.trim().is_empty() {
                return Err(SessionError::InvalidParameter(format!(
                    "{field} must not be empty"
                )));
            }
            if value == "." || value == ".." || value.contains(['/', '\\']) {
                return Err(SessionError::InvalidParameter(format!(
                    "{field} must be a plain label (got '{value}')"
                )));
            }
        }
        Ok(())
    }

    /// `sub-X_ses-Y_task-Z_run-N_<modality>` without extension
    fn file_stem(&self) -> String {
        let resolved = self.resolved();
        format!(
            "sub-{}_ses-{}_task-{}_run-{}_{}",
            resolved.subject,
            resolved.session,
            resolved.task,
            resolved.run,
            resolved.modality.as_deref().unwrap_or(UNKNOWN_MODALITY)
        )
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Resolved output locations for one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingPaths {
    /// Directory holding the data file and sidecar
    pub directory: PathBuf,
    /// Data file name (`.csv`)
    pub data_file: String,
    /// Sidecar file name (`.json`)
    pub sidecar_file: String,
}

impl RecordingPaths {
    /// Validate, create the directory, and check for collisions
    pub fn prepare(output_root: &Path, params: &RecordingParams) -> SessionResult<Self> {
        params.validate()?;
        let (directory, data_file) = build_data_path(output_root, params)?;
        let sidecar_file = build_sidecar_path(&directory, params);
        Ok(Self {
            directory,
            data_file,
            sidecar_file,
        })
    }

    pub fn data_path(&self) -> PathBuf {
        self.directory.join(&self.data_file)
    }

    pub fn sidecar_path(&self) -> PathBuf {
        self.directory.join(&self.sidecar_file)
    }

    /// Driver sink descriptor that writes a fresh file
    pub fn sink(&self) -> String {
        format!("file://{}:w", self.data_path().display())
    }
}

/// Output directory for a recording, without touching the filesystem
///
/// Unlabelled recordings (placeholder data type) are filed under the
/// modality placeholder so the directory matches the file name suffix.
pub fn data_directory(output_root: &Path, params: &RecordingParams) -> PathBuf {
    let resolved = params.resolved();
    let data_type = resolved.data_type.as_deref().unwrap_or(UNKNOWN_DATA_TYPE);
    let folder = if data_type == UNKNOWN_DATA_TYPE {
        resolved.modality.as_deref().unwrap_or(UNKNOWN_MODALITY)
    } else {
        data_type
    };
    output_root
        .join("sourcedata")
        .join(format!("sub-{}", resolved.subject))
        .join(format!("ses-{}", resolved.session))
        .join(folder)
}

/// Resolve and create the data directory and name the data file
///
/// Fails if `output_root` is missing (before any directory is created) or if
/// the data file already exists.
pub fn build_data_path(
    output_root: &Path,
    params: &RecordingParams,
) -> SessionResult<(PathBuf, String)> {
    if !output_root.is_dir() {
        return Err(FilesystemError::MissingOutputRoot(output_root.to_path_buf()).into());
    }

    let directory = data_directory(output_root, params);
    fs::create_dir_all(&directory).map_err(|source| FilesystemError::CreateDirectory {
        path: directory.clone(),
        source,
    })?;

    let data_file = format!("{}.csv", params.file_stem());
    let data_path = directory.join(&data_file);
    if data_path.exists() {
        return Err(SessionError::Collision { path: data_path });
    }

    tracing::debug!(path = %data_path.display(), "Resolved recording data path");
    Ok((directory, data_file))
}

/// Sidecar file name paired with the data file in `directory`
pub fn build_sidecar_path(_directory: &Path, params: &RecordingParams) -> String {
    format!("{}.json", params.file_stem())
}

/// Split a `file://<path>:<mode>` sink into its path and mode
pub fn parse_sink(sink: &str) -> Option<(PathBuf, &str)> {
    let rest = sink.strip_prefix("file://")?;
    let (path, mode) = rest.rsplit_once(':')?;
    if path.is_empty() || !matches!(mode, "w" | "a") {
        return None;
    }
    Some((PathBuf::from(path), mode))
}
