//! BIDS JSON sidecar generation
//!
//! The sidecar always carries `SamplingFrequency` and `EEGChannelCount` from
//! the catalog. Descriptive fields come from [`RecordingMetadata`] through a
//! fixed field table; absent fields are omitted rather than written as null.

use crate::catalog::DeviceSpec;
use crate::error::FilesystemError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Descriptive metadata supplied with a recording
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingMetadata {
    #[serde(default)]
    pub task: TaskMetadata,
    #[serde(default)]
    pub board: BoardMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<CapMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelname: Option<String>,
}

type FieldGetter = fn(&RecordingMetadata) -> Option<&str>;

fn task_label(m: &RecordingMetadata) -> Option<&str> {
    m.task.label.as_deref()
}

fn task_description(m: &RecordingMetadata) -> Option<&str> {
    m.task.description.as_deref()
}

fn task_instructions(m: &RecordingMetadata) -> Option<&str> {
    m.task.instructions.as_deref()
}

fn task_institution(m: &RecordingMetadata) -> Option<&str> {
    m.task.institution.as_deref()
}

fn board_manufacturer(m: &RecordingMetadata) -> Option<&str> {
    m.board.manufacturer.as_deref()
}

fn board_modelname(m: &RecordingMetadata) -> Option<&str> {
    m.board.modelname.as_deref()
}

fn cap_manufacturer(m: &RecordingMetadata) -> Option<&str> {
    m.board.cap.as_ref().and_then(|c| c.manufacturer.as_deref())
}

fn cap_modelname(m: &RecordingMetadata) -> Option<&str> {
    m.board.cap.as_ref().and_then(|c| c.modelname.as_deref())
}

/// Optional sidecar keys and where their values come from
const OPTIONAL_FIELDS: &[(&str, FieldGetter)] = &[
    ("TaskName", task_label),
    ("TaskDescription", task_description),
    ("Instructions", task_instructions),
    ("InstitutionName", task_institution),
    ("Manufacturer", board_manufacturer),
    ("ManufacturersModelName", board_modelname),
    ("CapManufacturer", cap_manufacturer),
    ("CapManufacturersModelName", cap_modelname),
];

/// Build the sidecar document for a completed recording
pub fn build_sidecar(device: &DeviceSpec, metadata: &RecordingMetadata) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("SamplingFrequency".into(), device.sampling_rate.into());
    doc.insert("EEGChannelCount".into(), device.channel_count().into());
    for (key, get) in OPTIONAL_FIELDS {
        if let Some(value) = get(metadata) {
            doc.insert((*key).into(), value.into());
        }
    }
    doc
}

/// Write a sidecar document as 4-space indented JSON with sorted keys
pub fn write_sidecar(path: &Path, doc: &Map<String, Value>) -> Result<(), FilesystemError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    let sorted: BTreeMap<&String, &Value> = doc.iter().collect();
    sorted
        .serialize(&mut ser)
        .map_err(|source| FilesystemError::SidecarEncode {
            path: path.to_path_buf(),
            source,
        })?;
    buf.push(b'\n');

    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&buf)?;
        file.sync_all()
    };
    write().map_err(|source| FilesystemError::SidecarWrite {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %path.display(), "Sidecar json file written");
    Ok(())
}
