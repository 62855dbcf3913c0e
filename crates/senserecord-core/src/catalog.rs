//! Static catalog of supported boards
//!
//! Identities follow BrainFlow board names. Sampling rates and EEG channel
//! labels are the defaults those boards report. A [`DeviceSpec`] can only be
//! obtained from this table, so holding one proves the identity is valid.

use serde::Serialize;

/// Static facts about one supported board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSpec {
    /// Board identity, e.g. `SYNTHETIC_BOARD`
    pub name: &'static str,
    /// Sampling rate in Hz
    pub sampling_rate: u32,
    /// EEG channel labels in stream order
    pub channel_names: &'static [&'static str],
}

impl DeviceSpec {
    /// Number of EEG channels
    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }
}

/// Identity of the simulated board that ships with the default driver
pub const SYNTHETIC_BOARD: &str = "SYNTHETIC_BOARD";

const SIXTEEN_CHANNELS: &[&str] = &[
    "Fp1", "Fp2", "C3", "C4", "P7", "P8", "O1", "O2", "F7", "F8", "F3", "F4", "T7", "T8", "P3",
    "P4",
];

const MUSE_CHANNELS: &[&str] = &["TP9", "AF7", "AF8", "TP10"];

static DEVICES: &[DeviceSpec] = &[
    DeviceSpec {
        name: SYNTHETIC_BOARD,
        sampling_rate: 250,
        channel_names: SIXTEEN_CHANNELS,
    },
    DeviceSpec {
        name: "CYTON_BOARD",
        sampling_rate: 250,
        channel_names: &["Fp1", "Fp2", "C3", "C4", "P7", "P8", "O1", "O2"],
    },
    DeviceSpec {
        name: "GANGLION_BOARD",
        sampling_rate: 200,
        channel_names: &["Fp1", "Fp2", "O1", "O2"],
    },
    DeviceSpec {
        name: "CYTON_DAISY_BOARD",
        sampling_rate: 125,
        channel_names: SIXTEEN_CHANNELS,
    },
    DeviceSpec {
        name: "BRAINBIT_BOARD",
        sampling_rate: 250,
        channel_names: &["T3", "T4", "O1", "O2"],
    },
    DeviceSpec {
        name: "UNICORN_BOARD",
        sampling_rate: 250,
        channel_names: &["Fz", "C3", "Cz", "C4", "Pz", "PO7", "Oz", "PO8"],
    },
    DeviceSpec {
        name: "MUSE_2_BOARD",
        sampling_rate: 256,
        channel_names: MUSE_CHANNELS,
    },
    DeviceSpec {
        name: "MUSE_S_BOARD",
        sampling_rate: 256,
        channel_names: MUSE_CHANNELS,
    },
    DeviceSpec {
        name: "CROWN_BOARD",
        sampling_rate: 256,
        channel_names: &["CP3", "C3", "F5", "PO3", "PO4", "F6", "C4", "CP4"],
    },
];

/// Look up a board identity
pub fn resolve(identity: &str) -> Option<&'static DeviceSpec> {
    DEVICES.iter().find(|d| d.name == identity)
}

/// Whether the identity names a supported board
pub fn is_known(identity: &str) -> bool {
    resolve(identity).is_some()
}

/// Every supported board, in catalog order
pub fn all() -> &'static [DeviceSpec] {
    DEVICES
}

pub fn sampling_rate(identity: &str) -> Option<u32> {
    resolve(identity).map(|d| d.sampling_rate)
}

pub fn channel_names(identity: &str) -> Option<&'static [&'static str]> {
    resolve(identity).map(|d| d.channel_names)
}

pub fn channel_count(identity: &str) -> Option<usize> {
    resolve(identity).map(DeviceSpec::channel_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_entry_resolves_to_itself() {
        for device in all() {
            let resolved = resolve(device.name).unwrap();
            assert_eq!(resolved, device);
            assert!(resolved.sampling_rate > 0);
            assert!(resolved.channel_count() > 0);
        }
    }

    #[test]
    fn test_unknown_identities_not_found() {
        for name in ["", "synthetic_board", "SYNTHETIC", "NOT_A_BOARD", " CYTON_BOARD"] {
            assert!(resolve(name).is_none(), "{name:?} should not resolve");
            assert!(!is_known(name));
            assert_eq!(sampling_rate(name), None);
            assert_eq!(channel_count(name), None);
        }
    }

    #[test]
    fn test_synthetic_board_facts() {
        assert_eq!(sampling_rate(SYNTHETIC_BOARD), Some(250));
        assert_eq!(channel_count(SYNTHETIC_BOARD), Some(16));
        assert_eq!(channel_names(SYNTHETIC_BOARD).unwrap()[0], "Fp1");
    }

    #[test]
    fn test_identities_are_unique() {
        let mut names: Vec<_> = all().iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all().len());
    }
}
