//! Board driver seam
//!
//! A [`DeviceDriver`] turns a catalog entry plus [`ConnectionParams`] into a
//! [`DeviceConnection`], the handle a session drives through
//! prepare / start_stream / stop_stream / release.
//!
//! - [`DefaultDriver`] serves `SYNTHETIC_BOARD` with a simulated streamer
//!   ([`synthetic`]) and reports every other board as having no driver
//! - `mock` (tests and the `mock` feature) provides a scriptable connection
//!   with call counters

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod synthetic;

use crate::catalog::{DeviceSpec, SYNTHETIC_BOARD};
use crate::error::DeviceError;
use crate::params::ConnectionParams;

/// One logical connection to a physical or simulated board
///
/// Implementations are driven by a single caller at a time; the session
/// layer serializes access.
pub trait DeviceConnection: Send {
    /// Acquire the board session
    fn prepare(&mut self) -> Result<(), DeviceError>;

    /// Release the board session
    fn release(&mut self) -> Result<(), DeviceError>;

    /// Begin streaming into `sink` (`file://<path>:<mode>`)
    fn start_stream(&mut self, buffer_size: usize, sink: &str) -> Result<(), DeviceError>;

    /// Stop an active stream
    fn stop_stream(&mut self) -> Result<(), DeviceError>;
}

/// Factory for board connections
pub trait DeviceDriver: Send + Sync {
    fn connect(
        &self,
        device: &'static DeviceSpec,
        params: &ConnectionParams,
    ) -> Result<Box<dyn DeviceConnection>, DeviceError>;
}

/// Driver shipped with senserecord
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDriver;

impl DeviceDriver for DefaultDriver {
    fn connect(
        &self,
        device: &'static DeviceSpec,
        params: &ConnectionParams,
    ) -> Result<Box<dyn DeviceConnection>, DeviceError> {
        if device.name == SYNTHETIC_BOARD {
            return Ok(Box::new(synthetic::SyntheticBoard::new(device)));
        }
        tracing::debug!(
            board = device.name,
            params = ?params,
            "No hardware driver compiled in; board will report unreachable"
        );
        Ok(Box::new(UnavailableBoard { name: device.name }))
    }
}

/// Connection for boards without a driver in this build
struct UnavailableBoard {
    name: &'static str,
}

impl DeviceConnection for UnavailableBoard {
    fn prepare(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::NoDriver(self.name.to_string()))
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::NotPrepared)
    }

    fn start_stream(&mut self, _buffer_size: usize, _sink: &str) -> Result<(), DeviceError> {
        Err(DeviceError::NoDriver(self.name.to_string()))
    }

    fn stop_stream(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::NotStreaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn test_default_driver_connects_synthetic() {
        let device = catalog::resolve(SYNTHETIC_BOARD).unwrap();
        let mut conn = DefaultDriver
            .connect(device, &ConnectionParams::default())
            .unwrap();
        conn.prepare().unwrap();
        conn.release().unwrap();
    }

    #[test]
    fn test_default_driver_hardware_unavailable() {
        let device = catalog::resolve("CYTON_BOARD").unwrap();
        let mut conn = DefaultDriver
            .connect(device, &ConnectionParams::default())
            .unwrap();
        assert_eq!(
            conn.prepare(),
            Err(DeviceError::NoDriver("CYTON_BOARD".to_string()))
        );
    }
}
