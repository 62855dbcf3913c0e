//! Scriptable in-memory driver
//!
//! Counts every call made against its connections and can be told to fail
//! individual operations. Only built for tests and with the `mock`
//! feature.

use crate::catalog::DeviceSpec;
use crate::driver::{DeviceConnection, DeviceDriver};
use crate::error::DeviceError;
use crate::params::ConnectionParams;
use crate::paths::parse_sink;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Call counters shared by a driver and every connection it hands out
#[derive(Debug, Default)]
pub struct MockCounters {
    pub connect: AtomicUsize,
    pub prepare: AtomicUsize,
    pub release: AtomicUsize,
    pub start_stream: AtomicUsize,
    pub stop_stream: AtomicUsize,
    /// Connections handed out and not yet dropped
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    /// `prepare` calls currently in progress
    pub preparing: AtomicUsize,
    pub max_preparing: AtomicUsize,
}

impl MockCounters {
    /// Total calls that reached the hardware seam (excluding connect)
    pub fn hardware_calls(&self) -> usize {
        self.prepare.load(Ordering::SeqCst)
            + self.release.load(Ordering::SeqCst)
            + self.start_stream.load(Ordering::SeqCst)
            + self.stop_stream.load(Ordering::SeqCst)
    }

    /// Most connections that were open at once
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Most `prepare` calls that overlapped
    pub fn max_preparing(&self) -> usize {
        self.max_preparing.load(Ordering::SeqCst)
    }
}

fn enter(current: &AtomicUsize, max: &AtomicUsize) {
    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
    max.fetch_max(now, Ordering::SeqCst);
}

/// Failure switches, shared and mutable while connections are live
#[derive(Debug, Default)]
pub struct MockScript {
    pub fail_connect: AtomicBool,
    pub fail_prepare: AtomicBool,
    pub fail_release: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    /// Milliseconds `start_stream` blocks before returning
    pub start_delay_ms: AtomicU64,
    /// Milliseconds `prepare` blocks before returning
    pub prepare_delay_ms: AtomicU64,
}

/// Driver producing [`MockConnection`]s
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub counters: Arc<MockCounters>,
    pub script: Arc<MockScript>,
    sinks: Arc<Mutex<Vec<String>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sinks passed to `start_stream`, in call order
    pub fn sinks(&self) -> Vec<String> {
        self.sinks.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn prepare_calls(&self) -> usize {
        self.counters.prepare.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.counters.release.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.counters.start_stream.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.counters.stop_stream.load(Ordering::SeqCst)
    }

    pub fn set_fail_prepare(&self, fail: bool) {
        self.script.fail_prepare.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.script.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.script.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.script.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        self.script
            .start_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_prepare_delay(&self, delay: Duration) {
        self.script
            .prepare_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl DeviceDriver for MockDriver {
    fn connect(
        &self,
        device: &'static DeviceSpec,
        _params: &ConnectionParams,
    ) -> Result<Box<dyn DeviceConnection>, DeviceError> {
        self.counters.connect.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_connect.load(Ordering::SeqCst) {
            return Err(DeviceError::Other(format!(
                "failed to instantiate board object for {}",
                device.name
            )));
        }
        enter(&self.counters.live, &self.counters.max_live);
        Ok(Box::new(MockConnection {
            driver: self.clone(),
            prepared: false,
            streaming: false,
        }))
    }
}

/// Connection that touches nothing but an empty file at the sink path
pub struct MockConnection {
    driver: MockDriver,
    prepared: bool,
    streaming: bool,
}

impl MockConnection {
    fn failing(&self, switch: &AtomicBool, op: &str) -> Result<(), DeviceError> {
        if switch.load(Ordering::SeqCst) {
            Err(DeviceError::Other(format!("simulated {op} failure")))
        } else {
            Ok(())
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.driver.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DeviceConnection for MockConnection {
    fn prepare(&mut self) -> Result<(), DeviceError> {
        let counters = &self.driver.counters;
        counters.prepare.fetch_add(1, Ordering::SeqCst);
        enter(&counters.preparing, &counters.max_preparing);
        let delay = self.driver.script.prepare_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        counters.preparing.fetch_sub(1, Ordering::SeqCst);
        self.failing(&self.driver.script.fail_prepare, "prepare")?;
        self.prepared = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        self.driver.counters.release.fetch_add(1, Ordering::SeqCst);
        self.failing(&self.driver.script.fail_release, "release")?;
        self.prepared = false;
        self.streaming = false;
        Ok(())
    }

    fn start_stream(&mut self, _buffer_size: usize, sink: &str) -> Result<(), DeviceError> {
        self.driver
            .counters
            .start_stream
            .fetch_add(1, Ordering::SeqCst);
        let delay = self.driver.script.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.failing(&self.driver.script.fail_start, "start_stream")?;
        if !self.prepared {
            return Err(DeviceError::NotPrepared);
        }
        if self.streaming {
            return Err(DeviceError::AlreadyStreaming);
        }
        let (path, _) = parse_sink(sink).ok_or_else(|| DeviceError::InvalidSink(sink.into()))?;
        std::fs::write(&path, b"").map_err(|e| DeviceError::Io(e.to_string()))?;
        if let Ok(mut sinks) = self.driver.sinks.lock() {
            sinks.push(sink.to_string());
        }
        self.streaming = true;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<(), DeviceError> {
        self.driver
            .counters
            .stop_stream
            .fetch_add(1, Ordering::SeqCst);
        self.failing(&self.driver.script.fail_stop, "stop_stream")?;
        if !self.streaming {
            return Err(DeviceError::NotStreaming);
        }
        self.streaming = false;
        Ok(())
    }
}
