//! Simulated board that streams generated EEG to a CSV file
//!
//! Behaves like a real board from the session's point of view: it must be
//! prepared before streaming, refuses to start twice, and writes rows at the
//! catalog sampling rate on a background thread until stopped.
//!
//! ## File Format
//!
//! Header `sample_index,<channel names...>,timestamp`, then one row per sample.
//! Channel values are microvolts, timestamps are Unix seconds.

use crate::catalog::DeviceSpec;
use crate::driver::DeviceConnection;
use crate::error::DeviceError;
use crate::paths::parse_sink;
use std::f64::consts::TAU;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Interval between writer wakeups
const TICK: Duration = Duration::from_millis(20);

/// Handle to a running stream writer thread
struct StreamHandle {
    stop_flag: Arc<AtomicBool>,
    /// Rows written so far, updated by the writer thread
    rows_written: Arc<AtomicU64>,
    thread: Option<std::thread::JoinHandle<Result<(), DeviceError>>>,
}

impl StreamHandle {
    /// Stop the writer thread and wait for its final flush
    fn stop(&mut self) -> Result<(), DeviceError> {
        self.stop_flag.store(true, Ordering::Release);
        match self.thread.take() {
            Some(h) => h
                .join()
                .map_err(|_| DeviceError::Io("stream writer thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// The `SYNTHETIC_BOARD` connection
pub struct SyntheticBoard {
    device: &'static DeviceSpec,
    prepared: bool,
    stream: Option<StreamHandle>,
}

impl SyntheticBoard {
    pub fn new(device: &'static DeviceSpec) -> Self {
        Self {
            device,
            prepared: false,
            stream: None,
        }
    }

    /// Whether a stream writer is active
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Rows written by the active stream, 0 when idle
    pub fn rows_written(&self) -> u64 {
        self.stream
            .as_ref()
            .map(|s| s.rows_written.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn open_sink(&self, sink: &str) -> Result<(BufWriter<File>, bool), DeviceError> {
        let (path, mode) = parse_sink(sink).ok_or_else(|| DeviceError::InvalidSink(sink.into()))?;
        let file = match mode {
            "a" => OpenOptions::new().create(true).append(true).open(&path),
            _ => File::create(&path),
        }
        .map_err(|e| DeviceError::Io(format!("{}: {e}", path.display())))?;
        let needs_header = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
        tracing::debug!(path = %path.display(), mode, "Opened synthetic stream sink");
        Ok((BufWriter::with_capacity(8192, file), needs_header))
    }
}

impl DeviceConnection for SyntheticBoard {
    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.prepared = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        if !self.prepared {
            return Err(DeviceError::NotPrepared);
        }
        // Releasing mid-stream tears the writer down
        let result = match self.stream.take() {
            Some(mut stream) => stream.stop(),
            None => Ok(()),
        };
        self.prepared = false;
        result
    }

    fn start_stream(&mut self, buffer_size: usize, sink: &str) -> Result<(), DeviceError> {
        if !self.prepared {
            return Err(DeviceError::NotPrepared);
        }
        if self.stream.is_some() {
            return Err(DeviceError::AlreadyStreaming);
        }
        if buffer_size == 0 {
            return Err(DeviceError::InvalidBufferSize(buffer_size));
        }

        let (mut writer, needs_header) = self.open_sink(sink)?;
        if needs_header {
            write_header(&mut writer, self.device)
                .map_err(|e| DeviceError::Io(e.to_string()))?;
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let rows_written = Arc::new(AtomicU64::new(0));
        let generator = SignalGenerator::new(self.device, buffer_size);

        let flag = Arc::clone(&stop_flag);
        let rows = Arc::clone(&rows_written);
        let thread = std::thread::Builder::new()
            .name(format!("{}-stream", self.device.name.to_lowercase()))
            .spawn(move || generator.run(writer, flag, rows))
            .map_err(|e| DeviceError::Io(format!("failed to spawn stream writer: {e}")))?;

        self.stream = Some(StreamHandle {
            stop_flag,
            rows_written,
            thread: Some(thread),
        });

        tracing::info!(
            board = self.device.name,
            rate = self.device.sampling_rate,
            channels = self.device.channel_count(),
            "Synthetic stream started"
        );
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<(), DeviceError> {
        let mut stream = self.stream.take().ok_or(DeviceError::NotStreaming)?;
        let rows = stream.rows_written.load(Ordering::Relaxed);
        stream.stop()?;
        tracing::info!(board = self.device.name, rows, "Synthetic stream stopped");
        Ok(())
    }
}

fn write_header(writer: &mut impl Write, device: &DeviceSpec) -> std::io::Result<()> {
    write!(writer, "sample_index")?;
    for name in device.channel_names {
        write!(writer, ",{name}")?;
    }
    writeln!(writer, ",timestamp")?;
    writer.flush()
}

/// Produces alpha-band sine rows at the board's sampling rate
struct SignalGenerator {
    rate: u32,
    channels: usize,
    /// Maximum backlog kept when the writer falls behind
    buffer_size: u64,
}

impl SignalGenerator {
    fn new(device: &DeviceSpec, buffer_size: usize) -> Self {
        Self {
            rate: device.sampling_rate,
            channels: device.channel_count(),
            buffer_size: buffer_size as u64,
        }
    }

    fn sample(&self, index: u64, channel: usize) -> f64 {
        let t = index as f64 / self.rate as f64;
        let freq = 8.0 + channel as f64 * 0.5;
        let amplitude = 20.0 + channel as f64;
        amplitude * (TAU * freq * t).sin()
    }

    fn write_row(&self, w: &mut impl Write, index: u64, start_unix: f64) -> std::io::Result<()> {
        write!(w, "{index}")?;
        for channel in 0..self.channels {
            write!(w, ",{:.6}", self.sample(index, channel))?;
        }
        let timestamp = start_unix + index as f64 / self.rate as f64;
        writeln!(w, ",{timestamp:.6}")
    }

    fn run(
        self,
        mut writer: BufWriter<File>,
        stop_flag: Arc<AtomicBool>,
        rows_written: Arc<AtomicU64>,
    ) -> Result<(), DeviceError> {
        let started = Instant::now();
        let start_unix = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let mut next_index: u64 = 0;
        let mut written: u64 = 0;

        let io = |e: std::io::Error| DeviceError::Io(e.to_string());

        loop {
            let stopping = stop_flag.load(Ordering::Acquire);

            let due = (started.elapsed().as_secs_f64() * self.rate as f64) as u64;
            if due > next_index + self.buffer_size {
                let dropped = due - self.buffer_size - next_index;
                tracing::warn!(dropped, "Synthetic stream fell behind, dropping samples");
                next_index += dropped;
            }
            while next_index < due {
                if let Err(e) = self.write_row(&mut writer, next_index, start_unix) {
                    tracing::error!(error = %e, "Failed to write synthetic sample");
                    return Err(io(e));
                }
                next_index += 1;
                written += 1;
            }
            writer.flush().map_err(io)?;
            rows_written.store(written, Ordering::Relaxed);

            if stopping {
                break;
            }
            std::thread::sleep(TICK);
        }

        writer.get_ref().sync_all().map_err(io)?;
        tracing::debug!(rows = written, "Synthetic stream writer exited");
        Ok(())
    }
}
