//! One-shot frame timing capture.
//!
//! After `warmup_frames` ticks, the timings of the next `measured_frames`
//! ticks are buffered. On the tick right after the window the buffer is
//! written to a CSV file, preceded by the draw batch registry's instance
//! counts at that tick. Capture then stops for good, whether or not the
//! write succeeded.
//!
//! ```text
//! Total instance count,10000
//! Static instances,10000
//! Dynamic instances,0
//!
//! Frame,CPU Total Frame Time (ms),GPU Frame Time (ms),...
//! 1,16.6,4.2,...
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::batch::DrawBatchRegistry;
use crate::profiling::{CpuProfiler, GpuTimerManager, labels};

/// Benchmark capture settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Ticks ignored before capture starts.
    pub warmup_frames: u32,
    /// Ticks captured.
    pub measured_frames: u32,
    /// Destination of the CSV file.
    pub output_path: PathBuf,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_frames: 1000,
            measured_frames: 1000,
            output_path: PathBuf::from("frame_times.csv"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Cpu,
    Gpu,
}

struct Column {
    header: &'static str,
    source: Source,
    label: &'static str,
}

const fn column(header: &'static str, source: Source, label: &'static str) -> Column {
    Column {
        header,
        source,
        label,
    }
}

const COLUMN_COUNT: usize = 14;

const COLUMNS: [Column; COLUMN_COUNT] = [
    column("CPU Total Frame Time (ms)", Source::Cpu, labels::FRAME_TIME),
    column("GPU Frame Time (ms)", Source::Gpu, labels::GPU_FRAME_TIME),
    column("CPU Render Frame (ms)", Source::Cpu, labels::CPU_RENDER_FRAME),
    column("CPU Instance Update (GPU-driven) (ms)", Source::Cpu, labels::INSTANCE_UPDATE),
    column("CPU Culling (GPU-driven) (ms)", Source::Cpu, labels::CULLING),
    column("CPU Geometry (GPU-driven) (ms)", Source::Cpu, labels::GPU_DRIVEN_GEOMETRY),
    column("CPU Geometry (CPU-driven) (ms)", Source::Cpu, labels::GEOMETRY),
    column("CPU Lighting (ms)", Source::Cpu, labels::LIGHTING),
    column("CPU Wait for GPU (ms)", Source::Cpu, labels::GPU_SYNC),
    column("GPU Instance Update (GPU-driven) (ms)", Source::Gpu, labels::INSTANCE_UPDATE),
    column("GPU Culling (GPU-driven) (ms)", Source::Gpu, labels::CULLING),
    column("GPU Geometry (GPU-driven) (ms)", Source::Gpu, labels::GPU_DRIVEN_GEOMETRY),
    column("GPU Geometry (CPU-driven) (ms)", Source::Gpu, labels::GEOMETRY),
    column("GPU Lighting(ms)", Source::Gpu, labels::LIGHTING),
];

/// Where a capture is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    WarmingUp,
    Measuring,
    /// The artifact was written; nothing else will be captured.
    Written,
    /// Writing failed; nothing else will be captured.
    Failed,
}

/// Buffers timings of a fixed frame window and writes them once.
#[derive(Debug)]
pub struct BenchmarkCapture {
    config: BenchmarkConfig,
    tick: u64,
    rows: Vec<[f64; COLUMN_COUNT]>,
    state: CaptureState,
}

impl BenchmarkCapture {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            rows: Vec::with_capacity(config.measured_frames as usize),
            config,
            tick: 0,
            state: CaptureState::WarmingUp,
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Whether capture has stopped for good.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, CaptureState::Written | CaptureState::Failed)
    }

    /// Number of frames buffered so far.
    pub fn rows_captured(&self) -> usize {
        self.rows.len()
    }

    /// Account for one tick.
    ///
    /// A failed write moves the capture to [`CaptureState::Failed`] and is
    /// returned once; later ticks are ignored.
    pub fn sample(
        &mut self,
        cpu: &CpuProfiler,
        gpu: &GpuTimerManager,
        registry: &DrawBatchRegistry,
    ) -> io::Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        let tick = self.tick;
        self.tick += 1;

        let warmup = u64::from(self.config.warmup_frames);
        let window_end = warmup + u64::from(self.config.measured_frames);
        if tick < warmup {
            return Ok(());
        }
        if tick < window_end {
            if self.state == CaptureState::WarmingUp {
                log::info!(
                    "Benchmark warm-up done, capturing {} frames",
                    self.config.measured_frames
                );
                self.state = CaptureState::Measuring;
            }
            let row = std::array::from_fn(|i| {
                let column = &COLUMNS[i];
                match column.source {
                    Source::Cpu => cpu.last_time(column.label),
                    Source::Gpu => gpu.last_time(column.label),
                }
                .unwrap_or(0.0)
            });
            self.rows.push(row);
            return Ok(());
        }

        match self.write_file(&self.config.output_path, registry) {
            Ok(()) => {
                log::info!(
                    "Benchmark results written to {} ({} frames)",
                    self.config.output_path.display(),
                    self.rows.len()
                );
                self.state = CaptureState::Written;
                Ok(())
            }
            Err(err) => {
                log::error!(
                    "Failed to write benchmark results to {}: {}",
                    self.config.output_path.display(),
                    err
                );
                self.state = CaptureState::Failed;
                Err(err)
            }
        }
    }

    fn write_file(&self, path: &Path, registry: &DrawBatchRegistry) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_report(&mut out, registry)?;
        out.flush()
    }

    /// Write the CSV report for the frames buffered so far.
    pub fn write_report<W: Write>(
        &self,
        out: &mut W,
        registry: &DrawBatchRegistry,
    ) -> io::Result<()> {
        writeln!(out, "Total instance count,{}", registry.instance_count())?;
        writeln!(out, "Static instances,{}", registry.static_instance_count())?;
        writeln!(out, "Dynamic instances,{}", registry.dynamic_instance_count())?;
        writeln!(out)?;

        write!(out, "Frame")?;
        for column in &COLUMNS {
            write!(out, ",{}", column.header)?;
        }
        writeln!(out)?;

        for (index, row) in self.rows.iter().enumerate() {
            write!(out, "{}", index + 1)?;
            for value in row {
                write!(out, ",{}", value)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}
