//! Frame telemetry: named CPU and GPU durations.
//!
//! This module re-exports the Tracy macros and CPU timers from
//! [`ember_core`] and adds GPU timestamp scopes plus the [`Telemetry`]
//! collector owned by the renderer.
//!
//! # Labels
//!
//! CPU and GPU readouts of the same work share a label (see [`labels`]) so
//! the two timelines can be lined up after the fact, e.g. in the benchmark
//! CSV.
//!
//! # GPU Timestamps
//!
//! Each frame slot owns a fixed range of queries in one pool:
//!
//! ```text
//! pool: | slot 0: 2 * capacity | slot 1: 2 * capacity | ... |
//! ```
//!
//! A scope writes a timestamp when it opens and one when it closes. Results
//! of a slot are read back the next time that slot begins a frame, i.e. after
//! its fence has been waited on. If they are still unavailable the slot
//! records no scopes for that frame and the read is retried next time around.

use parking_lot::Mutex;

use crate::backend::{
    BackendResult, CommandBufferHandle, GpuCommand, GraphicsDevice, QueryPoolHandle,
};
use crate::batch::DrawBatchRegistry;
use crate::benchmark::BenchmarkCapture;
use crate::error::GraphicsError;

pub use ember_core::profiling::*;
pub use ember_core::timing::{CpuProfiler, CpuScope, TimingSample, duration_ms};

/// Scope labels shared by CPU and GPU timers.
pub mod labels {
    /// CPU interval between successive frames.
    pub const FRAME_TIME: &str = "Frame Time";
    /// CPU time spent inside the renderer for one frame.
    pub const CPU_RENDER_FRAME: &str = "CPU Render Frame";
    /// GPU time of the whole frame graph.
    pub const GPU_FRAME_TIME: &str = "GPU Frame Time";
    pub const INSTANCE_UPDATE: &str = "Instance Update";
    pub const CULLING: &str = "Culling";
    pub const GPU_DRIVEN_GEOMETRY: &str = "GPU Driven Geometry";
    pub const GEOMETRY: &str = "Geometry";
    pub const LIGHTING: &str = "Lighting";
    /// CPU time blocked on the image-in-flight wait.
    pub const GPU_SYNC: &str = "GPU Sync";
}

#[derive(Debug, Clone, Copy)]
struct RecordedScope {
    name: &'static str,
    begin: u32,
    end: Option<u32>,
}

#[derive(Debug, Default)]
struct SlotQueries {
    scopes: Vec<RecordedScope>,
    next_query: u32,
    recording: bool,
    pending: bool,
}

#[derive(Debug, Default)]
struct GpuTimerState {
    slots: Vec<SlotQueries>,
    active_slot: Option<usize>,
    timings: Vec<TimingSample>,
}

/// Timestamp-query based GPU scope timers.
#[derive(Debug)]
pub struct GpuTimerManager {
    pool: QueryPoolHandle,
    queries_per_slot: u32,
    period_ns: f64,
    state: Mutex<GpuTimerState>,
}

impl GpuTimerManager {
    /// Create the query pool for `frames_in_flight` slots of `capacity` scopes each.
    pub fn new(
        device: &dyn GraphicsDevice,
        frames_in_flight: usize,
        capacity: u32,
    ) -> BackendResult<Self> {
        let queries_per_slot = capacity * 2;
        let pool = device.create_query_pool(queries_per_slot * frames_in_flight as u32)?;
        Ok(Self {
            pool,
            queries_per_slot,
            period_ns: device.timestamp_period_ns(),
            state: Mutex::new(GpuTimerState {
                slots: (0..frames_in_flight).map(|_| SlotQueries::default()).collect(),
                ..Default::default()
            }),
        })
    }

    /// Read back the results `slot` produced last time around, then reset its
    /// queries for the frame being recorded into `cmd`.
    pub fn begin_frame(
        &self,
        device: &dyn GraphicsDevice,
        cmd: CommandBufferHandle,
        slot: usize,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        let GpuTimerState {
            slots,
            active_slot,
            timings,
        } = &mut *state;
        *active_slot = Some(slot);
        let queries = &mut slots[slot];
        let base = self.slot_base(slot);

        if queries.pending {
            match device.query_results(self.pool, base, queries.next_query)? {
                Some(values) => {
                    timings.clear();
                    for scope in &queries.scopes {
                        let Some(end) = scope.end else { continue };
                        let ticks =
                            values[end as usize].saturating_sub(values[scope.begin as usize]);
                        let milliseconds = ticks as f64 * self.period_ns / 1_000_000.0;
                        store(timings, scope.name, milliseconds);
                    }
                    queries.pending = false;
                }
                None => {
                    log::trace!("GPU timestamps of slot {} not ready, deferring", slot);
                    queries.recording = false;
                    return Ok(());
                }
            }
        }

        device.record(
            cmd,
            GpuCommand::ResetQueries {
                pool: self.pool,
                first: base,
                count: self.queries_per_slot,
            },
        );
        queries.scopes.clear();
        queries.next_query = 0;
        queries.recording = true;
        Ok(())
    }

    /// Time the GPU work recorded into `cmd` until the returned guard drops.
    pub fn scope<'a>(
        &'a self,
        device: &'a dyn GraphicsDevice,
        cmd: CommandBufferHandle,
        name: &'static str,
    ) -> GpuScope<'a> {
        let begin = {
            let mut state = self.state.lock();
            let active_slot = state.active_slot;
            active_slot.and_then(|slot| {
                let queries = &mut state.slots[slot];
                if !queries.recording || queries.next_query + 2 > self.queries_per_slot {
                    return None;
                }
                let begin = queries.next_query;
                queries.next_query += 2;
                queries.pending = true;
                queries.scopes.push(RecordedScope {
                    name,
                    begin,
                    end: None,
                });
                Some((slot, queries.scopes.len() - 1, begin))
            })
        };

        if let Some((slot, _, begin)) = begin {
            device.record(
                cmd,
                GpuCommand::WriteTimestamp {
                    pool: self.pool,
                    query: self.slot_base(slot) + begin,
                },
            );
        } else {
            log::trace!("GPU scope '{}' not recorded", name);
        }

        GpuScope {
            manager: self,
            device,
            cmd,
            open: begin,
        }
    }

    /// Duration of `name` in the most recently resolved frame, in milliseconds.
    /// Scopes that frame did not record read as `None`.
    pub fn last_time(&self, name: &str) -> Option<f64> {
        self.state
            .lock()
            .timings
            .iter()
            .find(|sample| sample.name == name)
            .map(|sample| sample.milliseconds)
    }

    /// Snapshot of every resolved GPU duration.
    pub fn timings(&self) -> Vec<TimingSample> {
        self.state.lock().timings.clone()
    }

    /// Release the query pool. The device must be idle.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        device.destroy_query_pool(self.pool);
    }

    fn slot_base(&self, slot: usize) -> u32 {
        slot as u32 * self.queries_per_slot
    }

    fn close(
        &self,
        device: &dyn GraphicsDevice,
        cmd: CommandBufferHandle,
        open: (usize, usize, u32),
    ) {
        let (slot, scope_index, begin) = open;
        let end = begin + 1;
        self.state.lock().slots[slot].scopes[scope_index].end = Some(end);
        device.record(
            cmd,
            GpuCommand::WriteTimestamp {
                pool: self.pool,
                query: self.slot_base(slot) + end,
            },
        );
    }
}

fn store(timings: &mut Vec<TimingSample>, name: &'static str, milliseconds: f64) {
    match timings.iter_mut().find(|sample| sample.name == name) {
        Some(sample) => sample.milliseconds = milliseconds,
        None => timings.push(TimingSample { name, milliseconds }),
    }
}

/// Guard returned by [`GpuTimerManager::scope`].
#[must_use = "the GPU scope ends when this guard is dropped"]
pub struct GpuScope<'a> {
    manager: &'a GpuTimerManager,
    device: &'a dyn GraphicsDevice,
    cmd: CommandBufferHandle,
    open: Option<(usize, usize, u32)>,
}

impl Drop for GpuScope<'_> {
    fn drop(&mut self) {
        if let Some(open) = self.open.take() {
            self.manager.close(self.device, self.cmd, open);
        }
    }
}

/// Telemetry collector owned by the renderer.
///
/// Groups the CPU timers, the GPU timers and the optional one-shot
/// benchmark capture. Its lifetime is the renderer's.
#[derive(Debug)]
pub struct Telemetry {
    cpu: CpuProfiler,
    gpu: GpuTimerManager,
    benchmark: Option<BenchmarkCapture>,
    last_tick: Option<std::time::Instant>,
}

impl Telemetry {
    pub fn new(gpu: GpuTimerManager, benchmark: Option<BenchmarkCapture>) -> Self {
        Self {
            cpu: CpuProfiler::new(),
            gpu,
            benchmark,
            last_tick: None,
        }
    }

    pub fn cpu(&self) -> &CpuProfiler {
        &self.cpu
    }

    pub fn gpu(&self) -> &GpuTimerManager {
        &self.gpu
    }

    pub fn benchmark(&self) -> Option<&BenchmarkCapture> {
        self.benchmark.as_ref()
    }

    /// Open a CPU scope.
    pub fn cpu_scope(&self, name: &'static str) -> CpuScope<'_> {
        self.cpu.scope(name)
    }

    /// Open a GPU scope around work recorded into `cmd`.
    pub fn gpu_scope<'a>(
        &'a self,
        device: &'a dyn GraphicsDevice,
        cmd: CommandBufferHandle,
        name: &'static str,
    ) -> GpuScope<'a> {
        self.gpu.scope(device, cmd, name)
    }

    /// Record the frame interval. Called once at the start of every frame.
    pub(crate) fn tick(&mut self) {
        let now = std::time::Instant::now();
        if let Some(last) = self.last_tick.replace(now) {
            let elapsed = now - last;
            self.cpu.record(labels::FRAME_TIME, elapsed);
            profile_plot!("frame_time_ms", duration_ms(elapsed));
        }
    }

    /// Feed the benchmark capture with this frame's timings.
    pub(crate) fn sample_benchmark(
        &mut self,
        registry: &DrawBatchRegistry,
    ) -> Result<(), GraphicsError> {
        if let Some(benchmark) = self.benchmark.as_mut() {
            benchmark.sample(&self.cpu, &self.gpu, registry)?;
        }
        Ok(())
    }

    pub(crate) fn destroy(&self, device: &dyn GraphicsDevice) {
        self.gpu.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SubmitInfo;
    use crate::backend::headless::HeadlessDevice;

    fn submit(device: &HeadlessDevice, cmd: CommandBufferHandle) {
        device.end_command_buffer(cmd).unwrap();
        device
            .submit(&SubmitInfo {
                command_buffer: cmd,
                wait_semaphore: None,
                signal_semaphore: None,
                fence: None,
            })
            .unwrap();
        device.reset_command_buffer(cmd).unwrap();
    }

    #[test]
    fn test_gpu_scope_resolves_next_time_slot_begins() {
        let device = HeadlessDevice::new();
        let timers = GpuTimerManager::new(&device, 2, 4).unwrap();
        let cmd = device.allocate_command_buffer().unwrap();

        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();
        {
            let _scope = timers.scope(&device, cmd, labels::CULLING);
        }
        submit(&device, cmd);
        assert_eq!(timers.last_time(labels::CULLING), None);

        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 1).unwrap();
        submit(&device, cmd);
        assert_eq!(timers.last_time(labels::CULLING), None);

        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();
        assert!(timers.last_time(labels::CULLING).unwrap() >= 0.0);
    }

    #[test]
    fn test_scope_missing_from_resolved_frame_is_dropped() {
        let device = HeadlessDevice::new();
        let timers = GpuTimerManager::new(&device, 1, 4).unwrap();
        let cmd = device.allocate_command_buffer().unwrap();

        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();
        drop(timers.scope(&device, cmd, labels::CULLING));
        drop(timers.scope(&device, cmd, labels::LIGHTING));
        submit(&device, cmd);

        // Second frame records only lighting.
        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();
        assert!(timers.last_time(labels::CULLING).is_some());
        drop(timers.scope(&device, cmd, labels::LIGHTING));
        submit(&device, cmd);

        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();
        assert_eq!(timers.last_time(labels::CULLING), None);
        assert!(timers.last_time(labels::LIGHTING).is_some());
        let names: Vec<_> = timers.timings().iter().map(|sample| sample.name).collect();
        assert_eq!(names, vec![labels::LIGHTING]);
    }

    #[test]
    fn test_unavailable_results_are_deferred() {
        let device = HeadlessDevice::new();
        let timers = GpuTimerManager::new(&device, 1, 4).unwrap();
        let cmd = device.allocate_command_buffer().unwrap();

        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();
        drop(timers.scope(&device, cmd, labels::LIGHTING));
        // Never submitted: the slot's timestamps stay unavailable.
        device.end_command_buffer(cmd).unwrap();
        device.reset_command_buffer(cmd).unwrap();

        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();
        drop(timers.scope(&device, cmd, labels::GEOMETRY));
        submit(&device, cmd);

        // The slot neither reset its queries nor recorded new timestamps.
        assert!(device.last_submission().is_empty());
        assert!(timers.timings().is_empty());
    }

    #[test]
    fn test_capacity_overflow_is_ignored() {
        let device = HeadlessDevice::new();
        let timers = GpuTimerManager::new(&device, 1, 1).unwrap();
        let cmd = device.allocate_command_buffer().unwrap();
        device.begin_command_buffer(cmd).unwrap();
        timers.begin_frame(&device, cmd, 0).unwrap();

        let first = timers.scope(&device, cmd, labels::CULLING);
        let second = timers.scope(&device, cmd, labels::LIGHTING);
        drop(second);
        drop(first);
        submit(&device, cmd);

        // Reset + two timestamps of the first scope only.
        assert_eq!(device.last_submission().len(), 3);
    }

    #[test]
    fn test_scope_outside_frame_is_noop() {
        let device = HeadlessDevice::new();
        let timers = GpuTimerManager::new(&device, 2, 4).unwrap();
        let cmd = device.allocate_command_buffer().unwrap();
        device.begin_command_buffer(cmd).unwrap();
        drop(timers.scope(&device, cmd, labels::CULLING));
        submit(&device, cmd);
        assert!(device.last_submission().is_empty());
    }

    #[test]
    fn test_telemetry_tick_records_frame_time() {
        let device = HeadlessDevice::new();
        let mut telemetry = Telemetry::new(GpuTimerManager::new(&device, 2, 4).unwrap(), None);
        telemetry.tick();
        assert_eq!(telemetry.cpu().last_time(labels::FRAME_TIME), None);
        telemetry.tick();
        assert!(telemetry.cpu().last_time(labels::FRAME_TIME).is_some());
    }
}
