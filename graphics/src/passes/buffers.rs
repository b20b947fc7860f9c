//! Host-visible buffers written every frame.

use crate::backend::{BufferHandle, GraphicsDevice};
use crate::deletion::{DeletionQueue, RetiredResource};
use crate::error::{BackendResultExt, GraphicsError};
use crate::renderer::FrameInfo;
use crate::types::{BufferDescriptor, BufferUsage};

const MIN_CAPACITY: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct SlotBuffer {
    buffer: BufferHandle,
    capacity: u64,
}

/// One growable host-visible buffer per frame slot.
///
/// A slot's buffer is only written while that slot records, after its fence
/// was waited on, so the CPU never overwrites data the GPU still reads. A
/// buffer that is too small is retired through the deletion queue and
/// replaced by one sized to the next power of two of the needed size, at
/// least 256 bytes.
#[derive(Debug)]
pub(crate) struct PerFrameBuffer {
    label: &'static str,
    usage: BufferUsage,
    slots: Vec<Option<SlotBuffer>>,
}

/// Buffer of the recording slot returned by [`PerFrameBuffer::reserve`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reserved {
    pub buffer: BufferHandle,
    /// The buffer was just created and holds no data.
    pub fresh: bool,
}

impl PerFrameBuffer {
    pub(crate) fn new(label: &'static str, usage: BufferUsage) -> Self {
        Self {
            label,
            usage: usage | BufferUsage::HOST_WRITE,
            slots: Vec::new(),
        }
    }

    /// Make the recording slot's buffer hold at least `size` bytes.
    ///
    /// Contents survive only while the buffer is not replaced; check
    /// [`Reserved::fresh`].
    pub(crate) fn reserve(
        &mut self,
        frame: &FrameInfo<'_>,
        size: u64,
    ) -> Result<Reserved, GraphicsError> {
        let slot = frame.frame_index;
        if self.slots.len() <= slot {
            self.slots.resize(slot + 1, None);
        }

        match self.slots[slot] {
            Some(current) if current.capacity >= size => Ok(Reserved {
                buffer: current.buffer,
                fresh: false,
            }),
            previous => {
                if let Some(previous) = previous {
                    frame
                        .deletion_queue
                        .push(self.label, RetiredResource::Buffer(previous.buffer));
                }
                let capacity = size.next_power_of_two().max(MIN_CAPACITY);
                let descriptor = BufferDescriptor::new(capacity, self.usage).with_label(self.label);
                let buffer = frame
                    .device
                    .create_buffer(&descriptor)
                    .during("create per-frame buffer")?;
                log::debug!(
                    "Per-frame buffer '{}' slot {} grown to {} bytes",
                    self.label,
                    slot,
                    capacity
                );
                self.slots[slot] = Some(SlotBuffer { buffer, capacity });
                Ok(Reserved {
                    buffer,
                    fresh: true,
                })
            }
        }
    }

    /// Upload `data` into the buffer of the recording slot.
    ///
    /// Returns `None` without touching the device when `data` is empty.
    pub(crate) fn write(
        &mut self,
        frame: &FrameInfo<'_>,
        data: &[u8],
    ) -> Result<Option<BufferHandle>, GraphicsError> {
        if data.is_empty() {
            return Ok(None);
        }
        let reserved = self.reserve(frame, data.len() as u64)?;
        frame
            .device
            .write_buffer(reserved.buffer, 0, data)
            .during("write per-frame buffer")?;
        Ok(Some(reserved.buffer))
    }

    /// Retire every slot's buffer, e.g. when the data shape changed.
    pub(crate) fn retire_all(&mut self, deletion_queue: &DeletionQueue) {
        for slot in self.slots.iter_mut() {
            if let Some(previous) = slot.take() {
                deletion_queue.push(self.label, RetiredResource::Buffer(previous.buffer));
            }
        }
    }

    /// Destroy every buffer now. The device must be idle.
    pub(crate) fn release(&mut self, device: &dyn GraphicsDevice) {
        for slot in self.slots.drain(..).flatten() {
            device.destroy_buffer(slot.buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CommandBufferHandle;
    use crate::backend::headless::HeadlessDevice;
    use crate::batch::DrawBatchRegistry;
    use crate::profiling::{GpuTimerManager, Telemetry};
    use crate::scene::SceneWorld;
    use crate::types::Extent2d;
    use crate::ui::NoUi;

    struct Fixture {
        device: HeadlessDevice,
        registry: DrawBatchRegistry,
        deletion: DeletionQueue,
        telemetry: Telemetry,
        scene: SceneWorld,
        cmd: CommandBufferHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let device = HeadlessDevice::new();
            let gpu = GpuTimerManager::new(&device, 2, 1).unwrap();
            let cmd = device.allocate_command_buffer().unwrap();
            Self {
                device,
                registry: DrawBatchRegistry::new(),
                deletion: DeletionQueue::new(2),
                telemetry: Telemetry::new(gpu, None),
                scene: SceneWorld::new(),
                cmd,
            }
        }

        fn frame(&self, frame_index: usize) -> FrameInfo<'_> {
            FrameInfo {
                scene: &self.scene,
                ui: &NoUi,
                draw_batcher: &self.registry,
                cmd: self.cmd,
                frame_index,
                swap_chain_extent: Extent2d::new(64, 64),
                aspect_ratio: 1.0,
                device: &self.device,
                telemetry: &self.telemetry,
                deletion_queue: &self.deletion,
            }
        }
    }

    #[test]
    fn test_growth_rounds_to_power_of_two() {
        let fixture = Fixture::new();
        let mut buffer = PerFrameBuffer::new("test", BufferUsage::STORAGE);

        let first = buffer.write(&fixture.frame(0), &[1; 300]).unwrap().unwrap();
        assert!(fixture.device.write_buffer(first, 511, &[0]).is_ok());
        assert!(fixture.device.write_buffer(first, 512, &[0]).is_err());

        // Fits: same buffer, nothing retired.
        let reserved = buffer.reserve(&fixture.frame(0), 512).unwrap();
        assert_eq!(reserved.buffer, first);
        assert!(!reserved.fresh);
        assert_eq!(fixture.deletion.pending_count(), 0);

        let grown = buffer.reserve(&fixture.frame(0), 513).unwrap();
        assert!(grown.fresh);
        assert_ne!(grown.buffer, first);
        assert!(fixture.device.write_buffer(grown.buffer, 1023, &[0]).is_ok());
        assert_eq!(fixture.deletion.pending_count(), 1);

        // Small requests still get the minimum capacity, per slot.
        let other = buffer.write(&fixture.frame(1), &[1; 4]).unwrap().unwrap();
        assert!(fixture.device.write_buffer(other, 255, &[0]).is_ok());
        assert!(buffer.write(&fixture.frame(1), &[]).unwrap().is_none());

        buffer.release(&fixture.device);
        fixture.deletion.flush_all(&fixture.device);
    }
}
