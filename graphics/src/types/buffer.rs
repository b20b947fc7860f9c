//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 0;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 1;
        /// Buffer can hold indirect draw arguments.
        const INDIRECT = 1 << 2;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 3;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 4;
        /// Buffer is host visible and written directly by the CPU.
        const HOST_WRITE = 1 << 5;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Arguments for one indexed indirect draw, laid out as the GPU reads them.
///
/// The culling pass writes one of these per draw batch; the GPU-driven
/// geometry pass consumes the array with a single indirect draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawIndexedIndirectArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DrawIndexedIndirectArgs>(), 20);

impl DrawIndexedIndirectArgs {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}
