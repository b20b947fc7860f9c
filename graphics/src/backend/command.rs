//! Handles and recorded commands.
//!
//! Backends hand out opaque `u64` handles; the renderer and the passes never
//! see API objects directly. Command recording is a flat list of
//! [`GpuCommand`]s appended to a command buffer between
//! `begin_command_buffer` and `end_command_buffer`.

use crate::scene::{MaterialId, MeshId};

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend-specific raw value.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The backend-specific raw value.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// CPU-waitable completion signal for submitted work.
    FenceHandle
);
gpu_handle!(
    /// GPU-side ordering signal between acquire, submit and present.
    SemaphoreHandle
);
gpu_handle!(
    /// Command recording target.
    CommandBufferHandle
);
gpu_handle!(
    /// GPU buffer.
    BufferHandle
);
gpu_handle!(
    /// GPU texture.
    TextureHandle
);
gpu_handle!(
    /// Timestamp query pool.
    QueryPoolHandle
);

/// A single recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// Open a debug label region.
    BeginLabel(&'static str),
    /// Close the innermost debug label region.
    EndLabel,
    /// Start rendering into the given attachments.
    BeginRendering {
        label: &'static str,
        color: Vec<TextureHandle>,
        depth: Option<TextureHandle>,
    },
    /// Finish the current rendering scope.
    EndRendering,
    /// Non-indexed draw, used for full-screen triangles and light billboards.
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    /// Instanced draw of one mesh/material batch.
    DrawIndexed {
        mesh: MeshId,
        material: MaterialId,
        first_instance: u32,
        instance_count: u32,
    },
    /// Draws whose arguments live in a GPU buffer.
    DrawIndexedIndirect {
        buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    /// Compute dispatch.
    Dispatch { x: u32, y: u32, z: u32 },
    /// Buffer-to-buffer copy.
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    /// Reset a range of timestamp queries before reuse.
    ResetQueries {
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    },
    /// Write a timestamp once preceding work completes.
    WriteTimestamp { pool: QueryPoolHandle, query: u32 },
}

/// One queue submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitInfo {
    pub command_buffer: CommandBufferHandle,
    /// Waited on before the commands execute (image available).
    pub wait_semaphore: Option<SemaphoreHandle>,
    /// Signaled when the commands finish (ready to present).
    pub signal_semaphore: Option<SemaphoreHandle>,
    /// Signaled for the CPU when the commands finish.
    pub fence: Option<FenceHandle>,
}
