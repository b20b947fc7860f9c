//! Descriptors and small value types shared by the backend interface and the passes.

mod buffer;
mod common;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, DrawIndexedIndirectArgs};
pub use common::Extent2d;
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
