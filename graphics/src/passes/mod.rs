//! Built-in passes and the default frame graph.
//!
//! # Default Roster
//!
//! | Order | CPU-driven | GPU-driven |
//! |-------|------------|------------|
//! | 1 | [`GeometryPass`] + [`StaticMeshRenderSystem`] (opaque) | [`CullingPass`] |
//! | 2 | | [`SceneUpdatePass`] |
//! | 3 | | [`GpuDrivenGeometryPass`] |
//! | then | [`SkyboxPass`], [`LightingPass`], [`PresentPass`], [`UiPass`], [`PostProcessingPass`], [`BloomPass`], [`TransparentPass`] + [`PointLightRenderSystem`] | same |
//!
//! The G-buffer, depth and HDR targets are shared through
//! [`SharedRenderTargets`]; the GPU-driven passes additionally share
//! [`SharedGpuDrivenBuffers`].

mod attachments;
mod buffers;
mod geometry;
mod gpu_driven;
mod lighting;
mod post;
mod systems;

pub use attachments::{RenderTargets, SharedRenderTargets};
pub use geometry::GeometryPass;
pub use gpu_driven::{
    CullingPass, GpuDrivenBuffers, GpuDrivenGeometryPass, SceneUpdatePass, SharedGpuDrivenBuffers,
};
pub use lighting::{LightingPass, SkyboxPass};
pub use post::{
    BLOOM_MIP_LEVELS, BloomPass, PostProcessingPass, PresentPass, TransparentPass, UiPass,
};
pub use systems::{PointLightRenderSystem, StaticMeshRenderSystem};

use crate::graph::{FrameGraph, GeometrySubmission};
use crate::scene::MaterialType;

/// Populate `graph` with the default roster for `submission`.
pub fn build_default_frame_graph(graph: &mut FrameGraph, submission: GeometrySubmission) {
    let targets = RenderTargets::shared();

    match submission {
        GeometrySubmission::CpuDriven => {
            graph
                .add(GeometryPass::new(targets.clone()))
                .add_render_system(StaticMeshRenderSystem::new(MaterialType::Opaque));
        }
        GeometrySubmission::GpuDriven => {
            let buffers = GpuDrivenBuffers::shared();
            graph.add(CullingPass::new(buffers.clone()));
            graph.add(SceneUpdatePass::new(buffers.clone()));
            graph.add(GpuDrivenGeometryPass::new(targets.clone(), buffers));
        }
    }

    graph.add(SkyboxPass::new(targets.clone()));
    graph.add(LightingPass::new(targets.clone()));
    graph.add(PresentPass::new());
    graph.add(UiPass::new());
    graph.add(PostProcessingPass::new(targets.clone()));
    graph.add(BloomPass::new());
    graph
        .add(TransparentPass::new(targets))
        .add_render_system(PointLightRenderSystem::new());

    log::debug!(
        "Default frame graph built ({:?}): {}",
        submission,
        graph.pass_names().join(", ")
    );
}
