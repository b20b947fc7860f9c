//! Frame graph: the ordered list of passes that make up a frame.
//!
//! Passes run strictly in the order they were added. The graph does not
//! infer dependencies; the builder is responsible for a sensible order.
//!
//! # Lifecycle
//!
//! | Step | Call | Notes |
//! |------|------|-------|
//! | Populate | [`FrameGraph::add`] | Only before compilation |
//! | Compile | [`FrameGraph::compile`] | Validates the roster, runs [`Pass::compile`] once; idempotent |
//! | Events | `scene_initialized` / `scene_changed` / `swap_chain_resized` | Fanned out to every pass |
//! | Per frame | [`FrameGraph::execute`] | A failing pass is logged and skipped; the rest still run |
//!
//! # Example
//!
//! ```ignore
//! let mut graph = FrameGraph::new();
//! graph
//!     .add(GeometryPass::new(targets.clone()))
//!     .add_render_system(StaticMeshRenderSystem::new(MaterialType::Opaque));
//! graph.add(LightingPass::new(targets));
//! graph.compile(&ctx)?;
//! ```

mod pass;

pub use pass::{
    AsAny, GeometrySubmission, Pass, PassContext, PassRole, RenderSystem,
};

use crate::backend::{GpuCommand, GraphicsDevice};
use crate::error::GraphicsError;
use crate::renderer::FrameInfo;
use crate::scene::Scene;

/// Frame graph validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Both a CPU-driven and a GPU-driven geometry pass were registered.
    #[error(
        "frame graph mixes CPU-driven geometry pass '{cpu_driven}' with GPU-driven geometry pass '{gpu_driven}'"
    )]
    ConflictingGeometrySubmission {
        cpu_driven: &'static str,
        gpu_driven: &'static str,
    },
    /// Two passes share a name.
    #[error("duplicate pass name '{0}'")]
    DuplicatePass(&'static str),
}

/// Ordered, compile-once collection of passes.
#[derive(Default)]
pub struct FrameGraph {
    passes: Vec<Box<dyn Pass>>,
    compiled: bool,
}

impl FrameGraph {
    /// Create an empty frame graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass and return it for further configuration, e.g. to
    /// register render systems.
    ///
    /// # Panics
    ///
    /// Panics if the graph is already compiled.
    pub fn add<P: Pass>(&mut self, pass: P) -> &mut P {
        assert!(
            !self.compiled,
            "Cannot add pass '{}' to a compiled frame graph",
            pass.name()
        );
        log::trace!("Frame graph: adding pass '{}'", pass.name());
        self.passes.push(Box::new(pass));

        let last = self.passes.len() - 1;
        let pass: &mut dyn Pass = self.passes[last].as_mut();
        match pass.as_any_mut().downcast_mut::<P>() {
            Some(pass) => pass,
            None => unreachable!("pass was just pushed as {}", std::any::type_name::<P>()),
        }
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Pass names in execution order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Geometry submission strategy of the registered geometry passes, if any.
    pub fn geometry_submission(&self) -> Option<GeometrySubmission> {
        self.passes.iter().find_map(|pass| match pass.role() {
            PassRole::Geometry(submission) => Some(submission),
            _ => None,
        })
    }

    /// Check the roster without compiling it.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut names: Vec<&'static str> = Vec::with_capacity(self.passes.len());
        let mut cpu_driven = None;
        let mut gpu_driven = None;

        for pass in &self.passes {
            let name = pass.name();
            if names.contains(&name) {
                return Err(GraphError::DuplicatePass(name));
            }
            names.push(name);

            match pass.role() {
                PassRole::Geometry(GeometrySubmission::CpuDriven) => cpu_driven = Some(name),
                PassRole::Geometry(GeometrySubmission::GpuDriven) => gpu_driven = Some(name),
                _ => {}
            }
        }

        if let (Some(cpu_driven), Some(gpu_driven)) = (cpu_driven, gpu_driven) {
            return Err(GraphError::ConflictingGeometrySubmission {
                cpu_driven,
                gpu_driven,
            });
        }
        Ok(())
    }

    /// Validate the roster and let every pass create its resources.
    ///
    /// Compiling an already compiled graph does nothing.
    pub fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        if self.compiled {
            log::trace!("Frame graph already compiled");
            return Ok(());
        }
        self.validate()?;
        for pass in &mut self.passes {
            pass.compile(ctx)?;
        }
        self.compiled = true;
        log::info!(
            "Frame graph compiled with {} passes: {}",
            self.passes.len(),
            self.pass_names().join(" -> ")
        );
        Ok(())
    }

    /// Record every pass in order. Returns the number of passes that failed.
    ///
    /// Does nothing before compilation.
    pub fn execute(&mut self, frame: &FrameInfo<'_>) -> usize {
        if !self.compiled {
            log::trace!("Frame graph not compiled, skipping execution");
            return 0;
        }

        let mut failures = 0;
        for pass in &mut self.passes {
            let name = pass.name();
            let label = pass.timing_label();
            let _cpu = label.map(|label| frame.cpu_scope(label));
            let _gpu = label.map(|label| frame.gpu_scope(label));

            frame.record(GpuCommand::BeginLabel(name));
            let result = pass.execute(frame);
            frame.record(GpuCommand::EndLabel);

            if let Err(err) = result {
                log::error!("Pass '{}' failed on frame slot {}: {}", name, frame.frame_index, err);
                failures += 1;
            }
        }
        failures
    }

    /// Notify every pass that the scene finished loading.
    pub fn scene_initialized(
        &mut self,
        ctx: &PassContext<'_>,
        scene: &dyn Scene,
    ) -> Result<(), GraphicsError> {
        for pass in &mut self.passes {
            pass.scene_initialized(ctx, scene)?;
        }
        Ok(())
    }

    /// Notify every pass that the scene changed.
    pub fn scene_changed(
        &mut self,
        ctx: &PassContext<'_>,
        scene: &dyn Scene,
    ) -> Result<(), GraphicsError> {
        for pass in &mut self.passes {
            pass.scene_changed(ctx, scene)?;
        }
        Ok(())
    }

    /// Notify every pass that the swapchain was recreated.
    pub fn swap_chain_resized(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        if !self.compiled {
            return Ok(());
        }
        for pass in &mut self.passes {
            pass.swap_chain_resized(ctx)?;
        }
        Ok(())
    }

    /// Destroy pass resources. The device must be idle.
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        for pass in &mut self.passes {
            pass.release(device);
        }
    }
}

impl std::fmt::Debug for FrameGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGraph")
            .field("passes", &self.pass_names())
            .field("compiled", &self.compiled)
            .finish()
    }
}
