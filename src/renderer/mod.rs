//! Renderer Module
//!
//! [`Renderer`] is the graphics context: it owns the device, the descriptor
//! heaps, the fence, the frame ring, the offscreen targets and, once
//! [`setup`](Renderer::setup) has run, the scene's pipelines and resources.
//!
//! # Lifecycle
//!
//! ```text
//! init ─► setup ─► (update_frame_resources ─► draw)* ─► shutdown
//! ```
//!
//! - `init` creates heaps, the frame ring and the offscreen targets.
//! - `setup` builds pipelines, uploads assets and bakes image-based lighting.
//!   It runs synchronously; every stage is submitted and waited on.
//! - `draw` records and submits one frame. At most [`FRAME_COUNT`] frames
//!   are in flight.
//! - `shutdown` waits for the last signalled fence value before releasing
//!   anything. It also runs from `Drop`.

pub mod core;
pub mod graph;
pub mod pipeline;
pub mod settings;
pub mod setup;

use glam::Mat4;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::errors::{PrismError, Result};
use crate::gpu::{GpuDevice, WgpuDevice};
use crate::resources::{ShadingConstants, TransformConstants};
use crate::scene::FrameView;

use self::core::{FRAME_COUNT, FrameRing, ResourceFactory, ResourceRegistry, SCENE_TRANSFORM, SKYBOX_TRANSFORM, SceneResources};
use self::graph::{FrameContext, FrameTargets, record_frame};
use self::pipeline::ShaderLibrary;
use self::settings::RendererSettings;
use self::setup::{SceneAssets, SceneState};

pub struct Renderer<D: GpuDevice> {
    settings: RendererSettings,
    factory: ResourceFactory<D>,
    ring: FrameRing,
    targets: FrameTargets,
    scene: Option<SceneState>,
    model: Mat4,
    frames: u64,
    shut_down: bool,
}

impl<D: GpuDevice> Renderer<D> {
    /// Creates the descriptor heaps, the frame ring and the offscreen targets
    /// sized to the device's swapchain.
    pub fn init(device: D, settings: RendererSettings) -> Result<Self> {
        settings.validate()?;
        let swapchain = device.swapchain();
        log::info!(
            "Initializing renderer: {}x{} swapchain ({} images, {:?}), MSAA x{}",
            swapchain.width,
            swapchain.height,
            swapchain.buffer_count,
            swapchain.format,
            settings.msaa_samples
        );

        let mut factory = ResourceFactory::new(device, settings.heap_sizes)?;
        let ring = FrameRing::new(&mut factory)?;
        let targets = match FrameTargets::create(&mut factory, swapchain, &settings) {
            Ok(targets) => targets,
            Err(err) => {
                let mut ring = ring;
                ring.release(&mut factory);
                return Err(err);
            }
        };

        Ok(Self {
            settings,
            factory,
            ring,
            targets,
            scene: None,
            model: Mat4::IDENTITY,
            frames: 0,
            shut_down: false,
        })
    }

    /// Builds pipelines, uploads the scene assets and bakes the environment.
    ///
    /// On failure no scene state is retained and `setup` may be retried.
    pub fn setup(&mut self, assets: &SceneAssets<'_>, shaders: &dyn ShaderLibrary) -> Result<()> {
        self.ensure_running()?;
        assert!(self.scene.is_none(), "Renderer::setup called twice");

        log::info!("Setting up scene");
        let scene = SceneState::build(&mut self.factory, assets, shaders, &self.settings)?;
        self.scene = Some(scene);
        Ok(())
    }

    /// Writes this frame's transform and shading constants into the slot
    /// the next [`draw`](Self::draw) records into, after waiting for the
    /// slot's previous frame.
    pub fn update_frame_resources(&mut self, view: &FrameView) -> Result<()> {
        self.ensure_running()?;
        let scene = self.scene.as_ref().ok_or(PrismError::NotReady)?;

        let index = self.ring.index();
        let parts = self.factory.frame_parts();
        self.ring.wait_for_slot(index, parts.device, parts.fence)?;

        let swapchain = parts.device.swapchain();
        let aspect = swapchain.width as f32 / swapchain.height.max(1) as f32;
        let projection = view.projection.matrix(aspect);

        let slot = self.ring.slot(index);
        slot.transforms.write(
            parts.device,
            SKYBOX_TRANSFORM,
            &TransformConstants::skybox(view.view, projection),
        )?;
        slot.transforms.write(
            parts.device,
            SCENE_TRANSFORM,
            &TransformConstants::new(self.model, view.view, projection),
        )?;
        slot.shading.write(
            parts.device,
            0,
            &ShadingConstants::new(
                view.camera_position,
                &self.settings.lights,
                scene.prefilter_mip_levels,
                self.settings.exposure,
            ),
        )?;
        Ok(())
    }

    /// Records, submits and presents one frame, then advances the fence and
    /// the ring.
    ///
    /// A frame the device accepted is fenced and its slot retired even when
    /// presentation fails; only `frames_rendered` stays behind.
    pub fn draw(&mut self) -> Result<()> {
        self.ensure_running()?;
        let scene = self.scene.as_ref().ok_or(PrismError::NotReady)?;
        let clear_color = self.settings.clear_color_rgba();

        let index = self.ring.index();
        let parts = self.factory.frame_parts();
        let slot = self.ring.acquire_slot(index, parts.device, parts.fence)?;

        let back_buffer = parts.device.acquire_back_buffer()?;
        let back_buffer_texture = parts.device.back_buffer(back_buffer);

        let mut ctx = FrameContext {
            commands: &mut slot.commands,
            tracker: parts.tracker,
            targets: &self.targets,
            scene: &scene.bindings,
            transforms: &slot.transforms,
            shading: &slot.shading,
            back_buffer,
            back_buffer_texture,
            clear_color,
        };
        record_frame(&mut ctx);

        parts.fence.submit(parts.device, &slot.commands)?;
        // Submitted work is fenced even when presentation fails.
        let presented = parts.device.present();
        let value = parts.fence.signal_and_advance(parts.device)?;
        self.ring.advance(value);
        if let Err(err) = presented {
            log::warn!("Frame {} submitted from slot {index} but not presented: {err}", self.frames);
            return Err(err);
        }
        log::trace!("Frame {} submitted from slot {index}, fence {value}", self.frames);

        self.frames += 1;
        Ok(())
    }

    /// [`update_frame_resources`](Self::update_frame_resources) followed by [`draw`](Self::draw).
    pub fn render(&mut self, view: &FrameView) -> Result<()> {
        self.update_frame_resources(view)?;
        self.draw()
    }

    /// Drains the GPU and releases every resource the renderer owns.
    ///
    /// Calling it again is a no-op. If the drain fails nothing is released,
    /// since the GPU may still be reading those resources.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }

        let parts = self.factory.frame_parts();
        parts.fence.drain(parts.device)?;
        log::info!("Shutdown: drained fence {} after {} frames", parts.fence.current(), self.frames);

        if let Some(scene) = self.scene.take() {
            scene.release(&mut self.factory);
        }
        self.ring.release(&mut self.factory);
        self.targets.release(&mut self.factory);
        self.shut_down = true;
        Ok(())
    }

    /// Model matrix applied to the scene mesh from the next frame on.
    pub fn set_model_transform(&mut self, model: Mat4) {
        self.model = model;
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        self.factory.device()
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        self.factory.device_mut()
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn factory(&self) -> &ResourceFactory<D> {
        &self.factory
    }

    /// Handles produced by [`setup`](Self::setup); `None` before it succeeds.
    #[must_use]
    pub fn scene_resources(&self) -> Option<&SceneResources> {
        self.scene.as_ref().map(|scene| &scene.resources)
    }

    #[must_use]
    pub fn registry(&self) -> Option<&ResourceRegistry> {
        self.scene.as_ref().map(|scene| &scene.registry)
    }

    /// Slot index the next frame records into, in `0..FRAME_COUNT`.
    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> usize {
        debug_assert!(self.ring.index() < FRAME_COUNT);
        self.ring.index()
    }

    #[inline]
    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.shut_down && self.scene.is_some()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down { Err(PrismError::ShutDown) } else { Ok(()) }
    }
}

impl Renderer<WgpuDevice> {
    /// Creates a wgpu device presenting to `window` and initializes the
    /// renderer on it.
    pub fn with_window<W>(window: W, width: u32, height: u32, settings: RendererSettings) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        settings.validate()?;
        let device = pollster::block_on(WgpuDevice::new(window, width, height, &settings))?;
        Self::init(device, settings)
    }
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Renderer shutdown failed: {err}");
        }
    }
}
