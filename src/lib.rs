//! # Prism
//!
//! Resource and frame orchestration core of a real-time PBR renderer written
//! against an explicit, D3D12-class GPU contract.
//!
//! The crate owns descriptor heaps, resource creation with manual state
//! tracking, a two-slot frame ring with fence pacing, a one-shot
//! image-based-lighting bake, and the fixed per-frame pass sequence
//! (skybox, forward PBR, MSAA resolve, tone mapping). Asset decoding,
//! shader compilation and input handling belong to collaborators.
//!
//! ```rust,ignore
//! use prism::{FrameView, HeadlessDevice, Renderer, RendererSettings, SceneAssets};
//!
//! let mut renderer = Renderer::init(HeadlessDevice::new(1200, 900), RendererSettings::default())?;
//! renderer.setup(&assets, &shaders)?;
//! renderer.render(&FrameView::default())?;
//! renderer.shutdown()?;
//! ```

pub mod errors;
pub mod gpu;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use errors::{PrismError, Result};
pub use gpu::{GpuDevice, HeadlessDevice, WgpuDevice};
pub use renderer::Renderer;
pub use renderer::pipeline::{MemoryShaderLibrary, ShaderLibrary, keys};
pub use renderer::settings::{HeapSizes, IblSettings, RendererSettings};
pub use renderer::setup::SceneAssets;
pub use resources::{ColorSpace, ImageData, MeshData, Vertex};
pub use scene::{FrameView, PointLight, Projection};
