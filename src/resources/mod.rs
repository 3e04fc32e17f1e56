//! CPU-side asset data handed to the renderer by its loaders, and the
//! constant block layouts it uploads each frame.

pub mod image;
pub mod mesh;
pub mod uniforms;

pub use image::{ColorSpace, ImageData};
pub use mesh::{MeshData, Vertex};
pub use uniforms::{LightData, PrefilterConstants, ShadingConstants, TransformConstants, MAX_LIGHTS};
