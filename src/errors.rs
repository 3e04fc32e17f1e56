//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`PrismError`] covers all failure modes including:
//! - GPU initialization failures (adapter, device, surface)
//! - Device-level operation failures (resource creation, submission, fence waits)
//! - Descriptor heap exhaustion
//! - Asset validation errors reported by setup
//! - Shader lookup failures
//!
//! Device-level failures are never retried: they terminate the affected
//! operation (frame, precompute stage or startup) and propagate to the caller.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, PrismError>`.
//!
//! ```rust,ignore
//! use prism::errors::{PrismError, Result};
//!
//! fn create_things() -> Result<()> {
//!     Ok(())
//! }
//! ```

use std::panic::Location;

use thiserror::Error;

use crate::gpu::{HeapKind, ShaderKey};

/// The main error type for the renderer.
#[derive(Error, Debug)]
pub enum PrismError {
    // ========================================================================
    // GPU & Rendering Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create or configure the presentation surface.
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Failed to acquire the next swapchain image.
    #[error("Failed to acquire swapchain image: {0}")]
    SurfaceAcquire(String),

    /// A device operation failed.
    ///
    /// `location` is the call site that issued the operation.
    #[error("Device operation `{operation}` failed at {location}: {reason}")]
    Device {
        /// Name of the failing operation
        operation: &'static str,
        /// Driver- or backend-provided reason
        reason: String,
        /// Call site of the operation
        location: &'static Location<'static>,
    },

    /// A handle did not resolve to a live device object.
    #[error("Unknown {kind} handle passed to `{operation}`")]
    UnknownResource {
        /// Object kind ("texture", "buffer", ...)
        kind: &'static str,
        /// The operation that received the handle
        operation: &'static str,
    },

    // ========================================================================
    // Descriptor Heap Errors
    // ========================================================================
    /// Every slot of a descriptor heap has been handed out.
    #[error("{kind} descriptor heap exhausted (capacity {capacity})")]
    HeapExhausted {
        /// Kind of the exhausted heap
        kind: HeapKind,
        /// Fixed capacity of the heap
        capacity: u32,
    },

    // ========================================================================
    // Asset & Shader Errors
    // ========================================================================
    /// Asset data supplied by a loader is malformed.
    #[error("Invalid asset `{name}`: {reason}")]
    InvalidAsset {
        /// Debug name of the asset
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// No shader is registered under the requested key.
    #[error("Shader not found: {0}")]
    ShaderNotFound(ShaderKey),

    /// A shader blob could not be turned into a program.
    #[error("Shader {key} could not be loaded: {reason}")]
    ShaderLoad {
        /// The shader being loaded
        key: ShaderKey,
        /// Failure reason
        reason: String,
    },

    /// A texture format is not supported by the operation.
    #[error("Format {format:?} is not supported by {operation}")]
    UnsupportedFormat {
        /// The offending format
        format: wgpu::TextureFormat,
        /// The operation rejecting it
        operation: &'static str,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Renderer settings are inconsistent.
    #[error("Invalid renderer settings: {0}")]
    InvalidSettings(String),

    /// `draw` or `update_frame_resources` was called before `setup` completed.
    #[error("Renderer is not set up")]
    NotReady,

    /// The renderer has been shut down.
    #[error("Renderer has been shut down")]
    ShutDown,
}

impl PrismError {
    /// Builds a [`PrismError::Device`] tagged with the caller's location.
    #[track_caller]
    pub fn device(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Device {
            operation,
            reason: reason.into(),
            location: Location::caller(),
        }
    }

    /// Builds a [`PrismError::InvalidAsset`].
    pub fn invalid_asset(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAsset {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, PrismError>`.
pub type Result<T> = std::result::Result<T, PrismError>;
