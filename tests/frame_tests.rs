//! Frame Loop Tests
//!
//! Tests for:
//! - The recorded pass sequence of one frame (skybox, scene, resolve, tonemap)
//! - Device event order around a frame (acquire, submit, present, signal)
//! - Frame pacing: a slot is never reused before its fence value completes
//! - State validation across many frames, with and without MSAA
//! - Lifecycle errors: drawing before setup and after shutdown

mod common;

use anyhow::Context;
use glam::{Mat4, Vec3};

use prism::gpu::{Command, DeviceEvent, FenceMode};
use prism::{FrameView, HeadlessDevice, PrismError, Projection, Renderer, RendererSettings};

use common::{ready_renderer, small_settings};

/// Draws and resolves of one command list, tagged with the bound pipeline.
fn frame_ops(device: &HeadlessDevice, commands: &[Command]) -> Vec<String> {
    let mut pipeline = "";
    let mut ops = Vec::new();
    for command in commands {
        match command {
            Command::SetPipeline(id) => pipeline = device.pipeline_label(*id).unwrap_or("unknown"),
            Command::DrawIndexed { instance_count, .. } => {
                assert_eq!(*instance_count, 1);
                ops.push(format!("draw_indexed:{pipeline}"));
            }
            Command::Draw {
                vertex_count,
                instance_count,
            } => {
                assert_eq!(*instance_count, 1);
                ops.push(format!("draw({vertex_count}):{pipeline}"));
            }
            Command::Resolve { .. } => ops.push("resolve".to_string()),
            _ => {}
        }
    }
    ops
}

/// `(completed value at submit, value signalled after it)` for every frame submission.
fn frame_fences(device: &HeadlessDevice) -> Vec<(u64, u64)> {
    let mut fences = Vec::new();
    let mut pending = None;
    for event in device.events() {
        match event {
            DeviceEvent::Submit { label, completed, .. } if label.starts_with("frame_") => pending = Some(*completed),
            DeviceEvent::Signal(value) => {
                if let Some(completed) = pending.take() {
                    fences.push((completed, *value));
                }
            }
            _ => {}
        }
    }
    fences
}

fn orbit_view(frame: u32) -> FrameView {
    let angle = frame as f32 * 0.1;
    FrameView::look_at(
        Vec3::new(3.0 * angle.sin(), 1.0, 3.0 * angle.cos()),
        Vec3::ZERO,
        Projection::default(),
    )
}

// ============================================================================
// Frame Sequence
// ============================================================================

#[test]
fn first_draw_records_skybox_scene_resolve_tonemap() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(1200, 900, FenceMode::Immediate, RendererSettings::default())?;
    renderer.device_mut().clear_events();

    renderer.render(&FrameView::default())?;

    let device = renderer.device();
    let frames: Vec<_> = device.submissions().collect();
    assert_eq!(frames.len(), 1);
    let (label, commands) = frames[0];
    assert_eq!(label, "frame_0");
    assert_eq!(
        frame_ops(device, commands),
        ["draw_indexed:skybox", "draw_indexed:pbr", "resolve", "draw(6):tonemap"]
    );

    let kinds: Vec<_> = device
        .events()
        .iter()
        .map(|e| match e {
            DeviceEvent::AcquireBackBuffer(_) => "acquire",
            DeviceEvent::Submit { .. } => "submit",
            DeviceEvent::Present => "present",
            DeviceEvent::Signal(_) => "signal",
            DeviceEvent::Wait { .. } => "wait",
        })
        .collect();
    assert_eq!(kinds, ["acquire", "submit", "present", "signal"]);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn single_sampled_frame_skips_the_resolve() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(320, 240, FenceMode::Immediate, small_settings(1))?;
    renderer.device_mut().clear_events();

    renderer.render(&FrameView::default())?;

    let device = renderer.device();
    let (_, commands) = device.submissions().next().context("no frame submitted")?;
    assert_eq!(
        frame_ops(device, commands),
        ["draw_indexed:skybox", "draw_indexed:pbr", "draw(6):tonemap"]
    );
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    Ok(())
}

#[test]
fn frames_alternate_slots_and_back_buffers() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(320, 240, FenceMode::Immediate, small_settings(4))?;
    renderer.device_mut().clear_events();

    for frame in 0..4 {
        assert_eq!(renderer.frame_index(), frame % 2);
        renderer.render(&orbit_view(frame as u32))?;
    }

    let device = renderer.device();
    let labels: Vec<_> = device.submissions().map(|(label, _)| label).collect();
    assert_eq!(labels, ["frame_0", "frame_1", "frame_0", "frame_1"]);

    let images: Vec<_> = device
        .events()
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::AcquireBackBuffer(index) => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(images, [0, 1, 0, 1]);
    assert_eq!(renderer.frames_rendered(), 4);
    Ok(())
}

#[test]
fn many_frames_leave_no_state_violations() -> anyhow::Result<()> {
    for samples in [1, 2, 4, 8] {
        let mut renderer = ready_renderer(256, 256, FenceMode::Deferred, small_settings(samples))?;
        renderer.set_model_transform(Mat4::from_rotation_y(0.5));
        for frame in 0..8 {
            renderer.render(&orbit_view(frame))?;
        }
        let violations = renderer.device().violations();
        assert!(violations.is_empty(), "msaa x{samples}: {violations:?}");
    }
    Ok(())
}

// ============================================================================
// Frame Pacing
// ============================================================================

#[test]
fn slot_reuse_waits_for_its_previous_frame() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(320, 240, FenceMode::Deferred, small_settings(4))?;
    for frame in 0..6 {
        renderer.render(&orbit_view(frame))?;
    }

    let fences = frame_fences(renderer.device());
    assert_eq!(fences.len(), 6);
    for k in 2..fences.len() {
        let (completed, _) = fences[k];
        let (_, previous_occupant) = fences[k - 2];
        assert!(
            completed >= previous_occupant,
            "frame {k} recorded before fence {previous_occupant} completed (at {completed})"
        );
    }
    Ok(())
}

#[test]
fn pacing_keeps_one_frame_in_flight_while_recording() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(320, 240, FenceMode::Deferred, small_settings(1))?;
    for frame in 0..6 {
        renderer.render(&orbit_view(frame))?;
    }

    let fences = frame_fences(renderer.device());
    for k in 1..fences.len() {
        let (completed, _) = fences[k];
        let (_, previous) = fences[k - 1];
        assert!(completed < previous, "frame {k} serialized behind frame {}", k - 1);
    }
    Ok(())
}

#[test]
fn fence_values_increase_every_frame() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(320, 240, FenceMode::Immediate, small_settings(1))?;
    for frame in 0..5 {
        renderer.render(&orbit_view(frame))?;
    }
    let signals: Vec<_> = frame_fences(renderer.device()).into_iter().map(|(_, v)| v).collect();
    assert!(signals.windows(2).all(|w| w[1] == w[0] + 1), "{signals:?}");
    Ok(())
}

// ============================================================================
// Lifecycle Errors
// ============================================================================

#[test]
fn drawing_before_setup_is_not_ready() -> anyhow::Result<()> {
    common::init_logging();
    let mut renderer = Renderer::init(HeadlessDevice::new(64, 64), small_settings(1))?;

    assert!(matches!(renderer.draw(), Err(PrismError::NotReady)));
    assert!(matches!(
        renderer.update_frame_resources(&FrameView::default()),
        Err(PrismError::NotReady)
    ));
    assert!(!renderer.is_ready());
    assert_eq!(renderer.device().submissions().count(), 0);
    Ok(())
}

#[test]
fn invalid_settings_are_rejected_at_init() -> anyhow::Result<()> {
    let settings = RendererSettings {
        msaa_samples: 3,
        ..RendererSettings::default()
    };
    assert!(matches!(
        Renderer::init(HeadlessDevice::new(64, 64), settings),
        Err(PrismError::InvalidSettings(_))
    ));
    Ok(())
}

#[test]
fn failed_submit_aborts_the_frame_without_advancing() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(320, 240, FenceMode::Immediate, small_settings(1))?;
    renderer.update_frame_resources(&FrameView::default())?;
    renderer.device_mut().fail_next("submit");

    let err = renderer.draw().unwrap_err();
    assert!(matches!(err, PrismError::Device { operation: "submit", .. }));
    assert_eq!(renderer.frames_rendered(), 0);
    assert_eq!(renderer.frame_index(), 0);
    Ok(())
}

#[test]
fn failed_present_still_fences_the_submitted_frame() -> anyhow::Result<()> {
    let mut renderer = ready_renderer(320, 240, FenceMode::Deferred, small_settings(4))?;
    renderer.render(&orbit_view(0))?;
    renderer.render(&orbit_view(1))?;
    renderer.device_mut().clear_events();
    renderer.device_mut().fail_next("present");

    let err = renderer.render(&orbit_view(2)).unwrap_err();
    assert!(matches!(err, PrismError::Device { operation: "present", .. }), "{err}");
    let kinds: Vec<_> = renderer
        .device()
        .events()
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::Submit { .. } => Some("submit"),
            DeviceEvent::Present => Some("present"),
            DeviceEvent::Signal(_) => Some("signal"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, ["submit", "signal"]);
    assert_eq!(renderer.frame_index(), 1);
    assert_eq!(renderer.frames_rendered(), 2);

    let failed_frame = renderer.device().signaled_value();
    for frame in 3..6 {
        renderer.render(&orbit_view(frame))?;
    }
    // the unpresented frame, then slots 1, 0, 1
    let fences = frame_fences(renderer.device());
    assert_eq!(fences.len(), 4);
    assert_eq!(fences[0].1, failed_frame);
    let (completed, _) = fences[2];
    assert!(completed >= failed_frame, "slot 0 reused before its unpresented frame completed");
    assert!(renderer.device().violations().is_empty(), "{:?}", renderer.device().violations());
    Ok(())
}
