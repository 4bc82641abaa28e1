// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use serde::Deserialize;
use std::path::PathBuf;

pub mod frame;

pub use frame::{run_frame, Acquired, FrameBackend, FrameStatus, Presented, TargetState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Which presentation behaviour to ask the backend for first. Whatever is
/// picked, the backend falls back to the first mode the surface reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentPreference {
    /// Throttle to display refresh, never tear.
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    pub validation: bool,
    pub clear_color: [f32; 4],
    pub present_mode: PresentPreference,
    pub shader_dir: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            validation: false,
            clear_color: [1.0, 0.5, 0.25, 1.0],
            present_mode: PresentPreference::Fifo,
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RendererConfig,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<FrameStatus>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}
