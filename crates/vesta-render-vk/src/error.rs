// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use vesta_core::ArenaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    Layer,
    InstanceExtension,
    DeviceExtension,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Requirement::Layer => "layer",
            Requirement::InstanceExtension => "instance extension",
            Requirement::DeviceExtension => "device extension",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueRole {
    Graphics,
    Present,
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueRole::Graphics => "graphics",
            QueueRole::Present => "present",
        })
    }
}

/// Everything that stops the renderer. Swapchain staleness is not in here:
/// it is an ordinary outcome of acquire/present, not a failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{kind} {name} not supported")]
    Unsupported { kind: Requirement, name: String },

    #[error("{0} queue family not found")]
    QueueFamilyMissing(QueueRole),

    #[error("no Vulkan physical device available")]
    NoPhysicalDevice,

    #[error("surface reports no {0}")]
    SurfaceEmpty(&'static str),

    #[error("{op} failed: {code:?} (VkResult {raw})", raw = .code.as_raw())]
    Api { op: &'static str, code: vk::Result },

    #[error("Vulkan loader: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("window handle: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("shader {}: {source}", .path.display())]
    Shader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Tags a raw `VkResult` with the call that produced it.
pub(crate) trait VkCheck<T> {
    fn check(self, op: &'static str) -> RenderResult<T>;
}

impl<T> VkCheck<T> for VkResult<T> {
    fn check(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|code| RenderError::Api { op, code })
    }
}
