// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Host-side collaborators: the window the renderer presents into and the
//! whole-file reads used for shader blobs.

pub mod fileio;
pub mod window;

pub use window::{PlatformWindow, WindowState};
pub use winit;
