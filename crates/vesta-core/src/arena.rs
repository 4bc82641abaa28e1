// SPDX-License-Identifier: CEPL-1.0
//! Bump arena for the short-lived buffers the renderer needs while it
//! stands up GPU state: enumeration results, extension lists, shader blobs.
//!
//! Nothing is freed per allocation. The whole arena goes away with its
//! owner, or is rewound with [`SetupArena::reset_scratch`] once every slice
//! handed out has been dropped (enforced by `&mut self`).

use bumpalo::Bump;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("setup arena exhausted: {requested} bytes requested, limit {limit} bytes")]
pub struct ArenaError {
    pub requested: usize,
    pub limit: usize,
}

pub struct SetupArena {
    bump: Bump,
    limit: usize,
}

impl SetupArena {
    /// 4 MiB, enough for every enumeration a single-window renderer performs.
    pub const DEFAULT_CAPACITY: usize = 4 * 1024 * 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(limit: usize) -> Self {
        let bump = Bump::with_capacity(limit);
        bump.set_allocation_limit(Some(limit));
        Self { bump, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Copy `src` into the arena and hand back a slice that lives as long as
    /// the arena borrow.
    pub fn copy_slice<T: Copy>(&self, src: &[T]) -> Result<&[T], ArenaError> {
        self.bump
            .try_alloc_slice_copy(src)
            .map(|s| &*s)
            .map_err(|_| ArenaError {
                requested: std::mem::size_of_val(src),
                limit: self.limit,
            })
    }

    /// A zero-filled byte buffer of exactly `len` bytes.
    pub fn zeroed_bytes(&self, len: usize) -> Result<&mut [u8], ArenaError> {
        self.bump
            .try_alloc_slice_fill_copy(len, 0u8)
            .map_err(|_| ArenaError {
                requested: len,
                limit: self.limit,
            })
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    pub fn reset_scratch(&mut self) {
        debug!(
            "arena: rewinding scratch ({} bytes held)",
            self.bump.allocated_bytes()
        );
        self.bump.reset();
    }
}

impl Default for SetupArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SetupArena {
    fn drop(&mut self) {
        debug!(
            "arena: released {} bytes in one shot",
            self.bump.allocated_bytes()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_preserve_contents() {
        let arena = SetupArena::with_capacity(1024);
        let words = arena.copy_slice(&[1u32, 2, 3, 4]).unwrap();
        let bytes = arena.copy_slice(b"VK_KHR_swapchain").unwrap();
        assert_eq!(words, &[1, 2, 3, 4]);
        assert_eq!(bytes, b"VK_KHR_swapchain");
    }

    #[test]
    fn zeroed_bytes_has_requested_length() {
        let arena = SetupArena::with_capacity(1024);
        let buf = arena.zeroed_bytes(300).unwrap();
        assert_eq!(buf.len(), 300);
        assert!(buf.iter().all(|&b| b == 0));
        buf[0] = 7;
        assert_eq!(buf[0], 7);
    }

    #[test]
    fn refuses_growth_past_limit() {
        let arena = SetupArena::with_capacity(64);
        let err = arena.zeroed_bytes(1 << 20).unwrap_err();
        assert_eq!(err.requested, 1 << 20);
        assert_eq!(err.limit, 64);
    }

    #[test]
    fn reset_allows_reuse() {
        let mut arena = SetupArena::with_capacity(4096);
        {
            let a = arena.zeroed_bytes(2048).unwrap();
            assert_eq!(a.len(), 2048);
        }
        arena.reset_scratch();
        let b = arena.zeroed_bytes(2048).unwrap();
        assert_eq!(b.len(), 2048);
    }

    #[test]
    fn default_capacity_is_four_mib() {
        let arena = SetupArena::default();
        assert_eq!(arena.limit(), 4 * 1024 * 1024);
    }
}
