use crate::state::MAX_COLOR_ATTACHMENTS;
use crossbeam_utils::Backoff;
use sgpu_formats::attachment::{MAX_ATTACHMENT_HEIGHT, MAX_ATTACHMENT_WIDTH};
use std::sync::atomic::{AtomicBool, Ordering};

/// Tiles are 16x16 pixels so the pixel-to-lock mapping is a shift.
pub const TILE_SHIFT: u32 = 4;
pub const TILE_SIZE: u32 = 1 << TILE_SHIFT;

/// Locks per table row/column, covering the maximum attachment extent.
pub const LOCK_TABLE_WIDTH: usize = (MAX_ATTACHMENT_WIDTH >> TILE_SHIFT) as usize;
pub const LOCK_TABLE_HEIGHT: usize = (MAX_ATTACHMENT_HEIGHT >> TILE_SHIFT) as usize;

const LOCKS_PER_TABLE: usize = LOCK_TABLE_WIDTH * LOCK_TABLE_HEIGHT;

/// A spinlock guarding one 16x16 pixel tile. Holders perform a short
/// read-modify-write of a single pixel; contended acquires spin with
/// exponential backoff rather than parking the worker.
pub struct TileLock {
    locked: AtomicBool,
}

impl TileLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquires the lock, spinning until the current holder releases it.
    #[inline]
    pub fn lock(&self) -> TileLockGuard<'_> {
        let backoff = Backoff::new();
        loop {
            if !self.locked.swap(true, Ordering::Acquire) {
                return TileLockGuard { lock: self };
            }
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }
}

impl Default for TileLock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TileLockGuard<'a> {
    lock: &'a TileLock,
}

impl Drop for TileLockGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Process-lifetime spinlock tables: one per color attachment index plus a
/// single depth table shared by every depth-stencil attachment.
///
/// All pixels inside the same tile of the same attachment share a lock;
/// distinct attachments draw from disjoint tables. The grid is constructed
/// once with the device and outlives every framebuffer.
pub struct TileLockGrid {
    color: Vec<TileLock>,
    depth: Vec<TileLock>,
}

impl TileLockGrid {
    pub fn new() -> Self {
        Self {
            color: (0..MAX_COLOR_ATTACHMENTS * LOCKS_PER_TABLE)
                .map(|_| TileLock::new())
                .collect(),
            depth: (0..LOCKS_PER_TABLE).map(|_| TileLock::new()).collect(),
        }
    }

    #[inline]
    fn tile_index(x: u32, y: u32) -> usize {
        debug_assert!(x < MAX_ATTACHMENT_WIDTH && y < MAX_ATTACHMENT_HEIGHT);
        (y >> TILE_SHIFT) as usize * LOCK_TABLE_WIDTH + (x >> TILE_SHIFT) as usize
    }

    /// The lock serializing color writes to pixel `(x, y)` of the given
    /// color attachment index.
    #[inline]
    pub fn color_lock(&self, attachment_index: usize, x: u32, y: u32) -> &TileLock {
        debug_assert!(attachment_index < MAX_COLOR_ATTACHMENTS);
        &self.color[attachment_index * LOCKS_PER_TABLE + Self::tile_index(x, y)]
    }

    /// The lock serializing depth-stencil access to pixel `(x, y)`. Held
    /// independently of any color lock.
    #[inline]
    pub fn depth_lock(&self, x: u32, y: u32) -> &TileLock {
        &self.depth[Self::tile_index(x, y)]
    }
}

impl Default for TileLockGrid {
    fn default() -> Self {
        Self::new()
    }
}
