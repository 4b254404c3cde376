//! Thread attachment on desktop.

use bridge_traits::{error::Result, ThreadAttacher};

/// Desktop hosts have no managed-object environment; every thread may call
/// listeners directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopThreadAttacher;

impl ThreadAttacher for DesktopThreadAttacher {
    fn ensure_current_thread_attached(&self) -> Result<()> {
        Ok(())
    }
}
