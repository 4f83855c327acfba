//! Built-in filesystem bootstrap.
//!
//! Mounts an in-memory root (`RamFs`) at `/` and a synthetic device tree
//! (`DevFs`) at `/dev`. Concrete on-disk filesystems (`ext2`) attach
//! themselves separately via `ext2_vfs_init_with_callbacks`.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::devfs::DevFs;
use crate::ramfs::RamFs;
use crate::vfs::mount::mount;
use crate::vfs::traits::VfsResult;

static ROOT_FS: RamFs = RamFs::new_const();
static DEV_FS: DevFs = DevFs::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Mount the built-in root and device filesystems. Idempotent.
pub fn vfs_init_builtin_filesystems() -> VfsResult<()> {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    mount(b"/", &ROOT_FS, 0)?;
    mount(b"/dev", &DEV_FS, 0)?;
    Ok(())
}

pub fn vfs_is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}
