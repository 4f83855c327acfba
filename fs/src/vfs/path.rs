//! Path-to-inode resolution.
//!
//! A path is first routed to the mounted filesystem that owns the longest
//! matching prefix (see `mount::resolve_mount`), then walked component by
//! component from that filesystem's root inode via `FileSystem::lookup`.

use crate::MAX_PATH_LEN;
use crate::vfs::mount::resolve_mount;
use crate::vfs::traits::{FileSystem, FileType, InodeId, VfsError, VfsResult};

/// A path that has been resolved down to a concrete inode on a concrete
/// filesystem.
pub struct ResolvedPath {
    pub inode: InodeId,
    pub fs: &'static dyn FileSystem,
}

fn split_components(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|&b| b == b'/').filter(|c| !c.is_empty())
}

/// Resolve `path` (absolute, `/`-separated) down to its inode.
///
/// Every intermediate component must be a directory; the final component
/// may be anything. Symlinks are not followed (none of the in-tree
/// filesystems currently produce `FileType::Symlink` from `lookup`).
pub fn resolve_path(path: &[u8]) -> VfsResult<ResolvedPath> {
    if path.len() > MAX_PATH_LEN {
        return Err(VfsError::NameTooLong);
    }

    let (fs, relative) = resolve_mount(path)?;
    let mut inode = fs.root_inode();

    let mut components = split_components(relative).peekable();
    if components.peek().is_none() {
        return Ok(ResolvedPath { inode, fs });
    }

    while let Some(name) = components.next() {
        let is_last = components.peek().is_none();
        if !is_last {
            let stat = fs.stat(inode)?;
            if stat.file_type != FileType::Directory {
                return Err(VfsError::NotDirectory);
            }
        }
        inode = fs.lookup(inode, name)?;
    }

    Ok(ResolvedPath { inode, fs })
}

/// Resolve the parent directory of `path` and return it together with the
/// final path component's name (borrowed from `path`).
///
/// Used by operations that create or remove a directory entry by name
/// (`create`, `unlink`, `rename`) rather than an already-existing inode.
pub fn resolve_parent(path: &[u8]) -> VfsResult<(ResolvedPath, &[u8])> {
    if path.is_empty() || path[0] != b'/' {
        return Err(VfsError::InvalidPath);
    }

    let mut last = None;
    for (idx, &b) in path.iter().enumerate() {
        if b == b'/' {
            last = Some(idx);
        }
    }
    let split_at = last.ok_or(VfsError::InvalidPath)?;
    let parent_len = split_at;
    let name = &path[split_at + 1..];
    if name.is_empty() {
        return Err(VfsError::InvalidPath);
    }

    let parent_path: &[u8] = if parent_len == 0 { b"/" } else { &path[..parent_len] };
    let resolved = resolve_path(parent_path)?;
    let stat = resolved.fs.stat(resolved.inode)?;
    if stat.file_type != FileType::Directory {
        return Err(VfsError::NotDirectory);
    }

    Ok((resolved, name))
}
