//! Volume statistics (§4.G "Statfs").

use std::fs;
use std::path::Path;

use nix::sys::statvfs;

use crate::error::{Error, Result};
use crate::flags::{FsMetadataFlags, VolumeFeatures};
use crate::handle::Handle;
use crate::stat::StatfsResult;

/// Queries volume statistics for the filesystem backing `handle`, populating only the fields
/// requested in `wanted` (plus whatever `/etc/mtab` lookup cheaply supplies alongside them).
pub(crate) fn statfs(handle: &Handle, wanted: FsMetadataFlags) -> Result<StatfsResult> {
    let vfs = statvfs::fstatvfs(handle.borrowed_fd()).map_err(Error::from)?;
    let mut result = StatfsResult::default();

    if wanted.contains(FsMetadataFlags::BSIZE) {
        result.bsize = Some(vfs.block_size());
    }
    if wanted.contains(FsMetadataFlags::IOSIZE) {
        result.iosize = Some(vfs.fragment_size());
    }
    if wanted.contains(FsMetadataFlags::BLOCKS) {
        result.blocks = Some(vfs.blocks());
    }
    if wanted.contains(FsMetadataFlags::BFREE) {
        result.bfree = Some(vfs.blocks_free());
    }
    if wanted.contains(FsMetadataFlags::BAVAIL) {
        result.bavail = Some(vfs.blocks_available());
    }
    if wanted.contains(FsMetadataFlags::FILES) {
        result.files = Some(vfs.files());
    }
    if wanted.contains(FsMetadataFlags::FFREE) {
        result.ffree = Some(vfs.files_free());
    }
    if wanted.contains(FsMetadataFlags::NAMEMAX) {
        result.namemax = Some(vfs.name_max());
    }

    let needs_mount_entry = wanted.intersects(
        FsMetadataFlags::FSTYPENAME | FsMetadataFlags::MNTFROMNAME | FsMetadataFlags::MNTONNAME | FsMetadataFlags::FLAGS,
    );
    if needs_mount_entry {
        if let Ok(path) = handle.path(false) {
            if let Some(entry) = best_mount_entry(&path) {
                if wanted.contains(FsMetadataFlags::FSTYPENAME) {
                    result.fstypename = Some(entry.fstype.clone());
                }
                if wanted.contains(FsMetadataFlags::MNTFROMNAME) {
                    result.mntfromname = Some(entry.device.clone());
                }
                if wanted.contains(FsMetadataFlags::MNTONNAME) {
                    result.mntonname = Some(entry.mount_point.clone());
                }
                if wanted.contains(FsMetadataFlags::FLAGS) {
                    result.features = features_from_entry(&entry);
                }
            }
        }
    }

    Ok(result)
}

struct MountEntry {
    device: String,
    mount_point: String,
    fstype: String,
    options: String,
}

/// Parses `/etc/mtab` (falling back to `/proc/mounts`) and picks the entry whose mount point
/// has the longest byte-overlap with `path`'s components, ties broken by registration order
/// (first match in the file wins).
fn best_mount_entry(path: &Path) -> Option<MountEntry> {
    let contents = fs::read_to_string("/etc/mtab").or_else(|_| fs::read_to_string("/proc/mounts")).ok()?;
    let target = path.to_string_lossy();

    let mut best: Option<(usize, MountEntry)> = None;
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(mount_point), Some(fstype), Some(options)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if !target.starts_with(mount_point) {
            continue;
        }
        let score = byte_overlap(&target, mount_point);
        let better = match &best {
            Some((best_score, _)) => score > *best_score,
            None => true,
        };
        if better {
            best = Some((
                score,
                MountEntry {
                    device: device.to_string(),
                    mount_point: mount_point.to_string(),
                    fstype: fstype.to_string(),
                    options: options.to_string(),
                },
            ));
        }
    }
    best.map(|(_, entry)| entry)
}

fn byte_overlap(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

fn features_from_entry(entry: &MountEntry) -> VolumeFeatures {
    let mut features = VolumeFeatures::empty();
    let opts: Vec<&str> = entry.options.split(',').collect();
    if opts.contains(&"ro") {
        features |= VolumeFeatures::RDONLY;
    }
    if opts.contains(&"noexec") {
        features |= VolumeFeatures::NOEXEC;
    }
    if opts.contains(&"nosuid") {
        features |= VolumeFeatures::NOSUID;
    }
    if opts.iter().any(|o| o.starts_with("acl")) {
        features |= VolumeFeatures::ACLS;
    }
    if opts.iter().any(|o| o.starts_with("user_xattr") || *o == "xattr") {
        features |= VolumeFeatures::XATTR;
    }
    match entry.fstype.as_str() {
        "btrfs" | "zfs" => features |= VolumeFeatures::COMPRESSION | VolumeFeatures::FILECOMPRESSION | VolumeFeatures::EXTENTS,
        "ext4" | "xfs" => features |= VolumeFeatures::EXTENTS,
        _ => {}
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_overlap_prefers_longer_match() {
        assert!(byte_overlap("/home/user/file", "/home/user") > byte_overlap("/home/user/file", "/home"));
    }

    #[test]
    fn features_parse_ro_option() {
        let entry = MountEntry {
            device: "tmpfs".into(),
            mount_point: "/".into(),
            fstype: "tmpfs".into(),
            options: "ro,noexec".into(),
        };
        let features = features_from_entry(&entry);
        assert!(features.contains(VolumeFeatures::RDONLY));
        assert!(features.contains(VolumeFeatures::NOEXEC));
    }
}
