//! Directory enumeration (§4.G "Directory enumeration").

use nix::dir::Dir;

use crate::error::{Error, Result};
use crate::flags::MetadataFlags;
use crate::handle::{is_delete_pending_name, stat_from_native, Handle};
use crate::stat::DirectoryEntry;

/// Enumerates up to `max_items` entries of `handle`, skipping `.`/`..`, applying `glob` (a
/// literal leaf name short-circuits to a single relative `lstat`), and omitting
/// delete-pending sentinel names when `hide_deleted` is set. Returns `(entries,
/// more_available)`; the handle's internal cursor advances so the next call continues where
/// this one left off — callers loop with a fresh cursor (`Handle::set_readdir_cursor(0)`,
/// exposed indirectly via reopening the handle) only when they want to restart.
pub(crate) fn readdir(
    handle: &Handle,
    max_items: usize,
    glob: Option<&str>,
    wanted: MetadataFlags,
    hide_deleted: bool,
) -> Result<(Vec<DirectoryEntry>, bool)> {
    if let Some(pattern) = glob {
        if !is_glob_pattern(pattern) {
            return Ok((single_glob_fast_path(handle, pattern, wanted)?, false));
        }
    }

    let dup_fd = nix::unistd::dup(handle.borrowed_fd()).map_err(Error::from)?;
    let mut dir = Dir::from_fd(dup_fd).map_err(Error::from)?;

    let mut leafnames: Vec<std::ffi::OsString> = Vec::new();
    for entry in dir.iter() {
        let entry = entry.map_err(Error::from)?;
        let name = entry.file_name().to_bytes();
        if name == b"." || name == b".." {
            continue;
        }
        let os_name = std::ffi::OsString::from(String::from_utf8_lossy(name).into_owned());
        if hide_deleted && is_delete_pending_name(&os_name) {
            continue;
        }
        if let Some(pattern) = glob {
            if !glob_match(pattern, &os_name.to_string_lossy()) {
                continue;
            }
        }
        leafnames.push(os_name);
    }
    leafnames.sort();

    let cursor = handle.readdir_cursor() as usize;
    let page: Vec<_> = leafnames.iter().skip(cursor).take(max_items.max(1)).cloned().collect();
    let more = cursor + page.len() < leafnames.len();
    handle.set_readdir_cursor((cursor + page.len()) as u64);

    let mut entries = Vec::with_capacity(page.len());
    for leaf in page {
        let stat = lstat_relative(handle, leaf.as_os_str(), wanted)?;
        entries.push(DirectoryEntry { leafname: leaf, stat });
    }
    Ok((entries, more))
}

fn single_glob_fast_path(handle: &Handle, leaf: &str, wanted: MetadataFlags) -> Result<Vec<DirectoryEntry>> {
    match lstat_relative(handle, std::ffi::OsStr::new(leaf), wanted) {
        Ok(stat) => Ok(vec![DirectoryEntry {
            leafname: leaf.into(),
            stat,
        }]),
        Err(e) if e.kind() == crate::error::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn lstat_relative(handle: &Handle, leaf: &std::ffi::OsStr, wanted: MetadataFlags) -> Result<crate::stat::Stat> {
    let st = nix::sys::stat::fstatat(handle.borrowed_fd(), leaf, nix::fcntl::AtFlags::AT_SYMLINK_NOFOLLOW)
        .map_err(Error::from)?;
    Ok(stat_from_native(&st, wanted))
}

fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// A small `*`/`?` glob matcher; sufficient for the leaf-name patterns this crate exposes to
/// callers (no `[...]` character classes).
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_wildcards() {
        assert!(glob_match("foo*", "foobar"));
        assert!(glob_match("f?o", "foo"));
        assert!(!glob_match("foo", "foobar"));
    }

    #[test]
    fn detects_glob_vs_literal() {
        assert!(!is_glob_pattern("plainname"));
        assert!(is_glob_pattern("*.txt"));
    }
}
