//! Absolute path parsing and mount-prefix matching.
//!
//! Grounded on `original_source/kernel/fs/util.cpp`'s `Path::Split` et al.,
//! simplified since this kernel's [`vfs::Vfs`](crate::vfs::Vfs) only needs
//! to split a path into mount prefix plus remainder, not a full `.`/`..`
//! normalizer (the original resolves `..` during path walking, one
//! component at a time, which `vfs::Vfs::resolve_with_depth` already does).

extern crate alloc;

/// `true` if `path` starts with `/`.
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Finds the longest mount point in `mounts` that is a prefix of `path`,
/// respecting path-component boundaries (`/foo` is not a prefix match for
/// `/foobar`).
#[must_use]
pub fn longest_prefix_match<'a>(path: &str, mounts: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut best: Option<&str> = None;
    for mount in mounts {
        if is_prefix(mount, path) {
            let better = match best {
                Some(b) => mount.len() > b.len(),
                None => true,
            };
            if better {
                best = Some(mount);
            }
        }
    }
    best
}

fn is_prefix(mount: &str, path: &str) -> bool {
    if mount == "/" {
        return true;
    }
    path == mount || path.strip_prefix(mount).is_some_and(|rest| rest.starts_with('/'))
}

/// Strips `mount` from the front of `path`, returning the remainder with
/// any leading `/` also removed (so `components` never yields an empty
/// leading component).
#[must_use]
pub fn strip_mount_prefix<'a>(path: &'a str, mount: &str) -> &'a str {
    let rest = if mount == "/" {
        path
    } else {
        path.strip_prefix(mount).unwrap_or(path)
    };
    rest.trim_start_matches('/')
}

/// Splits a relative path remainder into its `/`-separated components,
/// skipping empty components from repeated slashes.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_mount_matches_everything() {
        let mounts = ["/", "/mnt/data"];
        assert_eq!(longest_prefix_match("/etc/passwd", mounts.into_iter()), Some("/"));
    }

    #[test]
    fn longest_match_wins_over_root() {
        let mounts = ["/", "/mnt", "/mnt/data"];
        assert_eq!(longest_prefix_match("/mnt/data/x", mounts.into_iter()), Some("/mnt/data"));
    }

    #[test]
    fn prefix_respects_component_boundary() {
        let mounts = ["/mnt"];
        assert_eq!(longest_prefix_match("/mntfoo", mounts.into_iter()), None);
    }

    #[test]
    fn components_skips_empty_segments() {
        let parts: alloc::vec::Vec<_> = components("a//b/c/").collect();
        assert_eq!(parts, ["a", "b", "c"]);
    }

    #[test]
    fn strip_mount_prefix_trims_leading_slash() {
        assert_eq!(strip_mount_prefix("/mnt/data/x", "/mnt/data"), "x");
        assert_eq!(strip_mount_prefix("/etc/passwd", "/"), "etc/passwd");
    }
}
