//! File iterator: emits regular-file paths for a root that is either a
//! single file or a directory, recursing depth-first in filesystem order.
//! Symlinks, devices, and sockets are ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Walk `root`, yielding every regular file found. If `root` is itself a
/// regular file, yields just that path. Directory recursion is depth-first;
/// within a directory, entries are visited in the order the filesystem
/// returns them (no sort is imposed).
pub fn iter_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let meta = fs::symlink_metadata(root)?;
    let mut out = Vec::new();

    if meta.is_file() {
        out.push(root.to_path_buf());
    } else if meta.is_dir() {
        walk_dir(root, &mut out)?;
    }
    // Symlinks, devices, sockets, etc. at the root are silently ignored,
    // matching how entries of those kinds are skipped during recursion.

    Ok(out)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            continue;
        } else if file_type.is_dir() {
            walk_dir(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
        // Other kinds (devices, sockets, FIFOs) are ignored.
    }
    Ok(())
}

/// Running totals the driver reports as it works through a file list.
#[derive(Default, Debug, Clone, Copy)]
pub struct Counters {
    pub total_files: usize,
    pub successfully_transferred: usize,
}

impl Counters {
    /// Record the outcome of one file transfer.
    pub fn record(&mut self, success: bool) {
        self.total_files += 1;
        if success {
            self.successfully_transferred += 1;
        }
    }

    pub fn failed(&self) -> usize {
        self.total_files - self.successfully_transferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn tmp_root(name: &str) -> PathBuf {
        let p =
            std::env::temp_dir().join(format!("wup-dfu-walk-test-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&p);
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn single_file_root() {
        let root = tmp_root("single");
        let file = root.join("firmware.bin");
        File::create(&file).unwrap();

        let files = iter_files(&file).unwrap();
        assert_eq!(files, vec![file]);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn recurses_into_subdirectories() {
        let root = tmp_root("nested");
        fs::create_dir(root.join("sub")).unwrap();
        File::create(root.join("a.bin")).unwrap();
        File::create(root.join("sub/b.bin")).unwrap();

        let mut files = iter_files(&root).unwrap();
        files.sort();

        let mut expected = vec![root.join("a.bin"), root.join("sub/b.bin")];
        expected.sort();

        assert_eq!(files, expected);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let root = tmp_root("empty");
        assert_eq!(iter_files(&root).unwrap(), Vec::<PathBuf>::new());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn counters_track_total_and_failures() {
        let mut counters = Counters::default();
        counters.record(true);
        counters.record(false);
        counters.record(true);

        assert_eq!(counters.total_files, 3);
        assert_eq!(counters.successfully_transferred, 2);
        assert_eq!(counters.failed(), 1);
    }
}
