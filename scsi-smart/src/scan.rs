use crate::debug;
use std::io;
use std::path::{Path, PathBuf};

/// Where device nodes live
pub const DEVICE_DIR: &str = "/dev";

/// Whole-disk SCSI block devices: `sd` followed by a name that does not
/// end in a digit (`sda`, `sdab`, but not partitions like `sda1`)
pub fn is_whole_disk(name: &str) -> bool {
    name.len() > 2
        && name.starts_with("sd")
        && !name.ends_with(|c: char| c.is_ascii_digit())
}

/// Candidate whole-disk device paths under [`DEVICE_DIR`]
///
/// Only the directory is read: no device is opened.
pub fn scan_devices() -> io::Result<Vec<PathBuf>> {
    scan_dir(Path::new(DEVICE_DIR))
}

/// Candidate whole-disk device paths in `dir`, sorted
pub fn scan_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in dir.read_dir()? {
        let entry = entry?;
        if entry.file_name().to_str().is_some_and(is_whole_disk) {
            found.push(entry.path());
        }
    }
    found.sort();
    debug::println!("found {} disks in {}", found.len(), dir.display());
    Ok(found)
}
