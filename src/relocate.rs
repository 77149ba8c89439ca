//! Moving a single file into its destination.
//!
//! A relocation first tries a same-filesystem move: the file is hard linked at
//! the destination, which the kernel refuses if that name is taken, and the
//! source name is then unlinked. When linking is not possible (most commonly
//! because source and destination live on different filesystems) it falls back
//! to streaming the bytes into a freshly created destination file and removing
//! the source afterwards. An existing destination is never overwritten.
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// How a file ended up at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateMethod {
    /// Same-filesystem move: hard link at the destination, then unlink of the source.
    Linked,
    /// Byte copy into a new file followed by removal of the source.
    Copied,
}

/// Record of a successful relocation.
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Where the file was picked up.
    pub source: PathBuf,
    /// Where the file now lives.
    pub destination: PathBuf,
    pub method: RelocateMethod,
    /// Set when the copy fallback could not carry the source permissions over.
    /// The file is relocated either way.
    pub permission_warning: Option<String>,
}

/// Errors that abort the relocation of one file.
#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("failed to create destination directory {}: {source}", .path.display())]
    DirectoryCreate { path: PathBuf, source: io::Error },

    #[error("destination file already exists: {}", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to open source file {}: {source}", .path.display())]
    OpenSource { path: PathBuf, source: io::Error },

    #[error("failed to create destination file {}: {source}", .path.display())]
    CreateDest { path: PathBuf, source: io::Error },

    /// Streaming, flushing or syncing the destination failed. The destination
    /// may be left behind incomplete.
    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The destination was written but the source could not be deleted, so
    /// the file now exists in both places.
    #[error("failed to remove source file {}: {source}", .path.display())]
    RemoveSource { path: PathBuf, source: io::Error },
}

/// Result type for relocations.
pub type RelocateResult<T> = Result<T, RelocateError>;

/// The filesystem primitives a relocation is built from.
pub trait FileOps {
    /// Makes `from` reachable at `to` without copying. Must fail with
    /// [`io::ErrorKind::AlreadyExists`] rather than replace an existing `to`.
    fn link(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Deletes the source name once the destination holds the file.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`FileOps`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn link(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::hard_link(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Moves `source` to `destination`, creating the destination's parent
/// directories as needed.
///
/// # Examples
///
/// ```no_run
/// use dumpsort::relocate::relocate;
/// use std::path::Path;
///
/// match relocate(Path::new("/dump/a.csv"), Path::new("/csv/a.csv")) {
///     Ok(done) => println!("moved via {:?}", done.method),
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
pub fn relocate(source: &Path, destination: &Path) -> RelocateResult<Relocation> {
    relocate_with(source, destination, &StdFileOps)
}

/// Same as [`relocate`], with the link and remove steps supplied by the caller.
///
/// A link error of kind `AlreadyExists` aborts the relocation. Any other link
/// error sends it down the copy path.
pub fn relocate_with<O>(source: &Path, destination: &Path, ops: &O) -> RelocateResult<Relocation>
where
    O: FileOps + ?Sized,
{
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| RelocateError::DirectoryCreate {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    // symlink_metadata so that a dangling link also counts as occupied
    if fs::symlink_metadata(destination).is_ok() {
        return Err(RelocateError::AlreadyExists {
            path: destination.to_path_buf(),
        });
    }

    let remove_source = |e: io::Error| RelocateError::RemoveSource {
        path: source.to_path_buf(),
        source: e,
    };

    match ops.link(source, destination) {
        Ok(()) => {
            ops.remove(source).map_err(remove_source)?;
            return Ok(Relocation {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
                method: RelocateMethod::Linked,
                permission_warning: None,
            });
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(RelocateError::AlreadyExists {
                path: destination.to_path_buf(),
            });
        }
        Err(e) => debug!(
            source = %source.display(),
            error = %e,
            "link failed, falling back to copy"
        ),
    }

    let permissions = copy_contents(source, destination)?;

    let permission_warning = match permissions {
        Ok(perms) => fs::set_permissions(destination, perms)
            .err()
            .map(|e| format!("could not set permissions on {}: {}", destination.display(), e)),
        Err(e) => Some(format!(
            "could not read permissions of {}: {}",
            source.display(),
            e
        )),
    };
    if let Some(ref message) = permission_warning {
        warn!("{}", message);
    }

    ops.remove(source).map_err(remove_source)?;

    Ok(Relocation {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        method: RelocateMethod::Copied,
        permission_warning,
    })
}

/// Streams `source` into a new file at `destination`.
///
/// Returns the source permissions as read from the open handle, or the error
/// that prevented reading them. Every step that closes or flushes the
/// destination is checked.
fn copy_contents(
    source: &Path,
    destination: &Path,
) -> RelocateResult<io::Result<Permissions>> {
    let mut reader = File::open(source).map_err(|e| RelocateError::OpenSource {
        path: source.to_path_buf(),
        source: e,
    })?;
    let permissions = reader.metadata().map(|m| m.permissions());

    let dest_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                RelocateError::AlreadyExists {
                    path: destination.to_path_buf(),
                }
            } else {
                RelocateError::CreateDest {
                    path: destination.to_path_buf(),
                    source: e,
                }
            }
        })?;

    let copy_error = |e: io::Error| RelocateError::Copy {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: e,
    };

    let mut writer = BufWriter::new(dest_file);
    io::copy(&mut reader, &mut writer).map_err(copy_error)?;
    writer.flush().map_err(copy_error)?;
    let dest_file = writer.into_inner().map_err(|e| copy_error(e.into_error()))?;
    dest_file.sync_all().map_err(copy_error)?;

    Ok(permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Links always fail, as they do across filesystems.
    struct CrossDevice;

    impl FileOps for CrossDevice {
        fn link(&self, _: &Path, _: &Path) -> io::Result<()> {
            Err(io::Error::other("simulated cross-device link"))
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            fs::remove_file(path)
        }
    }

    /// Copies succeed but the source can never be deleted.
    struct StuckSource;

    impl FileOps for StuckSource {
        fn link(&self, _: &Path, _: &Path) -> io::Result<()> {
            Err(io::Error::other("simulated cross-device link"))
        }

        fn remove(&self, _: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only dump"))
        }
    }

    /// Another writer claims the destination right before the link.
    struct ContendedDestination;

    impl FileOps for ContendedDestination {
        fn link(&self, from: &Path, to: &Path) -> io::Result<()> {
            fs::write(to, "other writer")?;
            fs::hard_link(from, to)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            fs::remove_file(path)
        }
    }

    #[test]
    fn test_relocate_links_and_creates_parent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("report.csv");
        fs::write(&source, "a,b,c").expect("Failed to write test file");
        let destination = temp_dir.path().join("nested/archive/report.csv");

        let done = relocate(&source, &destination).expect("Failed to relocate");

        assert_eq!(done.method, RelocateMethod::Linked);
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&destination).unwrap(), "a,b,c");
    }

    #[test]
    fn test_relocate_refuses_to_overwrite() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        let destination = temp_dir.path().join("out/a.txt");
        fs::write(&source, "new").unwrap();
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, "old").unwrap();

        let result = relocate(&source, &destination);

        assert!(matches!(result, Err(RelocateError::AlreadyExists { .. })));
        assert_eq!(fs::read_to_string(&source).unwrap(), "new");
        assert_eq!(fs::read_to_string(&destination).unwrap(), "old");
    }

    #[test]
    fn test_destination_taken_after_check_is_not_overwritten() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        let destination = temp_dir.path().join("out/a.txt");
        fs::write(&source, "ours").unwrap();

        let result = relocate_with(&source, &destination, &ContendedDestination);

        assert!(matches!(result, Err(RelocateError::AlreadyExists { .. })));
        assert_eq!(fs::read_to_string(&source).unwrap(), "ours");
        assert_eq!(fs::read_to_string(&destination).unwrap(), "other writer");
    }

    #[test]
    fn test_copy_fallback_is_byte_identical() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("blob.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
        fs::write(&source, &content).unwrap();
        let destination = temp_dir.path().join("dest/blob.bin");

        let done = relocate_with(&source, &destination, &CrossDevice).expect("Copy failed");

        assert_eq!(done.method, RelocateMethod::Copied);
        assert!(done.permission_warning.is_none());
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), content);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_fallback_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("run.sh");
        fs::write(&source, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&source, Permissions::from_mode(0o750)).unwrap();
        let destination = temp_dir.path().join("bin/run.sh");

        relocate_with(&source, &destination, &CrossDevice).expect("Copy failed");

        let mode = fs::metadata(&destination).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_copy_fallback_missing_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("gone.txt");
        let destination = temp_dir.path().join("dest/gone.txt");

        let result = relocate_with(&source, &destination, &CrossDevice);

        assert!(matches!(result, Err(RelocateError::OpenSource { .. })));
        assert!(!destination.exists());
    }

    #[test]
    fn test_copy_fallback_unwritable_destination_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "keep me").unwrap();
        // Longer than any filesystem's name limit
        let destination = temp_dir.path().join("out").join("n".repeat(300));

        let result = relocate_with(&source, &destination, &CrossDevice);

        assert!(matches!(result, Err(RelocateError::CreateDest { .. })));
        assert_eq!(fs::read_to_string(&source).unwrap(), "keep me");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_fallback_read_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // Opening a directory works on unix, reading from it does not
        let source = temp_dir.path().join("folder");
        fs::create_dir(&source).unwrap();
        let destination = temp_dir.path().join("out/folder");

        let result = relocate_with(&source, &destination, &CrossDevice);

        match result {
            Err(RelocateError::Copy { from, to, .. }) => {
                assert_eq!(from, source);
                assert_eq!(to, destination);
            }
            other => panic!("expected a copy error, got {:?}", other),
        }
        assert!(source.is_dir());
    }

    #[test]
    fn test_source_removal_failure_keeps_both_copies() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("data.bin");
        let content: Vec<u8> = (0..=255u8).collect();
        fs::write(&source, &content).unwrap();
        let destination = temp_dir.path().join("dest/data.bin");

        let result = relocate_with(&source, &destination, &StuckSource);

        match result {
            Err(RelocateError::RemoveSource { path, source: e }) => {
                assert_eq!(path, source);
                assert_eq!(e.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected a remove error, got {:?}", other),
        }
        assert_eq!(fs::read(&source).unwrap(), content);
        assert_eq!(fs::read(&destination).unwrap(), content);
    }

    #[test]
    fn test_directory_create_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("a.txt");
        fs::write(&source, "x").unwrap();
        // A regular file where a directory is expected
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let result = relocate(&source, &blocker.join("a.txt"));

        assert!(matches!(result, Err(RelocateError::DirectoryCreate { .. })));
        assert!(source.exists());
    }
}
