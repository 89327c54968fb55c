//! Secure links on the filesystem: create, read back, verify.

use super::codec;
use super::record::LinkRecord;
use crate::config::types::{Result, StaunchError, XATTR_NAME};
use crate::kernel::{self, fs::PathStatus};
use std::path::{Path, PathBuf};

pub use crate::kernel::fs::classify;

/// Where link payloads are persisted.
pub trait AttributeStore {
    /// Read the payload of `link`, at most `max_len` bytes.
    fn read(&self, link: &Path, max_len: usize) -> Result<Vec<u8>>;

    fn write(&self, link: &Path, payload: &[u8]) -> Result<()>;
}

/// The `security.staunch` extended attribute on the link inode.
#[derive(Debug, Default, Clone, Copy)]
pub struct XattrStore;

impl AttributeStore for XattrStore {
    fn read(&self, link: &Path, max_len: usize) -> Result<Vec<u8>> {
        kernel::xattr::get(link, XATTR_NAME, max_len)
    }

    fn write(&self, link: &Path, payload: &[u8]) -> Result<()> {
        kernel::xattr::set(link, XATTR_NAME, payload)
    }
}

/// Removes a freshly created link unless the creation is committed.
struct LinkGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> LinkGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for LinkGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => log::info!("Removed partially created link {}", self.path.display()),
            Err(e) => log::error!(
                "Failed to remove partially created link {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

pub struct LinkStore<A: AttributeStore> {
    attributes: A,
    max_attribute_size: usize,
}

impl<A: AttributeStore> LinkStore<A> {
    pub fn new(attributes: A, max_attribute_size: usize) -> Self {
        Self {
            attributes,
            max_attribute_size,
        }
    }

    pub fn attributes(&self) -> &A {
        &self.attributes
    }

    /// Create `link_path -> launcher_path` carrying `record`.
    ///
    /// On any failure after the symlink exists, the symlink is removed again.
    /// A pre-existing path is only replaced when `force` is set and it is a
    /// symlink itself.
    pub fn create_link(
        &self,
        link_path: &Path,
        launcher_path: &Path,
        record: &LinkRecord,
        force: bool,
    ) -> Result<()> {
        // A rejected record must leave any previous link untouched.
        let payload = codec::encode(record, self.max_attribute_size)?;

        match classify(link_path)? {
            PathStatus::Missing => {}
            PathStatus::IsSymlink if force => {
                std::fs::remove_file(link_path)?;
                log::info!("Removed previous link {}", link_path.display());
            }
            _ => return Err(StaunchError::AlreadyExists(link_path.to_path_buf())),
        }

        std::os::unix::fs::symlink(launcher_path, link_path).map_err(|e| {
            StaunchError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "can't create the symbolic link {} to {}: {}",
                    link_path.display(),
                    launcher_path.display(),
                    e
                ),
            ))
        })?;
        let guard = LinkGuard::new(link_path);

        if !kernel::fs::is_executable(link_path)? {
            return Err(StaunchError::InvalidLauncher(launcher_path.to_path_buf()));
        }

        self.attributes.write(link_path, &payload)?;
        self.verify(link_path, launcher_path, record)?;

        guard.commit();
        log::info!(
            "Created secure link {} -> {} for {}",
            link_path.display(),
            launcher_path.display(),
            record.target_path().display()
        );
        Ok(())
    }

    /// Decode the record attached to `link_path`.
    pub fn read_link_record(&self, link_path: &Path) -> Result<LinkRecord> {
        let payload = self.attributes.read(link_path, self.max_attribute_size)?;
        codec::decode(&payload)
    }

    /// Where `link_path` points.
    pub fn read_link_target(&self, link_path: &Path) -> Result<PathBuf> {
        Ok(std::fs::read_link(link_path)?)
    }

    fn verify(&self, link_path: &Path, launcher_path: &Path, written: &LinkRecord) -> Result<()> {
        let read = self.read_link_record(link_path).map_err(|e| {
            StaunchError::VerificationFailed(format!(
                "unable to read back {}: {}",
                link_path.display(),
                e
            ))
        })?;

        let mut mismatches = Vec::new();
        if read.identity() != written.identity() {
            mismatches.push(format!(
                "identity written={} read={}",
                written.identity(),
                read.identity()
            ));
        }
        if read.target_path() != written.target_path() {
            mismatches.push(format!(
                "target written={} read={}",
                written.target_path().display(),
                read.target_path().display()
            ));
        }
        if !same_groups(&read, written) {
            mismatches.push(format!(
                "groups written={:?} read={:?}",
                written.groups(),
                read.groups()
            ));
        }

        let link_target = self.read_link_target(link_path)?;
        if link_target != launcher_path {
            mismatches.push(format!(
                "link target written={} read={}",
                launcher_path.display(),
                link_target.display()
            ));
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(StaunchError::VerificationFailed(mismatches.join("; ")))
        }
    }
}

fn same_groups(a: &LinkRecord, b: &LinkRecord) -> bool {
    let mut left = a.groups().to_vec();
    let mut right = b.groups().to_vec();
    left.sort();
    right.sort();
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::MIN_ATTRIBUTE_SIZE;
    use crate::link::record::GroupId;
    use crate::testing::MemoryAttributes;
    use std::os::unix::fs::{symlink, PermissionsExt};

    struct Fixture {
        dir: tempfile::TempDir,
        launcher: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let launcher = dir.path().join("stauncher");
            std::fs::write(&launcher, b"#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755)).unwrap();
            Self { dir, launcher }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }
    }

    fn store(attributes: MemoryAttributes) -> LinkStore<MemoryAttributes> {
        LinkStore::new(attributes, MIN_ATTRIBUTE_SIZE)
    }

    fn record() -> LinkRecord {
        LinkRecord::new("app.42", "/usr/bin/true", [GroupId::new(44).unwrap()]).unwrap()
    }

    #[test]
    fn create_then_read_round_trips() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        let store = store(MemoryAttributes::default());

        store.create_link(&link, &fx.launcher, &record(), false).unwrap();

        assert_eq!(store.read_link_record(&link).unwrap(), record());
        assert_eq!(store.read_link_target(&link).unwrap(), fx.launcher);
        assert_eq!(classify(&link).unwrap(), PathStatus::IsSymlink);
    }

    #[test]
    fn existing_path_without_force_is_refused() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        symlink(&fx.launcher, &link).unwrap();

        let err = store(MemoryAttributes::default())
            .create_link(&link, &fx.launcher, &record(), false)
            .unwrap_err();
        assert!(matches!(err, StaunchError::AlreadyExists(_)));
    }

    #[test]
    fn force_never_removes_a_regular_file() {
        let fx = Fixture::new();
        let file = fx.path("precious");
        std::fs::write(&file, b"data").unwrap();

        let err = store(MemoryAttributes::default())
            .create_link(&file, &fx.launcher, &record(), true)
            .unwrap_err();
        assert!(matches!(err, StaunchError::AlreadyExists(_)));
        assert_eq!(std::fs::read(&file).unwrap(), b"data");
    }

    #[test]
    fn force_replaces_an_existing_symlink() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        symlink("/somewhere/else", &link).unwrap();

        let store = store(MemoryAttributes::default());
        store.create_link(&link, &fx.launcher, &record(), true).unwrap();
        assert_eq!(store.read_link_target(&link).unwrap(), fx.launcher);
    }

    #[test]
    fn non_executable_launcher_removes_the_link() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        let not_exec = fx.path("plain");
        std::fs::write(&not_exec, b"x").unwrap();
        std::fs::set_permissions(&not_exec, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = store(MemoryAttributes::default())
            .create_link(&link, &not_exec, &record(), false)
            .unwrap_err();
        assert!(matches!(err, StaunchError::InvalidLauncher(_)));
        assert_eq!(classify(&link).unwrap(), PathStatus::Missing);
    }

    #[test]
    fn failed_attribute_write_removes_the_link() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        let attributes = MemoryAttributes::default();
        attributes.fail_writes();

        assert!(store(attributes)
            .create_link(&link, &fx.launcher, &record(), false)
            .is_err());
        assert_eq!(classify(&link).unwrap(), PathStatus::Missing);
    }

    #[test]
    fn oversize_record_creates_nothing() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        let target = format!("/{}", "x".repeat(MIN_ATTRIBUTE_SIZE));
        let big = LinkRecord::new("", target, []).unwrap();

        let err = store(MemoryAttributes::default())
            .create_link(&link, &fx.launcher, &big, false)
            .unwrap_err();
        assert!(matches!(err, StaunchError::TooLong { .. }));
        assert_eq!(classify(&link).unwrap(), PathStatus::Missing);
    }

    #[test]
    fn forced_oversize_record_keeps_the_previous_link() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        let store = store(MemoryAttributes::default());
        store.create_link(&link, &fx.launcher, &record(), false).unwrap();

        let target = format!("/{}", "x".repeat(9000));
        let big = LinkRecord::new("app.42", target, []).unwrap();
        let err = store
            .create_link(&link, &fx.launcher, &big, true)
            .unwrap_err();

        assert!(matches!(err, StaunchError::TooLong { .. }));
        assert_eq!(classify(&link).unwrap(), PathStatus::IsSymlink);
        assert_eq!(store.read_link_record(&link).unwrap(), record());
    }

    #[test]
    fn corrupted_read_back_removes_the_link() {
        let fx = Fixture::new();
        let link = fx.path("l1");
        let attributes = MemoryAttributes::default();
        attributes.corrupt_reads_with(b"staunch-1.0\0/usr/bin/false".to_vec());

        let err = store(attributes)
            .create_link(&link, &fx.launcher, &record(), false)
            .unwrap_err();
        assert!(matches!(err, StaunchError::VerificationFailed(_)));
        assert_eq!(classify(&link).unwrap(), PathStatus::Missing);
    }

    #[test]
    fn missing_attribute_reads_as_not_found() {
        let fx = Fixture::new();
        let link = fx.path("bare");
        symlink(&fx.launcher, &link).unwrap();

        let err = store(MemoryAttributes::default())
            .read_link_record(&link)
            .unwrap_err();
        assert!(matches!(err, StaunchError::NotFound(_)));
    }
}
