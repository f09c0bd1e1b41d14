// X authority records and the per-server authority file
//
// A record is the standard xauth binary entry: big-endian family, then four
// length-prefixed byte strings (address, display number, mechanism name,
// cookie). The per-server file lives under `<run-directory>/root/<address>`
// and is unlinked on every stop path.

use log::{debug, warn};
use rand::Rng;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Authority entry scoped to one host.
pub const FAMILY_LOCAL: u16 = 256;
/// Authority entry matching any host.
pub const FAMILY_WILD: u16 = 65535;

const MIT_MAGIC_COOKIE: &str = "MIT-MAGIC-COOKIE-1";

/// One XAuthority record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XAuthority {
    family: u16,
    address: Vec<u8>,
    number: String,
    name: String,
    data: Vec<u8>,
}

impl XAuthority {
    pub fn new(family: u16, address: Vec<u8>, number: String, name: String, data: Vec<u8>) -> Self {
        Self {
            family,
            address,
            number,
            name,
            data,
        }
    }

    /// A fresh MIT-MAGIC-COOKIE-1 record for a local display.
    pub fn new_local_cookie(hostname: &str, display_number: u32) -> Self {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill(&mut cookie[..]);
        Self {
            family: FAMILY_LOCAL,
            address: hostname.as_bytes().to_vec(),
            number: display_number.to_string(),
            name: MIT_MAGIC_COOKIE.to_string(),
            data: cookie.to_vec(),
        }
    }

    pub fn family(&self) -> u16 {
        self.family
    }

    pub fn address(&self) -> &[u8] {
        &self.address
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace `path` with this record. Truncate-then-write; mode 0600.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        self.write_entry(&mut file)
    }

    fn write_entry<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.family.to_be_bytes())?;
        write_block(writer, &self.address)?;
        write_block(writer, self.number.as_bytes())?;
        write_block(writer, self.name.as_bytes())?;
        write_block(writer, &self.data)
    }
}

fn write_block<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&(bytes.len() as u16).to_be_bytes())?;
    writer.write_all(bytes)
}

/// Lifecycle of the authority file backing one local X server.
#[derive(Debug, Default)]
pub struct AuthorityFile {
    path: Option<PathBuf>,
}

impl AuthorityFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Materialise `authority` under `<run_directory>/root/<address>`.
    /// Failures are logged, not fatal: the caller simply ends up without an
    /// `-auth` argument if no path was produced.
    pub fn write(&mut self, authority: &XAuthority, run_directory: &Path, address: &str) {
        if self.path.is_none() {
            let dir = run_directory.join("root");
            if let Err(e) = std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(&dir)
            {
                warn!(
                    "Failed to make authority directory {}: {}",
                    dir.display(),
                    e
                );
            }
            self.path = Some(dir.join(address));
        }

        let path = self.path.as_ref().unwrap();
        debug!("Writing X server authority to {}", path.display());
        if let Err(e) = authority.write(path) {
            warn!("Failed to write authority: {}", e);
        }
    }

    /// Unlink the file and clear the stored path. Safe on every stop path.
    pub fn remove(&mut self) {
        if let Some(path) = self.path.take() {
            debug!("Removing X server authority {}", path.display());
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove authority {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthorityFile, XAuthority, FAMILY_LOCAL};
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn cookie_record_has_sixteen_random_bytes() {
        let authority = XAuthority::new_local_cookie("host", 0);
        assert_eq!(authority.family(), FAMILY_LOCAL);
        assert_eq!(authority.name(), "MIT-MAGIC-COOKIE-1");
        assert_eq!(authority.data().len(), 16);
        assert_ne!(
            XAuthority::new_local_cookie("host", 0).data(),
            authority.data()
        );
    }

    #[test]
    fn serialises_the_xauth_binary_layout() {
        let authority = XAuthority::new(
            FAMILY_LOCAL,
            b"host".to_vec(),
            "2".to_string(),
            "MIT-MAGIC-COOKIE-1".to_string(),
            vec![0xde, 0xad],
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth");
        authority.write(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let mut expected = vec![0x01, 0x00]; // family 256
        expected.extend_from_slice(&[0, 4]);
        expected.extend_from_slice(b"host");
        expected.extend_from_slice(&[0, 1]);
        expected.extend_from_slice(b"2");
        expected.extend_from_slice(&[0, 18]);
        expected.extend_from_slice(b"MIT-MAGIC-COOKIE-1");
        expected.extend_from_slice(&[0, 2]);
        expected.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn write_replaces_previous_contents() {
        let authority = XAuthority::new_local_cookie("host", 0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth");
        authority.write(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        authority.write(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn authority_file_lives_under_run_root_and_is_removed_on_stop() {
        let authority = XAuthority::new_local_cookie("host", 2);
        let dir = tempfile::tempdir().unwrap();

        let mut file = AuthorityFile::new();
        file.write(&authority, dir.path(), ":2");

        let path = dir.path().join("root").join(":2");
        assert_eq!(file.path(), Some(path.as_path()));
        assert!(path.exists());

        let mode = std::fs::metadata(dir.path().join("root"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);

        file.remove();
        assert!(file.path().is_none());
        assert!(!path.exists());

        // A second remove must not touch anything.
        file.remove();
    }
}
