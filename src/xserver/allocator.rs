// Display number allocation and conflict detection
//
// A display number is in use when we have reserved it ourselves or when a
// foreign X server holds a valid lock file for it. The lock probe is
// advisory: a server racing us will fail to bind its socket and exit, which
// flows through the normal stopped cleanup.

use log::debug;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Hands out unused display numbers; one instance per process.
#[derive(Debug)]
pub struct DisplayNumberAllocator {
    minimum: u32,
    lock_dir: PathBuf,
    reserved: Mutex<Vec<u32>>,
}

impl DisplayNumberAllocator {
    pub fn new(minimum: u32) -> Self {
        Self::with_lock_dir(minimum, "/tmp")
    }

    /// Probe lock files somewhere other than `/tmp` (tests, relocated roots).
    pub fn with_lock_dir(minimum: u32, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            minimum,
            lock_dir: lock_dir.into(),
            reserved: Mutex::new(Vec::new()),
        }
    }

    /// Reserve the smallest display number not in use.
    pub fn reserve(&self) -> u32 {
        let mut reserved = self.reserved.lock().unwrap();
        let mut number = self.minimum;
        while reserved.contains(&number) || self.foreign_lock_valid(number) {
            number += 1;
        }
        reserved.push(number);
        debug!("Reserved display number {}", number);
        number
    }

    /// Release a reservation; no-op if the number is not ours.
    pub fn release(&self, number: u32) {
        let mut reserved = self.reserved.lock().unwrap();
        if let Some(index) = reserved.iter().position(|&n| n == number) {
            reserved.remove(index);
            debug!("Released display number {}", number);
        }
    }

    /// Whether a foreign X server holds a valid `.X<n>-lock`. Unreadable or
    /// unparseable lock contents count as valid.
    fn foreign_lock_valid(&self, number: u32) -> bool {
        let path = self.lock_dir.join(format!(".X{}-lock", number));
        if !path.exists() {
            return false;
        }

        match read_lock_pid(&path) {
            Some(pid) if pid > 0 => !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH)),
            Some(_) => false,
            None => true,
        }
    }
}

fn read_lock_pid(path: &Path) -> Option<i32> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}
