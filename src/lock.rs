//! Lock file for single-instance enforcement.
//!
//! One scheduler should own the display at a time. The lock file lives in
//! the runtime directory and holds the owner's PID; the exclusive flock is
//! what actually enforces the claim, so a stale file from a crashed run is
//! simply relocked and rewritten.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::{Context, Result};
use fs2::FileExt;

/// Holds the instance lock for the lifetime of the process. Dropping it
/// releases the flock; the file itself is removed on clean shutdown.
pub struct InstanceLock {
    file: File,
    path: String,
}

impl InstanceLock {
    /// Acquire the exclusive instance lock, writing our PID into the file.
    /// Fails when another instance holds it.
    pub fn acquire() -> Result<Self> {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
        let path = format!("{runtime_dir}/duskr.lock");

        // Opened without truncation so a conflicting owner's PID stays
        // readable for the error message.
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open lock file {path}"))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                writeln!(&file, "{}", std::process::id())?;
                file.flush()?;
                Ok(Self { file, path })
            }
            Err(_) => {
                let mut contents = String::new();
                let _ = file.read_to_string(&mut contents);
                let owner = contents.lines().next().unwrap_or("unknown");
                anyhow::bail!("another instance is already running (PID {owner})")
            }
        }
    }

    /// Release the lock and remove the lock file.
    pub fn release(self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
