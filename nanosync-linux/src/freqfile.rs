//! Persistence of the last good frequency estimate.
//!
//! The file holds a single human readable ppb value; at startup it preloads
//! the servo integrator so a restarted daemon starts near its old frequency
//! instead of relearning it from scratch.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use nanosync::servo::ClockState;

/// Saves at most every this many seconds, even while locked
const SAVE_INTERVAL_SECS: u64 = 60;

/// Manages the frequency file
#[derive(Debug)]
pub struct FrequencyFile {
    path: PathBuf,
    last_saved: Option<f64>,
    last_save_at: Option<std::time::Instant>,
}

impl FrequencyFile {
    /// Create a handle for the given path; nothing is touched yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_saved: None,
            last_save_at: None,
        }
    }

    /// Read the stored estimate, if the file exists and parses
    pub fn load(&self) -> Option<f64> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) => {
                log::info!(
                    "no stored frequency at {}: {error}",
                    self.path.display()
                );
                return None;
            }
        };

        match contents.trim().parse::<f64>() {
            Ok(ppb) if ppb.is_finite() => Some(ppb),
            _ => {
                log::warn!("could not parse frequency file {}", self.path.display());
                None
            }
        }
    }

    /// Store the estimate when the clock is locked and the value moved.
    /// Writes go through a temporary file so readers never see a torn
    /// value.
    pub fn save(&mut self, ppb: f64, state: ClockState) {
        if state != ClockState::Locked {
            return;
        }

        let unchanged = self
            .last_saved
            .map(|last| (last - ppb).abs() < 0.5)
            .unwrap_or(false);
        let too_soon = self
            .last_save_at
            .map(|at| at.elapsed().as_secs() < SAVE_INTERVAL_SECS)
            .unwrap_or(false);
        if unchanged || too_soon {
            return;
        }

        if let Err(error) = write_atomically(&self.path, ppb) {
            log::warn!(
                "could not store frequency in {}: {error}",
                self.path.display()
            );
            return;
        }

        self.last_saved = Some(ppb);
        self.last_save_at = Some(std::time::Instant::now());
    }

    /// Store unconditionally, e.g. on shutdown
    pub fn store_now(&mut self, ppb: f64) {
        if let Err(error) = write_atomically(&self.path, ppb) {
            log::warn!(
                "could not store frequency in {}: {error}",
                self.path.display()
            );
        }
    }
}

fn write_atomically(path: &Path, ppb: f64) -> std::io::Result<()> {
    let temporary = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temporary)?;
        writeln!(file, "{ppb:.3}")?;
        file.sync_all()?;
    }

    fs::rename(&temporary, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join("nanosync-freqfile-test");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("frequency");
        let _ = fs::remove_file(&path);

        let mut file = FrequencyFile::new(&path);
        assert_eq!(file.load(), None);

        // Tracking state never persists
        file.save(125.0, ClockState::Tracking);
        assert_eq!(file.load(), None);

        file.save(125.25, ClockState::Locked);
        assert_eq!(file.load(), Some(125.25));

        let _ = fs::remove_file(&path);
    }
}
