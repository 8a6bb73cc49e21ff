use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Result, TileError};
use crate::paths::{out_deck_dir, out_mt0, out_sim_err, out_sim_log};
use crate::sim::{mt0, RawMeasurements, SimJob, Simulator};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs decks through an HSPICE-compatible binary.
#[derive(Debug, Clone)]
pub struct Hspice {
    binary: PathBuf,
}

impl Hspice {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }

    fn simulation_error(job: &SimJob, reason: impl Into<String>) -> TileError {
        TileError::Simulation {
            testbench: job.deck.clone(),
            reason: reason.into(),
        }
    }
}

impl Default for Hspice {
    fn default() -> Self {
        Self::new("hspice")
    }
}

impl Simulator for Hspice {
    fn simulate(&self, job: &SimJob) -> Result<RawMeasurements> {
        let dir = out_deck_dir(&job.run_dir, &job.deck);
        let out_file = File::create(out_sim_log(&job.run_dir, &job.deck))?;
        let err_file = File::create(out_sim_err(&job.run_dir, &job.deck))?;

        let mut child = Command::new(&self.binary)
            .arg("-i")
            .arg(format!("{}.sp", job.deck))
            .arg("-o")
            .arg(&job.deck)
            .stdout(out_file)
            .stderr(err_file)
            .current_dir(&dir)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    TileError::Environment(format!("cannot run simulator {:?}: {e}", self.binary))
                }
                _ => TileError::Io(e),
            })?;

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() > job.timeout {
                child.kill()?;
                child.wait()?;
                return Err(Self::simulation_error(
                    job,
                    format!("timed out after {:?}", job.timeout),
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        debug!("Simulated `{}` in {:?}", job.deck, start.elapsed());

        if !status.success() {
            return Err(Self::simulation_error(job, format!("simulator exited with {status}")));
        }

        let text = std::fs::read_to_string(out_mt0(&job.run_dir, &job.deck))
            .map_err(|e| Self::simulation_error(job, format!("no measurement table: {e}")))?;
        let mut values = mt0::parse(&text)?;
        Ok(job
            .measures
            .iter()
            .map(|m| (m.clone(), values.remove(m).flatten()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lut")).unwrap();
        let job = SimJob::builder()
            .deck("lut")
            .run_dir(dir.path())
            .measures(vec!["meas_total_tfall".to_string()])
            .build()
            .unwrap();
        let err = Hspice::new("/nonexistent/hspice").simulate(&job).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
