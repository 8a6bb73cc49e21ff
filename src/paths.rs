use std::path::{Path, PathBuf};

pub fn out_deck_dir(work_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(name)
}

pub fn out_deck(work_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    out_deck_dir(work_dir, name).join(format!("{name}.sp"))
}

/// Measurement table written by the simulator next to the deck.
pub fn out_mt0(work_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    out_deck_dir(work_dir, name).join(format!("{name}.mt0"))
}

pub fn out_sim_log(work_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    out_deck_dir(work_dir, name).join(format!("{name}.lis"))
}

pub fn out_sim_err(work_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    out_deck_dir(work_dir, name).join(format!("{name}.err"))
}

pub fn out_checkpoints(work_dir: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join("checkpoints")
}

pub fn out_checkpoint(work_dir: impl AsRef<Path>, pass: usize) -> PathBuf {
    out_checkpoints(work_dir).join(format!("pass_{pass}.json"))
}

pub fn out_report(work_dir: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join("report.txt")
}

pub fn out_csv(work_dir: impl AsRef<Path>, category: &str) -> PathBuf {
    PathBuf::from(work_dir.as_ref()).join(format!("{category}.csv"))
}
