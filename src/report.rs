use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::driver::{BuildSummary, JobStatus};

pub const REPORTS_DIR: &str = "build_reports";

/// Write one csv row per job into `dir/<date>_<profile>.csv` and return the file path.
/// Runs finishing in the same millisecond get a `_<n>` suffix.
pub fn emit_csv(summary: &BuildSummary, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).context("Failed to create the reports directory")?;
    let stem = format!(
        "{}_{}",
        chrono::Local::now().format("%F-%H-%M-%S%.3f"),
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        }
    );
    let (path, file) = create_unique(dir, &stem)?;
    let mut writer = csv::Writer::from_writer(&file);

    writer.write_record(["input", "output", "status", "exit_code"])?;
    for report in &summary.reports {
        let (status, code) = match &report.status {
            JobStatus::Succeeded => ("succeeded", Some(0)),
            JobStatus::Failed { code, .. } => ("failed", *code),
            JobStatus::SpawnFailed(_) => ("spawn_failed", None),
            JobStatus::Detached => ("detached", None),
        };
        writer.serialize((
            report.job.input.to_string_lossy(),
            report.job.output.to_string_lossy(),
            status,
            code,
        ))?;
    }
    writer.flush()?;
    Ok(path)
}

fn create_unique(dir: &Path, stem: &str) -> Result<(PathBuf, File)> {
    let mut suffix = 0_usize;
    loop {
        let path = if suffix == 0 {
            dir.join(format!("{stem}.csv"))
        } else {
            dir.join(format!("{stem}_{suffix}.csv"))
        };
        match OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()))
            }
        }
    }
}
