use std::{
    fmt::{self, Display},
    num::NonZeroUsize,
    str::FromStr,
};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::{
    compiler::CompilerLocation,
    jobs::ShaderJob,
    launcher::{Invocation, Launcher},
};

/// How compiler processes are started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// One after the other, waiting for each.
    Sequential,
    /// At most `threads` compilers at once, waiting for all.
    Parallel { threads: NonZeroUsize },
    /// Start everything, wait for nothing.
    Detached,
}

impl LaunchMode {
    pub fn parallel_default() -> Self {
        let threads = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::Parallel { threads }
    }
}

impl FromStr for LaunchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::parallel_default()),
            "detached" => Ok(Self::Detached),
            _ => bail!("Unknown launch mode {s:?}, expected sequential, parallel or detached"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed { code: Option<i32>, stderr: String },
    SpawnFailed(String),
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: ShaderJob,
    pub status: JobStatus,
}

impl JobReport {
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Failed { .. } | JobStatus::SpawnFailed(_)
        )
    }
}

impl Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = self.job.input.display();
        match &self.status {
            JobStatus::Succeeded => write!(f, "{input} -> {}", self.job.output.display()),
            JobStatus::Failed { code: Some(code), .. } => {
                write!(f, "{input}: compiler exited with code {code}")
            }
            JobStatus::Failed { code: None, .. } => {
                write!(f, "{input}: compiler terminated by a signal")
            }
            JobStatus::SpawnFailed(e) => write!(f, "{input}: {e}"),
            JobStatus::Detached => write!(f, "{input}: launched"),
        }
    }
}

/// Reports of a whole run, in job order.
#[derive(Debug, Default)]
pub struct BuildSummary {
    pub reports: Vec<JobReport>,
}

impl BuildSummary {
    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|r| r.is_failure())
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == JobStatus::Succeeded)
            .count()
    }

    pub fn detached_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == JobStatus::Detached)
            .count()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Log every report and fail if any job failed.
    pub fn check(&self) -> Result<()> {
        for report in &self.reports {
            match &report.status {
                JobStatus::Succeeded => info!("{report}"),
                JobStatus::Detached => debug!("{report}"),
                JobStatus::Failed { stderr, .. } => {
                    error!("{report}");
                    if !stderr.trim().is_empty() {
                        error!("{}", stderr.trim_end());
                    }
                }
                JobStatus::SpawnFailed(_) => error!("{report}"),
            }
        }

        if self.is_success() {
            Ok(())
        } else {
            Err(anyhow!(
                "{} of {} shader(s) failed to compile",
                self.failed_count(),
                self.reports.len()
            ))
        }
    }
}

/// Runs jobs through a [`Launcher`].
pub struct Driver<'a, L: Launcher> {
    launcher: &'a L,
    compiler: &'a CompilerLocation,
    target_env: Option<&'a str>,
}

impl<'a, L: Launcher> Driver<'a, L> {
    pub fn new(launcher: &'a L, compiler: &'a CompilerLocation, target_env: Option<&'a str>) -> Self {
        Self {
            launcher,
            compiler,
            target_env,
        }
    }

    pub fn run(&self, jobs: Vec<ShaderJob>, mode: LaunchMode) -> Result<BuildSummary> {
        if jobs.is_empty() {
            warn!("Nothing to compile");
            return Ok(BuildSummary::default());
        }
        debug!("Running {} job(s) in {mode:?} mode", jobs.len());

        let reports = match mode {
            LaunchMode::Sequential => jobs.into_iter().map(|job| self.run_one(job)).collect(),
            LaunchMode::Parallel { threads } => self.run_parallel(jobs, threads)?,
            LaunchMode::Detached => jobs.into_iter().map(|job| self.detach_one(job)).collect(),
        };
        Ok(BuildSummary { reports })
    }

    fn invocation(&self, job: &ShaderJob) -> Invocation {
        Invocation::compile(self.compiler, job, self.target_env)
    }

    fn run_one(&self, job: ShaderJob) -> JobReport {
        let invocation = self.invocation(&job);
        debug!("{invocation}");
        let status = match self.launcher.run(&invocation) {
            Ok(outcome) if outcome.success() => JobStatus::Succeeded,
            Ok(outcome) => JobStatus::Failed {
                code: outcome.code,
                stderr: outcome.stderr,
            },
            Err(e) => JobStatus::SpawnFailed(format!("{e:#}")),
        };
        JobReport { job, status }
    }

    fn detach_one(&self, job: ShaderJob) -> JobReport {
        let invocation = self.invocation(&job);
        debug!("{invocation} &");
        let status = match self.launcher.spawn_detached(&invocation) {
            Ok(()) => JobStatus::Detached,
            Err(e) => JobStatus::SpawnFailed(format!("{e:#}")),
        };
        JobReport { job, status }
    }

    fn run_parallel(&self, jobs: Vec<ShaderJob>, threads: NonZeroUsize) -> Result<Vec<JobReport>> {
        let count = jobs.len();
        let threads = threads.get().min(count);
        let (job_sender, job_receiver) = crossbeam_channel::unbounded::<(usize, ShaderJob)>();
        let (report_sender, report_receiver) = crossbeam_channel::unbounded();

        for job in jobs.into_iter().enumerate() {
            job_sender.send(job).context("Channel disconnected")?;
        }
        // workers stop once the queue is drained
        drop(job_sender);

        crossbeam_utils::thread::scope(|s| {
            for i in 0..threads {
                let receiver = job_receiver.clone();
                let sender = report_sender.clone();
                s.builder()
                    .name(format!("Compiler {}", i))
                    .spawn(move |_| self.worker_main(receiver, sender))
                    .context("Thread spawn failed")?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .map_err(|_| anyhow!("Compiler worker panicked"))??;
        drop(report_sender);

        let mut reports: Vec<Option<JobReport>> = vec![None; count];
        for (index, report) in report_receiver.iter() {
            reports[index] = Some(report);
        }
        reports
            .into_iter()
            .map(|r| r.ok_or_else(|| anyhow!("A job was never reported")))
            .collect()
    }

    fn worker_main(&self, receiver: Receiver<(usize, ShaderJob)>, sender: Sender<(usize, JobReport)>) {
        for (index, job) in receiver.iter() {
            let report = self.run_one(job);
            if sender.send((index, report)).is_err() {
                warn!("Report channel disconnected");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::{
        compiler::{compiler_file_name, locate},
        host::fake::FakeHost,
        launcher::fake::FakeLauncher,
    };

    fn compiler() -> CompilerLocation {
        let mut host = FakeHost::new("/w").with_var("VULKAN_SDK", "/sdk");
        host.add_file(Path::new("/sdk/bin").join(compiler_file_name()));
        locate(&host).unwrap()
    }

    fn jobs(names: &[&str]) -> Vec<ShaderJob> {
        names
            .iter()
            .map(|n| ShaderJob::new(PathBuf::from(format!("/w/shaders/{n}"))))
            .collect()
    }

    fn threads(n: usize) -> LaunchMode {
        LaunchMode::Parallel {
            threads: NonZeroUsize::new(n).unwrap(),
        }
    }

    #[test]
    fn sequential_runs_in_order() {
        let launcher = FakeLauncher::default();
        let compiler = compiler();
        let driver = Driver::new(&launcher, &compiler, None);

        let summary = driver
            .run(jobs(&["a.vert", "b.frag", "c.comp"]), LaunchMode::Sequential)
            .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.succeeded_count(), 3);
        let inputs: Vec<_> = launcher.ran().into_iter().map(|i| i.args[0].clone()).collect();
        assert_eq!(
            inputs,
            vec!["/w/shaders/a.vert", "/w/shaders/b.frag", "/w/shaders/c.comp"]
        );
        assert!(summary.check().is_ok());
    }

    #[test]
    fn failure_is_reported() {
        let mut launcher = FakeLauncher::default();
        launcher.failures.insert(
            PathBuf::from("/w/shaders/b.frag"),
            (1, "b.frag:3: error: syntax error".to_owned()),
        );
        let compiler = compiler();
        let driver = Driver::new(&launcher, &compiler, None);

        let summary = driver
            .run(jobs(&["a.vert", "b.frag"]), LaunchMode::Sequential)
            .unwrap();

        assert!(!summary.is_success());
        assert_eq!(summary.failed_count(), 1);
        let failed = summary.failures().next().unwrap();
        assert_eq!(
            failed.status,
            JobStatus::Failed {
                code: Some(1),
                stderr: "b.frag:3: error: syntax error".to_owned()
            }
        );
        assert!(summary.check().is_err());
    }

    #[test]
    fn spawn_failure_is_reported() {
        let mut launcher = FakeLauncher::default();
        launcher.unspawnable.push(PathBuf::from("/w/shaders/a.vert"));
        let compiler = compiler();
        let driver = Driver::new(&launcher, &compiler, None);

        let summary = driver.run(jobs(&["a.vert"]), LaunchMode::Sequential).unwrap();
        assert!(matches!(summary.reports[0].status, JobStatus::SpawnFailed(_)));
        assert!(!summary.is_success());
    }

    #[test]
    fn parallel_matches_sequential() {
        let names = ["a.vert", "b.frag", "c.comp", "d.geom", "e.tesc", "f.tese", "g.mesh"];
        let mut launcher = FakeLauncher::default();
        launcher
            .failures
            .insert(PathBuf::from("/w/shaders/d.geom"), (2, String::new()));
        let compiler = compiler();
        let driver = Driver::new(&launcher, &compiler, Some("vulkan1.2"));

        let sequential = driver.run(jobs(&names), LaunchMode::Sequential).unwrap();
        let parallel = driver.run(jobs(&names), threads(3)).unwrap();

        assert_eq!(sequential.reports, parallel.reports);
        assert_eq!(parallel.failed_count(), 1);
        assert_eq!(launcher.ran().len(), names.len() * 2);
    }

    #[test]
    fn more_threads_than_jobs() {
        let launcher = FakeLauncher::default();
        let compiler = compiler();
        let driver = Driver::new(&launcher, &compiler, None);

        let summary = driver.run(jobs(&["a.vert"]), threads(16)).unwrap();
        assert_eq!(summary.succeeded_count(), 1);
    }

    #[test]
    fn detached_does_not_wait() {
        let launcher = FakeLauncher::default();
        let compiler = compiler();
        let driver = Driver::new(&launcher, &compiler, None);

        let summary = driver
            .run(jobs(&["a.vert", "b.frag"]), LaunchMode::Detached)
            .unwrap();

        assert!(launcher.ran().is_empty());
        assert_eq!(launcher.detached().len(), 2);
        assert_eq!(summary.detached_count(), 2);
        assert!(summary.is_success());
    }

    #[test]
    fn no_jobs() {
        let launcher = FakeLauncher::default();
        let compiler = compiler();
        let driver = Driver::new(&launcher, &compiler, None);

        let summary = driver.run(Vec::new(), threads(4)).unwrap();
        assert!(summary.reports.is_empty());
        assert!(summary.check().is_ok());
    }

    #[test]
    fn launch_mode_from_str() {
        assert_eq!("sequential".parse::<LaunchMode>().unwrap(), LaunchMode::Sequential);
        assert_eq!("detached".parse::<LaunchMode>().unwrap(), LaunchMode::Detached);
        assert!(matches!(
            "parallel".parse::<LaunchMode>().unwrap(),
            LaunchMode::Parallel { .. }
        ));
        assert!("async".parse::<LaunchMode>().is_err());
    }
}
