#![warn(
    clippy::correctness,
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf
)]
#![warn(
    clippy::unwrap_used,
    clippy::clone_on_ref_ptr,
    clippy::empty_structs_with_brackets,
    clippy::dbg_macro
)]

mod compiler;
mod driver;
mod host;
mod jobs;
mod launcher;
mod options;
#[cfg(feature = "report")]
mod report;

use anyhow::{Context, Result};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use crate::{
    driver::Driver,
    host::{Host, OsHost},
    jobs::JobRequest,
    launcher::{CommandLauncher, Launcher},
    options::{Command, Options, LOG_ENV},
};

fn main() -> Result<()> {
    let options = match Options::parse(std::env::args().skip(1))? {
        Command::Build(options) => options,
        Command::Help => {
            println!("{}", options::USAGE);
            return Ok(());
        }
    };

    let host = OsHost;
    let env_level = host.env_var(LOG_ENV);
    init_logger(options.log_level(env_level.as_deref().and_then(|v| v.to_str())))?;

    build(&host, &CommandLauncher, &options)
}

/// Locate the compiler, resolve the jobs and run them. Fails if any job failed.
fn build(host: &impl Host, launcher: &impl Launcher, options: &Options) -> Result<()> {
    let compiler = compiler::locate(host).context("Cannot find the compiler path")?;
    info!("Using {compiler}");

    let jobs = jobs::resolve(
        host,
        &JobRequest {
            paths: &options.shader_paths,
            names: &options.shader_names,
            shaders_dir: &options.shaders_dir,
        },
    )?;

    let driver = Driver::new(launcher, &compiler, options.target_env.as_deref());
    let summary = driver.run(jobs, options.launch)?;

    #[cfg(feature = "report")]
    match report::emit_csv(&summary, std::path::Path::new(report::REPORTS_DIR)) {
        Ok(path) => info!("Report written to {}", path.display()),
        Err(e) => log::warn!("Csv emit failed: {e:#}"),
    }

    info!(
        "{} compiled, {} launched, {} failed",
        summary.succeeded_count(),
        summary.detached_count(),
        summary.failed_count()
    );
    summary.check()
}

fn init_logger(level: LevelFilter) -> Result<()> {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .build();
    TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto)
        .context("Failed to initialize logger")
}
