use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::LevelFilter;

use crate::driver::LaunchMode;

pub const DEFAULT_SHADERS_DIR: &str = "shaders";
/// Overrides the log level when neither `--verbose` nor `--quiet` is given.
pub const LOG_ENV: &str = "COMPILE_SHADERS_LOG";

pub const USAGE: &str = "\
Compiles GLSL shaders to SPIR-V with the Vulkan SDK's glslc.

Usage: compile_shaders [OPTIONS]

Options:
  --shader_name <NAME>...   Compile every file of the shaders directory with this name
  --shader_path <PATH>...   Compile these files
  --shaders_dir <DIR>       Directory searched by --shader_name [default: shaders]
  --launch <MODE>           sequential, parallel or detached [default: sequential]
  --jobs <N>                Compilers running at once, implies --launch parallel
  --target_env <ENV>        Forwarded to glslc as --target-env=<ENV>
  -v, --verbose             More logs
  -q, --quiet               Only warnings and errors
  -h, --help                Print this help

The compiler is looked up in $VK_SDK_PATH, then $VULKAN_SDK.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub shader_names: Vec<String>,
    pub shader_paths: Vec<PathBuf>,
    pub shaders_dir: PathBuf,
    pub launch: LaunchMode,
    pub target_env: Option<String>,
    pub log_level: Option<LevelFilter>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            shader_names: Vec::new(),
            shader_paths: Vec::new(),
            shaders_dir: PathBuf::from(DEFAULT_SHADERS_DIR),
            launch: LaunchMode::Sequential,
            target_env: None,
            log_level: None,
        }
    }
}

/// Result of reading the command line.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Build(Options),
    Help,
}

impl Options {
    /// Parse the arguments following the program name.
    pub fn parse<I, S>(args: I) -> Result<Command>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut options = Options::default();
        let mut launch = None;
        let mut jobs = None;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            i += 1;
            match flag {
                "-h" | "--help" => return Ok(Command::Help),
                "-v" | "--verbose" => options.log_level = Some(LevelFilter::Debug),
                "-q" | "--quiet" => options.log_level = Some(LevelFilter::Warn),
                "--shader_name" => {
                    let values = take_values(&args, &mut i, flag)?;
                    options.shader_names.extend(values.iter().cloned());
                }
                "--shader_path" => {
                    let values = take_values(&args, &mut i, flag)?;
                    options.shader_paths.extend(values.iter().map(PathBuf::from));
                }
                "--shaders_dir" => options.shaders_dir = take_value(&args, &mut i, flag)?.into(),
                "--target_env" => {
                    options.target_env = Some(take_value(&args, &mut i, flag)?.to_owned());
                }
                "--launch" => {
                    launch = Some(take_value(&args, &mut i, flag)?.parse::<LaunchMode>()?);
                }
                "--jobs" => {
                    let value = take_value(&args, &mut i, flag)?;
                    let n = value
                        .parse::<NonZeroUsize>()
                        .with_context(|| format!("Invalid --jobs value {value:?}"))?;
                    jobs = Some(n);
                }
                _ => bail!("Unknown argument {flag:?}, see --help"),
            }
        }

        options.launch = match (launch, jobs) {
            (None, None) => LaunchMode::Sequential,
            (Some(LaunchMode::Parallel { .. }) | None, Some(threads)) => {
                LaunchMode::Parallel { threads }
            }
            (Some(mode), None) => mode,
            (Some(_), Some(_)) => bail!("--jobs only applies to --launch parallel"),
        };

        Ok(Command::Build(options))
    }

    /// Log level from the flags, then the environment, then `Info`.
    pub fn log_level(&self, env_value: Option<&str>) -> LevelFilter {
        self.log_level
            .or_else(|| env_value.and_then(|v| v.trim().parse().ok()))
            .unwrap_or(LevelFilter::Info)
    }
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-') && arg.len() > 1
}

/// Every argument up to the next flag.
fn take_values<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a [String]> {
    let start = *i;
    while *i < args.len() && !is_flag(&args[*i]) {
        *i += 1;
    }
    if start == *i {
        return Err(anyhow!("{flag} expects at least one value"));
    }
    Ok(&args[start..*i])
}

fn take_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    match args.get(*i) {
        Some(value) if !is_flag(value) => {
            *i += 1;
            Ok(value)
        }
        _ => Err(anyhow!("{flag} expects a value")),
    }
}
