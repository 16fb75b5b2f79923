use std::{
    ffi::OsString,
    fmt::{self, Display},
    path::PathBuf,
    process::{Command, Stdio},
};

use anyhow::{Context, Result};

use crate::{compiler::CompilerLocation, jobs::ShaderJob};

/// A program and its arguments, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    /// `glslc <input> -o <output> [--target-env=<env>]`
    pub fn compile(compiler: &CompilerLocation, job: &ShaderJob, target_env: Option<&str>) -> Self {
        let mut args = vec![
            job.input.clone().into_os_string(),
            "-o".into(),
            job.output.clone().into_os_string(),
        ];
        if let Some(env) = target_env {
            args.push(format!("--target-env={env}").into());
        }
        Self {
            program: compiler.path().to_path_buf(),
            args,
        }
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// How a finished compiler process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl ProcessOutcome {
    #[inline(always)]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Starts compiler processes.
pub trait Launcher: Sync {
    /// Spawn and wait for the process.
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutcome>;

    /// Spawn the process and return right away.
    fn spawn_detached(&self, invocation: &Invocation) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl CommandLauncher {
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        command
    }
}

impl Launcher for CommandLauncher {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutcome> {
        let output = Self::command(invocation)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", invocation.program.display()))?;

        Ok(ProcessOutcome {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    // the child is never waited for
    #[allow(clippy::zombie_processes)]
    fn spawn_detached(&self, invocation: &Invocation) -> Result<()> {
        Self::command(invocation)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", invocation.program.display()))?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn compiler() -> CompilerLocation {
        let mut host = crate::host::fake::FakeHost::new("/w").with_var("VK_SDK_PATH", "/sdk");
        host.add_file(Path::new("/sdk/bin").join(crate::compiler::compiler_file_name()));
        crate::compiler::locate(&host).unwrap()
    }

    #[test]
    fn compile_arguments() {
        let job = ShaderJob::new(PathBuf::from("/w/shaders/basic.vert"));
        let invocation = Invocation::compile(&compiler(), &job, None);

        assert_eq!(invocation.program, compiler().path());
        assert_eq!(
            invocation.args,
            vec![
                OsString::from("/w/shaders/basic.vert"),
                OsString::from("-o"),
                OsString::from("/w/shaders/basic_vert.spv"),
            ]
        );
    }

    #[test]
    fn target_env_is_appended() {
        let job = ShaderJob::new(PathBuf::from("/w/a.frag"));
        let invocation = Invocation::compile(&compiler(), &job, Some("vulkan1.2"));

        assert_eq!(invocation.args.len(), 4);
        assert_eq!(invocation.args[3], "--target-env=vulkan1.2");
        assert!(invocation.to_string().ends_with("/w/a_frag.spv --target-env=vulkan1.2"));
    }

    #[cfg(unix)]
    #[test]
    fn runs_real_process() {
        let invocation = Invocation {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo broken >&2; exit 3".into()],
        };
        let outcome = CommandLauncher.run(&invocation).unwrap();
        assert_eq!(outcome.code, Some(3));
        assert!(!outcome.success());
        assert_eq!(outcome.stderr.trim(), "broken");
    }

    #[test]
    fn missing_program() {
        let invocation = Invocation {
            program: PathBuf::from("/definitely/not/a/compiler"),
            args: Vec::new(),
        };
        assert!(CommandLauncher.run(&invocation).is_err());
        assert!(CommandLauncher.spawn_detached(&invocation).is_err());
    }
}
