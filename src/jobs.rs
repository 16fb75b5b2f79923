use std::{
    ffi::{OsStr, OsString},
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::host::Host;

pub const SPIRV_EXTENSION: &str = "spv";

/// One compiler run: `input` is compiled into `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ShaderJob {
    pub fn new(input: PathBuf) -> Self {
        let output = output_path(&input);
        Self { input, output }
    }
}

/// What the user asked to compile.
#[derive(Debug, Clone, Copy)]
pub struct JobRequest<'a> {
    pub paths: &'a [PathBuf],
    pub names: &'a [String],
    pub shaders_dir: &'a Path,
}

/// `dir/name.ext` -> `dir/name_ext.spv`. The extension is taken after the last dot.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let ext = input.extension().unwrap_or_default();

    let mut file_name = OsString::with_capacity(stem.len() + ext.len() + 5);
    file_name.push(stem);
    file_name.push("_");
    file_name.push(ext);
    file_name.push(".");
    file_name.push(SPIRV_EXTENSION);

    input.with_file_name(file_name)
}

/// Whether the part of `file_name` before its first dot is exactly `name`:
/// `blur.frag.glsl` has the name `blur`, never `blur.frag`.
pub fn has_shader_name(file_name: &OsStr, name: &str) -> bool {
    let bytes = file_name.as_encoded_bytes();
    let end = bytes.iter().position(|&b| b == b'.').unwrap_or(bytes.len());
    bytes[..end] == *name.as_bytes()
}

/// Make `path` absolute against the current directory and drop `.` and `..` components.
pub fn absolute(host: &impl Host, path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        host.current_dir()
            .context("Failed to get the current directory")?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            c => normalized.push(c.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Build the job list: explicit paths first, then every name match in the shaders directory.
///
/// Missing files and unmatched names only produce a warning. Nothing is deduplicated.
pub fn resolve(host: &impl Host, request: &JobRequest) -> Result<Vec<ShaderJob>> {
    let mut jobs = Vec::with_capacity(request.paths.len() + request.names.len());

    for path in request.paths {
        let input = absolute(host, path)?;
        if !host.exists(&input) {
            warn!("Shader {} does not exist", input.display());
            continue;
        }
        jobs.push(ShaderJob::new(input));
    }

    if request.names.is_empty() {
        return Ok(jobs);
    }

    let dir = absolute(host, request.shaders_dir)?;
    let files = match host.list_files(&dir) {
        Ok(files) => files,
        Err(e) => {
            warn!("Cannot read shaders directory {}: {e}", dir.display());
            return Ok(jobs);
        }
    };
    // compiled outputs share the directory, they are never sources
    let sources: Vec<&OsString> = files
        .iter()
        .filter(|file| Path::new(file).extension() != Some(OsStr::new(SPIRV_EXTENSION)))
        .collect();

    for name in request.names {
        let before = jobs.len();
        for file in sources.iter().filter(|file| has_shader_name(file, name)) {
            jobs.push(ShaderJob::new(dir.join(file)));
        }
        match jobs.len() - before {
            0 => warn!("No shader named {name} in {}", dir.display()),
            n => debug!("{n} shader(s) named {name}"),
        }
    }

    Ok(jobs)
}
