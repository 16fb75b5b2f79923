use std::{
    env::consts::EXE_SUFFIX,
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use log::debug;

use crate::host::Host;

/// SDK root variables, in lookup order.
pub const SDK_VARS: [&str; 2] = ["VK_SDK_PATH", "VULKAN_SDK"];
/// The SDK ships its tools in `Bin` on Windows and `bin` elsewhere.
const BIN_DIRS: [&str; 2] = ["bin", "Bin"];
const COMPILER_NAME: &str = "glslc";

/// Resolved path to the `glslc` executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerLocation {
    path: PathBuf,
}

impl CompilerLocation {
    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Display for CompilerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LocateError {
    /// None of the SDK variables points to an existing directory.
    SdkNotFound,
    /// An SDK root was found but none of these executables exist.
    CompilerMissing(Vec<PathBuf>),
}

impl Display for LocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateError::SdkNotFound => write!(
                f,
                "Vulkan SDK not found: set {} or {} to the SDK directory",
                SDK_VARS[0], SDK_VARS[1]
            ),
            LocateError::CompilerMissing(tried) => {
                write!(f, "{COMPILER_NAME} not found in the Vulkan SDK, tried:")?;
                for path in tried {
                    write!(f, " {}", path.display())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for LocateError {}

/// File name of the compiler executable on this platform.
pub fn compiler_file_name() -> String {
    format!("{COMPILER_NAME}{EXE_SUFFIX}")
}

/// Find `glslc` under the first SDK root that contains it.
pub fn locate(host: &impl Host) -> Result<CompilerLocation, LocateError> {
    let file_name = compiler_file_name();
    let mut tried = Vec::new();

    for var in SDK_VARS {
        let Some(root) = host.env_var(var) else {
            debug!("{var} is not set");
            continue;
        };
        let root = PathBuf::from(root);
        if !host.is_dir(&root) {
            debug!("{var}={} is not a directory", root.display());
            continue;
        }

        for bin in BIN_DIRS {
            let path = root.join(bin).join(&file_name);
            if host.exists(&path) {
                debug!("Found compiler through {var}");
                return Ok(CompilerLocation { path });
            }
            tried.push(path);
        }
    }

    if tried.is_empty() {
        Err(LocateError::SdkNotFound)
    } else {
        Err(LocateError::CompilerMissing(tried))
    }
}
