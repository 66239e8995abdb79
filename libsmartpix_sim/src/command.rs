use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// A single external program invocation within a job.
///
/// Whether a command must run from inside a specific directory is decided when the command is
/// built. PixelAV, for example, loads its configuration relative to its install directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Standard {
        program: PathBuf,
        args: Vec<String>,
    },
    WithWorkingDirectory {
        dir: PathBuf,
        program: PathBuf,
        args: Vec<String>,
    },
}

impl Command {
    /// A command run from the launcher's own working directory
    pub fn standard<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        Self::Standard {
            program: program.into(),
            args,
        }
    }

    /// A command run from inside `dir`
    pub fn in_directory<D: Into<PathBuf>, P: Into<PathBuf>>(
        dir: D,
        program: P,
        args: Vec<String>,
    ) -> Self {
        Self::WithWorkingDirectory {
            dir: dir.into(),
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        match self {
            Self::Standard { program, .. } => program,
            Self::WithWorkingDirectory { program, .. } => program,
        }
    }

    pub fn args(&self) -> &[String] {
        match self {
            Self::Standard { args, .. } => args,
            Self::WithWorkingDirectory { args, .. } => args,
        }
    }

    pub fn working_directory(&self) -> Option<&Path> {
        match self {
            Self::Standard { .. } => None,
            Self::WithWorkingDirectory { dir, .. } => Some(dir),
        }
    }

    /// Build the std process for this command. Output is inherited from the caller.
    pub fn to_process(&self) -> std::process::Command {
        let mut process = std::process::Command::new(self.program());
        process.args(self.args());
        if let Some(dir) = self.working_directory() {
            process.current_dir(dir);
        }
        process
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(dir) = self.working_directory() {
            write!(f, "cd {} && ", dir.display())?;
        }
        write!(f, "{}", self.program().display())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
