use std::path::PathBuf;

/// Failures the submission pipeline reports to the user.
#[derive(thiserror::Error, Debug)]
pub enum SwarmError {
    #[error("no valid commands found in {}", .file.display())]
    NoCommands { file: PathBuf },

    /// The plan builder was handed zero task scripts; callers check for this first.
    #[error("cannot build a job array from an empty task list")]
    EmptyTaskList,

    #[error("failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Slurm submission failed ({status}): {stderr}")]
    Submission { status: String, stderr: String },
}

/// Invalid settings, caught once when command-line args are interpreted.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SettingsError {
    #[error("job name must not be empty")]
    EmptyJobName,
    #[error("invalid job name '{0}' (must not contain '/' or whitespace)")]
    InvalidJobName(String),
    #[error("--cpus must be at least 1")]
    ZeroCpus,
    #[error("missing required argument --{0}")]
    MissingArg(&'static str),
}
