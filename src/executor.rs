use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SwarmError;
use crate::submission::ArrayPlan;

/// What a finished subprocess left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs a program to completion and captures its output.
pub trait ProcessRunner {
    fn run(&self, argv: &[String]) -> io::Result<ProcessOutput>;
}

/// Spawns real processes.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> io::Result<ProcessOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let output = Command::new(program).args(args).output()?;
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// Dry run: nothing was submitted.
    Preview {
        command_line: String,
        dispatcher: PathBuf,
    },
    Submitted {
        stdout: String,
        job_id: Option<String>,
    },
}

impl SubmissionResult {
    pub fn preview_text(&self) -> Option<String> {
        match self {
            SubmissionResult::Preview {
                command_line,
                dispatcher,
            } => Some(format!(
                "[DRY RUN] Would submit the following command to Slurm:\n\n{}\n\n[DRY RUN] Master script saved to: {}",
                command_line,
                dispatcher.display()
            )),
            SubmissionResult::Submitted { .. } => None,
        }
    }
}

/// Pull the job id out of sbatch's `Submitted batch job <id>` line.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    static JOB_ID: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"Submitted batch job (\d+)").expect("valid job id regex"));
    JOB_ID
        .captures(stdout)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Submit `plan`, or only describe it when `dry_run` is set.
///
/// At most one process is spawned and failures are never retried.
pub fn execute(
    plan: &ArrayPlan,
    dry_run: bool,
    runner: &dyn ProcessRunner,
) -> Result<SubmissionResult, SwarmError> {
    if dry_run {
        log::info!("Dry run flag detected. Skipping subprocess execution.");
        return Ok(SubmissionResult::Preview {
            command_line: plan.command_line(),
            dispatcher: plan.dispatcher_path.clone(),
        });
    }

    let program = plan.command.first().cloned().unwrap_or_default();
    log::debug!("Executing {}", program);
    let output = runner
        .run(&plan.command)
        .map_err(|source| SwarmError::Spawn { program, source })?;

    if !output.success() {
        let stderr = output.stderr.trim().to_string();
        log::error!("Subprocess failed with {}", output.status());
        log::error!("STDERR output: {}", stderr);
        return Err(SwarmError::Submission {
            status: output.status(),
            stderr,
        });
    }

    let stdout = output.stdout.trim().to_string();
    log::info!("Subprocess succeeded. STDOUT: {}", stdout);
    Ok(SubmissionResult::Submitted {
        job_id: parse_job_id(&stdout),
        stdout,
    })
}
