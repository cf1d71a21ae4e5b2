use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::error::SwarmError;
use crate::settings::{Settings, Workspace};

/// Set by Slurm in each array task's environment.
pub const ARRAY_TASK_VAR: &str = "SLURM_ARRAY_TASK_ID";

/// `1-N`, or `1-N%R` when at most R tasks may run at once.
pub fn array_spec(num_jobs: usize, rate_limit: Option<u32>) -> String {
    match rate_limit {
        Some(limit) if limit > 0 => format!("1-{}%{}", num_jobs, limit),
        _ => format!("1-{}", num_jobs),
    }
}

/// Single-quote `s` for bash, so spaces and `$` in paths stay literal.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The script Slurm launches once per array task; it runs the matching `job_<n>.sh`.
pub fn dispatcher_script(task_dir: &Path, num_jobs: usize) -> String {
    format!(
        r#"#!/bin/bash
# Master entry point for the swarm job array.
# Slurm runs this script {num_jobs} times.
# {var} ranges from 1 to {num_jobs}.
bash {dir}/job_${var}.sh
"#,
        num_jobs = num_jobs,
        var = ARRAY_TASK_VAR,
        dir = shell_quote(&task_dir.display().to_string()),
    )
}

pub fn dispatcher_path(array_dir: &Path, job_name: &str) -> PathBuf {
    array_dir.join(format!("{}_master.sh", job_name))
}

pub fn record_path(array_dir: &Path, job_name: &str) -> PathBuf {
    array_dir.join(format!("{}_command.txt", job_name))
}

fn task_dir(first_script: &Path) -> Result<PathBuf> {
    let parent = match first_script.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::path::absolute(parent)
        .with_context(|| format!("resolving task script directory {}", parent.display()))
}

/// Everything needed to submit (or preview) one job array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayPlan {
    pub array_spec: String,
    /// full argv, scheduler binary first and dispatcher script last
    pub command: Vec<String>,
    pub dispatcher_path: PathBuf,
    pub dispatcher_script: String,
    pub record_path: PathBuf,
}

impl ArrayPlan {
    pub fn build(job_scripts: &[PathBuf], settings: &Settings, workspace: &Workspace) -> Result<Self> {
        let num_jobs = job_scripts.len();
        let first = job_scripts.first().ok_or(SwarmError::EmptyTaskList)?;
        log::debug!("Preparing to submit array of {} jobs", num_jobs);

        let array_spec = array_spec(num_jobs, settings.rate_limit);
        let dispatcher_path = dispatcher_path(&workspace.array_dir, &settings.job_name);
        let dispatcher_script = dispatcher_script(&task_dir(first)?, num_jobs);

        let mut command = vec![
            settings.sbatch_bin.clone(),
            format!("--chdir={}", workspace.cwd.display()),
            format!("--partition={}", settings.partition),
            format!("--job-name={}", settings.job_name),
            format!("--output={}", settings.output_log),
            format!("--error={}", settings.error_log),
            format!("--time={}", settings.time),
            format!("--cpus-per-task={}", settings.cpus),
            format!("--mem={}", settings.memory),
            format!("--array={}", array_spec),
        ];

        if !settings.sbatch_options.trim().is_empty() {
            log::debug!("Appending sbatch options: {}", settings.sbatch_options);
            command.extend(settings.sbatch_options.split_whitespace().map(String::from));
        }

        if let Some(image) = &settings.container_image {
            log::debug!("Adding container image: {}", image);
            command.push(format!("--container-image={}", image));
        }
        if let Some(mounts) = &settings.container_mounts {
            log::debug!("Adding container mounts: {}", mounts);
            command.push(format!("--container-mounts={}", mounts));
        }

        command.push(dispatcher_path.display().to_string());

        Ok(Self {
            array_spec,
            command,
            dispatcher_path,
            dispatcher_script,
            record_path: record_path(&workspace.array_dir, &settings.job_name),
        })
    }

    /// The argv joined with spaces, as stored in the command record.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Write the dispatcher script and the command record, replacing any earlier ones.
    pub fn write_artifacts(&self) -> Result<()> {
        fs::write(&self.dispatcher_path, &self.dispatcher_script).with_context(|| {
            format!("writing dispatcher script {}", self.dispatcher_path.display())
        })?;
        log::debug!("Created master script at {}", self.dispatcher_path.display());

        let command_line = self.command_line();
        log::debug!("Final sbatch command: {}", command_line);
        fs::write(&self.record_path, format!("{}\n", command_line))
            .with_context(|| format!("writing command record {}", self.record_path.display()))?;
        Ok(())
    }
}

pub fn print_run_stats(num_jobs: usize, job_id: &str, plan: &ArrayPlan) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let message = format!(
        r#"🚀 Job submission complete! ✅
🔖 Job ID is: {}
📌 {} array tasks submitted at {}.
📝 Command recorded in: {}
📂 Master script: {}"#,
        job_id,
        num_jobs,
        timestamp,
        plan.record_path.display(),
        plan.dispatcher_path.display()
    );

    println!("{}", message);
}
