use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;

use crate::error::SettingsError;

pub mod defaults {
    pub const ARRAY_DIR: &str = "sbatch_arrays";
    pub const PARTITION: &str = "general-cpu";
    pub const OUTPUT_LOG: &str = "%A_%a.log";
    pub const ERROR_LOG: &str = "%A_%a.err";
    pub const TIME: &str = "24:00:00";
    pub const CPUS: &str = "4";
    pub const MEMORY: &str = "8G";
    pub const JOB_NAME: &str = "swarm_array";
    pub const SBATCH_BIN: &str = "sbatch";
    pub const LOG_FILE: &str = "swarm.log";
}

/// Settings are the command-line args with defaults applied and validated.
/// Nothing past this point re-checks them.
#[derive(Debug, Clone)]
pub struct Settings {
    /// bash file holding the commands to split
    pub file: PathBuf,
    /// job working dir; `None` means the bash file's directory
    pub chdir: Option<PathBuf>,
    /// where task scripts, dispatcher and command record go (relative to the working dir)
    pub array_dir: PathBuf,
    pub partition: String,
    pub output_log: String,
    pub error_log: String,
    /// wall-clock limit per task
    pub time: String,
    pub cpus: u32,
    pub memory: String,
    /// free-form extra sbatch flags, split on whitespace
    pub sbatch_options: String,
    pub job_name: String,
    /// max concurrently running tasks; `None` is uncapped
    pub rate_limit: Option<u32>,
    pub container_image: Option<String>,
    pub container_mounts: Option<String>,
    /// raw `--modules` value, turned into a list by `modules::verify_modules`
    pub modules: Option<String>,
    pub sbatch_bin: String,
    pub log_file: PathBuf,
    pub dry_run: bool,
    pub debug: bool,
}

impl Settings {
    /// Settings for `file` with every other field at its default.
    #[cfg(test)]
    pub fn with_file(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            chdir: None,
            array_dir: PathBuf::from(defaults::ARRAY_DIR),
            partition: defaults::PARTITION.to_owned(),
            output_log: defaults::OUTPUT_LOG.to_owned(),
            error_log: defaults::ERROR_LOG.to_owned(),
            time: defaults::TIME.to_owned(),
            cpus: 4,
            memory: defaults::MEMORY.to_owned(),
            sbatch_options: String::new(),
            job_name: defaults::JOB_NAME.to_owned(),
            rate_limit: None,
            container_image: None,
            container_mounts: None,
            modules: None,
            sbatch_bin: defaults::SBATCH_BIN.to_owned(),
            log_file: PathBuf::from(defaults::LOG_FILE),
            dry_run: false,
            debug: false,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.job_name.is_empty() {
            return Err(SettingsError::EmptyJobName);
        }
        // job name becomes part of generated file names
        if self.job_name.contains('/') || self.job_name.contains(char::is_whitespace) {
            return Err(SettingsError::InvalidJobName(self.job_name.clone()));
        }
        if self.cpus == 0 {
            return Err(SettingsError::ZeroCpus);
        }
        Ok(())
    }
}

fn required(matches: &ArgMatches, id: &'static str) -> Result<String, SettingsError> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or(SettingsError::MissingArg(id))
}

fn non_empty(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .filter(|s| !s.is_empty())
        .cloned()
}

impl TryFrom<&ArgMatches> for Settings {
    type Error = SettingsError;

    fn try_from(matches: &ArgMatches) -> Result<Self, Self::Error> {
        let settings = Self {
            file: PathBuf::from(required(matches, "file")?),
            chdir: non_empty(matches, "chdir").map(PathBuf::from),
            array_dir: PathBuf::from(required(matches, "array_dir")?),
            partition: required(matches, "partition")?,
            output_log: required(matches, "output_log")?,
            error_log: required(matches, "error_log")?,
            time: required(matches, "time")?,
            cpus: matches
                .get_one::<u32>("cpus")
                .copied()
                .ok_or(SettingsError::MissingArg("cpus"))?,
            memory: required(matches, "mem")?,
            sbatch_options: non_empty(matches, "sbatch_options").unwrap_or_default(),
            job_name: required(matches, "job_name")?,
            rate_limit: matches
                .get_one::<u32>("rate_limit")
                .copied()
                .filter(|&n| n > 0),
            container_image: non_empty(matches, "image"),
            container_mounts: non_empty(matches, "mounts"),
            modules: non_empty(matches, "modules"),
            sbatch_bin: required(matches, "sbatch_bin")?,
            log_file: PathBuf::from(required(matches, "log_file")?),
            dry_run: matches.get_flag("dry_run"),
            debug: matches.get_flag("debug"),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Absolute locations for one run, with the working and array dirs created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub bash_file: PathBuf,
    pub cwd: PathBuf,
    pub array_dir: PathBuf,
}

impl Workspace {
    pub fn resolve(settings: &Settings) -> Result<Self> {
        let bash_file = fs::canonicalize(&settings.file)
            .with_context(|| format!("bash file {} not found", settings.file.display()))?;
        log::debug!("Resolved bash file path: {}", bash_file.display());

        let cwd = match &settings.chdir {
            None => {
                log::debug!("No --chdir provided; using the bash file's directory");
                bash_file
                    .parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| anyhow!("bash file {} has no parent", bash_file.display()))?
            }
            Some(dir) => create_dir(dir)?,
        };
        log::debug!("Working directory: {}", cwd.display());

        // an absolute --array_dir replaces cwd entirely
        let array_dir = create_dir(&cwd.join(&settings.array_dir))?;
        log::debug!("Array scripts directory: {}", array_dir.display());

        Ok(Self {
            bash_file,
            cwd,
            array_dir,
        })
    }
}

fn create_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating directory {}", dir.display()))?;
    fs::canonicalize(dir).with_context(|| format!("resolving directory {}", dir.display()))
}
