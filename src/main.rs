mod args;
mod error;
mod executor;
mod jobs;
mod modules;
mod settings;
mod submission;

use std::fs::{self, File, OpenOptions};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

use error::SwarmError;
use executor::{ProcessRunner, SubmissionResult, SystemRunner};
use settings::{Settings, Workspace};
use submission::ArrayPlan;

/// Debug logs always go to `log_file`; with `debug` they are echoed to stderr too.
fn log_subscriber(log_file: File, debug: bool) -> impl tracing::Subscriber + Send + Sync + 'static {
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);
    let console_layer = debug.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::DEBUG)
    });
    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
}

fn init_logging(settings: &Settings) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.log_file)
        .with_context(|| format!("opening log file {}", settings.log_file.display()))?;
    // also forwards `log` records from the rest of the crate
    log_subscriber(log_file, settings.debug)
        .try_init()
        .context("installing logger")?;
    log::debug!("--- swarm execution started ---");
    Ok(())
}

struct Outcome {
    num_jobs: usize,
    plan: ArrayPlan,
    result: SubmissionResult,
}

/// Split the bash file into task scripts, then submit them as one array.
fn run_pipeline(settings: &Settings, runner: &dyn ProcessRunner) -> Result<Outcome> {
    let workspace = Workspace::resolve(settings)?;
    println!(
        "{}",
        format!("Processing bash file: {}", workspace.bash_file.display()).cyan()
    );

    let source = fs::read_to_string(&workspace.bash_file)
        .with_context(|| format!("reading bash file {}", workspace.bash_file.display()))?;
    log::debug!("Read {} lines from bash file", source.lines().count());

    let modules = settings
        .modules
        .as_deref()
        .map(modules::verify_modules)
        .unwrap_or_default();

    let job_scripts = jobs::create_job_scripts(&source, &workspace.array_dir, &modules)
        .with_context(|| format!("writing job scripts to {}", workspace.array_dir.display()))?;
    if job_scripts.is_empty() {
        log::error!("Parser returned no scripts");
        return Err(SwarmError::NoCommands {
            file: workspace.bash_file,
        }
        .into());
    }
    println!(
        "{}",
        format!("Successfully split into {} array tasks.", job_scripts.len()).green()
    );

    let plan = ArrayPlan::build(&job_scripts, settings, &workspace)?;
    plan.write_artifacts()?;
    let result = executor::execute(&plan, settings.dry_run, runner)?;

    Ok(Outcome {
        num_jobs: job_scripts.len(),
        plan,
        result,
    })
}

fn run() -> Result<()> {
    let matches = args::parse_args();
    let settings = Settings::try_from(&matches)?;
    init_logging(&settings)?;

    let outcome = run_pipeline(&settings, &SystemRunner)?;
    match &outcome.result {
        SubmissionResult::Preview { .. } => {
            if let Some(preview) = outcome.result.preview_text() {
                println!("\n{}", preview);
            }
        }
        SubmissionResult::Submitted { stdout, job_id } => {
            println!("{} {}", "Success:".green(), stdout);
            submission::print_run_stats(
                outcome.num_jobs,
                job_id.as_deref().unwrap_or("unknown"),
                &outcome.plan,
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::FakeRunner;
    use std::path::Path;
    use tempfile::tempdir;
    use tracing_subscriber::util::SubscriberInitExt;

    fn write_bash_file(dir: &Path, contents: &str) -> std::path::PathBuf {
        let file = dir.join("mock_script.sh");
        fs::write(&file, contents).unwrap();
        file
    }

    #[test]
    fn test_dry_run_writes_artifacts_without_submitting() {
        let dir = tempdir().unwrap();
        let file = write_bash_file(dir.path(), "echo 'Task 1'\necho 'Task 2'\necho 'Task 3'\n");
        let mut settings = Settings::with_file(&file);
        settings.dry_run = true;
        settings.container_image = Some("ubuntu:latest".to_string());
        settings.container_mounts = Some("/src:/dest".to_string());
        let runner = FakeRunner::new(0, "", "");

        let outcome = run_pipeline(&settings, &runner).unwrap();

        assert!(runner.calls.borrow().is_empty());
        assert_eq!(outcome.num_jobs, 3);
        assert!(matches!(outcome.result, SubmissionResult::Preview { .. }));

        let array_dir = fs::canonicalize(dir.path()).unwrap().join("sbatch_arrays");
        for i in 1..=3 {
            let task = fs::read_to_string(array_dir.join(format!("job_{}.sh", i))).unwrap();
            assert_eq!(task, format!("echo 'Task {}'\n", i));
        }
        let master = fs::read_to_string(array_dir.join("swarm_array_master.sh")).unwrap();
        assert!(master.contains("bash"));
        assert!(master.contains("job_$SLURM_ARRAY_TASK_ID.sh"));

        let record = fs::read_to_string(array_dir.join("swarm_array_command.txt")).unwrap();
        assert!(record.starts_with("sbatch "));
        assert!(record.contains("--array=1-3 "));
        assert!(record.contains("--container-image=ubuntu:latest"));
        assert!(record.contains("--container-mounts=/src:/dest"));
        assert!(record.ends_with(&format!(
            "{}\n",
            array_dir.join("swarm_array_master.sh").display()
        )));
    }

    #[test]
    fn test_rate_limit_in_record() {
        let dir = tempdir().unwrap();
        let file = write_bash_file(dir.path(), "echo test\n");
        let mut settings = Settings::with_file(&file);
        settings.rate_limit = Some(5);
        settings.job_name = "my_test_job".to_string();
        let runner = FakeRunner::new(0, "Submitted batch job 42\n", "");

        let outcome = run_pipeline(&settings, &runner).unwrap();

        let record = fs::read_to_string(&outcome.plan.record_path).unwrap();
        assert!(record.contains("--array=1-1%5"));
        assert_eq!(runner.calls.borrow().len(), 1);
        assert_eq!(
            outcome.result,
            SubmissionResult::Submitted {
                stdout: "Submitted batch job 42".to_string(),
                job_id: Some("42".to_string()),
            }
        );
    }

    #[test]
    fn test_modules_prefix_task_scripts() {
        let dir = tempdir().unwrap();
        let file = write_bash_file(dir.path(), "ls -l\n");
        let mut settings = Settings::with_file(&file);
        settings.modules = Some("python/3.9,gcc".to_string());
        settings.dry_run = true;

        run_pipeline(&settings, &FakeRunner::new(0, "", "")).unwrap();

        let task = fs::read_to_string(dir.path().join("sbatch_arrays/job_1.sh")).unwrap();
        assert!(task.starts_with("module load python/3.9 gcc && "));
        assert_eq!(task, "module load python/3.9 gcc && ls -l\n");
    }

    #[test]
    fn test_no_commands_stops_before_plan() {
        let dir = tempdir().unwrap();
        let file = write_bash_file(dir.path(), "# nothing to run\n\n");
        let settings = Settings::with_file(&file);
        let runner = FakeRunner::new(0, "", "");

        let err = run_pipeline(&settings, &runner).err().unwrap();

        assert!(matches!(
            err.downcast_ref::<SwarmError>(),
            Some(SwarmError::NoCommands { .. })
        ));
        assert!(runner.calls.borrow().is_empty());
        assert!(!dir.path().join("sbatch_arrays/swarm_array_command.txt").exists());
    }

    #[test]
    fn test_submission_failure_propagates() {
        let dir = tempdir().unwrap();
        let file = write_bash_file(dir.path(), "echo test\n");
        let settings = Settings::with_file(&file);
        let runner = FakeRunner::new(1, "", "sbatch: error: Batch job submission failed\n");

        let err = run_pipeline(&settings, &runner).err().unwrap();

        match err.downcast_ref::<SwarmError>() {
            Some(SwarmError::Submission { stderr, .. }) => {
                assert_eq!(stderr, "sbatch: error: Batch job submission failed")
            }
            _ => panic!("unexpected error: {err:#}"),
        }
        // the record is still written before submission
        assert!(dir.path().join("sbatch_arrays/swarm_array_command.txt").exists());
    }

    #[test]
    fn test_log_file_written_with_and_without_debug() {
        for debug in [false, true] {
            let dir = tempdir().unwrap();
            let path = dir.path().join("swarm.log");
            let file = File::create(&path).unwrap();
            {
                let _guard = log_subscriber(file, debug).set_default();
                tracing::debug!("splitting commands");
            }
            let contents = fs::read_to_string(&path).unwrap();
            assert!(contents.contains("DEBUG"), "debug={debug}: {contents}");
            assert!(contents.contains("splitting commands"), "debug={debug}: {contents}");
        }
    }

    #[test]
    fn test_missing_bash_file() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_file(dir.path().join("this_file_is_fake.sh"));
        assert!(run_pipeline(&settings, &FakeRunner::new(0, "", "")).is_err());
    }
}
