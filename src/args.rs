use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};

use crate::settings::defaults;

pub fn build_cli() -> ClapCommand {
    ClapCommand::new("swarm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Parse a bash file and submit it as a Slurm job array")
        .long_about(
            "Splits a file of shell commands into one script per command and submits them \
            all as a single Slurm job array. Lines ending in '\\' are joined with the next \
            line; blank lines and '#' comments are ignored.",
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Input bash file with multiple commands")
                .required(true),
        )
        .arg(
            Arg::new("chdir")
                .short('D')
                .long("chdir")
                .value_name("DIR")
                .help("Execution directory for the Slurm job. Defaults to the bash file's directory"),
        )
        .arg(
            Arg::new("array_dir")
                .long("array_dir")
                .value_name("DIR")
                .help("Where to save the generated array scripts")
                .long_help(
                    "Where to save the generated array scripts. A relative path is resolved \
                    against the execution directory.",
                )
                .default_value(defaults::ARRAY_DIR),
        )
        .arg(
            Arg::new("partition")
                .short('p')
                .long("partition")
                .value_name("PARTITION")
                .help("Partition to submit the job to")
                .default_value(defaults::PARTITION),
        )
        .arg(
            Arg::new("output_log")
                .short('o')
                .long("output_log")
                .value_name("PATTERN")
                .help("Path to the output log file")
                .default_value(defaults::OUTPUT_LOG),
        )
        .arg(
            Arg::new("error_log")
                .short('e')
                .long("error_log")
                .value_name("PATTERN")
                .help("Path to the error log file")
                .default_value(defaults::ERROR_LOG),
        )
        .arg(
            Arg::new("time")
                .short('t')
                .long("time")
                .value_name("TIME")
                .help("Wall-clock time for each task (e.g. 24:00:00)")
                .default_value(defaults::TIME),
        )
        .arg(
            Arg::new("cpus")
                .short('c')
                .long("cpus")
                .value_name("CPUS")
                .help("Number of CPUs per task")
                .value_parser(value_parser!(u32))
                .default_value(defaults::CPUS),
        )
        .arg(
            Arg::new("mem")
                .long("mem")
                .value_name("MEMORY")
                .help("Memory requirement (e.g. 8G)")
                .default_value(defaults::MEMORY),
        )
        .arg(
            Arg::new("sbatch_options")
                .long("sbatch_options")
                .value_name("OPTIONS")
                .help("Additional sbatch options (e.g. --gres=gpu:1)")
                .allow_hyphen_values(true)
                .default_value(""),
        )
        .arg(
            Arg::new("job_name")
                .short('J')
                .long("job_name")
                .value_name("NAME")
                .help("Job name for the job array")
                .default_value(defaults::JOB_NAME),
        )
        .arg(
            Arg::new("rate_limit")
                .long("rate_limit")
                .value_name("N")
                .help("Maximum number of array tasks running at once (0 for no limit)")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("image")
                .long("image")
                .value_name("IMAGE")
                .help("Pyxis/Enroot container image (e.g. ubuntu:latest or /path/to/image.sqsh)"),
        )
        .arg(
            Arg::new("mounts")
                .long("mounts")
                .value_name("MOUNTS")
                .help("Comma-separated container mounts (e.g. /src:/dest,/src2:/dest2)"),
        )
        .arg(
            Arg::new("modules")
                .short('m')
                .long("modules")
                .value_name("MODULES")
                .help("Environment modules to load before each command (e.g. python/3.9,gcc)"),
        )
        .arg(
            Arg::new("sbatch_bin")
                .long("sbatch_bin")
                .value_name("PROGRAM")
                .env("SWARM_SBATCH")
                .help("Scheduler submission binary")
                .default_value(defaults::SBATCH_BIN),
        )
        .arg(
            Arg::new("log_file")
                .long("log_file")
                .value_name("FILE")
                .help("File that receives debug logs")
                .default_value(defaults::LOG_FILE),
        )
        .arg(
            Arg::new("dry_run")
                .long("dry-run")
                .help("Print the planned submission without executing it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Send detailed debug logging to the terminal")
                .action(ArgAction::SetTrue),
        )
}

pub fn parse_args() -> ArgMatches {
    build_cli().get_matches()
}
