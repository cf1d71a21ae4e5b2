use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CONTINUATION: char = '\\';
const COMMENT: char = '#';

/// Split shell source into logical commands.
///
/// Blank lines and `#` comments are skipped without interrupting a command that
/// is being continued. A line ending in `\` is joined to the next one with a
/// single space. A command still open at the end of the input is dropped.
pub fn split_commands(source: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (line_num, line) in source.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with(COMMENT) {
            continue;
        }

        if let Some(fragment) = stripped.strip_suffix(CONTINUATION) {
            current.push(fragment.trim_end());
            continue;
        }

        current.push(stripped);
        let command = current.join(" ").trim().to_string();
        current.clear();

        if !command.is_empty() {
            log::debug!("line {}: command {} complete", line_num + 1, commands.len() + 1);
            commands.push(command);
        }
    }

    if !current.is_empty() {
        log::warn!(
            "input ends inside a continued command; discarding {} unterminated line(s)",
            current.len()
        );
    }

    commands
}

/// `module load a b && `, or nothing when no modules were requested.
pub fn module_prefix(modules: &[String]) -> String {
    if modules.is_empty() {
        String::new()
    } else {
        format!("module load {} && ", modules.join(" "))
    }
}

pub fn job_script_name(index: usize) -> String {
    format!("job_{}.sh", index)
}

/// Write one `job_<n>.sh` per logical command into `array_dir`, numbered from 1.
///
/// `array_dir` must already exist. Returns the script paths in command order,
/// which may be empty.
pub fn create_job_scripts(
    source: &str,
    array_dir: &Path,
    modules: &[String],
) -> io::Result<Vec<PathBuf>> {
    let prefix = module_prefix(modules);
    let mut job_scripts = Vec::new();

    for (i, command) in split_commands(source).into_iter().enumerate() {
        let job_script = array_dir.join(job_script_name(i + 1));
        fs::write(&job_script, format!("{}{}\n", prefix, command))?;
        log::debug!("Created {} with command: {}", job_script.display(), command);
        job_scripts.push(job_script);
    }

    log::info!(
        "Generated {} job scripts in {}",
        job_scripts.len(),
        array_dir.display()
    );
    Ok(job_scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_one_script_per_line() {
        let dir = tempdir().unwrap();
        let source = "echo 'Task 1'\necho 'Task 2'\necho 'Task 3'\n";

        let scripts = create_job_scripts(source, dir.path(), &[]).unwrap();

        assert_eq!(scripts.len(), 3);
        for (i, script) in scripts.iter().enumerate() {
            assert_eq!(script, &dir.path().join(format!("job_{}.sh", i + 1)));
            let contents = fs::read_to_string(script).unwrap();
            assert_eq!(contents, format!("echo 'Task {}'\n", i + 1));
        }
    }

    #[test]
    fn test_comments_and_continuations() {
        let dir = tempdir().unwrap();
        let source = "# comment\nls -l\n\necho 'hello' \\\n  'world'\n";

        let scripts = create_job_scripts(source, dir.path(), &[]).unwrap();

        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].file_name().unwrap(), "job_1.sh");
        assert_eq!(fs::read_to_string(&scripts[0]).unwrap(), "ls -l\n");
        assert_eq!(scripts[1].file_name().unwrap(), "job_2.sh");
        assert_eq!(
            fs::read_to_string(&scripts[1]).unwrap(),
            "echo 'hello' 'world'\n"
        );
    }

    #[test]
    fn test_module_prefix() {
        let dir = tempdir().unwrap();
        let modules = vec!["python/3.9".to_string(), "gcc".to_string()];

        let scripts = create_job_scripts("ls -l", dir.path(), &modules).unwrap();

        assert_eq!(scripts.len(), 1);
        let contents = fs::read_to_string(&scripts[0]).unwrap();
        assert_eq!(contents, "module load python/3.9 gcc && ls -l\n");
    }

    #[test]
    fn test_comments_do_not_break_continuation() {
        let source = "cmd --a \\\n\n# interlude\n   --b \\\n--c\nnext";
        assert_eq!(split_commands(source), vec!["cmd --a --b --c", "next"]);
    }

    #[test]
    fn test_multiline_join_has_no_backslashes() {
        let source = "a\\\n  b   \\\n c";
        assert_eq!(split_commands(source), vec!["a b c"]);
    }

    #[test]
    fn test_dangling_continuation_is_dropped() {
        let source = "first\nsecond \\\n  still going \\\n";
        assert_eq!(split_commands(source), vec!["first"]);
    }

    #[test]
    fn test_no_commands() {
        let dir = tempdir().unwrap();
        let scripts = create_job_scripts("\n# only a comment\n   \n", dir.path(), &[]).unwrap();
        assert!(scripts.is_empty());
        assert!(split_commands("").is_empty());
    }

    #[test]
    fn test_empty_module_list_has_no_prefix() {
        assert_eq!(module_prefix(&[]), "");
        assert_eq!(module_prefix(&["samtools".to_string()]), "module load samtools && ");
    }
}
