//! External TLS grading command (e.g. `testssl.sh`).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use chorekit_shared::{ChoreError, Grade, Result};

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("ANSI regex"));

/// Remove terminal colour/escape sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Scan grading output for the `Overall Grade`, `Grade cap reasons` and
/// `Grade warning` lines. The value is whatever follows the label.
pub fn parse_grade(output: &str) -> Grade {
    let mut grade = Grade::default();
    for line in strip_ansi(output).lines() {
        if let Some(value) = value_after(line, "Overall Grade") {
            grade.overall = value;
        } else if let Some(value) = value_after(line, "Grade cap reasons") {
            grade.cap_reasons = value;
        } else if let Some(value) = value_after(line, "Grade warning") {
            grade.warning = value;
        }
    }
    grade
}

fn value_after(line: &str, label: &str) -> Option<String> {
    line.rsplit_once(label)
        .map(|(_, rest)| rest.trim().to_string())
}

/// Single-quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Runs the configured grading command for one URL at a time and keeps its
/// output as `<log_dir>/<host+path>.log`.
#[derive(Debug, Clone)]
pub struct GradeCommand {
    template: String,
    log_dir: PathBuf,
}

impl GradeCommand {
    /// `template` is run through the shell with `{url}` replaced by the
    /// quoted URL.
    pub fn new(template: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            log_dir: log_dir.into(),
        }
    }

    fn command_line(&self, url: &str) -> String {
        self.template.replace("{url}", &shell_quote(url))
    }

    /// Log file for `url`: `<scheme>_<host+path>.log`, path separators
    /// flattened.
    pub fn log_path(&self, url: &str) -> PathBuf {
        let flat = match url.split_once("://") {
            Some((scheme, rest)) => format!("{scheme}_{}", rest.trim_end_matches('/')),
            None => url.trim_end_matches('/').to_string(),
        };
        let name: String = flat
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || ".-_".contains(c) { c } else { '_' })
            .collect();
        self.log_dir.join(format!("{name}.log"))
    }

    /// Run the command for `url`, write its log, and parse the grade.
    ///
    /// A non-zero exit status is an error; the log is still written.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn run(&self, url: &str) -> Result<Grade> {
        let line = self.command_line(url);
        debug!(command = %line, "running grading command");

        let output = shell(&line)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ChoreError::Command(format!("failed to start '{line}': {e}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let clean = strip_ansi(&text);

        let log_path = self.log_path(url);
        write_log(&log_path, &clean)?;

        if !output.status.success() {
            return Err(ChoreError::Command(format!(
                "grading command exited with {} (log: {})",
                output.status,
                log_path.display()
            )));
        }

        let grade = parse_grade(&clean);
        info!(overall = %grade.overall, "graded");
        Ok(grade)
    }
}

#[cfg(windows)]
fn shell(line: &str) -> Command {
    let mut command = Command::new("wsl");
    command.args(["bash", "-c", line]);
    command
}

#[cfg(not(windows))]
fn shell(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.args(["-c", line]);
    command
}

fn write_log(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ChoreError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| ChoreError::io(path, e))
}
