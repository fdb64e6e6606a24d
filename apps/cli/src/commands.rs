//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use chorekit_collector::{Collector, write_export};
use chorekit_qa::{ChatClient, QaLayout, run_qa};
use chorekit_records::{RecordSchema, extract_files, to_json, write_xlsx};
use chorekit_sheets::{archive_file, default_output_dir, read_csv, read_url_list};
use chorekit_shared::{
    AppConfig, ProgressReporter, init_config, load_config, load_config_from, require_env,
};
use chorekit_urlcheck::{
    GradeCommand, Report, SmtpMailer, UrlChecker, default_report_dir, run_checks, sample_urls,
    send_report,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// chorekit: spreadsheet Q&A, XML record extraction, web data collection
/// and URL reports.
#[derive(Parser)]
#[command(
    name = "chorekit",
    version,
    about = "Automation tools for spreadsheets, XML records, web data and URL checks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.chorekit/chorekit.toml).
    #[arg(long, global = true, env = "CHOREKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer the questions of a spreadsheet with a language model.
    Ask {
        /// Workbook (.xlsx) holding the questions.
        file: PathBuf,

        /// Write the answered workbook here instead of in place.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Answer column (1-based), e.g. to keep an earlier run's answers.
        #[arg(long)]
        answer_column: Option<u32>,

        /// Skip the model endpoint reachability check.
        #[arg(long)]
        no_preflight: bool,
    },

    /// Extract change records from XML files.
    Extract {
        /// XML files to read.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write an .xlsx sheet instead of printing JSON.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Collect data for every record of a CSV file.
    Collect {
        /// CSV input with a header row.
        file: PathBuf,

        /// Directory for the export and error log.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Check URLs for reachability and certificate validity, then mail a report.
    #[command(name = "check-urls")]
    CheckUrls {
        /// URL list (.txt, .csv or .xlsx; first column, no header).
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// URLs given directly.
        urls: Vec<String>,

        /// Write the report but do not send it.
        #[arg(long)]
        no_mail: bool,

        /// Check a random tenth of the URLs (at least one).
        #[arg(long)]
        sample: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "chorekit=info",
        1 => "chorekit=debug",
        _ => "chorekit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Ask {
            file,
            out,
            answer_column,
            no_preflight,
        } => {
            let config = resolve_config(config_path)?;
            cmd_ask(&config, &file, out.as_deref(), answer_column, no_preflight).await
        }
        Command::Extract { files, out } => {
            let config = resolve_config(config_path)?;
            cmd_extract(&config, &files, out.as_deref())
        }
        Command::Collect { file, out_dir } => {
            let config = resolve_config(config_path)?;
            cmd_collect(&config, &file, out_dir.as_deref()).await
        }
        Command::CheckUrls {
            file,
            urls,
            no_mail,
            sample,
        } => {
            let config = resolve_config(config_path)?;
            cmd_check_urls(&config, file.as_deref(), urls, no_mail, sample).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, label: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {label}"));
    }

    fn done(&self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config: &AppConfig,
    file: &Path,
    out: Option<&Path>,
    answer_column: Option<u32>,
    no_preflight: bool,
) -> Result<()> {
    let mut qa = config.qa.clone();
    if let Some(column) = answer_column {
        qa.answer_column = column;
    }
    if no_preflight {
        qa.preflight = false;
    }

    // Fail before touching the workbook.
    let api_key = require_env(&qa.api_key_env, "Model API key")?;
    let client = ChatClient::new(&qa, api_key)?;

    info!(file = %file.display(), model = %qa.model, "answering questions");

    let reporter = CliProgress::new();
    let summary = run_qa(file, out, &QaLayout::from(&qa), &client, &reporter).await?;

    println!();
    println!("  Answered:  {}", summary.answered);
    println!("  Preserved: {}", summary.preserved);
    println!("  Empty:     {}", summary.skipped_empty);
    println!("  Failed:    {}", summary.failed);
    println!("  Saved to:  {}", summary.saved_to.display());
    println!();

    Ok(())
}

fn cmd_extract(config: &AppConfig, files: &[PathBuf], out: Option<&Path>) -> Result<()> {
    let schema = RecordSchema::from(&config.records);
    let reporter = CliProgress::new();
    let outcome = extract_files(files, &schema, &reporter);

    match out {
        Some(path) => {
            write_xlsx(path, &schema, &outcome.records)?;
            eprintln!("Wrote {} record(s) to {}", outcome.records.len(), path.display());
        }
        None => println!("{}", to_json(&outcome.records)?),
    }

    if outcome.is_clean() {
        return Ok(());
    }
    for failure in &outcome.failures {
        eprintln!("  {}: {}", failure.path.display(), failure.error);
    }
    Err(eyre!(
        "{} of {} file(s) could not be extracted",
        outcome.failures.len(),
        files.len()
    ))
}

async fn cmd_collect(config: &AppConfig, file: &Path, out_dir: Option<&Path>) -> Result<()> {
    let collector_config = config.collector.clone();

    let cookie = match &collector_config.session_cookie {
        Some(cookie) => Some(require_env(&cookie.env, "Session cookie")?),
        None => None,
    };
    let table = read_csv(file)?;
    let collector = Collector::new(collector_config, cookie)?;

    let out_dir = match (out_dir, &config.collector.output_dir) {
        (Some(dir), _) => dir.to_path_buf(),
        (None, Some(dir)) => PathBuf::from(dir),
        (None, None) => default_output_dir(),
    };

    info!(file = %file.display(), records = table.rows.len(), "collecting data");

    let reporter = CliProgress::new();
    let report = collector.collect(&table, &reporter).await?;
    let paths = write_export(&out_dir, &config.collector, &report)?;

    println!();
    println!("  Valid:    {}", report.valid_items().count());
    println!("  Failures: {}", report.failures.len());
    println!("  Export:   {}", paths.export.display());
    if let Some(errors) = &paths.errors {
        println!("  Errors:   {}", errors.display());
    }
    println!();

    Ok(())
}

async fn cmd_check_urls(
    config: &AppConfig,
    file: Option<&Path>,
    mut urls: Vec<String>,
    no_mail: bool,
    sample: bool,
) -> Result<()> {
    if let Some(path) = file {
        urls.extend(read_url_list(path)?);
    }
    if urls.is_empty() {
        return Err(eyre!("no URLs given: pass URLs or --file"));
    }
    if sample || !config.url_check.check_all {
        let total = urls.len();
        urls = sample_urls(&urls);
        info!(sampled = urls.len(), total, "checking a random sample");
    }

    let report_dir = config
        .url_check
        .report_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_report_dir);
    let grader = config
        .url_check
        .grade_command
        .as_ref()
        .map(|template| GradeCommand::new(template.clone(), &report_dir));

    let checker = UrlChecker::new(&config.url_check)?;
    let reporter = CliProgress::new();
    let results = run_checks(&checker, grader.as_ref(), &urls, &reporter).await;

    let report = Report::new(results);
    let report_path = report.write_xlsx(&report_dir)?;
    let summary = report.summary();

    println!();
    println!("  Checked:             {}", summary.total);
    println!("  Invalid:             {}", summary.invalid);
    println!("  Unreachable:         {}", summary.unreachable);
    println!("  Certificate invalid: {}", summary.certificate_invalid);
    if grader.is_some() {
        println!("  Grade ok:            {}", summary.grade_ok);
        println!("  Grade not ok:        {}", summary.grade_not_ok);
    }
    println!("  Report:              {}", report_path.display());
    println!();

    if config.url_check.archive_input {
        if let Some(path) = file {
            let archived = archive_file(path, Path::new("Archive"))?;
            println!("  Input archived to {}", archived.display());
        }
    }

    if no_mail {
        return Ok(());
    }
    if config.smtp.recipients.is_empty() {
        warn!("no recipients configured, report not mailed");
        return Ok(());
    }

    let password = match &config.smtp.password_env {
        Some(var) => Some(require_env(var, "SMTP password")?),
        None => None,
    };
    let mailer = SmtpMailer::new(&config.smtp, password)?;
    if send_report(&mailer, &config.smtp, &report, &report_path).await? {
        println!("  Report mailed to {}", config.smtp.recipients.join(", "));
    }

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
