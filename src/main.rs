use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use sheet_splitter::config::{
    ConfigFile, DEFAULT_LOG_FILE, LogLevel, NonInteractive, Parameter, ParameterSource,
    SplitConfig,
};
use sheet_splitter::credentials::{ConsolePrompt, CredentialProvider, NoCredentials};
use sheet_splitter::io::excel_read::CalamineEngine;
use sheet_splitter::naming::folder_name;
use sheet_splitter::session::DEFAULT_MAX_PASSWORD_ATTEMPTS;
use sheet_splitter::split::split_workbook;
use sheet_splitter::{Result, logging};
use tracing::{error, info, warn};

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        if logging::is_initialized() {
            error!("{err}");
        } else {
            eprintln!("error: {err}");
        }
        std::process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let file = ConfigFile::load(&cli.config)?;

    let mut prompt = ConsolePrompt::stdio();
    let mut non_interactive = NonInteractive;
    let source: &mut dyn ParameterSource = if cli.non_interactive {
        &mut non_interactive
    } else {
        &mut prompt
    };

    let input = source.resolve(
        Parameter::Input,
        cli.input.map(|path| path.display().to_string()),
        file.input_excel_file.as_deref(),
    )?;
    let worksheet = source.resolve(Parameter::Worksheet, cli.sheet, file.tab_name.as_deref())?;
    let column = source.resolve(Parameter::Column, cli.column, file.column_name.as_deref())?;

    let mut config = SplitConfig::new(input, worksheet, column)
        .with_prefix(cli.prefix.or(file.file_prefix).unwrap_or_default())
        .with_max_password_attempts(cli.max_password_attempts);
    if let Some(password) = cli.password.or(file.password) {
        config = config.with_password(password);
    }
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }

    let level: LogLevel = match cli.log_level.as_deref() {
        Some(level) => level.parse()?,
        None => file.log_level.unwrap_or_default(),
    };

    let output_dir = cli
        .output_dir
        .join(folder_name(&config.file_prefix, Local::now().naive_local()));
    std::fs::create_dir_all(&output_dir)?;
    let log_name = file.log_file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE);
    logging::init(level, &output_dir.join(log_name))?;

    for warning in &file.warnings {
        warn!("{warning}");
    }
    info!(
        input = %config.input_path.display(),
        worksheet = %config.worksheet_name,
        column = %config.group_column_name,
        %level,
        "starting split"
    );

    let mut quiet = NoCredentials;
    let credentials: &mut dyn CredentialProvider = if cli.non_interactive {
        &mut quiet
    } else {
        &mut prompt
    };
    let summary = split_workbook(CalamineEngine::new(), credentials, &config, &output_dir)?;

    if let Some(path) = &cli.summary_json {
        summary.save_json(path)?;
    }
    for failure in &summary.failed {
        warn!(group = %failure.key, file = %failure.file, "group not written: {}", failure.error);
    }
    info!(
        "{} of {} group file(s) written from {} row(s)",
        summary.written.len(),
        summary.total_groups,
        summary.source_rows
    );
    info!("output folder: {}", summary.output_dir.display());
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Split a worksheet into one workbook per distinct value of a column."
)]
struct Cli {
    /// Key=value configuration file supplying defaults.
    #[arg(long, default_value = "config.txt")]
    config: PathBuf,

    /// Source workbook.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Worksheet to split.
    #[arg(long)]
    sheet: Option<String>,

    /// Header of the column whose values define the groups.
    #[arg(long)]
    column: Option<String>,

    /// Password of a protected workbook.
    #[arg(long)]
    password: Option<String>,

    /// Prefix for the output folder and file names.
    #[arg(long)]
    prefix: Option<String>,

    /// Base directory receiving the timestamped output folder.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Number of output files written concurrently.
    #[arg(long)]
    workers: Option<usize>,

    /// Password attempts before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_PASSWORD_ATTEMPTS)]
    max_password_attempts: u32,

    /// ERROR, INFO or DEBUG; overrides the configuration file.
    #[arg(long)]
    log_level: Option<String>,

    /// Never prompt; missing parameters are errors.
    #[arg(long)]
    non_interactive: bool,

    /// Also write the run summary as JSON to this path.
    #[arg(long)]
    summary_json: Option<PathBuf>,
}
