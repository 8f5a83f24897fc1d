use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use ckpt_steward::config::{self, Overrides, Settings};
use ckpt_steward::executor::{RunOptions, StdoutSink, execute};
use ckpt_steward::planner::build_plans;
use ckpt_steward::prompt::{AssumeYes, LinePrompt, Prompt};
use ckpt_steward::report::plans_json;
use ckpt_steward::storage::FsStorage;
use ckpt_steward::Result;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Delete old training checkpoints and back up a sparse subset of them
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Directory with checkpoint directories named 'global_stepXXX'
    checkpoint_dir: PathBuf,
    /// How many of the latest checkpoints to keep [default: 5]
    #[arg(long = "cps_to_keep", visible_alias = "cps-to-keep")]
    cps_to_keep: Option<usize>,
    /// Directory to back checkpoints up to; enables the backup step
    #[arg(long = "backup_dir", visible_alias = "backup-dir")]
    backup_dir: Option<PathBuf>,
    /// Minimum steps between two backed-up checkpoints [default: 2300]
    #[arg(long = "backup_interval", visible_alias = "backup-interval")]
    backup_interval: Option<u64>,
    /// TOML file with [retention] and [backup] settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Answer "yes" to every confirmation
    #[arg(long, short = 'y')]
    yes: bool,
    /// Print both plans and exit without prompting or changing anything
    #[arg(long)]
    dry_run: bool,
    /// Print both plans as JSON and exit
    #[arg(long)]
    json: bool,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    // A missing .env is fine; it only supplies `backup.dir_env` values.
    dotenv::dotenv().ok();
    init_logging(args.log_format);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let doc = args.config.as_deref().map(config::load).transpose()?;
    let settings = Settings::resolve(
        args.checkpoint_dir,
        doc.as_ref(),
        Overrides {
            keep: args.cps_to_keep,
            backup_dir: args.backup_dir,
            backup_interval: args.backup_interval,
        },
    )?;

    let storage = FsStorage;
    let plans = build_plans(&storage, &settings)?;
    if args.json {
        println!("{}", plans_json(&plans)?);
        return Ok(());
    }

    let mut prompt: Box<dyn Prompt> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(LinePrompt::stdin())
    };
    let sink = StdoutSink::default();
    let summary = execute(
        &storage,
        prompt.as_mut(),
        &sink,
        &plans,
        RunOptions {
            dry_run: args.dry_run,
        },
    )?;
    tracing::info!(
        copied = summary.copied.len(),
        deleted = summary.deleted.len(),
        "all operations done"
    );
    Ok(())
}
