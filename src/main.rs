use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use toolstrap::{Bootstrapper, Config, ToExitCode, flatten, manifest};

#[derive(Parser, Clone)]
#[command(name = "toolstrap", version, about = "Fetch and build a set of Go tools")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory built binaries are written to
    #[arg(long)]
    bin_dir: Option<PathBuf>,

    /// Scratch workspace repositories are fetched into
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Number of download workers
    #[arg(long)]
    download_workers: Option<usize>,

    /// Number of build workers
    #[arg(long)]
    build_workers: Option<usize>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Keep the workspace after the run
    #[arg(long)]
    keep_workspace: bool,

    /// Quiet mode - only warnings and errors are logged
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Fetch all dependencies, then build every tool (default)
    Run,
    /// Print the tools and the distinct dependencies that would be fetched
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Only fetch the dependencies; the workspace is kept
    Fetch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.quiet);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (message, code) = failure_report(&e);
            eprintln!("{message}");
            ExitCode::from(code)
        }
    }
}

/// The single line printed for a failed run, and the process exit code
fn failure_report(e: &anyhow::Error) -> (String, u8) {
    match e.downcast_ref::<toolstrap::Error>() {
        Some(err) => (
            format!("toolstrap: error[{}]: {e:#}", err.error_code()),
            u8::try_from(err.exit_code()).unwrap_or(1),
        ),
        None => (format!("toolstrap: {e:#}"), 1),
    }
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let default = if quiet {
        "toolstrap=warn"
    } else {
        "toolstrap=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    let tools = config.tools.clone();
    match args.command.unwrap_or(Command::Run) {
        Command::List { json } => list(&tools, json),
        Command::Run => {
            let bootstrapper = Bootstrapper::from_config(config)?;
            let cancel = CancellationToken::new();
            tokio::spawn(toolstrap::shutdown_on_signal(cancel.clone()));

            let summary = bootstrapper.run(&tools, &cancel).await?;
            tracing::info!(
                fetched = summary.fetched.len(),
                built = summary.built.len(),
                bin_dir = %bootstrapper.config().workspace.bin_dir.display(),
                "All tools built"
            );
            Ok(())
        }
        Command::Fetch => {
            config.workspace.keep_workspace = true;
            let bootstrapper = Bootstrapper::from_config(config)?;
            let cancel = CancellationToken::new();
            tokio::spawn(toolstrap::shutdown_on_signal(cancel.clone()));

            let fetched = bootstrapper.fetch(&tools, &cancel).await?;
            for info in &fetched {
                println!("{}\t{}\t{}", info.import_path, info.vcs, info.root.display());
            }
            Ok(())
        }
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(dir) = &args.bin_dir {
        config.workspace.bin_dir = dir.clone();
    }
    if let Some(dir) = &args.workspace {
        config.workspace.workspace_dir = dir.clone();
    }
    if let Some(n) = args.download_workers {
        config.concurrency.download_workers = n;
    }
    if let Some(n) = args.build_workers {
        config.concurrency.build_workers = n;
    }
    if let Some(secs) = args.deadline {
        config.concurrency.deadline = Some(Duration::from_secs(secs));
    }
    if args.keep_workspace {
        config.workspace.keep_workspace = true;
    }
}

fn list(tools: &toolstrap::ToolTable, json: bool) -> anyhow::Result<()> {
    let deps = flatten(tools);
    let targets = manifest::build_targets(tools);

    if json {
        let out = serde_json::json!({
            "tools": targets,
            "dependencies": deps,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Tools ({}):", targets.len());
    for target in &targets {
        println!("  {target}");
    }
    println!();
    println!("Dependencies ({}):", deps.len());
    for dep in &deps {
        println!("  {dep}");
    }
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_report_is_one_line_with_code() {
        let err = anyhow::Error::new(toolstrap::Error::InvalidArgument("workers".into()))
            .context("starting run");

        let (message, code) = failure_report(&err);

        assert_eq!(code, 2);
        assert_eq!(message.lines().count(), 1);
        assert!(message.starts_with("toolstrap: error["), "{message}");
        assert!(message.contains("starting run"), "{message}");
    }

    #[test]
    fn failure_report_without_crate_error_exits_one() {
        let (message, code) = failure_report(&anyhow::anyhow!("bad flag"));
        assert_eq!(code, 1);
        assert_eq!(message, "toolstrap: bad flag");
    }
}
