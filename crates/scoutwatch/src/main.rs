//! scoutwatch launcher
//!
//! With no subcommand the directory watcher runs until SIGINT/SIGTERM or
//! the watched directory disappears. A store outage pauses it; SIGUSR1
//! retries the store at once.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scoutwatch::{
    import_from_volume, render_comments, BackupWriter, CancellationToken, DirectoryWatcher,
    IngestContext, IngestError, MountRootLocator, PersistenceOrchestrator, PollingEventSource,
    Reconstructor, ResumeSignal, ScoutwatchConfig, WatchState,
};
use scoutwatch_db::SqliteStore;
use scoutwatch_logging::{init_logging, LogConfig, OperatorLog};
use scoutwatch_protocol::FormType;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "scoutwatch",
    version,
    about = "Ingest tablet scouting exports into the scouting store"
)]
struct Cli {
    /// Config file (default: ~/.scoutwatch/config.toml)
    #[arg(long, global = true, env = "SCOUTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Mirror all logs to stderr, not just operator lines and warnings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the drop directory and ingest new files (default)
    Watch {
        /// Directory to watch instead of the configured one
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Ingest every file at the root of a removable volume
    ImportUsb,

    /// Ingest the given files now, in order
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Also copy each file to the backup volume
        #[arg(long)]
        backup: bool,
    },

    /// Print a team's newest form as protocol text
    Reconstruct {
        team: i32,

        /// Form type, by name or ordinal
        #[arg(long, default_value = "prescouting")]
        form_type: FormType,
    },

    /// Print aggregate statistics for a team
    Summarize { team: i32 },

    /// Print a team's free-text comments
    Comments { team: i32 },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "scoutwatch",
        verbose: cli.verbose,
        fresh_file: matches!(cli.command, None | Some(Commands::Watch { .. })),
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {}", err);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = ScoutwatchConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Watch { dir: None }) {
        Commands::Watch { dir } => watch(config, dir).await,
        Commands::ImportUsb => import_usb(config).await,
        Commands::Ingest { files, backup } => ingest(config, files, backup).await,
        Commands::Reconstruct { team, form_type } => {
            let reviewer = reconstructor(&config);
            match reviewer.reconstruct_form(team, form_type).await? {
                Some(text) => {
                    println!("{}", text);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("No {} form stored for team {}", form_type, team);
                    Ok(ExitCode::from(1))
                }
            }
        }
        Commands::Summarize { team } => {
            let reviewer = reconstructor(&config);
            let aggregates = reviewer.aggregates(team).await?;
            println!("{}", aggregates.encode());
            if !aggregates.is_empty() {
                let names: HashMap<i32, String> = reviewer
                    .active_items()
                    .await?
                    .into_iter()
                    .map(|item| (item.id, item.name))
                    .collect();
                let label = |id: i32| names.get(&id).cloned().unwrap_or_else(|| id.to_string());
                for row in &aggregates.averages {
                    println!(
                        "  {:<24} avg {:>8.2}  std {:>8.2}  n {}",
                        label(row.item_id),
                        row.average,
                        row.std_dev,
                        row.count
                    );
                    if row.skipped > 0 {
                        println!("  {:<24} {} non-numeric value(s) skipped", "", row.skipped);
                    }
                }
                for row in &aggregates.proportions {
                    println!(
                        "  {:<24} yes {:>6.0}  n {:>6}  rate {:.2}",
                        label(row.item_id),
                        row.sum,
                        row.count,
                        row.rate
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Comments { team } => {
            let comments = reconstructor(&config).comments(team).await?;
            println!("{}", render_comments(&comments));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn watch(config: ScoutwatchConfig, dir: Option<PathBuf>) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let resume = ResumeSignal::new();
    install_signal_handlers(cancel.clone(), resume.clone())?;

    let mut ctx = with_configured_backup(&config, ingest_context(&config, cancel).await?);

    let dir = dir.unwrap_or_else(|| config.watch.directory.clone());
    let source = PollingEventSource::new(
        &dir,
        config.watch.poll_interval(),
        config.watch.include_modified,
    )
    .with_context(|| format!("Cannot watch {}", dir.display()))?;

    let mut watcher =
        DirectoryWatcher::new(source).with_resume(resume, config.watch.resume_interval());
    let report = watcher.run(&mut ctx).await;
    ctx.log.close();

    println!(
        "{} file(s) processed, {} form(s) stored, {} form(s) failed, {} decode error(s)",
        report.files_processed, report.forms_stored, report.forms_failed, report.decode_errors
    );
    Ok(match report.exit {
        WatchState::Inaccessible => ExitCode::from(2),
        _ => ExitCode::SUCCESS,
    })
}

async fn ingest(config: ScoutwatchConfig, files: Vec<PathBuf>, backup: bool) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone(), ResumeSignal::new())?;

    let mut ctx = with_configured_backup(&config, ingest_context(&config, cancel).await?);
    let mut code = ExitCode::SUCCESS;
    for path in &files {
        if ctx.cancel.is_cancelled() {
            break;
        }
        match ctx.ingest_file(path, backup).await {
            Ok(report) => println!(
                "{}: {} form(s) stored, {} failed, {} decode error(s)",
                path.display(),
                report.forms_stored,
                report.forms_failed,
                report.decode_errors
            ),
            Err(err) if err.is_fatal() => {
                eprintln!("{}", err);
                code = ExitCode::from(2);
                break;
            }
            Err(err) => {
                eprintln!("{}", err);
                code = ExitCode::from(1);
            }
        }
    }
    ctx.log.close();
    Ok(code)
}

fn with_configured_backup(
    config: &ScoutwatchConfig,
    ctx: IngestContext<SqliteStore>,
) -> IngestContext<SqliteStore> {
    if !config.backup.enabled {
        return ctx;
    }
    ctx.with_backup(BackupWriter::new(
        MountRootLocator::new(config.volume.mount_roots.clone()),
        config.backup.locate_retry.clone(),
        config.backup.start_index,
    ))
}

async fn import_usb(config: ScoutwatchConfig) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone(), ResumeSignal::new())?;

    let mut ctx: IngestContext<SqliteStore> = ingest_context(&config, cancel).await?;
    let locator = MountRootLocator::new(config.volume.mount_roots.clone());

    let result = import_from_volume(&mut ctx, &locator, &config.volume.retry).await;
    ctx.log.close();
    match result {
        Ok(report) => {
            println!(
                "Imported {} file(s) from {}: {} form(s) stored, {} file(s) unreadable",
                report.files.len(),
                report.volume.display(),
                report.forms_stored(),
                report.files_failed
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err @ IngestError::VolumeNotFound { .. }) => {
            eprintln!("{}", err);
            Ok(ExitCode::from(1))
        }
        Err(err) => {
            eprintln!("{}", err);
            Ok(ExitCode::from(2))
        }
    }
}

async fn ingest_context(
    config: &ScoutwatchConfig,
    cancel: CancellationToken,
) -> Result<IngestContext<SqliteStore>> {
    let store = SqliteStore::open(&config.store.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open store at {}",
                config.store.database_path.display()
            )
        })?;
    info!(database = %store.path().display(), layout = ?config.protocol.layout, "Store ready");

    let orchestrator = PersistenceOrchestrator::new(
        store,
        config.store.connect_retry.clone(),
        config.store.record_retries,
    );
    Ok(IngestContext::new(
        config.protocol.layout,
        orchestrator,
        OperatorLog::new(config.operator_log.max_lines),
        cancel,
    ))
}

fn reconstructor(config: &ScoutwatchConfig) -> Reconstructor<SqliteStore> {
    Reconstructor::new(
        SqliteStore::existing(&config.store.database_path),
        config.protocol.layout,
    )
}

fn install_signal_handlers(cancel: CancellationToken, resume: ResumeSignal) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM, SIGUSR1])
            .context("Failed to install signal handlers")?;
        std::thread::spawn(move || {
            for sig in signals.forever() {
                if sig == SIGUSR1 {
                    info!("Received SIGUSR1, retrying store");
                    resume.request();
                    continue;
                }
                info!("Received signal {}, shutting down...", sig);
                cancel.cancel();
                break;
            }
        });
    }

    #[cfg(windows)]
    {
        drop(resume);
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}
