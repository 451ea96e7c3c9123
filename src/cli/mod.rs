pub mod commands;
pub mod output;
pub mod track;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{add_task, increment_elapsed, rename_task, set_elapsed, ElapsedField};
use output::{print_task, print_tasks};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use track::track_task;

use crate::{
    settings::Settings,
    tasks::storage::{TaskStorage, TaskStorageImpl},
    utils::{
        clock::{Clock, SystemClock},
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX, TRACK_PREFIX},
        man_hours::HoursPerDay,
        shutdown::detect_shutdown,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Worktally", version, long_about = None)]
#[command(about = "Track elapsed work time against tasks", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        help = "Application directory. By default uses $XDG_STATE_HOME/worktally or $HOME/.local/state/worktally"
    )]
    dir: Option<PathBuf>,
    #[arg(long, help = "Enable trace logging")]
    log: bool,
    #[arg(long = "log-filter", help = "Log level, overrides --log and RUST_LOG")]
    log_filter: Option<LevelFilter>,
    #[arg(long = "log-console", help = "Mirror logs to stdout")]
    log_console: bool,
    #[arg(
        long = "hours-per-day",
        help = "Hours in one person-day for this run. Examples are \"8\", \"7.5h\""
    )]
    hours_per_day: Option<HoursPerDay>,
    #[arg(long = "tick-secs", help = "How often a running tracker accrues time, for this run")]
    tick_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Add a new task")]
    Add { name: String },
    #[command(about = "List tasks with their elapsed time and man-hours")]
    List {},
    #[command(about = "Overwrite elapsed time of a task")]
    Set {
        id: String,
        #[arg(long)]
        hours: Option<u32>,
        #[arg(long)]
        minutes: Option<u32>,
    },
    #[command(about = "Add one hour or one minute to a task")]
    Increment { id: String, field: ElapsedField },
    #[command(about = "Rename a task")]
    Rename { id: String, name: String },
    #[command(about = "Remove a task")]
    Remove { id: String },
    #[command(about = "Track time for a task until interrupted")]
    Track { id: String },
    #[command(about = "Store --hours-per-day and --tick-secs as defaults")]
    Configure {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args
        .dir
        .clone()
        .map_or_else(create_application_default_path, ensure_dir)?;

    let logging_level = args
        .log_filter
        .or_else(|| args.log.then_some(LevelFilter::TRACE));
    let prefix = match args.commands {
        Commands::Track { .. } => TRACK_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir, logging_level, args.log_console)?;

    let settings = Settings::load(&app_dir)
        .await?
        .with_overrides(args.hours_per_day, args.tick_secs)?;
    let storage: Arc<dyn TaskStorage> = Arc::new(TaskStorageImpl::new(app_dir.clone())?);
    let hours_per_day = settings.hours_per_person_day;

    match args.commands {
        Commands::Add { name } => {
            let task = add_task(storage, &name, &settings, system_clock()).await?;
            println!("Added {}", task.id);
            Ok(())
        }
        Commands::List {} => {
            print_tasks(&storage.load_all().await?, hours_per_day);
            Ok(())
        }
        Commands::Set { id, hours, minutes } => {
            let (task, changed) =
                set_elapsed(storage, &id, hours, minutes, &settings, system_clock()).await?;
            if !changed {
                println!("Unchanged");
            }
            print_task(&task, hours_per_day);
            Ok(())
        }
        Commands::Increment { id, field } => {
            let task = increment_elapsed(storage, &id, field, &settings, system_clock()).await?;
            print_task(&task, hours_per_day);
            Ok(())
        }
        Commands::Rename { id, name } => {
            let task = rename_task(storage, &id, &name, &settings, system_clock()).await?;
            print_task(&task, hours_per_day);
            Ok(())
        }
        Commands::Remove { id } => {
            if storage.remove(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No task with id {id}");
            }
            Ok(())
        }
        Commands::Track { id } => {
            let shutdown = CancellationToken::new();
            let (_, recorded) = tokio::join!(
                detect_shutdown(shutdown.clone()),
                async {
                    let result =
                        track_task(storage, &id, &settings, system_clock, shutdown.clone()).await;
                    // Nothing left to wait for if tracking failed to start.
                    shutdown.cancel();
                    result
                },
            );
            print_task(&recorded?, hours_per_day);
            Ok(())
        }
        Commands::Configure {} => {
            settings.save(&app_dir).await?;
            info!("Saved settings {settings:?}");
            println!(
                "Saved {} per person-day, tick every {}s",
                settings.hours_per_person_day, settings.tick_period_secs
            );
            Ok(())
        }
    }
}

fn system_clock() -> Box<dyn Clock> {
    Box::new(SystemClock)
}
