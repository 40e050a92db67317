//! `authentiya` - CLI for the writing-session recorder
//!
//! `authentiya run` drives the recorder from newline-delimited JSON on
//! stdin. The remaining commands inspect or change the shared store the way
//! the extension popup and options pages do.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{Local, Utc};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use authentiya::cli::{
    CiteCommand, Cli, Command, ConfigCommand, CoursesCommand, EventsCommand, OutputArgs,
    OutputFormat, RunCommand, StartCommand, ToggleCommand,
};
use authentiya::export::convert_to_csv;
use authentiya::lms::{self, CanvasClient};
use authentiya::message::Command as RecorderCommand;
use authentiya::recorder::{Outcome, Recorder};
use authentiya::session::{Session, SessionController, SessionState};
use authentiya::source::{self, LineSource, SourceHandle};
use authentiya::store::{CitationEntry, KeystrokeLog, SessionHistoryEntry, ToggleEntry};
use authentiya::{citation, init_logging, sink, view, Catalog, Config, Error, Store};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(execute(cli));
    // A pending stdin read holds a blocking thread until the next line
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<Error>() {
                Some(inner) if inner.is_validation_error() => eprintln!("{inner}"),
                _ => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config;
    let load = || Config::load_from(path.clone());

    match cli.command {
        Command::Run(cmd) => handle_run(&load()?, &cmd).await,
        Command::Start(cmd) => handle_start(&load()?, cmd).await,
        Command::Submit(args) => handle_submit(&load()?, &args).await,
        Command::Reset => handle_reset(&load()?).await,
        Command::Status(args) => handle_status(&load()?, &args),
        Command::Events(cmd) => handle_events(&load()?, &cmd),
        Command::Citations(args) => handle_citations(&load()?, &args),
        Command::Cite(cmd) => handle_cite(&load()?, &cmd).await,
        Command::History(args) => handle_history(&load()?, &args),
        Command::Toggle(cmd) => handle_toggle(&load()?, &cmd).await,
        Command::Courses(cmd) => handle_courses(&load()?, &cmd).await,
        Command::Config(cmd) => handle_config(path.clone(), cmd),
    }
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    let path = config.database_path();
    Store::open(&path).with_context(|| format!("opening store at {}", path.display()))
}

fn recorder(config: &Config) -> anyhow::Result<Recorder> {
    let store = open_store(config)?;
    let sink = sink::from_config(&config.remote)?;
    let mut recorder = Recorder::new(config, store, sink)?;
    recorder.restore()?;
    Ok(recorder)
}

/// Dispatch a single command through a freshly restored recorder.
async fn dispatch_once(config: &Config, command: RecorderCommand) -> anyhow::Result<Outcome> {
    let mut recorder = recorder(config)?;
    let outcome = recorder.dispatch(command);
    recorder.flush().await;
    Ok(outcome?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_run(config: &Config, cmd: &RunCommand) -> anyhow::Result<()> {
    let mut recorder = Recorder::new(
        config,
        open_store(config)?,
        sink::from_config(&config.remote)?,
    )?;
    if !cmd.no_restore && recorder.restore()? {
        info!("Resumed active session");
    }

    let (tx, rx) = mpsc::channel(config.capture.channel_capacity);
    let handle = SourceHandle::new();
    let reader = source::spawn(LineSource::stdin(), tx, handle.clone());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let summary = recorder.run(rx, shutdown).await?;
    handle.stop();
    if reader.is_finished() {
        match reader.await {
            Ok(Ok(stats)) => info!(%stats, "Input finished"),
            Ok(Err(e)) => warn!(error = %e, "Input failed"),
            Err(e) => warn!(error = %e, "Input task failed"),
        }
    }

    eprintln!(
        "Processed {} messages ({} rejected, {} ticks)",
        summary.messages, summary.rejected, summary.ticks
    );
    Ok(())
}

async fn handle_start(config: &Config, cmd: StartCommand) -> anyhow::Result<()> {
    let outcome = dispatch_once(
        config,
        RecorderCommand::StartSession {
            course: cmd.course,
            assignment: cmd.assignment,
        },
    )
    .await?;

    if let Outcome::Started(session) = outcome {
        if cmd.json {
            print_json(&session.to_data())?;
        } else {
            println!(
                "Started session {} for {} / {}",
                session.key, session.course, session.assignment
            );
        }
    }
    Ok(())
}

async fn handle_submit(config: &Config, args: &OutputArgs) -> anyhow::Result<()> {
    let outcome = dispatch_once(config, RecorderCommand::SubmitSession).await?;

    if let Outcome::Submitted(submission) = outcome {
        if args.json {
            print_json(&serde_json::json!({
                "report": submission.path,
                "history": submission.history,
            }))?;
        } else {
            let stats = submission.report.citation_stats();
            println!("Session submitted.");
            println!("  Report:     {}", submission.path.display());
            println!("  Events:     {}", submission.report.keystroke_data.len());
            println!(
                "  Duration:   {}",
                view::format_clock(submission.report.session_duration)
            );
            println!(
                "  Citations:  {} ({}% cited)",
                stats.total,
                stats.percentage()
            );
        }
    }
    Ok(())
}

async fn handle_reset(config: &Config) -> anyhow::Result<()> {
    dispatch_once(config, RecorderCommand::ResetSession).await?;
    println!("Session discarded.\n");
    print!(
        "{}",
        view::render_status(&SessionState::Idle, 0, &config.catalog, &Local)
    );
    Ok(())
}

fn handle_status(config: &Config, args: &OutputArgs) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let mut controller = SessionController::new(
        config.catalog.clone(),
        config.session.snapshot_every_ticks,
    );
    controller.restore(&store)?;
    let events = store
        .load::<KeystrokeLog>()?
        .map_or(0, |log| log.data.len());

    if args.json {
        let stats = store.stats()?;
        print_json(&serde_json::json!({
            "session": controller.session().map(Session::to_data),
            "events": events,
            "database_path": store.path(),
            "records": stats.records,
            "schema_version": stats.schema_version,
            "db_size_bytes": stats.db_size_bytes,
            "last_updated": stats.last_updated.as_ref().map(view::format_instant),
        }))
    } else {
        print!(
            "{}",
            view::render_status(controller.state(), events, &config.catalog, &Local)
        );
        Ok(())
    }
}

fn handle_events(config: &Config, cmd: &EventsCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let log = store.load::<KeystrokeLog>()?.unwrap_or_default();
    let skip = cmd.last.map_or(0, |n| log.data.len().saturating_sub(n));

    match cmd.output() {
        OutputFormat::Table => print!("{}", view::render_events(&log, cmd.last)),
        OutputFormat::Csv => {
            let rows: Vec<Vec<String>> = log.data.iter().skip(skip).map(|r| r.fields()).collect();
            print!("{}", convert_to_csv(Some(&log.label[..]), Some(&rows[..])));
        }
        OutputFormat::Json => print_json(&log.data[skip..])?,
    }
    Ok(())
}

fn handle_citations(config: &Config, args: &OutputArgs) -> anyhow::Result<()> {
    let entries = open_store(config)?.load_list::<CitationEntry>()?;
    if args.json {
        print_json(&entries)
    } else {
        print!("{}", view::render_citations(&entries));
        Ok(())
    }
}

async fn handle_cite(config: &Config, cmd: &CiteCommand) -> anyhow::Result<()> {
    let entries = open_store(config)?.load_list::<CitationEntry>()?;
    let Some(index) = citation::find(&entries, &cmd.entry) else {
        bail!("no copy/paste event matches {:?}", cmd.entry);
    };

    match dispatch_once(config, RecorderCommand::MarkCited(index)).await? {
        Outcome::Cited { changed: true } => println!("Marked [{index}] as cited."),
        _ => println!("[{index}] is already cited."),
    }
    Ok(())
}

fn handle_history(config: &Config, args: &OutputArgs) -> anyhow::Result<()> {
    let entries = open_store(config)?.load_list::<SessionHistoryEntry>()?;
    if args.json {
        print_json(&entries)
    } else {
        print!("{}", view::render_history(&entries, &Local));
        Ok(())
    }
}

async fn handle_toggle(config: &Config, cmd: &ToggleCommand) -> anyhow::Result<()> {
    let entry = ToggleEntry {
        state: cmd.state.into(),
        timestamp: Utc::now(),
    };
    let outcome = dispatch_once(config, RecorderCommand::TrackToggle(entry)).await?;
    if let Outcome::Toggled(state) = outcome {
        println!("Tracking {state}.");
    }
    Ok(())
}

async fn handle_courses(config: &Config, cmd: &CoursesCommand) -> anyhow::Result<()> {
    if cmd.verify {
        let client = CanvasClient::from_config(&config.remote)?;
        if client.verify().await? {
            let store = open_store(config)?;
            if lms::remember_domain(&store, client.base_url())? {
                println!("Canvas instance is reachable; domain stored.");
            } else {
                println!("Canvas instance is reachable.");
            }
            return Ok(());
        }
        bail!("Canvas instance did not answer the course listing request");
    }

    let catalog = if cmd.remote {
        let client = CanvasClient::from_config(&config.remote)?;
        Catalog {
            courses: client.courses().await?.into_iter().map(Into::into).collect(),
        }
    } else {
        config.catalog.clone()
    };

    if cmd.json {
        return print_json(&catalog.courses);
    }
    if catalog.is_empty() {
        println!("No courses configured.");
    }
    for course in &catalog.courses {
        println!("{} ({})", course.display_name(), course.value);
        for assignment in &course.assignments {
            println!("  - {} ({})", assignment.label, assignment.value);
        }
    }
    Ok(())
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path)?;
            if json {
                print_json(&config)?;
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Export directory:   {}", config.export_dir().display());
                println!();
                println!("[Session]");
                println!("  Tick interval (ms): {}", config.session.tick_interval_ms);
                println!("  Snapshot every:     {} ticks", config.session.snapshot_every_ticks);
                println!();
                println!("[Capture]");
                println!("  Repeat window (ms): {}", config.capture.repeat_window_ms);
                println!("  Channel capacity:   {}", config.capture.channel_capacity);
                println!();
                println!("[Catalog]");
                println!("  Courses:            {}", config.catalog.courses.len());
                println!();
                println!("[Remote]");
                println!("  Enabled:            {}", config.remote.enabled);
                println!(
                    "  Endpoint:           {}",
                    config.remote.endpoint.as_deref().unwrap_or("--")
                );
                println!(
                    "  Canvas:             {}",
                    config.remote.canvas_base_url.as_deref().unwrap_or("--")
                );
            }
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                path.unwrap_or_else(Config::default_config_path).display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
