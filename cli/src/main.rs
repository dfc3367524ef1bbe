//! Focus - terminal front-end for the focus session timer.
//!
//! # Commands
//!
//! - `focus run`: Start the interactive timer
//! - `focus status`: Show the persisted session, if any
//! - `focus clear`: Discard the persisted session
//!
//! # Environment Variables
//!
//! See [`focus_core::config`] for available configuration options.

mod desktop;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use focus_core::clock::SystemClock;
use focus_core::config::Config;
use focus_core::dispatch::{
    AudioOutput, BellOutput, EffectDispatcher, NotificationBackend, Notifier, PipeOutput,
    SoundPlayer,
};
use focus_core::persistence::{FileSnapshotStore, SnapshotStore};
use focus_core::session::{Action, FocusSession, SessionChannels, SessionDeps};
use focus_core::tabs::{TabBus, TabCoordinator};
use focus_core::tasks::{MemoryTaskStore, TaskItem, Toast, ToastSink, ToastVariant};
use focus_core::view::format_clock;
use focus_core::{FsmState, MAX_DURATION_MINUTES};

use crate::desktop::DesktopNotifications;

/// Focus - single-task focus session timer.
#[derive(Parser, Debug)]
#[command(name = "focus")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    FOCUS_STATE_DIR          Snapshot directory (default: platform data dir)
    FOCUS_TICK_INTERVAL_MS   Tick period in milliseconds (default: 250)
    FOCUS_BREAK_MINUTES      Break length in minutes (default: 5)
    FOCUS_CHANNEL_CAPACITY   Event and tab channel capacity (default: 256)
    FOCUS_TASK_COLLECTION    Task collection name (default: tasks)

EXAMPLES:
    # Start a 25 minute session right away
    focus run --task-id t1 --title \"Write report\" --minutes 25

    # Simulate two tabs sharing one timer
    focus run --tabs 2
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the interactive timer.
    ///
    /// Resumes a persisted session if one exists. Type `help` for the list
    /// of commands.
    Run {
        /// Task item to start a session for.
        #[arg(long, requires = "minutes")]
        task_id: Option<String>,

        /// Title of the task item.
        #[arg(long)]
        title: Option<String>,

        /// Planned focus duration in minutes (at most one day).
        #[arg(
            long,
            requires = "task_id",
            value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_MINUTES)
        )]
        minutes: Option<u64>,

        /// Number of simulated tabs sharing the timer.
        #[arg(long, default_value_t = 1)]
        tabs: usize,

        /// Show notifications in the terminal only.
        #[arg(long)]
        no_desktop: bool,
    },

    /// Show the persisted session.
    Status,

    /// Discard the persisted session.
    Clear,
}

const HELP: &str = "\
commands:
    start <task-id> <minutes> [title]   start a focus session
    pause | resume | stop               control the running session
    finish                              finish overtime and offer a break
    break | skip | dismiss              start, skip or dismiss the break
    remind <title>                      play the reminder for an upcoming task
    delete <task-id>                    delete a task item
    tab <n>                             switch the active input to tab n
    use                                 use the current tab instead
    status                              show every tab
    quit                                exit";

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;
    debug!(state_dir = %config.state_dir.display(), "Configuration loaded");

    match cli.command {
        Command::Status => run_status(&config),
        Command::Clear => run_clear(&config),
        Command::Run {
            task_id,
            title,
            minutes,
            tabs,
            no_desktop,
        } => {
            if tabs == 0 {
                bail!("--tabs must be at least 1");
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            let initial = task_id.zip(minutes).map(|(id, minutes)| Action::Start {
                session_id: id,
                title,
                duration_minutes: minutes,
            });
            runtime.block_on(run_timer(config, tabs, !no_desktop, initial))
        }
    }
}

fn run_status(config: &Config) -> Result<()> {
    let store = FileSnapshotStore::open(config).context("Failed to open snapshot store")?;
    match store.load() {
        Some(snapshot) => {
            println!("session:  {}", snapshot.session_id);
            if let Some(title) = &snapshot.title {
                println!("title:    {title}");
            }
            println!("status:   {:?}", snapshot.status);
            println!("planned:  {}", format_clock(snapshot.duration_ms));
            println!("paused:   {}", format_clock(snapshot.paused_ms));
        }
        None => println!("No active session."),
    }
    Ok(())
}

fn run_clear(config: &Config) -> Result<()> {
    FileSnapshotStore::open(config)
        .context("Failed to open snapshot store")?
        .clear()
        .context("Failed to clear snapshot")?;
    println!("Snapshot cleared.");
    Ok(())
}

/// Prints toasts to stdout.
struct PrintToastSink;

impl ToastSink for PrintToastSink {
    fn show(&self, toast: Toast) {
        let marker = match toast.variant {
            ToastVariant::Default => "*",
            ToastVariant::Destructive => "!",
        };
        println!("{marker} {}: {}", toast.title, toast.description);
    }
}

struct Tab {
    session: FocusSession,
    channels: SessionChannels,
    last_state: FsmState,
}

/// Runs the interactive timer until `quit`, end of input or a signal.
async fn run_timer(
    config: Config,
    tab_count: usize,
    desktop: bool,
    initial: Option<Action>,
) -> Result<()> {
    info!("Starting focus timer");

    let store: Arc<dyn SnapshotStore> =
        Arc::new(FileSnapshotStore::open(&config).context("Failed to open snapshot store")?);
    let tasks = Arc::new(MemoryTaskStore::new(config.task_collection.clone()));
    let toasts: Arc<dyn ToastSink> = Arc::new(PrintToastSink);
    let bus = (tab_count > 1).then(|| TabBus::with_capacity(config.channel_capacity));
    let backend: Option<Arc<dyn NotificationBackend>> =
        desktop.then(|| Arc::new(DesktopNotifications) as Arc<dyn NotificationBackend>);
    let output: Arc<dyn AudioOutput> = match PipeOutput::detect() {
        Some(pipe) => Arc::new(pipe),
        None => {
            info!("No PCM player found, falling back to the terminal bell");
            Arc::new(BellOutput)
        }
    };

    // A restored session needs its item to exist for the deletion check.
    if let Some(snapshot) = store.load() {
        let title = snapshot.title.clone().unwrap_or_default();
        tasks.insert(TaskItem::new(snapshot.session_id, title));
    }

    let mut tabs = Vec::with_capacity(tab_count);
    for _ in 0..tab_count {
        let deps = SessionDeps {
            clock: Arc::new(SystemClock),
            store: store.clone(),
            tasks: tasks.clone(),
            dispatcher: Arc::new(EffectDispatcher::new(
                SoundPlayer::new(output.clone()),
                Notifier::new(backend.clone(), toasts.clone()),
            )),
            coordinator: TabCoordinator::new(bus.clone()),
        };
        let (session, channels) = FocusSession::launch(&config, deps);
        tabs.push(Tab {
            last_state: session.state(),
            session,
            channels,
        });
    }
    for tab in &mut tabs {
        tab.session.process_pending(&mut tab.channels);
    }

    let mut current = tab_count - 1;
    info!(tabs = tab_count, tab_id = %tabs[current].session.tab_id(), "Timer ready");
    print_status(&tabs, current);

    if let Some(Action::Start {
        session_id,
        title,
        duration_minutes,
    }) = initial
    {
        let item_title = title.clone().unwrap_or_else(|| session_id.clone());
        tasks.insert(TaskItem::new(session_id.clone(), item_title));
        tabs[current].session.perform(Action::Start {
            session_id,
            title,
            duration_minutes,
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut refresh = tokio::time::interval(config.tick_interval);

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }
            _ = refresh.tick() => {
                for (index, tab) in tabs.iter_mut().enumerate() {
                    tab.session.process_pending(&mut tab.channels);
                    if tab.session.state() != tab.last_state {
                        tab.last_state = tab.session.state();
                        let view = tab.session.view();
                        println!("[tab {}] {} {}", index + 1, view.state, view.clock);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    debug!("End of input");
                    break;
                };
                match handle_line(line.trim(), &mut tabs, &mut current, &tasks) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("error: {e}"),
                }
            }
        }
    }

    info!("Focus timer stopped");
    Ok(())
}

/// Handles one input line. Returns `false` to quit.
fn handle_line(
    line: &str,
    tabs: &mut [Tab],
    current: &mut usize,
    tasks: &MemoryTaskStore,
) -> Result<bool> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(true);
    };
    let rest: Vec<&str> = words.collect();

    let action = match command {
        "quit" | "exit" => return Ok(false),
        "help" => {
            println!("{HELP}");
            return Ok(true);
        }
        "status" => {
            print_status(tabs, *current);
            return Ok(true);
        }
        "tab" => {
            let n: usize = rest
                .first()
                .context("usage: tab <n>")?
                .parse()
                .context("tab must be a number")?;
            if n == 0 || n > tabs.len() {
                bail!("no tab {n}");
            }
            *current = n - 1;
            println!("input goes to tab {n}");
            return Ok(true);
        }
        "delete" => {
            let id = rest.first().context("usage: delete <task-id>")?;
            if tasks.remove(id).is_none() {
                bail!("no task {id}");
            }
            for tab in tabs.iter_mut() {
                tab.session.on_items_changed();
            }
            return Ok(true);
        }
        "start" => {
            let [id, minutes, title @ ..] = rest.as_slice() else {
                bail!("usage: start <task-id> <minutes> [title]");
            };
            let minutes: u64 = minutes.parse().context("minutes must be a number")?;
            if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
                bail!("minutes must be between 1 and {MAX_DURATION_MINUTES}");
            }
            let title = (!title.is_empty()).then(|| title.join(" "));
            tasks.insert(TaskItem::new(*id, title.clone().unwrap_or_else(|| (*id).to_string())));
            Action::Start {
                session_id: (*id).to_string(),
                title,
                duration_minutes: minutes,
            }
        }
        "pause" => Action::Pause,
        "resume" => Action::Resume,
        "stop" => Action::Stop,
        "finish" => Action::FinishAndBreak,
        "break" => Action::StartBreak,
        "skip" => Action::SkipBreak,
        "dismiss" => Action::DismissBreak,
        "use" => Action::TakeLeadership,
        "remind" => Action::Remind {
            title: rest.join(" "),
        },
        other => bail!("unknown command {other:?}, type `help`"),
    };

    let tab = &mut tabs[*current];
    if !tab.session.perform(action) && !tab.session.is_leader() {
        warn!(tab = *current + 1, "Another tab is driving the timer, type `use` to take over");
    }
    Ok(true)
}

fn print_status(tabs: &[Tab], current: usize) {
    for (index, tab) in tabs.iter().enumerate() {
        let view = tab.session.view();
        let marker = if index == current { ">" } else { " " };
        let role = if tab.session.is_leader() { "leader" } else { "follower" };
        let mut line = format!("{marker} tab {} ({role}): {} {}", index + 1, view.state, view.clock);
        if let Some(title) = &view.title {
            line.push_str(&format!(" - {title}"));
        }
        if !tab.session.is_leader() {
            if let Some(clock) = tab.session.mirror().clock() {
                line.push_str(&format!(" [mirroring {clock}]"));
            }
        }
        println!("{line}");
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_minutes(minutes: &str) -> Result<Option<u64>, clap::Error> {
        let cli = Cli::try_parse_from(["focus", "run", "--task-id", "t1", "--minutes", minutes])?;
        match cli.command {
            Command::Run { minutes, .. } => Ok(minutes),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn minutes_must_fit_in_a_day() {
        assert_eq!(parse_minutes("25").unwrap(), Some(25));
        assert_eq!(parse_minutes("1440").unwrap(), Some(MAX_DURATION_MINUTES));
        assert!(parse_minutes("0").is_err());
        assert!(parse_minutes("1441").is_err());
        assert!(parse_minutes("400000000000000").is_err());
    }

    #[test]
    fn desktop_notifications_are_on_by_default() {
        let cli = Cli::try_parse_from(["focus", "run"]).unwrap();
        assert!(matches!(cli.command, Command::Run { no_desktop: false, .. }));

        let cli = Cli::try_parse_from(["focus", "run", "--no-desktop"]).unwrap();
        assert!(matches!(cli.command, Command::Run { no_desktop: true, .. }));
    }

    #[test]
    fn start_command_rejects_oversized_minutes() {
        let tasks = MemoryTaskStore::new("tasks");
        let mut current = 0;
        let err = handle_line("start t1 1441", &mut [], &mut current, &tasks).unwrap_err();
        assert_eq!(err.to_string(), "minutes must be between 1 and 1440");
        assert!(tasks.get("t1").is_none());
    }
}
