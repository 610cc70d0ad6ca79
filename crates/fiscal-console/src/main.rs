mod app;
mod screen;
mod ui;

use app::{handle_input, Action, App, InputOutcome};
use clap::Parser;
use crossterm::event::EventStream;
use fiscal_core::{
    ConsoleSettings, DisplayNameStore, HttpBridge, PollScheduler, SettingsLayer, SyncCore,
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const UI_REFRESH_MS: u64 = 250;
const ACTION_QUEUE_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "fiscal-console", version, about = "Monitoring console for a fiscal device bridge")]
struct Args {
    /// Bridge base URL, e.g. http://localhost:5349
    #[arg(long)]
    bridge_url: Option<String>,
    /// Poll interval in seconds
    #[arg(long)]
    interval: Option<u64>,
    /// Directory for console-state.json and console.log
    #[arg(long)]
    state_dir: Option<PathBuf>,
    /// Per-request timeout in seconds; 0 disables it
    #[arg(long)]
    timeout: Option<u64>,
    /// Run one reconciliation pass, print the snapshot as JSON and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

impl Args {
    fn settings_layer(&self) -> SettingsLayer {
        SettingsLayer {
            bridge_url: self.bridge_url.clone(),
            poll_interval_secs: self.interval,
            state_dir: self.state_dir.clone(),
            request_timeout_secs: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let settings = ConsoleSettings::resolve(args.settings_layer())?;
    init_logging(&settings);

    let bridge = HttpBridge::new(&settings.base_url, settings.request_timeout)?;
    let store = DisplayNameStore::new(&settings.state_dir);
    let core = Arc::new(SyncCore::new(bridge, store));
    info!(
        event = "console_start",
        bridge = %settings.base_url,
        poll_secs = settings.poll_interval.as_secs(),
        state_dir = %settings.state_dir.display()
    );

    if args.once {
        core.load_startup_config().await;
        core.reconcile_pass().await;
        println!("{}", serde_json::to_string_pretty(&core.snapshot())?);
        return Ok(());
    }

    run_terminal(core, &settings).await
}

async fn run_terminal(
    core: Arc<SyncCore<HttpBridge>>,
    settings: &ConsoleSettings,
) -> Result<(), Box<dyn Error>> {
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(ACTION_QUEUE_CAPACITY);
    {
        let core = Arc::clone(&core);
        let refresh_tx = refresh_tx.clone();
        tokio::spawn(async move {
            core.load_startup_config().await;
            let _ = refresh_tx.try_send(());
        });
    }
    let poller = PollScheduler::new(settings.poll_interval).start(Arc::clone(&core));

    let mut app = App::new(core.snapshot(), settings.base_url.clone());

    let _restore = screen::enter()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();
    let mut ui_ticker = tokio::time::interval(Duration::from_millis(UI_REFRESH_MS));

    loop {
        app.set_snapshot(core.snapshot());
        terminal.draw(|frame| ui::render_ui(frame, &app))?;
        tokio::select! {
            _ = ui_ticker.tick() => {}
            Some(()) = refresh_rx.recv() => {}
            maybe_event = events.next() => {
                if let Some(Ok(event)) = maybe_event {
                    match handle_input(event, &mut app) {
                        InputOutcome::Quit => break,
                        InputOutcome::Dispatch(action) => {
                            dispatch(&core, &mut app, action, refresh_tx.clone());
                        }
                        InputOutcome::Continue => {}
                    }
                }
            }
        }
    }

    poller.stop().await;
    Ok(())
}

fn dispatch(
    core: &Arc<SyncCore<HttpBridge>>,
    app: &mut App,
    action: Action,
    refresh_tx: mpsc::Sender<()>,
) {
    if let Action::Command(command) = action {
        app.note_hint(command, core.command_hint(command));
    }
    let core = Arc::clone(core);
    tokio::spawn(async move {
        match action {
            Action::Command(command) => core.submit_command(command).await,
            Action::RequestStatus => core.request_status().await,
            Action::RequestConfig => core.request_config().await,
        }
        let _ = refresh_tx.try_send(());
    });
}

fn init_logging(settings: &ConsoleSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_enabled = matches!(
        std::env::var("FISCAL_LOG_STDOUT").ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") | Some("YES")
    );
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return;
    }
    match open_log_file(settings) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(err) => {
            eprintln!("log_file_error: {err}");
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}

fn open_log_file(settings: &ConsoleSettings) -> io::Result<fs::File> {
    fs::create_dir_all(&settings.state_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(settings.log_path())
}
