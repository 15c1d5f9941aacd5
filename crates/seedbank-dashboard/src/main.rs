mod cli;
mod config;
mod edit;
mod poller;
mod state;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use config::{init_logging, Args, Config, LogTarget};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use edit::{WriteOutcome, WriteStep};
use futures_util::StreamExt;
use poller::{spawn_context_poller, spawn_seed_poller, PollEvent, Poller, SeedBundle, SeedQuery};
use ratatui::{backend::CrosstermBackend, Terminal};
use seedbank_client::StoreClient;
use seedbank_core::{AgentContext, MemoryType};
use state::{Action, App};
use std::{io, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{info, warn};

const WRITE_QUEUE_CAPACITY: usize = 4;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

struct Pollers {
    seeds: Poller<SeedQuery>,
    contexts: Poller<Option<MemoryType>>,
}

struct Channels {
    seeds: mpsc::Receiver<PollEvent<SeedBundle>>,
    contexts: mpsc::Receiver<PollEvent<Vec<AgentContext>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args)?;
    let client = StoreClient::with_connect_timeout(&config.api_base, config.connect_timeout)
        .context("building http client")?;

    if let Some(command) = args.command.clone() {
        init_logging(&config, LogTarget::Stderr);
        return cli::run(command, &config, &client).await;
    }

    let log_guard = init_logging(&config, LogTarget::File);
    info!(
        event = "dashboard_start",
        api_base = %config.api_base,
        log_file = log_guard.as_ref().is_some_and(|guard| guard.has_file())
    );

    let mut app = App::new(&config, state::open_preferences(&config));
    let client = Arc::new(client);
    let (seed_poller, seed_rx) = spawn_seed_poller(client.clone(), config.seed_poll, app.seed_query());
    let (context_poller, context_rx) =
        spawn_context_poller(client.clone(), config.context_poll, app.memory_filter);
    let pollers = Pollers {
        seeds: seed_poller,
        contexts: context_poller,
    };
    let mut channels = Channels {
        seeds: seed_rx,
        contexts: context_rx,
    };

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, &client, &pollers, &mut channels).await;
    restore_terminal(&mut terminal)?;

    app.close();
    pollers.seeds.shutdown().await;
    pollers.contexts.shutdown().await;
    info!(event = "dashboard_stop");
    result
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Tui,
    app: &mut App,
    client: &Arc<StoreClient>,
    pollers: &Pollers,
    channels: &mut Channels,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut clock = tokio::time::interval(Duration::from_secs(1));
    let (write_tx, mut write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);

    loop {
        if app.take_dirty() {
            terminal.draw(|f| ui::render(f, app))?;
        }

        let action = tokio::select! {
            _ = clock.tick() => {
                app.mark_dirty();
                None
            }
            Some(event) = channels.seeds.recv() => {
                app.apply_seed_event(event);
                None
            }
            Some(event) = channels.contexts.recv() => {
                app.apply_context_event(event);
                None
            }
            Some(result) = write_rx.recv() => app.apply_write_result(result),
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => handle_event(app, event),
                Some(Err(err)) => return Err(err.into()),
                None => Some(Action::Quit),
            },
        };

        if let Some(action) = action {
            if dispatch(action, pollers, client, &write_tx) {
                break;
            }
        }
        if app.should_quit() {
            break;
        }
    }
    Ok(())
}

fn handle_event(app: &mut App, event: Event) -> Option<Action> {
    match event {
        Event::Key(key) if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) => {
            app.handle_key(key)
        }
        Event::Mouse(mouse) => {
            app.handle_mouse(mouse);
            None
        }
        Event::Resize(_, _) => {
            app.mark_dirty();
            None
        }
        _ => None,
    }
}

/// Carries out an action. Returns true when the loop should stop.
fn dispatch(
    action: Action,
    pollers: &Pollers,
    client: &Arc<StoreClient>,
    write_tx: &mpsc::Sender<Result<WriteOutcome, String>>,
) -> bool {
    match action {
        Action::SetQuery(query) => {
            let mut params = pollers.seeds.params();
            params.query = query;
            if !pollers.seeds.set_params(params) {
                pollers.seeds.refresh();
            }
        }
        Action::SetMemoryFilter(memory_type) => {
            pollers.contexts.set_params(memory_type);
        }
        Action::Refresh => {
            pollers.seeds.refresh();
            pollers.contexts.refresh();
        }
        Action::Save(steps) => spawn_write(client.clone(), steps, write_tx.clone()),
        Action::Quit => return true,
    }
    false
}

fn spawn_write(
    client: Arc<StoreClient>,
    steps: Vec<WriteStep>,
    write_tx: mpsc::Sender<Result<WriteOutcome, String>>,
) {
    tokio::spawn(async move {
        let result = match edit::execute(&client, &steps).await {
            Ok(outcome) => {
                info!(event = "seed_write", steps = steps.len(), outcome = ?outcome);
                Ok(outcome)
            }
            Err(err) => {
                warn!(event = "seed_write_failed", error = %err);
                Err(err.to_string())
            }
        };
        let _ = write_tx.send(result).await;
    });
}
