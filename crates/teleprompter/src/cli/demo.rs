//! `teleprompter demo`: a control and a display view in one process.
//!
//! Both engines share one in-memory origin. With `--fallback` the
//! broadcast bus is unavailable, so both pick the storage relay the way a
//! browser without `BroadcastChannel` would.

use std::sync::Arc;
use std::time::Duration;

use teleprompter_core::clock::SystemClock;
use teleprompter_core::config::SyncConfig;
use teleprompter_core::state::{AppMode, LiveMessageType, Presenter, SharedState};
use teleprompter_core::store::MemoryStorage;
use teleprompter_core::sync::{LocalBus, Role, StorageRelay, SyncEngine, TokioScheduler, Transport, select_transport};

use super::CliError;
use crate::config::Config;

/// Time given to each step to reach the display.
const SETTLE: Duration = Duration::from_millis(50);

pub fn handle_demo(config: &Config, fallback: bool, json: bool) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let display = runtime.block_on(run_demo(&config.sync, fallback))?;

    if json {
        let text = serde_json::to_string_pretty(&display)
            .map_err(|e| CliError::Other(format!("failed to serialize state: {e}")))?;
        println!("{text}");
    }
    Ok(())
}

/// Two views sharing one origin.
struct Session {
    control: SyncEngine,
    display: SyncEngine,
}

impl Session {
    fn open(config: &SyncConfig, fallback: bool) -> Self {
        let bus = if fallback { LocalBus::closed() } else { LocalBus::new() };
        let storage = MemoryStorage::new();
        Self {
            control: open_engine(Role::Authoritative, &bus, &storage, config),
            display: open_engine(Role::Receiver, &bus, &storage, config),
        }
    }

    fn in_sync(&self) -> bool {
        self.control.state() == self.display.state()
    }
}

fn open_engine(role: Role, bus: &LocalBus, storage: &MemoryStorage, config: &SyncConfig) -> SyncEngine {
    let context = Arc::new(storage.context());
    let relay_context = context.clone();
    let transport = select_transport(
        || Ok(Arc::new(bus.attach()?) as Arc<dyn Transport>),
        || {
            Arc::new(StorageRelay::new(
                relay_context,
                Arc::new(TokioScheduler::new()),
                Arc::new(SystemClock),
                config,
            ))
        },
    );
    SyncEngine::new(role, transport, context, config.clone()).with_scheduler(Arc::new(TokioScheduler::new()))
}

async fn run_demo(config: &SyncConfig, fallback: bool) -> Result<SharedState, CliError> {
    let session = Session::open(config, fallback);
    println!(
        "Control: {} over {}, display: {} over {}",
        session.control.role(),
        session.control.transport_kind(),
        session.display.role(),
        session.display.transport_kind()
    );

    session.display.on_change(|state: &SharedState| {
        log::info!(
            "[Demo] Display now: speed {} playing {} presenter {:?}",
            state.speed,
            state.is_playing,
            state.selected_presenter_id
        );
    });

    session.control.mount();
    session.display.mount();
    tokio::time::sleep(config.startup_grace() + SETTLE).await;
    report(&session, "startup broadcast");

    let control = &session.control;
    control.set_presenters(vec![
        Presenter::new(1, "Opening", "Good evening and welcome."),
        Presenter::new(2, "Keynote", "Tonight we look at what changed this year."),
    ]);
    step(&session, "set presenters").await;

    control.select_presenter(2);
    step(&session, "select presenter 2").await;

    control.set_speed(2.5);
    control.set_font_size(56.0);
    step(&session, "speed 2.5, font 56").await;

    control.set_mode(AppMode::Combined);
    control.set_timer_duration(5 * 60 * 1000);
    control.start_timer();
    control.play();
    step(&session, "play with timer").await;

    let id = control.send_live_message("Wrap up in two minutes", LiveMessageType::Warning);
    step(&session, "push live message").await;
    println!("  display shows {:?}", session.display.state().current_message.text);

    control.clear_live_message(id.as_deref());
    control.pause();
    control.pause_timer();
    step(&session, "clear message and pause").await;
    println!("  display timer frozen at {} ms", session.display.elapsed_now());

    let display = session.display.state();
    session.display.unmount();
    session.control.unmount();

    if display != session.control.state() {
        return Err(CliError::Other("display diverged from control".to_string()));
    }
    println!("Display converged on the control state.");
    Ok(display)
}

async fn step(session: &Session, label: &str) {
    tokio::time::sleep(SETTLE).await;
    report(session, label);
}

fn report(session: &Session, label: &str) {
    let status = if session.in_sync() { "in sync" } else { "pending" };
    println!("{label:<28} {status}");
}
