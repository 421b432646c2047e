//! Idle detection and the "are you still there?" prompt
//!
//! Pure state machine: `handle_event` receives events and returns
//! `(new_state, action)`. The `IdleController` driver owns the only timer
//! slot and executes the I/O implied by each action, so arming the countdown
//! structurally disarms the idle timer and vice versa.
//!
//! ```text
//! Active ──idle timeout──▶ CountdownVisible(N) ──tick──▶ CountdownVisible(N-1)
//!   ▲                         │ still here               │ reaches 0 / log out
//!   │ refresh ok              ▼                          ▼
//!   └──────────────── Confirming(n) ──refresh failed──▶ LoggedOut
//! ```
//!
//! A forced logout (auth bus `Logout`) reaches `LoggedOut` from any state.

use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use session_auth::{AuthEvent, AuthEvents};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::refresh::RefreshCoordinator;

const COMMAND_BUFFER: usize = 32;

/// User-activity signals that count as presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    PointerDown,
    KeyPress,
    Scroll,
    Touch,
    Click,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleState {
    Active,
    CountdownVisible { seconds_remaining: u32 },
    /// "I'm here" pressed, refresh outstanding. No timer armed.
    Confirming { seconds_remaining: u32 },
    LoggedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    Activity(ActivityKind),
    IdleTimeout,
    Tick,
    StillHere,
    RefreshSucceeded,
    RefreshFailed,
    LogoutRequested,
    /// Session ended elsewhere (refresh failure, another component).
    ForcedLogout,
    SessionStarted,
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// Replace the timer slot with a fresh idle timer.
    ArmIdleTimer,
    /// Replace the timer slot with the next countdown tick.
    ArmCountdown,
    /// Disarm timers and ask the coordinator for a refresh.
    Refresh,
    /// Disarm timers and run the logout cleanup.
    Logout,
    /// Disarm timers; cleanup already happened elsewhere.
    Disarm,
    None,
}

#[derive(Debug, Clone)]
pub struct IdleConfig {
    pub idle_timeout: Duration,
    pub countdown_secs: u32,
    pub tick_interval: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(600_000),
            countdown_secs: 60,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Apply one event to the idle state machine.
pub fn handle_event(
    state: IdleState,
    event: IdleEvent,
    config: &IdleConfig,
) -> (IdleState, IdleAction) {
    match (state, event) {
        // Forced logout wins from anywhere; the cleanup already ran
        (IdleState::LoggedOut, IdleEvent::ForcedLogout) => (IdleState::LoggedOut, IdleAction::None),
        (_, IdleEvent::ForcedLogout) => (IdleState::LoggedOut, IdleAction::Disarm),

        (_, IdleEvent::SessionStarted) => (IdleState::Active, IdleAction::ArmIdleTimer),
        (IdleState::LoggedOut, _) => (IdleState::LoggedOut, IdleAction::None),

        (_, IdleEvent::LogoutRequested) => (IdleState::LoggedOut, IdleAction::Logout),

        (IdleState::Active, IdleEvent::Activity(_)) => (IdleState::Active, IdleAction::ArmIdleTimer),
        (IdleState::Active, IdleEvent::IdleTimeout) => (
            IdleState::CountdownVisible {
                seconds_remaining: config.countdown_secs,
            },
            IdleAction::ArmCountdown,
        ),

        (IdleState::CountdownVisible { seconds_remaining }, IdleEvent::Tick) => {
            if seconds_remaining <= 1 {
                (IdleState::LoggedOut, IdleAction::Logout)
            } else {
                (
                    IdleState::CountdownVisible {
                        seconds_remaining: seconds_remaining - 1,
                    },
                    IdleAction::ArmCountdown,
                )
            }
        }
        (IdleState::CountdownVisible { seconds_remaining }, IdleEvent::StillHere) => (
            IdleState::Confirming { seconds_remaining },
            IdleAction::Refresh,
        ),

        (IdleState::Confirming { .. }, IdleEvent::RefreshSucceeded) => {
            (IdleState::Active, IdleAction::ArmIdleTimer)
        }
        // The coordinator has already cleared the session and broadcast Logout
        (IdleState::Confirming { .. }, IdleEvent::RefreshFailed) => {
            (IdleState::LoggedOut, IdleAction::Disarm)
        }

        // Activity during the prompt, stale timer fires, ticks while confirming
        (state, _) => (state, IdleAction::None),
    }
}

enum Command {
    Activity(ActivityKind),
    StillHere,
    LogOut,
    SessionStarted,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Idle,
    Countdown,
}

/// Handle to a running idle controller.
///
/// Dropping every handle stops the driver the same way `shutdown` does.
#[derive(Clone)]
pub struct IdleHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<IdleState>,
}

impl IdleHandle {
    pub async fn activity(&self, kind: ActivityKind) {
        self.command(Command::Activity(kind)).await;
    }

    /// "I'm here" from the countdown prompt.
    pub async fn still_here(&self) {
        self.command(Command::StillHere).await;
    }

    pub async fn log_out(&self) {
        self.command(Command::LogOut).await;
    }

    /// A fresh login happened; resume idle tracking.
    pub async fn session_started(&self) {
        self.command(Command::SessionStarted).await;
    }

    /// Stop the driver and drop any armed timer.
    pub async fn shutdown(&self) {
        self.command(Command::Shutdown).await;
    }

    pub fn state(&self) -> IdleState {
        self.state.borrow().clone()
    }

    /// Watch state changes (the rendering layer navigates on `LoggedOut`).
    pub fn subscribe(&self) -> watch::Receiver<IdleState> {
        self.state.clone()
    }

    async fn command(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            debug!("idle controller already stopped");
        }
    }
}

pub struct IdleController {
    config: IdleConfig,
    coordinator: RefreshCoordinator,
    state: IdleState,
    timer: Option<(TimerKind, Pin<Box<Sleep>>)>,
    refresh: Option<JoinHandle<Result<Secret<String>, RefreshError>>>,
    state_tx: watch::Sender<IdleState>,
}

impl IdleController {
    /// Start the driver. Begins `Active` with the idle timer armed when
    /// `authenticated`, otherwise `LoggedOut`.
    pub fn spawn(
        config: IdleConfig,
        coordinator: RefreshCoordinator,
        events: &AuthEvents,
        authenticated: bool,
    ) -> (IdleHandle, JoinHandle<()>) {
        let initial = if authenticated {
            IdleState::Active
        } else {
            IdleState::LoggedOut
        };
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let auth_rx = events.subscribe();

        let mut controller = Self {
            config,
            coordinator,
            state: initial,
            timer: None,
            refresh: None,
            state_tx,
        };
        if authenticated {
            controller.arm(TimerKind::Idle);
        }

        let task = tokio::spawn(controller.run(cmd_rx, auth_rx));
        (
            IdleHandle {
                commands: cmd_tx,
                state: state_rx,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut auth: broadcast::Receiver<AuthEvent>,
    ) {
        let mut auth_open = true;
        loop {
            let event = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Activity(kind)) => IdleEvent::Activity(kind),
                    Some(Command::StillHere) => IdleEvent::StillHere,
                    Some(Command::LogOut) => IdleEvent::LogoutRequested,
                    Some(Command::SessionStarted) => IdleEvent::SessionStarted,
                    Some(Command::Shutdown) | None => break,
                },
                kind = expired(&mut self.timer) => {
                    self.timer = None;
                    match kind {
                        TimerKind::Idle => IdleEvent::IdleTimeout,
                        TimerKind::Countdown => IdleEvent::Tick,
                    }
                }
                result = settled(&mut self.refresh) => {
                    self.refresh = None;
                    match result {
                        Ok(_) => IdleEvent::RefreshSucceeded,
                        Err(e) => {
                            warn!(error = %e, "presence confirmation refresh failed");
                            IdleEvent::RefreshFailed
                        }
                    }
                }
                received = auth.recv(), if auth_open => match received {
                    Ok(AuthEvent::Logout) => IdleEvent::ForcedLogout,
                    Ok(AuthEvent::TokenRefreshed(_)) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "idle controller lagged on auth events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        auth_open = false;
                        continue;
                    }
                },
            };
            self.dispatch(event).await;
        }

        if let Some(refresh) = self.refresh.take() {
            refresh.abort();
        }
        debug!("idle controller stopped");
    }

    async fn dispatch(&mut self, event: IdleEvent) {
        let previous = self.state.clone();
        let (next, action) = handle_event(previous.clone(), event, &self.config);
        self.state = next;

        match action {
            IdleAction::ArmIdleTimer => self.arm(TimerKind::Idle),
            IdleAction::ArmCountdown => self.arm(TimerKind::Countdown),
            IdleAction::Refresh => {
                self.timer = None;
                let coordinator = self.coordinator.clone();
                self.refresh = Some(tokio::spawn(async move { coordinator.refresh().await }));
            }
            IdleAction::Logout => {
                self.disarm();
                self.coordinator.force_logout().await;
            }
            IdleAction::Disarm => self.disarm(),
            IdleAction::None => {}
        }

        if self.state != previous {
            match &self.state {
                IdleState::CountdownVisible { seconds_remaining }
                    if matches!(previous, IdleState::Active) =>
                {
                    info!(seconds = seconds_remaining, "idle timeout reached, showing countdown");
                }
                IdleState::LoggedOut => info!(from = ?previous, "idle controller logged out"),
                _ => {}
            }
            self.state_tx.send_replace(self.state.clone());
        }
    }

    fn arm(&mut self, kind: TimerKind) {
        let after = match kind {
            TimerKind::Idle => self.config.idle_timeout,
            TimerKind::Countdown => self.config.tick_interval,
        };
        self.timer = Some((kind, Box::pin(tokio::time::sleep(after))));
    }

    fn disarm(&mut self) {
        self.timer = None;
        if let Some(refresh) = self.refresh.take() {
            refresh.abort();
        }
    }
}

/// Resolves when the armed timer fires; pending forever when none is armed.
async fn expired(timer: &mut Option<(TimerKind, Pin<Box<Sleep>>)>) -> TimerKind {
    match timer {
        Some((kind, sleep)) => {
            sleep.as_mut().await;
            *kind
        }
        None => std::future::pending().await,
    }
}

/// Resolves with the outstanding refresh outcome; pending forever when none.
async fn settled(
    refresh: &mut Option<JoinHandle<Result<Secret<String>, RefreshError>>>,
) -> Result<Secret<String>, RefreshError> {
    match refresh {
        Some(handle) => handle.await.unwrap_or(Err(RefreshError::Cancelled)),
        None => std::future::pending().await,
    }
}
