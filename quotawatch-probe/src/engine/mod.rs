//! Quota polling engine.
//!
//! The engine is an actor: one task owns the [`PollingState`], the repeating
//! timer, the pending retry deadline and the observers. Public operations
//! send messages to it, so fetches never overlap.
//!
//! A failed fetch schedules a single retry after the policy delay, up to the
//! policy's retry budget. While a retry is pending, timer ticks are skipped.
//! When the budget is spent the timer is disarmed and `on_error` fires once;
//! polling resumes only through [`PollingEngine::retry_from_error`] or a new
//! [`PollingEngine::start_polling`].

pub mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::OptionFuture;
use quotawatch_core::{CredentialBundle, PollStatus, QuotaApiMethod, QuotaSnapshot};
use quotawatch_fetch::RetryPolicy;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, QuotaError};
use crate::service::QuotaFetcher;

pub use state::{FailureAction, PollingState, Trigger};

/// Receives every successful snapshot.
pub type QuotaObserver = Box<dyn Fn(QuotaSnapshot) + Send + Sync>;
/// Receives the terminal error of an exhausted retry ladder.
pub type ErrorObserver = Box<dyn Fn(&QuotaError) + Send + Sync>;
/// Receives `fetching` and `retrying` notifications.
pub type StatusObserver = Box<dyn Fn(PollStatus) + Send + Sync>;

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    /// Retry bookkeeping.
    pub state: PollingState,
    /// The repeating timer is armed.
    pub polling: bool,
    /// A retry is scheduled.
    pub retry_pending: bool,
    /// Method used for fetches.
    pub method: QuotaApiMethod,
    /// Credentials are set.
    pub has_credentials: bool,
}

enum Command {
    OnQuotaUpdate(QuotaObserver),
    OnError(ErrorObserver),
    OnStatus(StatusObserver),
    Start {
        interval: Duration,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Stop,
    RetryFromError {
        interval: Duration,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    QuickRefresh {
        reply: oneshot::Sender<Result<QuotaSnapshot, EngineError>>,
    },
    SetCredentials(CredentialBundle),
    SetApiMethod(QuotaApiMethod),
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to the polling actor.
///
/// Dropping every handle stops the actor.
#[derive(Debug)]
pub struct PollingEngine {
    tx: mpsc::UnboundedSender<Command>,
    transition: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollingEngine {
    /// Spawns the actor on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(
        fetcher: Arc<dyn QuotaFetcher>,
        method: QuotaApiMethod,
        policy: RetryPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let transition = Arc::new(AtomicBool::new(false));

        let actor = EngineTask {
            fetcher,
            bundle: None,
            method,
            policy,
            state: PollingState::default(),
            ticker: None,
            retry_at: None,
            on_update: None,
            on_error: None,
            on_status: None,
            transition: Arc::clone(&transition),
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            tx,
            transition,
            task,
        }
    }

    /// Registers the snapshot observer, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the actor has stopped.
    pub fn on_quota_update(
        &self,
        observer: impl Fn(QuotaSnapshot) + Send + Sync + 'static,
    ) -> Result<(), EngineError> {
        self.send(Command::OnQuotaUpdate(Box::new(observer)))
    }

    /// Registers the error observer, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the actor has stopped.
    pub fn on_error(
        &self,
        observer: impl Fn(&QuotaError) + Send + Sync + 'static,
    ) -> Result<(), EngineError> {
        self.send(Command::OnError(Box::new(observer)))
    }

    /// Registers the status observer, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the actor has stopped.
    pub fn on_status(
        &self,
        observer: impl Fn(PollStatus) + Send + Sync + 'static,
    ) -> Result<(), EngineError> {
        self.send(Command::OnStatus(Box::new(observer)))
    }

    /// Replaces the credentials and resets the error counters.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the actor has stopped.
    pub fn set_credentials(&self, bundle: CredentialBundle) -> Result<(), EngineError> {
        self.send(Command::SetCredentials(bundle))
    }

    /// Switches the API method and resets the error counters.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the actor has stopped.
    pub fn set_api_method(&self, method: QuotaApiMethod) -> Result<(), EngineError> {
        self.send(Command::SetApiMethod(method))
    }

    /// Cancels the repeating timer. A scheduled retry still runs.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the actor has stopped.
    pub fn stop_polling(&self) -> Result<(), EngineError> {
        self.send(Command::Stop)
    }

    /// Restarts the timer at `interval` and fetches immediately.
    ///
    /// The timer is armed before the fetch, so a fetch that spends the retry
    /// budget leaves it disarmed.
    ///
    /// # Errors
    ///
    /// Returns `TransitionInProgress` without doing anything while another
    /// start or manual retry runs, and `Fetch` when the immediate fetch
    /// fails.
    pub async fn start_polling(&self, interval: Duration) -> Result<(), EngineError> {
        self.transition(|reply| Command::Start { interval, reply })
            .await
    }

    /// Resets all counters and fetches once, re-arming the timer only if the
    /// fetch succeeds.
    ///
    /// # Errors
    ///
    /// As [`Self::start_polling`].
    pub async fn retry_from_error(&self, interval: Duration) -> Result<(), EngineError> {
        self.transition(|reply| Command::RetryFromError { interval, reply })
            .await
    }

    /// Fetches once, ignoring a pending retry and leaving counters and the
    /// timer alone.
    ///
    /// # Errors
    ///
    /// Returns `Fetch` on failure; `on_error` is not notified.
    pub async fn quick_refresh(&self) -> Result<QuotaSnapshot, EngineError> {
        self.request(|reply| Command::QuickRefresh { reply })
            .await?
    }

    /// Returns the current status.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the actor has stopped.
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Stops the actor and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Polling engine task ended abnormally");
        }
    }

    fn send(&self, command: Command) -> Result<(), EngineError> {
        self.tx.send(command).map_err(|_| EngineError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Claims the transition lock and runs a start-like command.
    ///
    /// The actor releases the lock once the command's fetch is done.
    async fn transition(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), EngineError>>) -> Command,
    ) -> Result<(), EngineError> {
        if self
            .transition
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Polling transition already in progress");
            return Err(EngineError::TransitionInProgress);
        }

        let (reply, rx) = oneshot::channel();
        if self.tx.send(make(reply)).is_err() {
            self.transition.store(false, Ordering::Release);
            return Err(EngineError::Closed);
        }
        rx.await.map_err(|_| EngineError::Closed)?
    }
}

// ============================================================================
// Actor
// ============================================================================

enum Event {
    Command(Option<Command>),
    Tick,
    RetryDue,
}

struct EngineTask {
    fetcher: Arc<dyn QuotaFetcher>,
    bundle: Option<CredentialBundle>,
    method: QuotaApiMethod,
    policy: RetryPolicy,
    state: PollingState,
    ticker: Option<Interval>,
    retry_at: Option<Instant>,
    on_update: Option<QuotaObserver>,
    on_error: Option<ErrorObserver>,
    on_status: Option<StatusObserver>,
    transition: Arc<AtomicBool>,
}

impl EngineTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        debug!("Polling engine started");

        loop {
            let event = {
                let tick = OptionFuture::from(self.ticker.as_mut().map(|t| t.tick()));
                let retry = OptionFuture::from(self.retry_at.map(tokio::time::sleep_until));

                tokio::select! {
                    command = rx.recv() => Event::Command(command),
                    Some(_) = tick => Event::Tick,
                    Some(()) = retry => Event::RetryDue,
                }
            };

            match event {
                Event::Command(Some(Command::Shutdown) | None) => break,
                Event::Command(Some(command)) => self.handle(command).await,
                Event::Tick => {
                    if self.state.should_run(Trigger::Tick) {
                        let _ = self.poll(Trigger::Tick).await;
                    } else {
                        debug!("Retry pending, skipping tick");
                    }
                }
                Event::RetryDue => {
                    self.retry_at = None;
                    self.state.finish_retry();
                    let _ = self.poll(Trigger::Retry).await;
                }
            }
        }

        debug!("Polling engine stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::OnQuotaUpdate(observer) => self.on_update = Some(observer),
            Command::OnError(observer) => self.on_error = Some(observer),
            Command::OnStatus(observer) => self.on_status = Some(observer),
            Command::Start { interval, reply } => {
                info!(interval_secs = interval.as_secs(), "Starting polling");
                self.arm_timer(interval);
                let result = if self.state.should_run(Trigger::Start) {
                    self.poll(Trigger::Start).await.map_err(EngineError::from)
                } else {
                    debug!("Retry pending, skipping immediate fetch");
                    Ok(())
                };
                self.transition.store(false, Ordering::Release);
                let _ = reply.send(result);
            }
            Command::Stop => self.stop_timer(),
            Command::RetryFromError { interval, reply } => {
                info!("Manual retry");
                self.state.reset_for_manual_retry();
                self.retry_at = None;
                self.stop_timer();
                let result = self.poll(Trigger::Manual).await;
                if result.is_ok() {
                    self.arm_timer(interval);
                }
                self.transition.store(false, Ordering::Release);
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::QuickRefresh { reply } => {
                let result = self.quick_refresh().await;
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::SetCredentials(bundle) => {
                debug!(?bundle, "Credentials replaced");
                self.bundle = Some(bundle);
                self.state.reset_counters();
            }
            Command::SetApiMethod(method) => {
                info!(%method, "API method changed");
                self.method = method;
                self.state.reset_counters();
            }
            Command::Status { reply } => {
                let _ = reply.send(EngineStatus {
                    state: self.state,
                    polling: self.ticker.is_some(),
                    retry_pending: self.retry_at.is_some(),
                    method: self.method,
                    has_credentials: self.bundle.is_some(),
                });
            }
            Command::Shutdown => {}
        }
    }

    /// The fetch routine shared by the timer, the start, scheduled retries
    /// and manual retries.
    async fn poll(&mut self, trigger: Trigger) -> Result<(), QuotaError> {
        if self.state.announces_fetching() {
            self.emit_status(PollStatus::Fetching);
        }

        match self.fetch().await {
            Ok(snapshot) => {
                debug!(?trigger, models = snapshot.models.len(), "Fetch succeeded");
                self.state.record_success();
                self.emit_update(snapshot);
                Ok(())
            }
            Err(e) => {
                self.handle_failure(trigger, &e);
                Err(e)
            }
        }
    }

    fn handle_failure(&mut self, trigger: Trigger, e: &QuotaError) {
        let max_retries = self.policy.max_retries;
        match self.state.record_failure(max_retries) {
            FailureAction::Retry { retry_count } => {
                let delay = self.policy.delay;
                warn!(
                    ?trigger,
                    category = %e.category(),
                    error = %e,
                    retry_count,
                    max_retries,
                    delay_secs = delay.as_secs(),
                    "Fetch failed, scheduling retry"
                );
                self.retry_at = Some(Instant::now() + delay);
                self.emit_status(PollStatus::Retrying {
                    retry_count,
                    max_retries,
                });
            }
            FailureAction::Exhausted => {
                error!(
                    ?trigger,
                    category = %e.category(),
                    error = %e,
                    consecutive_errors = self.state.consecutive_errors,
                    "Retry budget spent, polling stopped"
                );
                self.stop_timer();
                if let Some(observer) = &self.on_error {
                    observer(e);
                }
            }
        }
    }

    async fn quick_refresh(&mut self) -> Result<QuotaSnapshot, QuotaError> {
        match self.fetch().await {
            Ok(snapshot) => {
                self.emit_update(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Quick refresh failed");
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<QuotaSnapshot, QuotaError> {
        let bundle = self.bundle.as_ref().ok_or(QuotaError::MissingCsrfToken)?;
        self.fetcher.fetch(self.method, bundle).await
    }

    fn arm_timer(&mut self, interval: Duration) {
        let period = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    fn stop_timer(&mut self) {
        if self.ticker.take().is_some() {
            debug!("Polling timer stopped");
        }
    }

    fn emit_update(&self, snapshot: QuotaSnapshot) {
        if let Some(observer) = &self.on_update {
            observer(snapshot);
        }
    }

    fn emit_status(&self, status: PollStatus) {
        if let Some(observer) = &self.on_status {
            observer(status);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
