use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::death_resolver::DeathReport;
use crate::respawn::RespawnWorld;
use crate::session::{ChainTagSession, SessionError};
use crate::types::{
    DeathCause, DeathOutcome, HitVerdict, ParticipantId, SessionEvent, SessionSnapshot,
    SessionSummary, WinOutcome,
};

const COMMAND_QUEUE: usize = 256;

pub trait Clock: Send + 'static {
    fn now_ms(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
    }
}

pub trait NotifySink: Send + 'static {
    fn notify(&mut self, event: &SessionEvent);

    fn session_ended(&mut self, _summary: &SessionSummary) {}
}

#[derive(Clone, Debug)]
pub enum SessionNotice {
    Event(SessionEvent),
    Ended(SessionSummary),
}

impl NotifySink for mpsc::UnboundedSender<SessionNotice> {
    fn notify(&mut self, event: &SessionEvent) {
        let _ = self.send(SessionNotice::Event(event.clone()));
    }

    fn session_ended(&mut self, summary: &SessionSummary) {
        let _ = self.send(SessionNotice::Ended(summary.clone()));
    }
}

/// Writes every notification to the log as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl NotifySink for TracingSink {
    fn notify(&mut self, event: &SessionEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!(target: "chain_tag::notify", event = %json, "session event"),
            Err(error) => warn!(%error, "failed to serialise session event"),
        }
    }

    fn session_ended(&mut self, summary: &SessionSummary) {
        match serde_json::to_string(summary) {
            Ok(json) => info!(target: "chain_tag::notify", summary = %json, "session summary"),
            Err(error) => warn!(%error, "failed to serialise session summary"),
        }
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    Join {
        id: ParticipantId,
        reply: oneshot::Sender<Result<usize, SessionError>>,
    },
    Leave {
        id: ParticipantId,
        reply: oneshot::Sender<Result<WinOutcome, SessionError>>,
    },
    BeginCountdown {
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    CancelCountdown {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StartNow {
        reply: oneshot::Sender<Result<Vec<ParticipantId>, SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<SessionSummary, SessionError>>,
    },
    CombatHit {
        attacker: ParticipantId,
        victim: ParticipantId,
        reply: oneshot::Sender<HitVerdict>,
    },
    Death {
        victim: ParticipantId,
        killer: Option<ParticipantId>,
        cause: DeathCause,
        reply: oneshot::Sender<DeathOutcome>,
    },
    PollWin {
        reply: oneshot::Sender<WinOutcome>,
    },
    Reorganize {
        reply: oneshot::Sender<Result<Vec<ParticipantId>, SessionError>>,
    },
    TeamLeader {
        id: ParticipantId,
        reply: oneshot::Sender<Option<ParticipantId>>,
    },
    AreTeammates {
        a: ParticipantId,
        b: ParticipantId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    CountdownElapsed {
        epoch: u64,
    },
    RespawnDue {
        id: ParticipantId,
        due_at_ms: u64,
    },
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| SessionError::CoordinatorClosed)?;
        rx.await.map_err(|_| SessionError::CoordinatorClosed)
    }

    pub async fn join(&self, id: impl Into<ParticipantId>) -> Result<usize, SessionError> {
        let id = id.into();
        self.request(|reply| SessionCommand::Join { id, reply })
            .await?
    }

    pub async fn leave(&self, id: impl Into<ParticipantId>) -> Result<WinOutcome, SessionError> {
        let id = id.into();
        self.request(|reply| SessionCommand::Leave { id, reply })
            .await?
    }

    pub async fn begin_countdown(&self) -> Result<u64, SessionError> {
        self.request(|reply| SessionCommand::BeginCountdown { reply })
            .await?
    }

    pub async fn cancel_countdown(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::CancelCountdown { reply })
            .await?
    }

    pub async fn start_now(&self) -> Result<Vec<ParticipantId>, SessionError> {
        self.request(|reply| SessionCommand::StartNow { reply })
            .await?
    }

    pub async fn stop(&self) -> Result<SessionSummary, SessionError> {
        self.request(|reply| SessionCommand::Stop { reply }).await?
    }

    pub async fn combat_hit(
        &self,
        attacker: impl Into<ParticipantId>,
        victim: impl Into<ParticipantId>,
    ) -> Result<HitVerdict, SessionError> {
        let attacker = attacker.into();
        let victim = victim.into();
        self.request(|reply| SessionCommand::CombatHit {
            attacker,
            victim,
            reply,
        })
        .await
    }

    pub async fn death(
        &self,
        victim: impl Into<ParticipantId>,
        killer: Option<ParticipantId>,
        cause: DeathCause,
    ) -> Result<DeathOutcome, SessionError> {
        let victim = victim.into();
        self.request(|reply| SessionCommand::Death {
            victim,
            killer,
            cause,
            reply,
        })
        .await
    }

    pub async fn poll_win_condition(&self) -> Result<WinOutcome, SessionError> {
        self.request(|reply| SessionCommand::PollWin { reply })
            .await
    }

    pub async fn reorganize_ring(&self) -> Result<Vec<ParticipantId>, SessionError> {
        self.request(|reply| SessionCommand::Reorganize { reply })
            .await?
    }

    pub async fn team_leader_of(
        &self,
        id: impl Into<ParticipantId>,
    ) -> Result<Option<ParticipantId>, SessionError> {
        let id = id.into();
        self.request(|reply| SessionCommand::TeamLeader { id, reply })
            .await
    }

    pub async fn are_teammates(
        &self,
        a: impl Into<ParticipantId>,
        b: impl Into<ParticipantId>,
    ) -> Result<bool, SessionError> {
        let a = a.into();
        let b = b.into();
        self.request(|reply| SessionCommand::AreTeammates { a, b, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::CoordinatorClosed)
    }
}

/// Single task owning the session. Every trigger, including its own timers,
/// arrives as a [`SessionCommand`] on one channel.
pub struct SessionCoordinator {
    session: ChainTagSession,
    sink: Box<dyn NotifySink>,
    world: Box<dyn RespawnWorld + Send>,
    clock: Box<dyn Clock>,
    timers: mpsc::WeakSender<SessionCommand>,
    poll: Interval,
}

impl SessionCoordinator {
    pub fn spawn(
        config: SessionConfig,
        sink: Box<dyn NotifySink>,
        world: Box<dyn RespawnWorld + Send>,
        clock: Box<dyn Clock>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let session = ChainTagSession::new(config);
        let poll = Self::poll_interval(session.config());
        let coordinator = Self {
            session,
            sink,
            world,
            clock,
            timers: tx.downgrade(),
            poll,
        };
        let task = tokio::spawn(coordinator.run(rx));
        (SessionHandle { tx }, task)
    }

    fn poll_interval(config: &SessionConfig) -> Interval {
        let period = Duration::from_millis(config.win_poll_interval_ms.max(1));
        let start = Instant::now() + Duration::from_millis(config.win_poll_initial_delay_ms);
        let mut poll = interval_at(start, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        info!("session coordinator started");
        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        None | Some(SessionCommand::Shutdown) => break,
                        Some(command) => self.handle(command),
                    }
                }
                _ = self.poll.tick() => {
                    let now_ms = self.clock.now_ms();
                    let outcome = self.session.poll_win_condition(now_ms);
                    if outcome.is_ended() {
                        debug!(?outcome, "periodic poll ended the session");
                    }
                }
            }
            self.flush();
        }
        info!("session coordinator stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        let now_ms = self.clock.now_ms();
        match command {
            SessionCommand::Join { id, reply } => {
                let _ = reply.send(self.session.join(id));
            }
            SessionCommand::Leave { id, reply } => {
                let _ = reply.send(self.session.leave(&id, now_ms));
            }
            SessionCommand::BeginCountdown { reply } => {
                let result = self.session.begin_countdown();
                if let Ok(epoch) = result {
                    let delay = Duration::from_secs(self.session.config().countdown_secs);
                    self.spawn_timer(delay, SessionCommand::CountdownElapsed { epoch });
                }
                let _ = reply.send(result);
            }
            SessionCommand::CancelCountdown { reply } => {
                let _ = reply.send(self.session.cancel_countdown());
            }
            SessionCommand::StartNow { reply } => {
                let result = self.session.on_session_start(now_ms);
                if result.is_ok() {
                    self.restart_poll();
                }
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                let _ = reply.send(self.session.stop(now_ms));
            }
            SessionCommand::CombatHit {
                attacker,
                victim,
                reply,
            } => {
                let _ = reply.send(self.session.on_combat_hit(&attacker, &victim, now_ms));
            }
            SessionCommand::Death {
                victim,
                killer,
                cause,
                reply,
            } => {
                let report = DeathReport::new(victim, killer, cause, now_ms);
                let outcome = self.session.on_death(&report);
                if let Some(pending) = self.session.pending_respawn(&report.victim) {
                    let due_at_ms = pending.due_at_ms;
                    self.spawn_timer(
                        Duration::from_millis(outcome.respawn_delay_ms),
                        SessionCommand::RespawnDue {
                            id: report.victim.clone(),
                            due_at_ms,
                        },
                    );
                }
                let _ = reply.send(outcome);
            }
            SessionCommand::PollWin { reply } => {
                let _ = reply.send(self.session.poll_win_condition(now_ms));
            }
            SessionCommand::Reorganize { reply } => {
                let _ = reply.send(self.session.reorganize_ring());
            }
            SessionCommand::TeamLeader { id, reply } => {
                let _ = reply.send(self.session.team_leader_of(&id));
            }
            SessionCommand::AreTeammates { a, b, reply } => {
                let _ = reply.send(self.session.are_teammates(&a, &b));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot(now_ms));
            }
            SessionCommand::CountdownElapsed { epoch } => {
                match self.session.complete_countdown(epoch, now_ms) {
                    Some(Ok(_)) => self.restart_poll(),
                    Some(Err(error)) => {
                        warn!(%error, "countdown finished but session did not start")
                    }
                    None => {}
                }
            }
            SessionCommand::RespawnDue { id, due_at_ms } => {
                // wall clock may lag the timer by a millisecond
                let now_ms = now_ms.max(due_at_ms);
                if self
                    .session
                    .respawn_into(&id, now_ms, self.world.as_mut())
                    .is_none()
                {
                    debug!(participant = %id, "respawn timer had nothing to do");
                }
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn restart_poll(&mut self) {
        let config = self.session.config();
        let start = Instant::now() + Duration::from_millis(config.win_poll_initial_delay_ms);
        self.poll.reset_at(start);
    }

    fn spawn_timer(&self, delay: Duration, command: SessionCommand) {
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = timers.upgrade() {
                let _ = tx.send(command).await;
            }
        });
    }

    fn flush(&mut self) {
        for event in self.session.drain_events() {
            self.sink.notify(&event);
        }
        if let Some(summary) = self.session.take_summary() {
            self.sink.session_ended(&summary);
        }
    }
}
