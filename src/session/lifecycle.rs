use super::*;

impl ChainTagSession {
    pub fn join(&mut self, id: ParticipantId) -> Result<usize, SessionError> {
        if self.status != SessionStatus::Waiting {
            return Err(SessionError::NotWaiting(self.status));
        }
        if self.registry.contains(&id) {
            return Err(SessionError::AlreadyJoined(id));
        }
        if self.registry.len() >= self.config.max_participants {
            return Err(SessionError::SessionFull {
                max: self.config.max_participants,
            });
        }
        self.registry.insert(id.clone());
        let count = self.registry.len();
        info!(participant = %id, count, "participant joined");
        self.events.push(SessionEvent::ParticipantJoined {
            participant_id: id,
            count,
        });
        Ok(count)
    }

    pub fn leave(&mut self, id: &ParticipantId, now_ms: u64) -> Result<WinOutcome, SessionError> {
        if self.status == SessionStatus::Countdown {
            return Err(SessionError::CountdownInProgress);
        }
        if !self.registry.contains(id) {
            return Err(SessionError::NotInSession(id.clone()));
        }
        Ok(self.on_participant_leave(id, now_ms))
    }

    /// Returns the epoch the countdown timer must hand back to
    /// [`ChainTagSession::complete_countdown`].
    pub fn begin_countdown(&mut self) -> Result<u64, SessionError> {
        if self.status != SessionStatus::Waiting {
            return Err(SessionError::AlreadyRunning);
        }
        self.ensure_enough_participants()?;
        self.status = SessionStatus::Countdown;
        self.countdown_epoch += 1;
        info!(seconds = self.config.countdown_secs, "countdown started");
        self.events.push(SessionEvent::CountdownStarted {
            seconds: self.config.countdown_secs,
        });
        Ok(self.countdown_epoch)
    }

    pub fn cancel_countdown(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Countdown {
            return Err(SessionError::NoCountdown);
        }
        self.status = SessionStatus::Waiting;
        self.countdown_epoch += 1;
        info!("countdown cancelled");
        self.events.push(SessionEvent::CountdownCancelled);
        Ok(())
    }

    /// Starts the session if `epoch` still names the running countdown.
    pub fn complete_countdown(
        &mut self,
        epoch: u64,
        now_ms: u64,
    ) -> Option<Result<Vec<ParticipantId>, SessionError>> {
        if self.status != SessionStatus::Countdown || epoch != self.countdown_epoch {
            debug!(
                epoch,
                current = self.countdown_epoch,
                "stale countdown ignored"
            );
            return None;
        }
        Some(self.on_session_start(now_ms))
    }

    pub fn on_session_start(&mut self, now_ms: u64) -> Result<Vec<ParticipantId>, SessionError> {
        if self.status == SessionStatus::InGame {
            return Err(SessionError::AlreadyRunning);
        }
        if let Err(error) = self.ensure_enough_participants() {
            if self.status == SessionStatus::Countdown {
                self.status = SessionStatus::Waiting;
                self.events.push(SessionEvent::CountdownCancelled);
            }
            return Err(error);
        }

        self.tracker.clear_all();
        self.pending_respawns.clear();
        self.last_summary = None;
        let order = self.ring.setup_ring(&mut self.registry);
        self.status = SessionStatus::InGame;
        self.started_at_ms = now_ms;
        info!(participants = order.len(), now_ms, "session started");
        self.events.push(SessionEvent::SessionStarted {
            order: order.clone(),
        });
        Ok(order)
    }

    pub fn stop(&mut self, now_ms: u64) -> Result<SessionSummary, SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        self.end_session_with(None, SessionEndReason::Stopped, now_ms);
        self.last_summary.clone().ok_or(SessionError::NotRunning)
    }

    /// Ends the session at most once; afterwards the status is back to
    /// waiting and later polls report no decision.
    pub fn poll_win_condition(&mut self, now_ms: u64) -> WinOutcome {
        if !self.is_running() {
            return WinOutcome::NoDecision;
        }
        let outcome = win_condition::evaluate(&self.registry);
        debug!(?outcome, now_ms, "win condition polled");
        if let WinOutcome::SessionEnded { winner } = &outcome {
            self.end_session(winner.clone(), now_ms);
        }
        outcome
    }

    pub(super) fn end_session(&mut self, winner: Option<ParticipantId>, now_ms: u64) {
        let reason = if winner.is_some() {
            SessionEndReason::Victory
        } else {
            SessionEndReason::NoContestants
        };
        self.end_session_with(winner, reason, now_ms);
    }

    fn end_session_with(
        &mut self,
        winner: Option<ParticipantId>,
        reason: SessionEndReason,
        now_ms: u64,
    ) {
        if !self.is_running() {
            return;
        }
        let summary = SessionSummary {
            winner: winner.clone(),
            reason,
            started_at_ms: self.started_at_ms,
            ended_at_ms: now_ms,
            ended_at_iso: format_iso(now_ms),
            participants: self.registry.views(),
        };
        info!(winner = ?winner, ?reason, "session ended");
        self.events
            .push(SessionEvent::SessionEnded { winner, reason });

        self.registry.clear();
        self.tracker.clear_all();
        self.pending_respawns.clear();
        self.status = SessionStatus::Waiting;
        self.last_summary = Some(summary);
    }

    fn ensure_enough_participants(&self) -> Result<(), SessionError> {
        let current = self.registry.len();
        let required = self.config.min_participants;
        if current < required {
            return Err(SessionError::NotEnoughPlayers { required, current });
        }
        Ok(())
    }
}
