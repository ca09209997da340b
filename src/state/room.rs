//! Per-room orchestration: one serialized command queue per room, drained by
//! a dedicated task that is the single owner of all mutable room state.
//!
//! Every mark toggle, claim, round transition, playback confirmation, and
//! reconnect resync for a room flows through [`RoomCommand`] and is processed
//! in arrival order; rooms run fully in parallel with each other.

use std::collections::{HashMap, HashSet};
use std::time::{Instant, SystemTime};

use axum::extract::ws::Message;
use indexmap::{IndexMap, IndexSet};
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dao::models::EventScheduleEntity;
use crate::dto::common::PatternDto;
use crate::dto::ws::{ServerMessage, SessionStateSummary};
use crate::error::ServiceError;
use crate::services::sse_events;
use crate::state::SharedState;
use crate::state::card::{CARD_SQUARES, Card, CardError, Position, TrackRef};
use crate::state::claim::{
    ClaimDecision, ClaimOutcome, PendingReview, ResolvedClaim, WinClaimArbiter,
};
use crate::state::pattern::PatternSpec;
use crate::state::room_phase::{RoomEvent, RoomPhase, RoomPhaseMachine, RoundActivity};
use crate::state::rounds::EventSchedule;
use crate::state::sync::{ReportDisposition, SessionSyncProtocol};

/// Reply channel carried by host commands.
pub type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

/// Commands accepted by a room task. Participant commands report failures
/// over the participant's own socket; host commands carry a reply channel.
pub enum RoomCommand {
    /// Bind a (re)connected participant stream to the room.
    Join {
        participant_id: String,
        tx: mpsc::UnboundedSender<Message>,
    },
    /// A participant stream closed.
    Leave { participant_id: String },
    /// Authoritative mark/unmark toggle.
    Mark {
        participant_id: String,
        position: Position,
    },
    /// A participant asserts their card satisfies the active pattern.
    ClaimWin { participant_id: String },
    /// Externally-polled playback state relayed by a device.
    PlaybackReport {
        participant_id: String,
        playing: bool,
    },
    /// Host: full room snapshot.
    Snapshot { reply: oneshot::Sender<RoomSnapshot> },
    /// Host: append a round to the schedule.
    AddRound { name: String, reply: Reply<usize> },
    /// Host: finalize a deduplicated track pool for a round.
    PlanRound {
        index: usize,
        pool: Vec<TrackRef>,
        reply: Reply<usize>,
    },
    /// Host: activate a planned round, dealing fresh cards.
    StartRound { index: usize, reply: Reply<()> },
    /// Host: complete the active round without a win.
    CompleteRound { reply: Reply<usize> },
    /// Host: switch the room-wide win pattern.
    SetPattern {
        pattern: PatternSpec,
        reply: Reply<()>,
    },
    /// Host: resolve the claim awaiting review.
    ReviewClaim {
        approved: bool,
        reason: Option<String>,
        reply: Reply<()>,
    },
    /// Host: reset the whole event back to idle.
    ResetEvent { reply: Reply<()> },
    /// Host: advance playback to the next clip of the round.
    NextClip { reply: Reply<TrackRef> },
    /// Provider confirmed a clip is playing; sole writer of the played log.
    ClipStarted { clip_id: String },
    /// The review deadline elapsed for the given claim.
    ReviewTimeout { claim_id: Uuid },
}

/// Handle used to enqueue commands onto a room's serialized queue.
#[derive(Clone)]
pub struct RoomHandle {
    /// Command queue sender; order of sends is the order of processing.
    pub tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    /// Enqueue a command, mapping a closed queue to a service error.
    pub fn send(&self, command: RoomCommand) -> Result<(), ServiceError> {
        self.tx
            .send(command)
            .map_err(|_| ServiceError::InvalidState("room task stopped".into()))
    }
}

/// Read-only copy of a room's state handed to the REST layer.
pub struct RoomSnapshot {
    pub room_id: String,
    pub phase: RoomPhase,
    pub pattern: PatternSpec,
    pub active_round_index: Option<usize>,
    pub rounds: Vec<crate::state::rounds::Round>,
    pub participants: Vec<String>,
    pub current_clip: Option<TrackRef>,
    pub played_clip_ids: Vec<String>,
    pub pending_review: Option<PendingReview>,
    pub discarded_reports: u64,
}

/// Spawn the task that owns a room, optionally restoring a persisted
/// schedule, and return its command handle.
pub(crate) fn spawn_room(
    room_id: String,
    state: SharedState,
    restored: Option<EventScheduleEntity>,
) -> RoomHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = state.config().clone();
    let room = Room {
        room_id: room_id.clone(),
        state,
        phase: RoomPhaseMachine::new(),
        schedule: restored.map(Into::into).unwrap_or_default(),
        pattern: config.default_pattern.clone(),
        connections: IndexMap::new(),
        cards: IndexMap::new(),
        marked: HashMap::new(),
        played: IndexSet::new(),
        current_clip: None,
        clip_order: Vec::new(),
        clip_cursor: 0,
        arbiter: WinClaimArbiter::new(config.auto_accept_wins),
        sync: SessionSyncProtocol::new(config.resume_debounce, config.stale_report_window),
        self_tx: tx.clone(),
    };

    tokio::spawn(room.run(rx));
    info!(room_id, "room task started");
    RoomHandle { tx }
}

struct Room {
    room_id: String,
    state: SharedState,
    phase: RoomPhaseMachine,
    schedule: EventSchedule,
    pattern: PatternSpec,
    connections: IndexMap<String, mpsc::UnboundedSender<Message>>,
    cards: IndexMap<String, Card>,
    marked: HashMap<String, HashSet<Position>>,
    played: IndexSet<String>,
    current_clip: Option<TrackRef>,
    clip_order: Vec<TrackRef>,
    clip_cursor: usize,
    arbiter: WinClaimArbiter,
    sync: SessionSyncProtocol,
    self_tx: mpsc::UnboundedSender<RoomCommand>,
}

impl Room {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RoomCommand>) {
        while let Some(command) = commands.recv().await {
            self.handle(command).await;
        }
        info!(room_id = %self.room_id, "room task stopped");
    }

    async fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join { participant_id, tx } => self.handle_join(participant_id, tx),
            RoomCommand::Leave { participant_id } => {
                self.connections.shift_remove(&participant_id);
                info!(room_id = %self.room_id, participant_id, "participant disconnected");
            }
            RoomCommand::Mark {
                participant_id,
                position,
            } => self.handle_mark(&participant_id, position),
            RoomCommand::ClaimWin { participant_id } => self.handle_claim(&participant_id).await,
            RoomCommand::PlaybackReport {
                participant_id,
                playing,
            } => self.handle_playback_report(&participant_id, playing),
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::AddRound { name, reply } => {
                let _ = reply.send(self.handle_add_round(name).await);
            }
            RoomCommand::PlanRound { index, pool, reply } => {
                let _ = reply.send(self.handle_plan_round(index, pool).await);
            }
            RoomCommand::StartRound { index, reply } => {
                let _ = reply.send(self.handle_start_round(index).await);
            }
            RoomCommand::CompleteRound { reply } => {
                let _ = reply.send(self.handle_complete_round().await);
            }
            RoomCommand::SetPattern { pattern, reply } => {
                let _ = reply.send(self.handle_set_pattern(pattern));
            }
            RoomCommand::ReviewClaim {
                approved,
                reason,
                reply,
            } => {
                let _ = reply.send(self.handle_review(approved, reason).await);
            }
            RoomCommand::ResetEvent { reply } => {
                let _ = reply.send(self.handle_reset_event().await);
            }
            RoomCommand::NextClip { reply } => {
                let _ = reply.send(self.handle_next_clip());
            }
            RoomCommand::ClipStarted { clip_id } => self.handle_clip_started(clip_id),
            RoomCommand::ReviewTimeout { claim_id } => self.handle_review_timeout(claim_id).await,
        }
    }

    // ---- participant commands -------------------------------------------

    fn handle_join(&mut self, participant_id: String, tx: mpsc::UnboundedSender<Message>) {
        let reconnect = self.sync.note_connected(&participant_id, Instant::now());
        self.connections.insert(participant_id.clone(), tx);
        info!(
            room_id = %self.room_id,
            participant_id,
            reconnect,
            "participant connected"
        );

        // A participant joining mid-round gets a card dealt on the spot.
        if !self.cards.contains_key(&participant_id)
            && matches!(self.phase.phase(), RoomPhase::RoundRunning(_))
        {
            match self.deal_card(&participant_id) {
                Ok(()) => {}
                Err(err) => {
                    warn!(room_id = %self.room_id, participant_id, error = %err, "failed to deal card on join");
                    self.send_to(
                        &participant_id,
                        &ServerMessage::Error {
                            message: err.to_string(),
                        },
                    );
                }
            }
        }

        // Proactive resync: the client cannot know what it missed.
        self.send_resync(&participant_id);
    }

    fn handle_mark(&mut self, participant_id: &str, position: Position) {
        if !matches!(self.phase.phase(), RoomPhase::RoundRunning(_)) {
            self.send_to(
                participant_id,
                &ServerMessage::Error {
                    message: "no round is running".into(),
                },
            );
            return;
        }

        let Some(card) = self.cards.get(participant_id) else {
            self.send_to(
                participant_id,
                &ServerMessage::Error {
                    message: "no card assigned".into(),
                },
            );
            return;
        };
        if card.square_at(position).is_none() {
            self.send_to(
                participant_id,
                &ServerMessage::Error {
                    message: format!("card has no square at {position}"),
                },
            );
            return;
        }

        let marks = self.marked.entry(participant_id.to_string()).or_default();
        let marked = if marks.remove(&position) {
            false
        } else {
            marks.insert(position);
            true
        };

        self.send_to(
            participant_id,
            &ServerMessage::MarkApplied {
                position: position.to_string(),
                marked,
            },
        );
    }

    async fn handle_claim(&mut self, participant_id: &str) {
        let claimable = matches!(
            self.phase.phase(),
            RoomPhase::RoundRunning(RoundActivity::Playing)
                | RoomPhase::RoundRunning(RoundActivity::PausedForReview { .. })
        );
        if !claimable {
            self.send_to(
                participant_id,
                &ServerMessage::Error {
                    message: "no round is running".into(),
                },
            );
            return;
        }

        let Some(card) = self.cards.get(participant_id) else {
            self.send_to(
                participant_id,
                &ServerMessage::Error {
                    message: "no card assigned".into(),
                },
            );
            return;
        };

        let marks = self.marked.get(participant_id).cloned().unwrap_or_default();
        let snapshot = card.with_marks(&marks);
        let decision = self.arbiter.submit(
            participant_id,
            &snapshot,
            &marks,
            &self.played,
            &self.pattern,
            SystemTime::now(),
        );

        match decision {
            ClaimDecision::Invalid(evaluation) => {
                debug!(room_id = %self.room_id, participant_id, "claim did not complete the pattern");
                self.send_to(
                    participant_id,
                    &ServerMessage::ClaimInvalid {
                        progress: (&evaluation).into(),
                    },
                );
            }
            ClaimDecision::Queued { place } => {
                self.send_to(participant_id, &ServerMessage::ClaimQueued { place });
            }
            ClaimDecision::AutoAccepted(resolved) => {
                self.apply_resolution(resolved).await;
            }
            ClaimDecision::ReviewOpened(review) => {
                self.open_review(review);
            }
        }
    }

    fn handle_playback_report(&mut self, participant_id: &str, playing: bool) {
        match self
            .sync
            .evaluate_report(participant_id, playing, Instant::now())
        {
            ReportDisposition::Discarded(_) => {}
            ReportDisposition::Accepted => {
                let mid_clip = matches!(
                    self.phase.phase(),
                    RoomPhase::RoundRunning(RoundActivity::Playing)
                ) && self.current_clip.is_some();
                if !playing && mid_clip {
                    if self.sync.try_resume_nudge(Instant::now()) {
                        info!(room_id = %self.room_id, "nudging provider to resume playback");
                        let provider = self.state.provider();
                        tokio::spawn(async move {
                            if let Err(err) = provider.resume_playback().await {
                                warn!(error = %err, "resume nudge failed");
                            }
                        });
                    } else {
                        debug!(room_id = %self.room_id, "resume nudge suppressed by debounce");
                    }
                }
            }
        }
    }

    // ---- claim review lifecycle -----------------------------------------

    fn open_review(&mut self, review: PendingReview) {
        let claimant = review.claim.claimant_id.clone();
        match self.phase.transition(RoomEvent::PauseForReview {
            claimant: claimant.clone(),
        }) {
            Ok(phase) => {
                self.broadcast(&ServerMessage::GamePaused {
                    claimant: claimant.clone(),
                });
                sse_events::broadcast_phase_changed(
                    &self.state,
                    &self.room_id,
                    &phase,
                    Some(&claimant),
                );
                sse_events::broadcast_claim_review_opened(&self.state, &self.room_id, &review);
                self.arm_review_timeout(review.claim.id);

                // Freeze playback while the claim is adjudicated.
                let provider = self.state.provider();
                tokio::spawn(async move {
                    if let Err(err) = provider.stop_clip().await {
                        warn!(error = %err, "failed to stop playback for review");
                    }
                });
            }
            Err(err) => {
                // Single-review invariant should make this unreachable.
                warn!(room_id = %self.room_id, error = ?err, "failed to pause for review");
            }
        }
    }

    fn arm_review_timeout(&self, claim_id: Uuid) {
        let tx = self.self_tx.clone();
        let deadline = self.state.config().review_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = tx.send(RoomCommand::ReviewTimeout { claim_id });
        });
    }

    async fn handle_review(
        &mut self,
        approved: bool,
        reason: Option<String>,
    ) -> Result<(), ServiceError> {
        let resolved = self.arbiter.resolve(approved, reason, SystemTime::now())?;
        self.apply_resolution(resolved).await;
        Ok(())
    }

    async fn handle_review_timeout(&mut self, claim_id: Uuid) {
        if let Some(resolved) = self.arbiter.resolve_timeout(claim_id, SystemTime::now()) {
            info!(room_id = %self.room_id, %claim_id, "review timed out; auto-rejecting");
            self.apply_resolution(resolved).await;
        }
    }

    /// Apply a claim resolution to the room: broadcast it, then either
    /// complete the round / end the event (accepted) or resume play
    /// (rejected), and finally drain any queued claims.
    async fn apply_resolution(&mut self, resolved: ResolvedClaim) {
        let accepted = resolved.outcome.is_accepted();
        let outcome_label = match &resolved.outcome {
            ClaimOutcome::AutoAccepted => "auto_accepted".to_string(),
            ClaimOutcome::Approved => "approved".to_string(),
            ClaimOutcome::Rejected { reason } => reason.clone(),
            ClaimOutcome::TimedOut => "timeout".to_string(),
        };

        self.broadcast(&ServerMessage::ClaimResolved {
            claimant: resolved.claim.claimant_id.clone(),
            approved: accepted,
            outcome: outcome_label.clone(),
            details: resolved.details.iter().map(Into::into).collect(),
        });
        sse_events::broadcast_claim_resolved(
            &self.state,
            &self.room_id,
            &resolved.claim.claimant_id,
            accepted,
            &outcome_label,
        );

        if accepted {
            self.flush_queued_claims();
            self.finish_round_after_win().await;
        } else {
            // The pause was the review itself; rejection resumes play.
            if self.phase.phase().paused_for_verification() {
                match self.phase.transition(RoomEvent::ResumePlay) {
                    Ok(phase) => {
                        sse_events::broadcast_phase_changed(
                            &self.state,
                            &self.room_id,
                            &phase,
                            None,
                        );
                        if self.current_clip.is_some()
                            && self.sync.try_resume_nudge(Instant::now())
                        {
                            let provider = self.state.provider();
                            tokio::spawn(async move {
                                if let Err(err) = provider.resume_playback().await {
                                    warn!(error = %err, "failed to resume playback after review");
                                }
                            });
                        }
                    }
                    Err(err) => {
                        warn!(room_id = %self.room_id, error = ?err, "failed to resume after rejection");
                    }
                }
            }
            self.drain_claim_queue();
        }
    }

    /// Re-evaluate queued claims against the room state as it stands now.
    /// The first one that still completes re-opens a review; the rest wait.
    fn drain_claim_queue(&mut self) {
        while self.arbiter.active_review().is_none() {
            let Some(queued) = self.arbiter.pop_queued() else {
                break;
            };
            let claimant = queued.claimant_id.clone();
            let marks = self.marked.get(&claimant).cloned().unwrap_or_default();
            let decision = self.arbiter.readmit(
                queued,
                &marks,
                &self.played,
                &self.pattern,
                SystemTime::now(),
            );
            match decision {
                ClaimDecision::Invalid(_) => {
                    self.send_to(
                        &claimant,
                        &ServerMessage::ClaimResolved {
                            claimant: claimant.clone(),
                            approved: false,
                            outcome: "superseded by room state changes".into(),
                            details: Vec::new(),
                        },
                    );
                }
                ClaimDecision::ReviewOpened(review) => {
                    self.open_review(review);
                }
                ClaimDecision::AutoAccepted(_) | ClaimDecision::Queued { .. } => {
                    // readmit never takes these paths
                }
            }
        }
    }

    /// Discard queued claims after a win settled the round.
    fn flush_queued_claims(&mut self) {
        while let Some(queued) = self.arbiter.pop_queued() {
            self.send_to(
                &queued.claimant_id,
                &ServerMessage::ClaimResolved {
                    claimant: queued.claimant_id.clone(),
                    approved: false,
                    outcome: "round already won".into(),
                    details: Vec::new(),
                },
            );
        }
    }

    async fn finish_round_after_win(&mut self) {
        let Some(active_index) = self.schedule.active_index() else {
            warn!(room_id = %self.room_id, "win accepted without an active round");
            return;
        };
        let final_round = self.schedule.is_final_round(active_index);

        let mut updated = self.schedule.clone();
        if let Err(err) = updated.complete_active(SystemTime::now()) {
            warn!(room_id = %self.room_id, error = %err, "failed to complete round after win");
            return;
        }

        let event = if final_round {
            RoomEvent::SessionEnded
        } else {
            RoomEvent::RoundCompleted
        };
        match self.commit_schedule(event, updated).await {
            Ok(phase) => {
                self.current_clip = None;
                if final_round {
                    self.broadcast(&ServerMessage::SessionEnded);
                } else {
                    self.broadcast(&ServerMessage::RoundComplete {
                        round_index: active_index,
                    });
                    sse_events::broadcast_round_complete(&self.state, &self.room_id, active_index);
                }
                sse_events::broadcast_phase_changed(&self.state, &self.room_id, &phase, None);
            }
            Err(err) => {
                warn!(room_id = %self.room_id, error = %err, "failed to finish round after win");
            }
        }
    }

    // ---- host commands ---------------------------------------------------

    async fn handle_add_round(&mut self, name: String) -> Result<usize, ServiceError> {
        let mut updated = self.schedule.clone();
        let index = updated.add_round(name);
        self.store_schedule(updated).await?;
        Ok(index)
    }

    async fn handle_plan_round(
        &mut self,
        index: usize,
        pool: Vec<TrackRef>,
    ) -> Result<usize, ServiceError> {
        let mut updated = self.schedule.clone();
        let pool_size = {
            let round = updated.plan_round(index, pool)?;
            round.track_pool.len()
        };
        self.store_schedule(updated).await?;
        info!(room_id = %self.room_id, index, pool_size, "round planned");
        Ok(pool_size)
    }

    async fn handle_start_round(&mut self, index: usize) -> Result<(), ServiceError> {
        let mut updated = self.schedule.clone();
        let pool = {
            let round = updated.start_round(index, SystemTime::now())?;
            round.track_pool.clone()
        };
        // Cards are dealt at round start, so the generator's minimum applies
        // here rather than surfacing mid-round.
        if pool.len() < CARD_SQUARES {
            return Err(CardError::InsufficientPool { have: pool.len() }.into());
        }

        let phase = self.commit_schedule(RoomEvent::StartRound, updated).await?;

        // Round state starts over: marks, played log, clip order, claims.
        self.marked.clear();
        self.played.clear();
        self.current_clip = None;
        self.arbiter.reset();
        self.cards.clear();
        self.clip_order = pool;
        self.clip_order.shuffle(&mut rand::rng());
        self.clip_cursor = 0;

        let participants: Vec<String> = self.connections.keys().cloned().collect();
        for participant_id in participants {
            if let Err(err) = self.deal_card(&participant_id) {
                warn!(room_id = %self.room_id, participant_id, error = %err, "failed to deal card");
            }
        }
        self.broadcast_session_state();
        sse_events::broadcast_phase_changed(&self.state, &self.room_id, &phase, None);
        info!(room_id = %self.room_id, index, "round started");
        Ok(())
    }

    async fn handle_complete_round(&mut self) -> Result<usize, ServiceError> {
        if self.arbiter.active_review().is_some() {
            return Err(ServiceError::InvalidState(
                "cannot complete a round while a claim is under review".into(),
            ));
        }

        let mut updated = self.schedule.clone();
        let index = updated.complete_active(SystemTime::now())?;
        let phase = self
            .commit_schedule(RoomEvent::RoundCompleted, updated)
            .await?;

        self.current_clip = None;
        self.broadcast(&ServerMessage::RoundComplete { round_index: index });
        sse_events::broadcast_round_complete(&self.state, &self.room_id, index);
        sse_events::broadcast_phase_changed(&self.state, &self.room_id, &phase, None);
        Ok(index)
    }

    fn handle_set_pattern(&mut self, pattern: PatternSpec) -> Result<(), ServiceError> {
        info!(room_id = %self.room_id, pattern = pattern.name(), "pattern changed");
        // Changing the pattern never retroactively un-marks squares.
        self.pattern = pattern;
        self.broadcast_session_state();
        Ok(())
    }

    async fn handle_reset_event(&mut self) -> Result<(), ServiceError> {
        let mut updated = self.schedule.clone();
        updated.reset();
        let phase = self.commit_schedule(RoomEvent::ResetEvent, updated).await?;

        self.cards.clear();
        self.marked.clear();
        self.played.clear();
        self.current_clip = None;
        self.clip_order.clear();
        self.clip_cursor = 0;
        self.arbiter.reset();
        self.sync.clear();

        self.broadcast_session_state();
        sse_events::broadcast_event_reset(&self.state, &self.room_id);
        sse_events::broadcast_phase_changed(&self.state, &self.room_id, &phase, None);
        info!(room_id = %self.room_id, "event reset");
        Ok(())
    }

    fn handle_next_clip(&mut self) -> Result<TrackRef, ServiceError> {
        if !matches!(
            self.phase.phase(),
            RoomPhase::RoundRunning(RoundActivity::Playing)
        ) {
            return Err(ServiceError::InvalidState(
                "clips can only start while playing".into(),
            ));
        }
        let Some(clip) = self.clip_order.get(self.clip_cursor).cloned() else {
            return Err(ServiceError::InvalidState(
                "the round's track pool is exhausted".into(),
            ));
        };
        self.clip_cursor += 1;

        // The provider call is asynchronous; its confirmation re-enters the
        // queue as an ordinary command and is the only writer of the log.
        let provider = self.state.provider();
        let tx = self.self_tx.clone();
        let clip_id = clip.clip_id.clone();
        tokio::spawn(async move {
            match provider.start_clip(clip_id.clone()).await {
                Ok(()) => {
                    let _ = tx.send(RoomCommand::ClipStarted { clip_id });
                }
                Err(err) => {
                    warn!(clip_id, error = %err, "provider failed to start clip");
                }
            }
        });

        Ok(clip)
    }

    fn handle_clip_started(&mut self, clip_id: String) {
        if !matches!(self.phase.phase(), RoomPhase::RoundRunning(_)) {
            debug!(room_id = %self.room_id, clip_id, "dropping clip confirmation outside a round");
            return;
        }
        let Some(clip) = self
            .clip_order
            .iter()
            .find(|track| track.clip_id == clip_id)
            .cloned()
        else {
            warn!(room_id = %self.room_id, clip_id, "clip confirmation for a clip outside the round pool");
            return;
        };

        self.played.insert(clip_id.clone());
        self.current_clip = Some(clip.clone());
        self.sync.note_clip_started(Instant::now());

        self.broadcast(&ServerMessage::ClipStarted {
            clip: (&clip).into(),
        });
        sse_events::broadcast_clip_started(&self.state, &self.room_id, &clip);
        info!(room_id = %self.room_id, clip_id, "clip confirmed playing");
    }

    // ---- persistence -----------------------------------------------------

    /// Persist `updated` and commit it together with a phase transition.
    /// A failed persist aborts the planned transition; nothing changes.
    async fn commit_schedule(
        &mut self,
        event: RoomEvent,
        updated: EventSchedule,
    ) -> Result<RoomPhase, ServiceError> {
        let plan = self.phase.plan(event)?;
        if let Err(err) = self.persist_schedule(&updated).await {
            if let Err(abort_err) = self.phase.abort(plan.id) {
                warn!(room_id = %self.room_id, error = ?abort_err, "failed to abort phase plan");
            }
            return Err(err);
        }
        let phase = self.phase.apply(plan.id)?;
        self.schedule = updated;
        Ok(phase)
    }

    /// Persist `updated` and commit it without a phase change.
    async fn store_schedule(&mut self, updated: EventSchedule) -> Result<(), ServiceError> {
        self.persist_schedule(&updated).await?;
        self.schedule = updated;
        Ok(())
    }

    async fn persist_schedule(&self, schedule: &EventSchedule) -> Result<(), ServiceError> {
        match self.state.event_store().await {
            Some(store) => {
                let entity: EventScheduleEntity = schedule.into();
                store.save_schedule(self.room_id.clone(), entity).await?;
                Ok(())
            }
            None => {
                // Degraded mode: keep the room playable, lose durability.
                warn!(room_id = %self.room_id, "no event store; schedule not persisted");
                Ok(())
            }
        }
    }

    // ---- projections and fan-out ----------------------------------------

    fn deal_card(&mut self, participant_id: &str) -> Result<(), ServiceError> {
        let pool = self
            .schedule
            .active_round()
            .map(|round| round.track_pool.clone())
            .unwrap_or_default();
        let card = Card::generate(&pool)?;
        self.cards.insert(participant_id.to_string(), card);
        Ok(())
    }

    fn send_card(&mut self, participant_id: &str) {
        let Some(card) = self.cards.get(participant_id) else {
            return;
        };
        let marks = self.marked.get(participant_id).cloned().unwrap_or_default();
        let projected = card.with_marks(&marks);
        let message = ServerMessage::CardAssigned {
            card: (&projected).into(),
        };
        self.send_to(participant_id, &message);
    }

    fn session_state_for(&self, participant_id: &str) -> SessionStateSummary {
        let phase = self.phase.phase();
        SessionStateSummary {
            room_id: self.room_id.clone(),
            phase: phase.into(),
            paused_for_verification: phase.paused_for_verification(),
            active_round_index: self.schedule.active_index(),
            pattern: PatternDto::from(&self.pattern),
            current_clip: self.current_clip.as_ref().map(Into::into),
            played_clip_ids: self.played.iter().cloned().collect(),
            marked_positions: self
                .marked
                .get(participant_id)
                .map(|marks| {
                    let mut positions: Vec<Position> = marks.iter().copied().collect();
                    positions.sort();
                    positions.iter().map(Position::to_string).collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Re-send everything a (re)connecting client cannot reconstruct:
    /// its card, the phase, the current clip, and the pause flag.
    fn send_resync(&mut self, participant_id: &str) {
        let state = self.session_state_for(participant_id);
        self.send_to(participant_id, &ServerMessage::SessionState { state });
        self.send_card(participant_id);
    }

    fn broadcast_session_state(&mut self) {
        let participants: Vec<String> = self.connections.keys().cloned().collect();
        for participant_id in participants {
            let state = self.session_state_for(&participant_id);
            self.send_to(&participant_id, &ServerMessage::SessionState { state });
            self.send_card(&participant_id);
        }
    }

    fn send_to(&mut self, participant_id: &str, message: &ServerMessage) {
        let Some(tx) = self.connections.get(participant_id).cloned() else {
            return;
        };
        match serde_json::to_string(message) {
            Ok(payload) => {
                if tx.send(Message::Text(payload.into())).is_err() {
                    self.connections.shift_remove(participant_id);
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to serialize participant message");
            }
        }
    }

    fn broadcast(&mut self, message: &ServerMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize broadcast message");
                return;
            }
        };
        self.connections
            .retain(|_, tx| tx.send(Message::Text(payload.clone().into())).is_ok());
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            phase: self.phase.phase().clone(),
            pattern: self.pattern.clone(),
            active_round_index: self.schedule.active_index(),
            rounds: self.schedule.rounds().to_vec(),
            participants: self.connections.keys().cloned().collect(),
            current_clip: self.current_clip.clone(),
            played_clip_ids: self.played.iter().cloned().collect(),
            pending_review: self.arbiter.active_review().cloned(),
            discarded_reports: self.sync.discarded_reports(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;
    use tokio::time::timeout;

    use super::*;
    use crate::config::AppConfig;
    use crate::dao::event_store::MemoryEventStore;
    use crate::services::track_provider::NullTrackProvider;
    use crate::state::AppState;

    // Longer than the review timeout so the auto-advancing paused clock
    // reaches the armed review deadline before the receive guard fires.
    const RECV_DEADLINE: Duration = Duration::from_secs(30);

    fn pool(size: usize) -> Vec<TrackRef> {
        (0..size)
            .map(|n| TrackRef {
                clip_id: format!("clip-{n}"),
                title: format!("Title {n}"),
                artist: format!("Artist {n}"),
            })
            .collect()
    }

    async fn test_room(room_id: &str) -> (SharedState, RoomHandle) {
        let state = AppState::new(AppConfig::default(), Arc::new(NullTrackProvider));
        state
            .install_event_store(Arc::new(MemoryEventStore::new()))
            .await;
        let handle = state.ensure_room(room_id).await;
        (state, handle)
    }

    fn join(handle: &RoomHandle, participant_id: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        handle
            .send(RoomCommand::Join {
                participant_id: participant_id.into(),
                tx,
            })
            .unwrap();
        rx
    }

    async fn host<T: Send + 'static>(
        handle: &RoomHandle,
        build: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        handle.send(build(tx)).unwrap();
        rx.await.unwrap()
    }

    async fn snapshot(handle: &RoomHandle) -> RoomSnapshot {
        let (tx, rx) = oneshot::channel();
        handle.send(RoomCommand::Snapshot { reply: tx }).unwrap();
        rx.await.unwrap()
    }

    /// Read frames until one of the given message type arrives.
    async fn recv_until(rx: &mut mpsc::UnboundedReceiver<Message>, wanted: &str) -> Value {
        loop {
            let frame = timeout(RECV_DEADLINE, rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for `{wanted}`"))
                .unwrap_or_else(|| panic!("socket closed waiting for `{wanted}`"));
            let Message::Text(text) = frame else { continue };
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] == wanted {
                return value;
            }
        }
    }

    /// Set up a started round with one connected participant, returning the
    /// clip IDs of that participant's first card row.
    async fn start_two_round_event(
        handle: &RoomHandle,
        rx: &mut mpsc::UnboundedReceiver<Message>,
    ) -> Vec<String> {
        host(handle, |reply| RoomCommand::AddRound {
            name: "One".into(),
            reply,
        })
        .await
        .unwrap();
        host(handle, |reply| RoomCommand::AddRound {
            name: "Two".into(),
            reply,
        })
        .await
        .unwrap();
        host(handle, |reply| RoomCommand::PlanRound {
            index: 0,
            pool: pool(30),
            reply,
        })
        .await
        .unwrap();
        host(handle, |reply| RoomCommand::StartRound { index: 0, reply })
            .await
            .unwrap();

        let card = recv_until(rx, "card_assigned").await;
        let squares = card["card"]["squares"].as_array().unwrap();
        assert_eq!(squares.len(), 25);

        (0..5)
            .map(|col| {
                let position = format!("0-{col}");
                squares
                    .iter()
                    .find(|square| square["position"] == position.as_str())
                    .unwrap()["clip_id"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    async fn play_and_mark_row(
        handle: &RoomHandle,
        rx: &mut mpsc::UnboundedReceiver<Message>,
        row_clips: &[String],
    ) {
        for clip_id in row_clips {
            handle
                .send(RoomCommand::ClipStarted {
                    clip_id: clip_id.clone(),
                })
                .unwrap();
            recv_until(rx, "clip_started").await;
        }
        for col in 0..5u8 {
            handle
                .send(RoomCommand::Mark {
                    participant_id: "alice".into(),
                    position: Position { row: 0, col },
                })
                .unwrap();
            recv_until(rx, "mark_applied").await;
        }
    }

    #[tokio::test]
    async fn join_receives_authoritative_state() {
        let (_state, handle) = test_room("join-room").await;
        let mut rx = join(&handle, "alice");

        let state = recv_until(&mut rx, "session_state").await;
        assert_eq!(state["state"]["room_id"], "join-room");
        assert_eq!(state["state"]["phase"], "idle");
        assert_eq!(state["state"]["paused_for_verification"], false);
    }

    #[tokio::test]
    async fn start_round_deals_cards_and_enforces_pool_minimum() {
        let (_state, handle) = test_room("deal-room").await;
        let mut rx = join(&handle, "alice");

        host(&handle, |reply| RoomCommand::AddRound {
            name: "One".into(),
            reply,
        })
        .await
        .unwrap();

        // Unplanned rounds cannot start.
        let err = host(&handle, |reply| RoomCommand::StartRound { index: 0, reply })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoundConflict(_)));

        // A planned-but-small pool is rejected before anything changes.
        host(&handle, |reply| RoomCommand::PlanRound {
            index: 0,
            pool: pool(10),
            reply,
        })
        .await
        .unwrap();
        let err = host(&handle, |reply| RoomCommand::StartRound { index: 0, reply })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientPool(_)));
        let snap = snapshot(&handle).await;
        assert_eq!(snap.active_round_index, None);
        assert_eq!(snap.phase, RoomPhase::Idle);

        // Re-planning a planned round is a conflict; reset first.
        let err = host(&handle, |reply| RoomCommand::PlanRound {
            index: 0,
            pool: pool(30),
            reply,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::RoundConflict(_)));

        host(&handle, |reply| RoomCommand::ResetEvent { reply })
            .await
            .unwrap();
        host(&handle, |reply| RoomCommand::PlanRound {
            index: 0,
            pool: pool(30),
            reply,
        })
        .await
        .unwrap();
        host(&handle, |reply| RoomCommand::StartRound { index: 0, reply })
            .await
            .unwrap();

        let card = recv_until(&mut rx, "card_assigned").await;
        assert_eq!(card["card"]["squares"].as_array().unwrap().len(), 25);
        let snap = snapshot(&handle).await;
        assert_eq!(snap.active_round_index, Some(0));
    }

    #[tokio::test]
    async fn approved_claim_completes_the_round() {
        let (_state, handle) = test_room("approve-room").await;
        let mut rx = join(&handle, "alice");

        let row_clips = start_two_round_event(&handle, &mut rx).await;
        play_and_mark_row(&handle, &mut rx, &row_clips).await;

        handle
            .send(RoomCommand::ClaimWin {
                participant_id: "alice".into(),
            })
            .unwrap();
        let paused = recv_until(&mut rx, "game_paused").await;
        assert_eq!(paused["claimant"], "alice");
        let snap = snapshot(&handle).await;
        assert!(snap.phase.paused_for_verification());
        let review = snap.pending_review.expect("a review should be open");
        assert_eq!(review.lines.len(), 5);

        host(&handle, |reply| RoomCommand::ReviewClaim {
            approved: true,
            reason: None,
            reply,
        })
        .await
        .unwrap();

        let resolved = recv_until(&mut rx, "claim_resolved").await;
        assert_eq!(resolved["approved"], true);
        assert_eq!(resolved["details"].as_array().unwrap().len(), 5);
        let complete = recv_until(&mut rx, "round_complete").await;
        assert_eq!(complete["round_index"], 0);

        let snap = snapshot(&handle).await;
        assert!(!snap.phase.paused_for_verification());
        assert_eq!(snap.active_round_index, None);

        // Resolving again must be rejected, not double-applied.
        let err = host(&handle, |reply| RoomCommand::ReviewClaim {
            approved: true,
            reason: None,
            reply,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::ClaimConflict(_)));
    }

    #[tokio::test]
    async fn claim_without_played_clips_is_invalid_and_room_unaffected() {
        let (_state, handle) = test_room("invalid-room").await;
        let mut rx = join(&handle, "alice");

        start_two_round_event(&handle, &mut rx).await;

        // Mark a full row without any clip having played.
        for col in 0..5u8 {
            handle
                .send(RoomCommand::Mark {
                    participant_id: "alice".into(),
                    position: Position { row: 0, col },
                })
                .unwrap();
            recv_until(&mut rx, "mark_applied").await;
        }
        handle
            .send(RoomCommand::ClaimWin {
                participant_id: "alice".into(),
            })
            .unwrap();

        let invalid = recv_until(&mut rx, "claim_invalid").await;
        assert_eq!(invalid["progress"]["complete"], false);
        assert_eq!(invalid["progress"]["illegitimate_marked"], 5);
        assert_eq!(invalid["progress"]["legitimate_marked"], 0);

        let snap = snapshot(&handle).await;
        assert!(!snap.phase.paused_for_verification());
        assert!(snap.pending_review.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_review_times_out_and_unpauses() {
        let (_state, handle) = test_room("timeout-room").await;
        let mut rx = join(&handle, "alice");

        let row_clips = start_two_round_event(&handle, &mut rx).await;
        play_and_mark_row(&handle, &mut rx, &row_clips).await;

        handle
            .send(RoomCommand::ClaimWin {
                participant_id: "alice".into(),
            })
            .unwrap();
        recv_until(&mut rx, "game_paused").await;

        // No host decision arrives; the armed deadline auto-rejects.
        let resolved = recv_until(&mut rx, "claim_resolved").await;
        assert_eq!(resolved["approved"], false);
        assert_eq!(resolved["outcome"], "timeout");

        let snap = snapshot(&handle).await;
        assert!(!snap.phase.paused_for_verification());
        assert!(snap.pending_review.is_none());
        // The round keeps going; the claim is archived, not applied.
        assert_eq!(snap.active_round_index, Some(0));
    }

    #[tokio::test]
    async fn reconnect_resyncs_current_clip_and_suppresses_stale_reports() {
        let (_state, handle) = test_room("resync-room").await;
        let mut rx = join(&handle, "alice");

        start_two_round_event(&handle, &mut rx).await;
        let snap = snapshot(&handle).await;
        let first_clip = snap.rounds[0].track_pool[0].clip_id.clone();

        handle
            .send(RoomCommand::ClipStarted {
                clip_id: first_clip.clone(),
            })
            .unwrap();
        recv_until(&mut rx, "clip_started").await;

        // Drop the connection mid-clip and reconnect a few seconds later.
        handle
            .send(RoomCommand::Leave {
                participant_id: "alice".into(),
            })
            .unwrap();
        drop(rx);

        let mut rx = join(&handle, "alice");
        let state = recv_until(&mut rx, "session_state").await;
        assert_eq!(state["state"]["current_clip"]["clip_id"], first_clip.as_str());
        assert_eq!(state["state"]["played_clip_ids"][0], first_clip.as_str());
        // The same card is re-delivered, not a fresh one.
        recv_until(&mut rx, "card_assigned").await;

        // An externally-polled "not playing" report racing the reconnect is
        // a transport-lag artifact and must not be applied.
        handle
            .send(RoomCommand::PlaybackReport {
                participant_id: "alice".into(),
                playing: false,
            })
            .unwrap();

        let snap = snapshot(&handle).await;
        assert_eq!(snap.discarded_reports, 1);
        assert_eq!(
            snap.current_clip.as_ref().map(|clip| clip.clip_id.clone()),
            Some(first_clip)
        );
    }

    #[tokio::test]
    async fn final_round_win_ends_the_session() {
        let (_state, handle) = test_room("final-room").await;
        let mut rx = join(&handle, "alice");

        // Single-round event: its win ends the session.
        host(&handle, |reply| RoomCommand::AddRound {
            name: "Only".into(),
            reply,
        })
        .await
        .unwrap();
        host(&handle, |reply| RoomCommand::PlanRound {
            index: 0,
            pool: pool(30),
            reply,
        })
        .await
        .unwrap();
        host(&handle, |reply| RoomCommand::StartRound { index: 0, reply })
            .await
            .unwrap();

        let card = recv_until(&mut rx, "card_assigned").await;
        let squares = card["card"]["squares"].as_array().unwrap();
        let row_clips: Vec<String> = (0..5)
            .map(|col| {
                let position = format!("0-{col}");
                squares
                    .iter()
                    .find(|square| square["position"] == position.as_str())
                    .unwrap()["clip_id"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        play_and_mark_row(&handle, &mut rx, &row_clips).await;

        handle
            .send(RoomCommand::ClaimWin {
                participant_id: "alice".into(),
            })
            .unwrap();
        recv_until(&mut rx, "game_paused").await;
        host(&handle, |reply| RoomCommand::ReviewClaim {
            approved: true,
            reason: None,
            reply,
        })
        .await
        .unwrap();

        recv_until(&mut rx, "claim_resolved").await;
        recv_until(&mut rx, "session_ended").await;
        let snap = snapshot(&handle).await;
        assert_eq!(snap.phase, RoomPhase::Ended);

        // Only a whole-event reset reopens play.
        host(&handle, |reply| RoomCommand::ResetEvent { reply })
            .await
            .unwrap();
        let snap = snapshot(&handle).await;
        assert_eq!(snap.phase, RoomPhase::Idle);
        assert!(snap.played_clip_ids.is_empty());
    }
}
