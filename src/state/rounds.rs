//! Round and event lifecycle: the ordered list of rounds inside one hosted
//! event, and the only legal writer of round statuses.

use std::fmt;
use std::time::SystemTime;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{EventScheduleEntity, RoundEntity, RoundStatusEntity, TrackRefEntity};
use crate::state::card::TrackRef;

/// Lifecycle status of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    /// Created but not yet configured with a track pool.
    Unplanned,
    /// Track pool assigned; ready to start.
    Planned,
    /// Currently being played. At most one per event.
    Active,
    /// Finished, either explicitly or through an approved win.
    Completed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundStatus::Unplanned => "unplanned",
            RoundStatus::Planned => "planned",
            RoundStatus::Active => "active",
            RoundStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// One playthrough using a specific track pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    /// Stable identifier of the round.
    pub id: Uuid,
    /// Display name chosen by the host.
    pub name: String,
    /// Finalized, deduplicated track pool for the round.
    pub track_pool: Vec<TrackRef>,
    /// Current lifecycle status.
    pub status: RoundStatus,
    /// When the round went active.
    pub started_at: Option<SystemTime>,
    /// When the round completed.
    pub completed_at: Option<SystemTime>,
}

impl Round {
    fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            track_pool: Vec::new(),
            status: RoundStatus::Unplanned,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Rejection raised by an illegal round command. The offending command is
/// dropped and the event state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundStateConflict {
    /// The referenced round index does not exist.
    #[error("round {index} does not exist")]
    NoSuchRound {
        /// Offending index.
        index: usize,
    },
    /// The command is not legal from the round's current status.
    #[error("round {index} cannot `{attempted}` while {from}")]
    IllegalTransition {
        /// Round the command addressed.
        index: usize,
        /// Status the round was in.
        from: RoundStatus,
        /// Name of the attempted operation.
        attempted: &'static str,
    },
    /// Starting or planning a round with no tracks.
    #[error("round {index} has an empty track pool")]
    EmptyTrackPool {
        /// Round the command addressed.
        index: usize,
    },
    /// A command required an active round and none exists.
    #[error("no round is active")]
    NoActiveRound,
}

/// The ordered rounds of one hosted event plus the active-round cursor.
/// Sole writer of [`Round::status`].
#[derive(Debug, Clone, Default)]
pub struct EventSchedule {
    rounds: Vec<Round>,
    active_index: Option<usize>,
}

impl EventSchedule {
    /// Fresh schedule with no rounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// All rounds, in event order.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Index of the active round, if one is running.
    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    /// The active round, if one is running.
    pub fn active_round(&self) -> Option<&Round> {
        self.active_index.map(|index| &self.rounds[index])
    }

    /// Whether `index` is the last configured round of the event.
    pub fn is_final_round(&self, index: usize) -> bool {
        !self.rounds.is_empty() && index + 1 == self.rounds.len()
    }

    /// Append a new unplanned round, returning its index.
    pub fn add_round(&mut self, name: String) -> usize {
        self.rounds.push(Round::new(name));
        self.rounds.len() - 1
    }

    /// Assign a finalized track pool to an unplanned round
    /// (`Unplanned -> Planned`).
    pub fn plan_round(
        &mut self,
        index: usize,
        track_pool: Vec<TrackRef>,
    ) -> Result<&Round, RoundStateConflict> {
        let round = self.round_mut(index)?;
        if track_pool.is_empty() {
            return Err(RoundStateConflict::EmptyTrackPool { index });
        }
        if round.status != RoundStatus::Unplanned {
            return Err(RoundStateConflict::IllegalTransition {
                index,
                from: round.status,
                attempted: "plan",
            });
        }
        round.track_pool = track_pool;
        round.status = RoundStatus::Planned;
        Ok(&self.rounds[index])
    }

    /// Activate a planned round (`Planned -> Active`), auto-completing
    /// whichever round was previously active so exactly one round is active
    /// at a time.
    pub fn start_round(
        &mut self,
        index: usize,
        now: SystemTime,
    ) -> Result<&Round, RoundStateConflict> {
        {
            let round = self.round_mut(index)?;
            if round.status != RoundStatus::Planned {
                return Err(RoundStateConflict::IllegalTransition {
                    index,
                    from: round.status,
                    attempted: "start",
                });
            }
            if round.track_pool.is_empty() {
                return Err(RoundStateConflict::EmptyTrackPool { index });
            }
        }

        if let Some(previous) = self.active_index.take() {
            let round = &mut self.rounds[previous];
            round.status = RoundStatus::Completed;
            round.completed_at = Some(now);
        }

        let round = &mut self.rounds[index];
        round.status = RoundStatus::Active;
        round.started_at = Some(now);
        self.active_index = Some(index);
        Ok(&self.rounds[index])
    }

    /// Complete the active round (`Active -> Completed`), clearing the
    /// active cursor.
    pub fn complete_active(&mut self, now: SystemTime) -> Result<usize, RoundStateConflict> {
        let index = self.active_index.ok_or(RoundStateConflict::NoActiveRound)?;
        let round = &mut self.rounds[index];
        round.status = RoundStatus::Completed;
        round.completed_at = Some(now);
        self.active_index = None;
        Ok(index)
    }

    /// Whole-event reset: every round back to `Unplanned`, cursor cleared.
    /// The only path from `Completed` back to `Unplanned`.
    pub fn reset(&mut self) {
        for round in &mut self.rounds {
            round.status = RoundStatus::Unplanned;
            round.track_pool.clear();
            round.started_at = None;
            round.completed_at = None;
        }
        self.active_index = None;
    }

    fn round_mut(&mut self, index: usize) -> Result<&mut Round, RoundStateConflict> {
        self.rounds
            .get_mut(index)
            .ok_or(RoundStateConflict::NoSuchRound { index })
    }
}

impl From<&EventSchedule> for EventScheduleEntity {
    fn from(schedule: &EventSchedule) -> Self {
        Self {
            rounds: schedule.rounds.iter().map(Into::into).collect(),
            active_round_index: schedule.active_index,
        }
    }
}

impl From<EventScheduleEntity> for EventSchedule {
    fn from(entity: EventScheduleEntity) -> Self {
        Self {
            rounds: entity.rounds.into_iter().map(Into::into).collect(),
            active_index: entity.active_round_index,
        }
    }
}

impl From<&Round> for RoundEntity {
    fn from(round: &Round) -> Self {
        Self {
            id: round.id,
            name: round.name.clone(),
            track_pool: round.track_pool.iter().map(Into::into).collect(),
            status: round.status.into(),
            started_at: round.started_at,
            completed_at: round.completed_at,
        }
    }
}

impl From<RoundEntity> for Round {
    fn from(entity: RoundEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            track_pool: entity.track_pool.into_iter().map(Into::into).collect(),
            status: entity.status.into(),
            started_at: entity.started_at,
            completed_at: entity.completed_at,
        }
    }
}

impl From<RoundStatus> for RoundStatusEntity {
    fn from(status: RoundStatus) -> Self {
        match status {
            RoundStatus::Unplanned => RoundStatusEntity::Unplanned,
            RoundStatus::Planned => RoundStatusEntity::Planned,
            RoundStatus::Active => RoundStatusEntity::Active,
            RoundStatus::Completed => RoundStatusEntity::Completed,
        }
    }
}

impl From<RoundStatusEntity> for RoundStatus {
    fn from(entity: RoundStatusEntity) -> Self {
        match entity {
            RoundStatusEntity::Unplanned => RoundStatus::Unplanned,
            RoundStatusEntity::Planned => RoundStatus::Planned,
            RoundStatusEntity::Active => RoundStatus::Active,
            RoundStatusEntity::Completed => RoundStatus::Completed,
        }
    }
}

impl From<&TrackRef> for TrackRefEntity {
    fn from(track: &TrackRef) -> Self {
        Self {
            clip_id: track.clip_id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
        }
    }
}

impl From<TrackRefEntity> for TrackRef {
    fn from(entity: TrackRefEntity) -> Self {
        Self {
            clip_id: entity.clip_id,
            title: entity.title,
            artist: entity.artist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize) -> Vec<TrackRef> {
        (0..size)
            .map(|n| TrackRef {
                clip_id: format!("clip-{n}"),
                title: format!("Title {n}"),
                artist: format!("Artist {n}"),
            })
            .collect()
    }

    const NOW: SystemTime = SystemTime::UNIX_EPOCH;

    #[test]
    fn unplanned_round_cannot_start_directly() {
        let mut schedule = EventSchedule::new();
        let index = schedule.add_round("Warmup".into());

        let err = schedule.start_round(index, NOW).unwrap_err();
        assert_eq!(
            err,
            RoundStateConflict::IllegalTransition {
                index,
                from: RoundStatus::Unplanned,
                attempted: "start",
            }
        );
    }

    #[test]
    fn planned_round_with_tracks_starts() {
        let mut schedule = EventSchedule::new();
        let index = schedule.add_round("Warmup".into());
        schedule.plan_round(index, pool(25)).unwrap();

        let round = schedule.start_round(index, NOW).unwrap();
        assert_eq!(round.status, RoundStatus::Active);
        assert!(round.started_at.is_some());
        assert_eq!(schedule.active_index(), Some(index));
    }

    #[test]
    fn planning_with_empty_pool_is_rejected() {
        let mut schedule = EventSchedule::new();
        let index = schedule.add_round("Warmup".into());
        assert_eq!(
            schedule.plan_round(index, Vec::new()),
            Err(RoundStateConflict::EmptyTrackPool { index })
        );
        assert_eq!(schedule.rounds()[index].status, RoundStatus::Unplanned);
    }

    #[test]
    fn starting_second_round_auto_completes_the_first() {
        let mut schedule = EventSchedule::new();
        let first = schedule.add_round("One".into());
        let second = schedule.add_round("Two".into());
        schedule.plan_round(first, pool(25)).unwrap();
        schedule.plan_round(second, pool(25)).unwrap();

        schedule.start_round(first, NOW).unwrap();
        schedule.start_round(second, NOW).unwrap();

        assert_eq!(schedule.rounds()[first].status, RoundStatus::Completed);
        assert!(schedule.rounds()[first].completed_at.is_some());
        assert_eq!(schedule.rounds()[second].status, RoundStatus::Active);
        assert_eq!(schedule.active_index(), Some(second));
    }

    #[test]
    fn completed_round_only_reopens_through_event_reset() {
        let mut schedule = EventSchedule::new();
        let index = schedule.add_round("One".into());
        schedule.plan_round(index, pool(25)).unwrap();
        schedule.start_round(index, NOW).unwrap();
        schedule.complete_active(NOW).unwrap();

        let err = schedule.plan_round(index, pool(25)).unwrap_err();
        assert_eq!(
            err,
            RoundStateConflict::IllegalTransition {
                index,
                from: RoundStatus::Completed,
                attempted: "plan",
            }
        );

        schedule.reset();
        assert_eq!(schedule.rounds()[index].status, RoundStatus::Unplanned);
        assert!(schedule.rounds()[index].track_pool.is_empty());
        assert_eq!(schedule.active_index(), None);
        schedule.plan_round(index, pool(25)).unwrap();
    }

    #[test]
    fn complete_without_active_round_is_a_conflict() {
        let mut schedule = EventSchedule::new();
        assert_eq!(
            schedule.complete_active(NOW),
            Err(RoundStateConflict::NoActiveRound)
        );
    }

    #[test]
    fn final_round_detection() {
        let mut schedule = EventSchedule::new();
        let first = schedule.add_round("One".into());
        let second = schedule.add_round("Two".into());
        assert!(!schedule.is_final_round(first));
        assert!(schedule.is_final_round(second));
    }

    #[test]
    fn schedule_round_trips_through_entities() {
        let mut schedule = EventSchedule::new();
        let index = schedule.add_round("One".into());
        schedule.plan_round(index, pool(25)).unwrap();
        schedule.start_round(index, NOW).unwrap();

        let entity: EventScheduleEntity = (&schedule).into();
        let restored: EventSchedule = entity.into();
        assert_eq!(restored.active_index(), Some(index));
        assert_eq!(restored.rounds()[index].status, RoundStatus::Active);
        assert_eq!(restored.rounds()[index].track_pool.len(), 25);
    }
}
