//! Connection-resilience protocol: debounced resume nudges, stale playback
//! report filtering, and reconnect resynchronization bookkeeping.
//!
//! All methods take an explicit `now` so the guard logic stays clock-free
//! and directly testable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// A single timestamp guard: suppressed while `now` is within `window` of
/// the last firing.
#[derive(Debug, Clone)]
pub struct DebounceWindow {
    last_fired_at: Option<Instant>,
    window: Duration,
}

impl DebounceWindow {
    /// Create an un-fired window of the given width.
    pub fn new(window: Duration) -> Self {
        Self {
            last_fired_at: None,
            window,
        }
    }

    /// Whether a firing at `now` would fall inside the suppression window.
    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.last_fired_at
            .is_some_and(|last| now.duration_since(last) < self.window)
    }

    /// Record a firing at `now`.
    pub fn fire(&mut self, now: Instant) {
        self.last_fired_at = Some(now);
    }

    /// Fire unless suppressed; returns whether the firing went through.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if self.is_suppressed(now) {
            return false;
        }
        self.fire(now);
        true
    }

    /// Forget the last firing.
    pub fn clear(&mut self) {
        self.last_fired_at = None;
    }
}

/// Per-participant connection bookkeeping, rebuilt on every reconnect.
#[derive(Debug, Clone)]
pub struct SessionConnectionRecord {
    /// Last time a connection for this participant was established.
    pub last_seen_at: Instant,
    /// Externally-polled reports from this participant are ignored until
    /// this deadline.
    pub ignore_reports_until: Instant,
}

/// Why a playback report was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The reporting participant reconnected inside the guard window.
    ReconnectWindow,
    /// A "not playing" report raced a genuine clip start.
    ClipStartWindow,
}

/// Outcome of filtering one externally-polled playback report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDisposition {
    /// The report is trustworthy and may drive playback decisions.
    Accepted,
    /// Presumed transport-lag artifact; silently dropped but counted.
    Discarded(DiscardReason),
}

/// Per-room sync protocol state. Keyed by stable participant identity so a
/// reconnect (a new stream for a known identity) is distinguishable from a
/// first join.
#[derive(Debug)]
pub struct SessionSyncProtocol {
    resume_nudge: DebounceWindow,
    stale_window: Duration,
    records: HashMap<String, SessionConnectionRecord>,
    last_clip_started_at: Option<Instant>,
    discarded_reports: u64,
}

impl SessionSyncProtocol {
    /// Create protocol state with the room's configured guard windows.
    pub fn new(resume_debounce: Duration, stale_window: Duration) -> Self {
        Self {
            resume_nudge: DebounceWindow::new(resume_debounce),
            stale_window,
            records: HashMap::new(),
            last_clip_started_at: None,
            discarded_reports: 0,
        }
    }

    /// Record a connection for `participant_id`, returning `true` when this
    /// is a reconnect of a known identity (which must trigger a resync).
    pub fn note_connected(&mut self, participant_id: &str, now: Instant) -> bool {
        let record = SessionConnectionRecord {
            last_seen_at: now,
            ignore_reports_until: now + self.stale_window,
        };
        self.records.insert(participant_id.to_string(), record).is_some()
    }

    /// Record a server-confirmed clip start, arming the "not playing"
    /// suppression window.
    pub fn note_clip_started(&mut self, now: Instant) {
        self.last_clip_started_at = Some(now);
    }

    /// Filter one externally-polled playback report.
    ///
    /// Reports are dropped inside the per-participant reconnect window, and
    /// "not playing" reports are additionally dropped for a window after a
    /// genuine clip start, both being presumed transport-lag artifacts.
    pub fn evaluate_report(
        &mut self,
        participant_id: &str,
        claims_playing: bool,
        now: Instant,
    ) -> ReportDisposition {
        if let Some(record) = self.records.get(participant_id)
            && now < record.ignore_reports_until
        {
            return self.discard(participant_id, DiscardReason::ReconnectWindow);
        }

        if !claims_playing
            && let Some(started) = self.last_clip_started_at
            && now.duration_since(started) < self.stale_window
        {
            return self.discard(participant_id, DiscardReason::ClipStartWindow);
        }

        ReportDisposition::Accepted
    }

    /// Attempt a resume-playback nudge; at most one goes through per room
    /// per debounce window, so reconnection storms cannot multiply playback
    /// commands.
    pub fn try_resume_nudge(&mut self, now: Instant) -> bool {
        self.resume_nudge.try_fire(now)
    }

    /// Number of reports discarded by the guard windows so far.
    pub fn discarded_reports(&self) -> u64 {
        self.discarded_reports
    }

    /// Drop all per-connection state and guard history (event reset).
    pub fn clear(&mut self) {
        self.records.clear();
        self.last_clip_started_at = None;
        self.resume_nudge.clear();
    }

    fn discard(&mut self, participant_id: &str, reason: DiscardReason) -> ReportDisposition {
        self.discarded_reports += 1;
        debug!(
            participant_id,
            ?reason,
            total = self.discarded_reports,
            "discarded stale playback report"
        );
        ReportDisposition::Discarded(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: Duration = Duration::from_secs(10);
    const STALE: Duration = Duration::from_secs(15);

    fn protocol() -> SessionSyncProtocol {
        SessionSyncProtocol::new(RESUME, STALE)
    }

    #[test]
    fn debounce_window_suppresses_inside_and_allows_outside() {
        let start = Instant::now();
        let mut window = DebounceWindow::new(Duration::from_secs(10));

        assert!(!window.is_suppressed(start));
        assert!(window.try_fire(start));
        assert!(window.is_suppressed(start + Duration::from_secs(9)));
        assert!(!window.try_fire(start + Duration::from_secs(9)));
        assert!(window.try_fire(start + Duration::from_secs(10)));
    }

    #[test]
    fn first_join_is_not_a_reconnect() {
        let now = Instant::now();
        let mut sync = protocol();
        assert!(!sync.note_connected("alice", now));
        assert!(sync.note_connected("alice", now + Duration::from_secs(3)));
    }

    #[test]
    fn reports_are_ignored_after_reconnect() {
        let start = Instant::now();
        let mut sync = protocol();
        sync.note_connected("alice", start);
        sync.note_connected("alice", start + Duration::from_secs(5));

        // A "not playing" report 3s after reconnecting is a lag artifact.
        let disposition =
            sync.evaluate_report("alice", false, start + Duration::from_secs(8));
        assert_eq!(
            disposition,
            ReportDisposition::Discarded(DiscardReason::ReconnectWindow)
        );

        let later = start + Duration::from_secs(21);
        assert_eq!(sync.evaluate_report("alice", false, later), ReportDisposition::Accepted);
        assert_eq!(sync.discarded_reports(), 1);
    }

    #[test]
    fn not_playing_reports_race_a_fresh_clip_start() {
        let start = Instant::now();
        let mut sync = protocol();
        sync.note_connected("alice", start);
        let after_window = start + STALE;
        sync.note_clip_started(after_window);

        let racing = after_window + Duration::from_secs(2);
        assert_eq!(
            sync.evaluate_report("alice", false, racing),
            ReportDisposition::Discarded(DiscardReason::ClipStartWindow)
        );
        // A positive report is not affected by the clip-start guard.
        assert_eq!(sync.evaluate_report("alice", true, racing), ReportDisposition::Accepted);

        let settled = after_window + STALE;
        assert_eq!(sync.evaluate_report("alice", false, settled), ReportDisposition::Accepted);
    }

    #[test]
    fn resume_nudges_deduplicate_per_room() {
        let start = Instant::now();
        let mut sync = protocol();

        assert!(sync.try_resume_nudge(start));
        assert!(!sync.try_resume_nudge(start + Duration::from_secs(4)));
        assert!(!sync.try_resume_nudge(start + Duration::from_secs(9)));
        assert!(sync.try_resume_nudge(start + Duration::from_secs(10)));
    }

    #[test]
    fn clear_forgets_history() {
        let start = Instant::now();
        let mut sync = protocol();
        sync.note_connected("alice", start);
        sync.note_clip_started(start);
        sync.try_resume_nudge(start);

        sync.clear();
        assert!(!sync.note_connected("alice", start + Duration::from_secs(1)));
        assert_eq!(
            sync.evaluate_report("alice", false, start + Duration::from_secs(20)),
            ReportDisposition::Accepted
        );
        assert!(sync.try_resume_nudge(start + Duration::from_secs(1)));
    }
}
