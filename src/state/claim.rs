//! Win-claim arbitration: the state machine that decides whether a claimed
//! win pauses the room for host review, and owns the review lifecycle.

use std::collections::{HashSet, VecDeque};
use std::time::SystemTime;

use indexmap::IndexSet;
use thiserror::Error;
use uuid::Uuid;

use crate::state::card::{Card, Position};
use crate::state::pattern::{self, PatternEvaluation, PatternSpec};

/// A participant's assertion that their card satisfies the active pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct WinClaim {
    /// Unique identifier of the claim.
    pub id: Uuid,
    /// Stable identity of the claiming participant.
    pub claimant_id: String,
    /// Wall-clock time the claim was received.
    pub claimed_at: SystemTime,
    /// Snapshot of the claimant's card at claim time.
    pub card_snapshot: Card,
    /// Pattern the claim was made against.
    pub required_pattern: PatternSpec,
}

/// Verdict for one position of the completed pattern instance, shown to the
/// reviewing host so the decision is auditable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareVerdict {
    /// Marked, and the clip was confirmed played.
    Legitimate,
    /// Marked, but the clip never played.
    Illegitimate,
    /// Not marked (and therefore not counted either way).
    Unmarked,
}

/// One row of the host-review detail view.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLine {
    /// Grid position inside the completed pattern instance.
    pub position: Position,
    /// Clip the square refers to.
    pub clip_id: String,
    /// Verdict for this square.
    pub verdict: SquareVerdict,
}

/// A claim waiting for the host's decision. At most one exists per room.
#[derive(Debug, Clone)]
pub struct PendingReview {
    /// The claim under review.
    pub claim: WinClaim,
    /// When the review was opened; the timeout counts from here.
    pub opened_at: SystemTime,
    /// Evaluation that triggered the review.
    pub evaluation: PatternEvaluation,
    /// Per-square verdicts over the completed pattern instance.
    pub lines: Vec<ReviewLine>,
}

/// Terminal outcome of a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Accepted without review (fully-automatic mode only).
    AutoAccepted,
    /// Host approved the win.
    Approved,
    /// Host rejected the win.
    Rejected {
        /// Host-supplied reason, echoed to the claimant.
        reason: String,
    },
    /// No host decision arrived within the review deadline.
    TimedOut,
}

impl ClaimOutcome {
    /// Whether this outcome awards the win.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ClaimOutcome::AutoAccepted | ClaimOutcome::Approved)
    }
}

/// A resolved claim, archived for the room's duration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClaim {
    /// The original claim.
    pub claim: WinClaim,
    /// How it ended.
    pub outcome: ClaimOutcome,
    /// When it was resolved.
    pub resolved_at: SystemTime,
    /// Per-square verdicts over the winning pattern instance, kept for the
    /// audit trail and echoed in the resolution broadcast.
    pub details: Vec<ReviewLine>,
}

/// What the arbiter decided to do with a freshly submitted claim.
#[derive(Debug)]
pub enum ClaimDecision {
    /// The pattern is not complete; reported to the claimant only.
    Invalid(PatternEvaluation),
    /// Accepted immediately (fully-automatic mode).
    AutoAccepted(ResolvedClaim),
    /// The room pauses; the host must review.
    ReviewOpened(PendingReview),
    /// Another review is in flight; the claim was queued.
    Queued {
        /// Zero-based place in the queue.
        place: usize,
    },
}

/// Errors raised by review resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// There is no claim awaiting review; resolving again is a no-op error.
    #[error("no claim is awaiting review")]
    NoActiveReview,
}

/// Per-room claim arbiter. Holds the single in-flight review, the FIFO queue
/// of claims behind it, and the archive of resolutions.
#[derive(Debug)]
pub struct WinClaimArbiter {
    active: Option<PendingReview>,
    queue: VecDeque<WinClaim>,
    archive: Vec<ResolvedClaim>,
    auto_accept: bool,
}

impl WinClaimArbiter {
    /// Create an arbiter; `auto_accept` skips host review for clean claims.
    pub fn new(auto_accept: bool) -> Self {
        Self {
            active: None,
            queue: VecDeque::new(),
            archive: Vec::new(),
            auto_accept,
        }
    }

    /// The claim currently awaiting host review, if any.
    pub fn active_review(&self) -> Option<&PendingReview> {
        self.active.as_ref()
    }

    /// Archived resolutions, oldest first.
    pub fn archive(&self) -> &[ResolvedClaim] {
        &self.archive
    }

    /// Submit a claim, evaluating it against the *current* room state.
    ///
    /// An incomplete pattern is reported back to the claimant without
    /// touching the room. A complete pattern opens a review (pausing the
    /// room) or, when a review is already open, queues the claim for
    /// re-evaluation at dequeue time.
    pub fn submit(
        &mut self,
        claimant_id: &str,
        card: &Card,
        marked: &HashSet<Position>,
        played: &IndexSet<String>,
        pattern: &PatternSpec,
        now: SystemTime,
    ) -> ClaimDecision {
        let evaluation = pattern::evaluate(card, marked, played, pattern);
        if !evaluation.complete {
            return ClaimDecision::Invalid(evaluation);
        }

        let claim = WinClaim {
            id: Uuid::new_v4(),
            claimant_id: claimant_id.to_string(),
            claimed_at: now,
            card_snapshot: card.clone(),
            required_pattern: pattern.clone(),
        };

        if self.active.is_some() {
            self.queue.push_back(claim);
            return ClaimDecision::Queued {
                place: self.queue.len() - 1,
            };
        }

        if self.auto_accept && evaluation.illegitimate_marked == 0 {
            let details = review_lines(&claim.card_snapshot, marked, played, &evaluation);
            let resolved = ResolvedClaim {
                claim,
                outcome: ClaimOutcome::AutoAccepted,
                resolved_at: now,
                details,
            };
            self.archive.push(resolved.clone());
            return ClaimDecision::AutoAccepted(resolved);
        }

        let review = self.open_review(claim, marked, played, evaluation, now);
        ClaimDecision::ReviewOpened(review)
    }

    /// Resolve the active review with the host's decision.
    pub fn resolve(
        &mut self,
        approved: bool,
        reason: Option<String>,
        now: SystemTime,
    ) -> Result<ResolvedClaim, ClaimError> {
        let review = self.active.take().ok_or(ClaimError::NoActiveReview)?;
        let outcome = if approved {
            ClaimOutcome::Approved
        } else {
            ClaimOutcome::Rejected {
                reason: reason.unwrap_or_else(|| "rejected by host".into()),
            }
        };
        let resolved = ResolvedClaim {
            claim: review.claim,
            outcome,
            resolved_at: now,
            details: review.lines,
        };
        self.archive.push(resolved.clone());
        Ok(resolved)
    }

    /// Resolve the active review as timed out, but only when it still is the
    /// claim the timeout was armed for. A stale timeout is ignored.
    pub fn resolve_timeout(&mut self, claim_id: Uuid, now: SystemTime) -> Option<ResolvedClaim> {
        match &self.active {
            Some(review) if review.claim.id == claim_id => {}
            _ => return None,
        }
        let review = self.active.take()?;
        let resolved = ResolvedClaim {
            claim: review.claim,
            outcome: ClaimOutcome::TimedOut,
            resolved_at: now,
            details: review.lines,
        };
        self.archive.push(resolved.clone());
        Some(resolved)
    }

    /// Pop the next queued claim for re-evaluation against fresh room state.
    pub fn pop_queued(&mut self) -> Option<WinClaim> {
        self.queue.pop_front()
    }

    /// Re-admit a previously queued claim. Marks may have changed since it
    /// was queued, so it is re-evaluated: a claim that no longer completes is
    /// archived as superseded instead of pausing the room again.
    pub fn readmit(
        &mut self,
        claim: WinClaim,
        marked: &HashSet<Position>,
        played: &IndexSet<String>,
        pattern: &PatternSpec,
        now: SystemTime,
    ) -> ClaimDecision {
        debug_assert!(self.active.is_none(), "readmit while a review is open");

        let evaluation =
            pattern::evaluate(&claim.card_snapshot, marked, played, pattern);
        if !evaluation.complete {
            let resolved = ResolvedClaim {
                claim,
                outcome: ClaimOutcome::Rejected {
                    reason: "superseded by room state changes".into(),
                },
                resolved_at: now,
                details: Vec::new(),
            };
            self.archive.push(resolved.clone());
            return ClaimDecision::Invalid(evaluation);
        }

        let review = self.open_review(claim, marked, played, evaluation, now);
        ClaimDecision::ReviewOpened(review)
    }

    /// Drop queued claims and the active review without archiving outcomes.
    /// Used on round/event reset, where verification state starts over.
    pub fn reset(&mut self) {
        self.active = None;
        self.queue.clear();
    }

    fn open_review(
        &mut self,
        claim: WinClaim,
        marked: &HashSet<Position>,
        played: &IndexSet<String>,
        evaluation: PatternEvaluation,
        now: SystemTime,
    ) -> PendingReview {
        let lines = review_lines(&claim.card_snapshot, marked, played, &evaluation);
        let review = PendingReview {
            claim,
            opened_at: now,
            evaluation,
            lines,
        };
        self.active = Some(review.clone());
        review
    }
}

/// Build the per-square verdict rows over the completed pattern instance.
fn review_lines(
    card: &Card,
    marked: &HashSet<Position>,
    played: &IndexSet<String>,
    evaluation: &PatternEvaluation,
) -> Vec<ReviewLine> {
    let positions = evaluation.winning_positions.as_deref().unwrap_or_default();
    positions
        .iter()
        .filter_map(|position| card.square_at(*position))
        .map(|square| {
            let verdict = if !marked.contains(&square.position) {
                SquareVerdict::Unmarked
            } else if played.contains(&square.clip_id) {
                SquareVerdict::Legitimate
            } else {
                SquareVerdict::Illegitimate
            };
            ReviewLine {
                position: square.position,
                clip_id: square.clip_id.clone(),
                verdict,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::state::card::{GRID_SIZE, TrackRef};

    fn card_from_seed(seed: u64) -> Card {
        let pool: Vec<TrackRef> = (0..30)
            .map(|n| TrackRef {
                clip_id: format!("clip-{n}"),
                title: format!("Title {n}"),
                artist: format!("Artist {n}"),
            })
            .collect();
        Card::generate_with(&pool, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    fn winning_row_state(card: &Card, row: u8) -> (HashSet<Position>, IndexSet<String>) {
        let positions: Vec<Position> = (0..GRID_SIZE)
            .map(|col| Position { row, col })
            .collect();
        let marked: HashSet<Position> = positions.iter().copied().collect();
        let played: IndexSet<String> = positions
            .iter()
            .map(|position| card.square_at(*position).unwrap().clip_id.clone())
            .collect();
        (marked, played)
    }

    #[test]
    fn incomplete_claim_is_invalid_and_leaves_no_review() {
        let card = card_from_seed(1);
        let mut arbiter = WinClaimArbiter::new(false);

        let decision = arbiter.submit(
            "alice",
            &card,
            &HashSet::new(),
            &IndexSet::new(),
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        assert!(matches!(decision, ClaimDecision::Invalid(_)));
        assert!(arbiter.active_review().is_none());
    }

    #[test]
    fn complete_claim_always_pauses_for_review_by_default() {
        let card = card_from_seed(2);
        let (marked, played) = winning_row_state(&card, 2);
        let mut arbiter = WinClaimArbiter::new(false);

        let decision = arbiter.submit(
            "alice",
            &card,
            &marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        let ClaimDecision::ReviewOpened(review) = decision else {
            panic!("expected a review to open");
        };
        assert_eq!(review.claim.claimant_id, "alice");
        assert_eq!(review.lines.len(), 5);
        assert!(review
            .lines
            .iter()
            .all(|line| line.verdict == SquareVerdict::Legitimate));
        assert!(arbiter.active_review().is_some());
    }

    #[test]
    fn only_one_claim_reviews_at_a_time_others_queue() {
        let alice_card = card_from_seed(3);
        let bob_card = card_from_seed(4);
        let (alice_marked, mut played) = winning_row_state(&alice_card, 0);
        let (bob_marked, bob_played) = winning_row_state(&bob_card, 1);
        played.extend(bob_played);

        let mut arbiter = WinClaimArbiter::new(false);
        let first = arbiter.submit(
            "alice",
            &alice_card,
            &alice_marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        assert!(matches!(first, ClaimDecision::ReviewOpened(_)));

        let second = arbiter.submit(
            "bob",
            &bob_card,
            &bob_marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        assert!(matches!(second, ClaimDecision::Queued { place: 0 }));
    }

    #[test]
    fn resolving_twice_is_rejected() {
        let card = card_from_seed(5);
        let (marked, played) = winning_row_state(&card, 3);
        let mut arbiter = WinClaimArbiter::new(false);
        arbiter.submit(
            "alice",
            &card,
            &marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );

        let resolved = arbiter
            .resolve(true, None, SystemTime::UNIX_EPOCH)
            .unwrap();
        assert_eq!(resolved.outcome, ClaimOutcome::Approved);
        assert_eq!(
            arbiter.resolve(true, None, SystemTime::UNIX_EPOCH),
            Err(ClaimError::NoActiveReview)
        );
        assert_eq!(arbiter.archive().len(), 1);
    }

    #[test]
    fn stale_timeout_is_ignored_fresh_timeout_resolves() {
        let card = card_from_seed(6);
        let (marked, played) = winning_row_state(&card, 4);
        let mut arbiter = WinClaimArbiter::new(false);
        let ClaimDecision::ReviewOpened(review) = arbiter.submit(
            "alice",
            &card,
            &marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        ) else {
            panic!("expected review");
        };

        assert!(arbiter.resolve_timeout(Uuid::new_v4(), SystemTime::UNIX_EPOCH).is_none());

        let resolved = arbiter
            .resolve_timeout(review.claim.id, SystemTime::UNIX_EPOCH)
            .unwrap();
        assert_eq!(resolved.outcome, ClaimOutcome::TimedOut);
        assert!(arbiter.active_review().is_none());

        // The armed timeout firing again after resolution must be a no-op.
        assert!(arbiter.resolve_timeout(review.claim.id, SystemTime::UNIX_EPOCH).is_none());
    }

    #[test]
    fn queued_claim_is_reevaluated_against_current_state() {
        let alice_card = card_from_seed(7);
        let bob_card = card_from_seed(8);
        let (alice_marked, mut played) = winning_row_state(&alice_card, 0);
        let (bob_marked, bob_played) = winning_row_state(&bob_card, 2);
        played.extend(bob_played);

        let mut arbiter = WinClaimArbiter::new(false);
        arbiter.submit(
            "alice",
            &alice_card,
            &alice_marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        arbiter.submit(
            "bob",
            &bob_card,
            &bob_marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        arbiter.resolve(false, Some("not yet".into()), SystemTime::UNIX_EPOCH).unwrap();

        // Bob unmarked a square while queued; his claim no longer completes.
        let mut bob_marked_now = bob_marked.clone();
        let dropped = *bob_marked_now.iter().next().unwrap();
        bob_marked_now.remove(&dropped);

        let queued = arbiter.pop_queued().unwrap();
        let decision = arbiter.readmit(
            queued,
            &bob_marked_now,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        assert!(matches!(decision, ClaimDecision::Invalid(_)));
        assert!(arbiter.active_review().is_none());
        let superseded = arbiter.archive().last().unwrap();
        assert!(matches!(
            &superseded.outcome,
            ClaimOutcome::Rejected { reason } if reason.contains("superseded")
        ));
    }

    #[test]
    fn auto_accept_mode_skips_review_for_clean_claims_only() {
        let card = card_from_seed(9);
        let (marked, played) = winning_row_state(&card, 1);
        let mut arbiter = WinClaimArbiter::new(true);

        let decision = arbiter.submit(
            "alice",
            &card,
            &marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        assert!(matches!(decision, ClaimDecision::AutoAccepted(_)));

        // A complete line plus an unplayed mark elsewhere still pauses.
        let card = card_from_seed(10);
        let (mut marked, played) = winning_row_state(&card, 1);
        marked.insert(Position { row: 3, col: 3 });
        let mut arbiter = WinClaimArbiter::new(true);
        let decision = arbiter.submit(
            "alice",
            &card,
            &marked,
            &played,
            &PatternSpec::Line,
            SystemTime::UNIX_EPOCH,
        );
        assert!(matches!(decision, ClaimDecision::ReviewOpened(_)));
    }
}
