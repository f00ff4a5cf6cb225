//! Commit-Reveal Protocol
//!
//! The verifier's side of a match. Each turn walks the phases
//!
//! ```text
//! SetupCommit ─► MoveCommit ─► MoveProve ─► RankProve* ─► Resolved ─┐
//!     (once)         ▲                                               │
//!                    └──────────────── advance() ◄───────────────────┘
//!                                                  └─► Ended
//! ```
//!
//! Only ranks the engine actually reads are ever requested. Every submission
//! either advances the match or is rejected without touching state, and an
//! identical resubmission of an accepted payload is acknowledged as a
//! duplicate so clients can retry blindly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::hash::{Digest, short_hex};
use crate::game::board::Board;
use crate::game::movement::{unproven_movers, InvalidMove, QueuedMove};
use crate::game::rank::{Mobility, Rank, RankRules};
use crate::game::resolve::{plan, resolve, MatchOutcome, ResolveError, TurnResolveDelta, WinReason};
use crate::game::setup::{check_population, check_zone, count_ranks, place_army, SetupError};
use crate::game::state::{BoardState, PawnId, Team};
use crate::proof::commitment::{HiddenMove, HiddenRank, SetupCommit};
use crate::proof::merkle::{verify, MerkleError, MerkleProof, MerkleTree};
use crate::proof::vault::StoreError;

/// Match phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for both setup commitments
    SetupCommit,
    /// Waiting for both move commitments
    MoveCommit,
    /// Waiting for both move pre-images
    MoveProve,
    /// Waiting for requested rank proofs
    RankProve,
    /// Turn resolved, delta available
    Resolved,
    /// Match over
    Ended,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A locally queued move is not legal.
    #[error("invalid move: {0}")]
    InvalidMove(#[from] InvalidMove),

    /// The engine built a battle with the wrong number of pawns.
    #[error("malformed battle with {participants} participants")]
    MalformedBattle {
        /// Participant count
        participants: usize,
    },

    /// Any other engine invariant violation.
    #[error("resolution failed: {0}")]
    Resolve(ResolveError),

    /// A pre-image or Merkle proof does not open the commitment.
    #[error("proof mismatch: {0}")]
    ProofMismatch(String),

    /// The local secret needed for a proof is gone.
    #[error("no local secret for {0}")]
    MissingLocalSecret(String),

    /// Submission arrived in the wrong phase.
    #[error("expected phase {expected}, match is in {actual}")]
    OutOfPhase {
        /// Phase the submission belongs to
        expected: Phase,
        /// Current phase
        actual: Phase,
    },

    /// Merkle proof names a leaf that does not exist.
    #[error(transparent)]
    IndexOutOfRange(#[from] MerkleError),

    /// Setup commitment rejected.
    #[error("invalid setup: {0}")]
    InvalidSetup(#[from] SetupError),

    /// A different payload was already accepted for this slot.
    #[error("conflicting submission")]
    ConflictingSubmission,

    /// Rank proof for a pawn the verifier did not ask about.
    #[error("reveal of {0} was not requested")]
    RevealNotRequested(PawnId),

    /// The match is over.
    #[error("match has ended")]
    Ended,

    /// Local secret storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ResolveError> for ProtocolError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MalformedBattle { participants } => {
                ProtocolError::MalformedBattle { participants }
            }
            other => ProtocolError::Resolve(other),
        }
    }
}

impl ProtocolError {
    /// Stable machine-readable code for wire messages.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::InvalidMove(_) => "invalid_move",
            ProtocolError::MalformedBattle { .. } => "malformed_battle",
            ProtocolError::Resolve(_) => "resolve",
            ProtocolError::ProofMismatch(_) => "proof_mismatch",
            ProtocolError::MissingLocalSecret(_) => "missing_local_secret",
            ProtocolError::OutOfPhase { .. } => "out_of_phase",
            ProtocolError::IndexOutOfRange(_) => "index_out_of_range",
            ProtocolError::InvalidSetup(_) => "invalid_setup",
            ProtocolError::ConflictingSubmission => "conflicting_submission",
            ProtocolError::RevealNotRequested(_) => "reveal_not_requested",
            ProtocolError::Ended => "ended",
            ProtocolError::Store(_) => "store",
        }
    }
}

/// How an accepted submission was treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    /// New payload, state changed
    Accepted,
    /// Same payload as before, nothing changed
    Duplicate,
}

/// A team's published setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupCommitment {
    /// Committing team
    pub team: Team,
    /// One leaf per pawn, ascending by pawn id
    pub commits: Vec<SetupCommit>,
    /// Merkle root over `commits`
    #[serde(with = "crate::core::hash::hex_serde")]
    pub root: Digest,
    /// Ranks in the clear (not allowed in security mode)
    #[serde(default)]
    pub cleartext: Option<Vec<HiddenRank>>,
}

impl SetupCommitment {
    /// Leaf hashes in commit order.
    pub fn leaves(&self) -> Vec<Digest> {
        self.commits.iter().map(|c| c.hash).collect()
    }
}

/// Per-team protocol record.
#[derive(Clone, Debug, Default)]
struct TeamRecord {
    setup: Option<SetupCommitment>,
    leaf_index: BTreeMap<PawnId, usize>,
    move_commit: Option<Option<Digest>>,
    move_proof: Option<HiddenMove>,
    proven: BTreeMap<PawnId, HiddenRank>,
}

impl TeamRecord {
    /// Move proof settled: either supplied or not needed.
    fn move_settled(&self) -> bool {
        matches!(self.move_commit, Some(None)) || self.move_proof.is_some()
    }

    fn queued_move(&self) -> Option<QueuedMove> {
        self.move_proof.as_ref().map(HiddenMove::to_queued)
    }
}

/// Verifier state for one match.
#[derive(Clone, Debug)]
pub struct Match {
    phase: Phase,
    security_mode: bool,
    state: BoardState,
    teams: [TeamRecord; 2],
    pending: BTreeSet<PawnId>,
    turn_reveals: BTreeSet<PawnId>,
    ever_moved: BTreeSet<PawnId>,
    last_delta: Option<TurnResolveDelta>,
    outcome: Option<MatchOutcome>,
}

impl Match {
    /// New match waiting for setups.
    pub fn new(board: Arc<Board>, rules: Arc<RankRules>, security_mode: bool) -> Self {
        Self {
            phase: Phase::SetupCommit,
            security_mode,
            state: BoardState::new(board, rules),
            teams: [TeamRecord::default(), TeamRecord::default()],
            pending: BTreeSet::new(),
            turn_reveals: BTreeSet::new(),
            ever_moved: BTreeSet::new(),
            last_delta: None,
            outcome: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Verifier's view of the board.
    pub fn state(&self) -> &BoardState {
        &self.state
    }

    /// Cleartext setups refused?
    pub fn security_mode(&self) -> bool {
        self.security_mode
    }

    /// Ranks still to be proven this turn.
    pub fn pending_reveals(&self) -> &BTreeSet<PawnId> {
        &self.pending
    }

    /// Delta of the last resolved turn.
    pub fn last_delta(&self) -> Option<&TurnResolveDelta> {
        self.last_delta.as_ref()
    }

    /// Final result, once decided.
    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    /// Published setup root of a team.
    pub fn root(&self, team: Team) -> Option<Digest> {
        self.record(team).setup.as_ref().map(|s| s.root)
    }

    /// Move pre-images revealed this turn, Red first.
    pub fn revealed_moves(&self) -> (Option<HiddenMove>, Option<HiddenMove>) {
        (self.record(Team::Red).move_proof, self.record(Team::Blue).move_proof)
    }

    fn record(&self, team: Team) -> &TeamRecord {
        &self.teams[team as usize]
    }

    fn record_mut(&mut self, team: Team) -> &mut TeamRecord {
        &mut self.teams[team as usize]
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), ProtocolError> {
        if self.phase == Phase::Ended {
            return Err(ProtocolError::Ended);
        }
        if self.phase != expected {
            return Err(ProtocolError::OutOfPhase { expected, actual: self.phase });
        }
        Ok(())
    }

    // =========================================================================
    // SETUP
    // =========================================================================

    /// Publish a team's setup commitment.
    pub fn submit_setup(
        &mut self,
        team: Team,
        commitment: SetupCommitment,
    ) -> Result<Submission, ProtocolError> {
        if let Some(existing) = &self.record(team).setup {
            return if *existing == commitment {
                Ok(Submission::Duplicate)
            } else {
                Err(ProtocolError::ConflictingSubmission)
            };
        }
        self.expect_phase(Phase::SetupCommit)?;

        let ranks = self.verify_setup(team, &commitment)?;

        // Verified; only now touch state
        let pawns = commitment
            .commits
            .iter()
            .map(|c| (c.pawn.origin, ranks.get(&c.pawn).copied()));
        let mut staged = self.state.clone();
        place_army(&mut staged, team, pawns)?;
        self.state = staged;

        let record = self.record_mut(team);
        record.leaf_index = commitment
            .commits
            .iter()
            .enumerate()
            .map(|(i, c)| (c.pawn, i))
            .collect();
        info!(
            %team,
            pawns = commitment.commits.len(),
            root = %short_hex(&commitment.root),
            cleartext = commitment.cleartext.is_some(),
            "setup committed"
        );
        record.setup = Some(commitment);

        if self.teams.iter().all(|t| t.setup.is_some()) {
            self.phase = Phase::MoveCommit;
            info!("both setups committed, match started");
        }
        Ok(Submission::Accepted)
    }

    /// Check a setup commitment without changing anything.
    ///
    /// Returns the ranks disclosed by cleartext (empty in security mode).
    fn verify_setup(
        &self,
        team: Team,
        commitment: &SetupCommitment,
    ) -> Result<BTreeMap<PawnId, Rank>, SetupError> {
        if commitment.team != team {
            return Err(SetupError::TeamMismatch { submitter: team, claimed: commitment.team });
        }
        if commitment.commits.is_empty() {
            return Err(SetupError::Empty);
        }
        for pair in commitment.commits.windows(2) {
            if pair[0].pawn >= pair[1].pawn {
                return Err(SetupError::Unordered(pair[1].pawn));
            }
        }
        if let Some(foreign) = commitment.commits.iter().find(|c| c.pawn.team != team) {
            return Err(SetupError::WrongOwner(foreign.pawn));
        }
        check_zone(&self.state.board, team, commitment.commits.iter().map(|c| &c.pawn.origin))?;
        if MerkleTree::build(&commitment.leaves()).root() != commitment.root {
            return Err(SetupError::RootMismatch);
        }

        let mut ranks = BTreeMap::new();
        if let Some(cleartext) = &commitment.cleartext {
            if self.security_mode {
                return Err(SetupError::CleartextForbidden);
            }
            if cleartext.len() != commitment.commits.len() {
                return Err(SetupError::CleartextMismatch(
                    commitment.commits[cleartext.len().min(commitment.commits.len() - 1)].pawn,
                ));
            }
            for (hidden, commit) in cleartext.iter().zip(&commitment.commits) {
                if hidden.pawn != commit.pawn || hidden.commit() != commit.hash {
                    return Err(SetupError::CleartextMismatch(commit.pawn));
                }
                ranks.insert(hidden.pawn, hidden.rank);
            }
            check_population(
                &self.state.board,
                &self.state.rules,
                &count_ranks(ranks.values()),
            )?;
        }
        Ok(ranks)
    }

    // =========================================================================
    // MOVES
    // =========================================================================

    /// Commit to this turn's move (`None` = pass).
    pub fn commit_move(
        &mut self,
        team: Team,
        commitment: Option<Digest>,
    ) -> Result<Submission, ProtocolError> {
        if let Some(existing) = self.record(team).move_commit {
            return if existing == commitment {
                Ok(Submission::Duplicate)
            } else {
                Err(ProtocolError::ConflictingSubmission)
            };
        }
        self.expect_phase(Phase::MoveCommit)?;

        self.record_mut(team).move_commit = Some(commitment);
        debug!(
            %team,
            turn = self.state.turn,
            hash = %commitment.map(|h| short_hex(&h)).unwrap_or_else(|| "pass".into()),
            "move committed"
        );

        if self.teams.iter().all(|t| t.move_commit.is_some()) {
            self.phase = Phase::MoveProve;
            self.after_move_proof()?;
        }
        Ok(Submission::Accepted)
    }

    /// Reveal the move behind this turn's commitment.
    pub fn prove_move(&mut self, team: Team, hidden: HiddenMove) -> Result<Submission, ProtocolError> {
        if let Some(existing) = &self.record(team).move_proof {
            return if *existing == hidden {
                Ok(Submission::Duplicate)
            } else {
                Err(ProtocolError::ConflictingSubmission)
            };
        }
        self.expect_phase(Phase::MoveProve)?;

        match self.record(team).move_commit {
            Some(Some(committed)) if committed == hidden.commit() => {}
            Some(Some(_)) => {
                warn!(%team, pawn = %hidden.pawn, "move pre-image does not match commitment");
                return Err(ProtocolError::ProofMismatch(format!(
                    "move pre-image for {} does not open {team}'s commitment",
                    hidden.pawn
                )));
            }
            _ => {
                return Err(ProtocolError::ProofMismatch(format!("{team} committed to no move")));
            }
        }

        self.record_mut(team).move_proof = Some(hidden);
        debug!(%team, pawn = %hidden.pawn, target = %hidden.target, "move revealed");
        self.after_move_proof()?;
        Ok(Submission::Accepted)
    }

    /// Once both moves are known, work out which ranks are needed.
    fn after_move_proof(&mut self) -> Result<(), ProtocolError> {
        if !self.teams.iter().all(TeamRecord::move_settled) {
            return Ok(());
        }
        self.phase = Phase::RankProve;
        self.replan()
    }

    /// Recompute the pending reveal set; resolve when nothing is missing.
    ///
    /// A pass claims the side has no legal move, so every hidden pawn of a
    /// passing side that looks able to move has to be proven as well.
    fn replan(&mut self) -> Result<(), ProtocolError> {
        let red = self.record(Team::Red).queued_move();
        let blue = self.record(Team::Blue).queued_move();
        let turn_plan = plan(&self.state, red.as_ref(), blue.as_ref());
        let mut pending = turn_plan.unknown_ranks(&self.state);
        for team in Team::BOTH {
            if matches!(self.record(team).move_commit, Some(None)) {
                pending.extend(unproven_movers(&self.state, team));
            }
        }
        self.pending = pending;

        if self.pending.is_empty() {
            let contested = turn_plan
                .contests
                .iter()
                .flat_map(|c| c.participants.iter().copied())
                .collect();
            return self.resolve_turn(red, blue, contested);
        }
        info!(turn = self.state.turn, pending = ?self.pending, "rank reveals requested");
        Ok(())
    }

    /// Run the engine. Ranks proven this turn outside any battle are
    /// disclosed all the same, so they are marked revealed first.
    fn resolve_turn(
        &mut self,
        red: Option<QueuedMove>,
        blue: Option<QueuedMove>,
        contested: BTreeSet<PawnId>,
    ) -> Result<(), ProtocolError> {
        let mut staged = self.state.clone();
        for id in self.turn_reveals.difference(&contested) {
            if let Some(pawn) = staged.pawn_mut(id) {
                pawn.revealed = true;
            }
        }
        let (next, delta) = resolve(&staged, red.as_ref(), blue.as_ref())?;
        info!(
            turn = delta.turn,
            battles = delta.battles.len(),
            hash = %short_hex(&delta.state_hash),
            "turn resolved"
        );
        self.ever_moved.extend(delta.applied_moves.iter().map(|mv| mv.pawn));
        self.turn_reveals.clear();
        self.state = next;
        self.outcome = delta.outcome;
        self.last_delta = Some(delta);
        self.phase = Phase::Resolved;
        Ok(())
    }

    // =========================================================================
    // RANKS
    // =========================================================================

    /// Prove the rank of a requested pawn.
    pub fn prove_rank(
        &mut self,
        team: Team,
        hidden: HiddenRank,
        proof: MerkleProof,
    ) -> Result<Submission, ProtocolError> {
        if let Some(existing) = self.record(team).proven.get(&hidden.pawn) {
            return if *existing == hidden {
                Ok(Submission::Duplicate)
            } else {
                Err(ProtocolError::ConflictingSubmission)
            };
        }
        self.expect_phase(Phase::RankProve)?;
        if hidden.pawn.team != team || !self.pending.contains(&hidden.pawn) {
            return Err(ProtocolError::RevealNotRequested(hidden.pawn));
        }

        self.verify_rank(team, &hidden, &proof)?;

        self.state.learn_rank(&hidden.pawn, hidden.rank);
        self.pending.remove(&hidden.pawn);
        self.turn_reveals.insert(hidden.pawn);
        self.record_mut(team).proven.insert(hidden.pawn, hidden);
        debug!(%team, pawn = %hidden.pawn, rank = %hidden.rank, "rank proven");

        self.replan()?;
        Ok(Submission::Accepted)
    }

    fn verify_rank(
        &self,
        team: Team,
        hidden: &HiddenRank,
        proof: &MerkleProof,
    ) -> Result<(), ProtocolError> {
        let record = self.record(team);
        let setup = record
            .setup
            .as_ref()
            .ok_or(ProtocolError::OutOfPhase { expected: Phase::SetupCommit, actual: self.phase })?;

        let len = setup.commits.len();
        if proof.leaf_index >= len {
            return Err(MerkleError::IndexOutOfRange { index: proof.leaf_index, len }.into());
        }
        let expected_index = record
            .leaf_index
            .get(&hidden.pawn)
            .copied()
            .ok_or(ProtocolError::RevealNotRequested(hidden.pawn))?;
        if proof.leaf_index != expected_index {
            return Err(ProtocolError::ProofMismatch(format!(
                "{} is leaf {expected_index}, proof names leaf {}",
                hidden.pawn, proof.leaf_index
            )));
        }

        let leaf = hidden.commit();
        if leaf != setup.commits[expected_index].hash {
            warn!(%team, pawn = %hidden.pawn, "rank pre-image does not match commitment");
            return Err(ProtocolError::ProofMismatch(format!(
                "rank pre-image for {} does not open its leaf",
                hidden.pawn
            )));
        }
        if !verify(&setup.root, &leaf, proof) {
            return Err(ProtocolError::ProofMismatch(format!(
                "merkle path for {} does not reach the setup root",
                hidden.pawn
            )));
        }
        self.check_rank_history(team, hidden)
    }

    /// An opened rank must agree with everything the pawn has done and with
    /// the ranks its side has already shown.
    fn check_rank_history(&self, team: Team, hidden: &HiddenRank) -> Result<(), ProtocolError> {
        let record = self.record(team);
        let moving_now = record.move_proof.map(|mv| mv.pawn) == Some(hidden.pawn);
        if self.state.rules.mobility(hidden.rank) == Mobility::Immobile
            && (moving_now || self.ever_moved.contains(&hidden.pawn))
        {
            warn!(%team, pawn = %hidden.pawn, rank = %hidden.rank, "immobile rank has moved");
            return Err(ProtocolError::ProofMismatch(format!(
                "{} has moved but opens as immobile {}",
                hidden.pawn, hidden.rank
            )));
        }

        let max = self.state.board.max_pawns(hidden.rank);
        let shown = record.proven.values().filter(|h| h.rank == hidden.rank).count() as u32;
        if shown >= max {
            warn!(%team, pawn = %hidden.pawn, rank = %hidden.rank, max, "rank over population limit");
            return Err(ProtocolError::ProofMismatch(format!(
                "{team} already proved {shown} of rank {}, board allows {max}",
                hidden.rank
            )));
        }
        Ok(())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Leave `Resolved`: next turn, or `Ended` if the turn decided the match.
    pub fn advance(&mut self) -> Result<Phase, ProtocolError> {
        self.expect_phase(Phase::Resolved)?;

        for record in &mut self.teams {
            record.move_commit = None;
            record.move_proof = None;
        }
        self.pending.clear();
        self.turn_reveals.clear();

        self.phase = if self.outcome.is_some() {
            Phase::Ended
        } else {
            Phase::MoveCommit
        };
        debug!(phase = %self.phase, turn = self.state.turn, "advanced");
        Ok(self.phase)
    }

    /// Concede the match.
    pub fn forfeit(&mut self, team: Team) -> Result<MatchOutcome, ProtocolError> {
        let outcome = MatchOutcome::Winner { team: team.opponent(), reason: WinReason::Forfeit };
        self.end(outcome)?;
        Ok(outcome)
    }

    /// End the match with a given outcome (turn cap, forfeit).
    pub fn end(&mut self, outcome: MatchOutcome) -> Result<(), ProtocolError> {
        if self.phase == Phase::Ended {
            return Err(ProtocolError::Ended);
        }
        info!(?outcome, "match ended");
        self.outcome = Some(outcome);
        self.phase = Phase::Ended;
        self.pending.clear();
        Ok(())
    }
}
