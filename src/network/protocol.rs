//! Protocol Messages
//!
//! Wire format between a player client and a match session.
//! All messages are serialized as JSON tagged enums for debugging ease.

use serde::{Serialize, Deserialize};

use crate::core::hash::Digest;
use crate::game::resolve::{MatchOutcome, TurnResolveDelta};
use crate::game::state::{PawnId, PawnState, Team};
use crate::proof::commitment::{HiddenMove, HiddenRank};
use crate::proof::merkle::MerkleProof;
use crate::proof::protocol::{Phase, ProtocolError, SetupCommitment, Submission};

// =============================================================================
// CLIENT -> SESSION MESSAGES
// =============================================================================

/// Messages sent from a player to the match session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Publish the setup commitment.
    SubmitSetup {
        /// Submitting team
        team: Team,
        /// Leaves, root and optional cleartext
        commitment: SetupCommitment,
    },

    /// Commit to this turn's move.
    CommitMove {
        /// Submitting team
        team: Team,
        /// Turn the commitment belongs to
        turn: u32,
        /// Commitment hash, absent to pass
        #[serde(with = "crate::core::hash::hex_serde::option")]
        hash: Option<Digest>,
    },

    /// Open this turn's move commitment.
    ProveMove {
        /// Submitting team
        team: Team,
        /// Turn the proof belongs to
        turn: u32,
        /// Move pre-image
        hidden: HiddenMove,
    },

    /// Prove a requested rank.
    ProveRank {
        /// Submitting team
        team: Team,
        /// Rank pre-image
        hidden: HiddenRank,
        /// Inclusion proof against the setup root
        proof: MerkleProof,
    },

    /// Concede.
    Forfeit {
        /// Conceding team
        team: Team,
    },

    /// Ask for the current match snapshot (for reconnection).
    SyncRequest,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Team the message speaks for, if any.
    pub fn team(&self) -> Option<Team> {
        match self {
            ClientMessage::SubmitSetup { team, .. }
            | ClientMessage::CommitMove { team, .. }
            | ClientMessage::ProveMove { team, .. }
            | ClientMessage::ProveRank { team, .. }
            | ClientMessage::Forfeit { team } => Some(*team),
            ClientMessage::SyncRequest | ClientMessage::Ping { .. } => None,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::SubmitSetup { .. } => "submit_setup",
            ClientMessage::CommitMove { .. } => "commit_move",
            ClientMessage::ProveMove { .. } => "prove_move",
            ClientMessage::ProveRank { .. } => "prove_rank",
            ClientMessage::Forfeit { .. } => "forfeit",
            ClientMessage::SyncRequest => "sync_request",
            ClientMessage::Ping { .. } => "ping",
        }
    }
}

// =============================================================================
// SESSION -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from the match session to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Submission accepted (or recognized as a duplicate).
    Ack(Ack),

    /// Current match snapshot.
    Sync(MatchSnapshot),

    /// Match event notification.
    Event(MatchEvent),

    /// Pong response.
    Pong {
        /// Echoed client timestamp
        timestamp: u64,
        /// Session wall clock, unix millis
        server_time: u64,
    },

    /// Submission rejected.
    Error(ServerError),
}

/// Acknowledgement of a submission, with where the match now stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// New or duplicate
    pub submission: Submission,
    /// Phase after the submission
    pub phase: Phase,
    /// Turns resolved so far
    pub turn: u32,
    /// Ranks the session is waiting for
    pub pending: Vec<PawnId>,
}

/// Everything a reconnecting client needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Current phase
    pub phase: Phase,
    /// Turns resolved so far
    pub turn: u32,
    /// Ranks the session is waiting for
    pub pending: Vec<PawnId>,
    /// Every pawn as the session knows it (hidden ranks stay `None`)
    pub pawns: Vec<PawnState>,
    /// Hash of the session's board state
    #[serde(with = "crate::core::hash::hex_serde")]
    pub state_hash: Digest,
    /// Final result, once decided
    pub outcome: Option<MatchOutcome>,
}

/// Events pushed to every observer of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    /// A team published its setup.
    SetupCommitted {
        /// Committing team
        team: Team,
        /// Published root
        #[serde(with = "crate::core::hash::hex_serde")]
        root: Digest,
    },

    /// Both setups are in; turn 0 may begin.
    MatchStarted,

    /// The session needs these ranks before it can resolve.
    RevealRequested {
        /// Turn being resolved
        turn: u32,
        /// Pawns to prove, ascending
        pawns: Vec<PawnId>,
    },

    /// A turn was resolved.
    TurnResolved {
        /// Result of the turn
        delta: Box<TurnResolveDelta>,
    },

    /// The match is over.
    MatchEnded {
        /// Final result
        outcome: MatchOutcome,
        /// Turns resolved
        turn: u32,
    },
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Move is not legal.
    InvalidMove,
    /// Engine built an impossible battle.
    MalformedBattle,
    /// Engine invariant broken.
    Resolve,
    /// Pre-image or Merkle path does not open the commitment.
    ProofMismatch,
    /// Submission in the wrong phase.
    OutOfPhase,
    /// Submission for a turn that has not started.
    WrongTurn,
    /// Merkle leaf index does not exist.
    IndexOutOfRange,
    /// Setup commitment rejected.
    InvalidSetup,
    /// A different payload was already accepted.
    ConflictingSubmission,
    /// Rank proof nobody asked for.
    RevealNotRequested,
    /// Match is over.
    Ended,
    /// Internal error.
    InternalError,
}

impl ErrorCode {
    /// Map a protocol error code onto the wire enum.
    pub fn from_protocol(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidMove(_) => ErrorCode::InvalidMove,
            ProtocolError::MalformedBattle { .. } => ErrorCode::MalformedBattle,
            ProtocolError::Resolve(_) => ErrorCode::Resolve,
            ProtocolError::ProofMismatch(_) => ErrorCode::ProofMismatch,
            ProtocolError::OutOfPhase { .. } => ErrorCode::OutOfPhase,
            ProtocolError::IndexOutOfRange(_) => ErrorCode::IndexOutOfRange,
            ProtocolError::InvalidSetup(_) => ErrorCode::InvalidSetup,
            ProtocolError::ConflictingSubmission => ErrorCode::ConflictingSubmission,
            ProtocolError::RevealNotRequested(_) => ErrorCode::RevealNotRequested,
            ProtocolError::Ended => ErrorCode::Ended,
            ProtocolError::MissingLocalSecret(_) | ProtocolError::Store(_) => ErrorCode::InternalError,
        }
    }
}

impl From<&ProtocolError> for ServerError {
    fn from(err: &ProtocolError) -> Self {
        Self {
            code: ErrorCode::from_protocol(err),
            message: err.to_string(),
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::from(&err)
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coord::Coord;
    use crate::core::rng::DeterministicRng;
    use crate::game::movement::QueuedMove;
    use crate::game::rank::Rank;
    use crate::game::resolve::WinReason;
    use crate::proof::merkle::MerkleTree;

    fn pawn() -> PawnId {
        PawnId::new(Team::Blue, Coord::new(4, 7))
    }

    #[test]
    fn test_client_message_json_shape() {
        let msg = ClientMessage::CommitMove { team: Team::Red, turn: 3, hash: Some([0xab; 32]) };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"commit_move\""));
        assert!(json.contains(&"ab".repeat(32)));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);

        let pass = ClientMessage::CommitMove { team: Team::Blue, turn: 3, hash: None };
        let json = pass.to_json().unwrap();
        assert!(json.contains("\"hash\":null"));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), pass);
    }

    #[test]
    fn test_proofs_survive_the_wire() {
        let mut rng = DeterministicRng::new(8);
        let hidden = HiddenRank::new(pawn(), Rank::Sergeant, &mut rng);
        let other = HiddenRank::new(PawnId::new(Team::Blue, Coord::new(5, 7)), Rank::Bomb, &mut rng);
        let tree = MerkleTree::build(&[hidden.commit(), other.commit()]);
        let msg = ClientMessage::ProveRank { team: Team::Blue, hidden, proof: tree.proof(0).unwrap() };

        let ClientMessage::ProveRank { hidden, proof, .. } =
            ClientMessage::from_json(&msg.to_json().unwrap()).unwrap()
        else {
            panic!("wrong variant");
        };
        assert!(crate::proof::merkle::verify(&tree.root(), &hidden.commit(), &proof));

        let mv = QueuedMove::new(Team::Blue, pawn(), Coord::new(4, 7), Coord::new(4, 6));
        let msg = ClientMessage::ProveMove { team: Team::Blue, turn: 0, hidden: HiddenMove::new(&mv, &mut rng) };
        assert_eq!(ClientMessage::from_json(&msg.to_json().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_team_and_kind() {
        assert_eq!(ClientMessage::Forfeit { team: Team::Blue }.team(), Some(Team::Blue));
        assert_eq!(ClientMessage::SyncRequest.team(), None);
        assert_eq!(ClientMessage::Ping { timestamp: 1 }.kind(), "ping");
    }

    #[test]
    fn test_error_codes() {
        let err = ProtocolError::ConflictingSubmission;
        let msg = ServerMessage::Error(ServerError::from(&err));
        let json = msg.to_json().unwrap();
        assert!(json.contains("conflicting_submission"));

        let missing = ProtocolError::MissingLocalSecret("rank".into());
        assert_eq!(ErrorCode::from_protocol(&missing), ErrorCode::InternalError);
    }

    #[test]
    fn test_match_event_tags() {
        let ended = ServerMessage::Event(MatchEvent::MatchEnded {
            outcome: MatchOutcome::Winner { team: Team::Red, reason: WinReason::FlagCaptured },
            turn: 12,
        });
        let json = ended.to_json().unwrap();
        assert!(json.contains("\"event\":\"match_ended\""));
        assert!(json.contains("flag_captured"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), ended);

        let request = MatchEvent::RevealRequested { turn: 2, pawns: vec![pawn()] };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(serde_json::from_str::<MatchEvent>(&json).unwrap(), request);
    }
}
