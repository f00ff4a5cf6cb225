//! Player Client
//!
//! Drives an [`Agent`] against a match over any [`Transport`]. Every request
//! is bounded by a timeout and retried with the identical payload; the
//! session treats repeats as duplicates, so a reply lost in transit costs a
//! round trip and nothing else. Secrets are released only after the session
//! acknowledges the proof that used them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::hash::short_hex;
use crate::core::rng::SaltSource;
use crate::game::board::Board;
use crate::game::movement::QueuedMove;
use crate::game::rank::RankRules;
use crate::game::setup::Placement;
use crate::game::state::{BoardState, PawnId};
use crate::network::protocol::{Ack, ClientMessage, ErrorCode, MatchSnapshot, ServerError, ServerMessage};
use crate::network::session::{MatchSession, SessionError};
use crate::proof::agent::{Agent, MoveCommitment};
use crate::proof::protocol::ProtocolError;
use crate::proof::vault::SecretStore;

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No reply in time, after every retry.
    #[error("no reply after {attempts} attempts of {timeout:?}")]
    Timeout {
        /// Per-attempt timeout
        timeout: Duration,
        /// Attempts made
        attempts: u32,
    },

    /// The other end is gone.
    #[error("connection closed")]
    Closed,

    /// The session refused the message.
    #[error("rejected ({:?}): {}", .0.code, .0.message)]
    Rejected(ServerError),

    /// The session answered with something that makes no sense here.
    #[error("unexpected reply: {0}")]
    Unexpected(String),
}

impl TransportError {
    /// Wire error code, for rejections.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TransportError::Rejected(err) => Some(err.code),
            _ => None,
        }
    }
}

impl From<SessionError> for TransportError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Timeout(timeout) => TransportError::Timeout { timeout, attempts: 1 },
            SessionError::Closed | SessionError::NotFound(_) => TransportError::Closed,
        }
    }
}

/// Something that carries one request to a match and brings back the reply.
pub trait Transport: Send + Sync {
    /// Send a message and wait for the reply.
    fn send(
        &self,
        message: ClientMessage,
    ) -> impl Future<Output = Result<ServerMessage, TransportError>> + Send;
}

impl Transport for MatchSession {
    async fn send(&self, message: ClientMessage) -> Result<ServerMessage, TransportError> {
        Ok(self.request(message).await?)
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Talking to the session failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Local protocol step failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Client retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Time allowed for one attempt.
    pub request_timeout: Duration,
    /// Extra attempts after the first.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_timeout: std::env::var("STRATAGEM_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            max_retries: std::env::var("STRATAGEM_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// One player connected to one match.
pub struct Client<T: Transport, S: SecretStore, R: SaltSource> {
    transport: T,
    agent: Agent<S, R>,
    config: ClientConfig,
    board: Arc<Board>,
    rules: Arc<RankRules>,
}

impl<T: Transport, S: SecretStore, R: SaltSource> Client<T, S, R> {
    /// Wrap an agent and a transport.
    pub fn new(
        transport: T,
        agent: Agent<S, R>,
        config: ClientConfig,
        board: Arc<Board>,
        rules: Arc<RankRules>,
    ) -> Self {
        Self { transport, agent, config, board, rules }
    }

    /// The local player.
    pub fn agent(&self) -> &Agent<S, R> {
        &self.agent
    }

    /// Give the agent back, e.g. to destroy its vault.
    pub fn into_agent(self) -> Agent<S, R> {
        self.agent
    }

    /// Send with timeout and retries. Protocol rejections are not retried.
    pub async fn submit(&self, message: ClientMessage) -> Result<ServerMessage, TransportError> {
        let attempts = self.config.max_retries + 1;
        for attempt in 1..=attempts {
            match timeout(self.config.request_timeout, self.transport.send(message.clone())).await {
                Ok(Ok(ServerMessage::Error(err))) => return Err(TransportError::Rejected(err)),
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(TransportError::Timeout { .. })) | Err(_) => {
                    warn!(
                        team = ?message.team(),
                        kind = message.kind(),
                        attempt,
                        attempts,
                        "request timed out"
                    );
                }
                Ok(Err(err)) => return Err(err),
            }
        }
        Err(TransportError::Timeout { timeout: self.config.request_timeout, attempts })
    }

    async fn submit_for_ack(&self, message: ClientMessage) -> Result<Ack, TransportError> {
        match self.submit(message).await? {
            ServerMessage::Ack(ack) => Ok(ack),
            other => Err(TransportError::Unexpected(format!("{other:?}"))),
        }
    }

    /// Fetch the match as the session sees it.
    pub async fn sync(&self) -> Result<(MatchSnapshot, BoardState), TransportError> {
        let snapshot = match self.submit(ClientMessage::SyncRequest).await? {
            ServerMessage::Sync(snapshot) => snapshot,
            other => return Err(TransportError::Unexpected(format!("{other:?}"))),
        };
        let mut state = BoardState::new(self.board.clone(), self.rules.clone());
        state.turn = snapshot.turn;
        state.pawns = snapshot.pawns.iter().map(|p| (p.id, p.clone())).collect();
        Ok((snapshot, state))
    }

    /// Commit to and publish a placement.
    pub async fn setup(&mut self, placement: &Placement, security_mode: bool) -> Result<Ack, ClientError> {
        let commitment = self.agent.prepare_setup(&self.board, &self.rules, placement, security_mode)?;
        let ack = self
            .submit_for_ack(ClientMessage::SubmitSetup { team: self.agent.team(), commitment })
            .await?;
        info!(team = %self.agent.team(), phase = %ack.phase, "setup acknowledged");
        Ok(ack)
    }

    /// Commit to this turn's move.
    pub async fn commit_move(
        &mut self,
        state: &BoardState,
        mv: Option<QueuedMove>,
    ) -> Result<(MoveCommitment, Ack), ClientError> {
        let commitment = self.agent.prepare_move(state, mv)?;
        let ack = self
            .submit_for_ack(ClientMessage::CommitMove {
                team: commitment.team,
                turn: state.turn,
                hash: commitment.hash,
            })
            .await?;
        Ok((commitment, ack))
    }

    /// Open a move commitment. Passing turns have nothing to open.
    pub async fn prove_move(&mut self, turn: u32, commitment: &MoveCommitment) -> Result<Option<Ack>, ClientError> {
        let Some(hash) = commitment.hash else {
            return Ok(None);
        };
        let hidden = self.agent.move_proof(&hash)?;
        let ack = self
            .submit_for_ack(ClientMessage::ProveMove { team: commitment.team, turn, hidden })
            .await?;
        self.agent.acknowledge_move(&hash)?;
        debug!(team = %commitment.team, hash = %short_hex(&hash), "move proof acknowledged");
        Ok(Some(ack))
    }

    /// Prove every pending rank owned by this side.
    ///
    /// Returns the last acknowledgement, or `None` if nothing was ours.
    pub async fn answer_reveals(&mut self, pending: &[PawnId]) -> Result<Option<Ack>, ClientError> {
        let team = self.agent.team();
        let mut last = None;
        for pawn in pending.iter().filter(|p| p.team == team) {
            let (hidden, proof) = self.agent.rank_proof(pawn)?;
            let ack = self
                .submit_for_ack(ClientMessage::ProveRank { team: pawn.team, hidden, proof })
                .await?;
            self.agent.acknowledge_rank(pawn)?;
            last = Some(ack);
        }
        Ok(last)
    }

    /// Concede.
    pub async fn forfeit(&mut self) -> Result<Ack, ClientError> {
        let ack = self.submit_for_ack(ClientMessage::Forfeit { team: self.agent.team() }).await?;
        self.agent.end_match()?;
        Ok(ack)
    }

    /// Drop every local secret once the match is over.
    pub fn finish(&mut self) -> Result<(), ClientError> {
        self.agent.end_match()?;
        Ok(())
    }
}
