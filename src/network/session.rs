//! Match Session Management
//!
//! Each match is owned by one tokio task. Clients talk to it through a
//! cloneable [`MatchSession`] handle (mpsc request, oneshot reply), so turns
//! are strictly sequential per match. Results flow one way: the task pushes
//! [`MatchEvent`]s to every subscriber over a broadcast channel.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::hash::Digest;
use crate::game::board::Board;
use crate::game::rank::RankRules;
use crate::game::resolve::{MatchOutcome, WinReason};
use crate::game::state::{PawnId, Team};
use crate::network::protocol::{
    Ack, ClientMessage, ErrorCode, MatchEvent, MatchSnapshot, ServerError, ServerMessage,
};
use crate::proof::commitment::HiddenMove;
use crate::proof::protocol::{Match, Phase, ProtocolError, Submission};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for match sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Refuse cleartext setups.
    pub security_mode: bool,
    /// How long a caller waits for the session task to answer.
    pub request_timeout: Duration,
    /// Where file-backed secret vaults live.
    pub store_dir: PathBuf,
    /// Turns after which the match is drawn.
    pub max_turns: u32,
    /// End the match against a side whose rank proof fails to verify.
    pub forfeit_on_bad_proof: bool,
    /// Buffered events per subscriber before lagging ones miss events.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            security_mode: true,
            request_timeout: Duration::from_secs(5),
            store_dir: std::env::temp_dir().join("stratagem"),
            max_turns: 1000,
            forfeit_on_bad_proof: true,
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            security_mode: var("STRATAGEM_SECURITY_MODE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.security_mode),
            request_timeout: var("STRATAGEM_REQUEST_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            store_dir: var("STRATAGEM_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            max_turns: var("STRATAGEM_MAX_TURNS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_turns),
            forfeit_on_bad_proof: var("STRATAGEM_FORFEIT_ON_BAD_PROOF")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.forfeit_on_bad_proof),
            event_capacity: defaults.event_capacity,
        }
    }
}

/// Session errors (transport level; protocol rejections travel as
/// [`ServerMessage::Error`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No such session.
    #[error("session {0} not found")]
    NotFound(Uuid),

    /// The session task is gone.
    #[error("session closed")]
    Closed,

    /// The session task did not answer in time.
    #[error("session did not answer within {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// HANDLE
// =============================================================================

struct Command {
    message: ClientMessage,
    reply: oneshot::Sender<ServerMessage>,
}

/// Cloneable handle to a running match.
#[derive(Clone, Debug)]
pub struct MatchSession {
    id: Uuid,
    requests: mpsc::Sender<Command>,
    events: broadcast::Sender<MatchEvent>,
    phase: watch::Receiver<Phase>,
    request_timeout: Duration,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("message", &self.message.kind()).finish()
    }
}

impl MatchSession {
    /// Start the task that owns a new match. Must be called inside a runtime.
    pub fn spawn(id: Uuid, board: Arc<Board>, rules: Arc<RankRules>, config: &SessionConfig) -> Self {
        let (requests, inbox) = mpsc::channel(32);
        let (events, _) = broadcast::channel(config.event_capacity);
        let (phase_tx, phase) = watch::channel(Phase::SetupCommit);

        let task = SessionTask {
            id,
            game: Match::new(board, rules, config.security_mode),
            max_turns: config.max_turns,
            forfeit_on_bad_proof: config.forfeit_on_bad_proof,
            settled: BTreeMap::new(),
            announced: BTreeSet::new(),
            events: events.clone(),
            phase: phase_tx,
        };
        tokio::spawn(task.run(inbox));
        info!(match_id = %id, security_mode = config.security_mode, "session started");

        Self {
            id,
            requests,
            events,
            phase,
            request_timeout: config.request_timeout,
        }
    }

    /// Match identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Phase as of the last handled request.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Subscribe to match events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<MatchEvent> {
        self.events.subscribe()
    }

    /// Send one message and wait for the answer.
    pub async fn request(&self, message: ClientMessage) -> Result<ServerMessage, SessionError> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(Command { message, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        timeout(self.request_timeout, answer)
            .await
            .map_err(|_| SessionError::Timeout(self.request_timeout))?
            .map_err(|_| SessionError::Closed)
    }
}

// =============================================================================
// TASK
// =============================================================================

/// What a team had accepted in a turn, for answering late retries.
#[derive(Clone, Debug, Default)]
struct Settled {
    commit: Option<Option<Digest>>,
    proof: Option<HiddenMove>,
}

struct SessionTask {
    id: Uuid,
    game: Match,
    max_turns: u32,
    forfeit_on_bad_proof: bool,
    settled: BTreeMap<(u32, Team), Settled>,
    announced: BTreeSet<PawnId>,
    events: broadcast::Sender<MatchEvent>,
    phase: watch::Sender<Phase>,
}

impl SessionTask {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        while let Some(command) = inbox.recv().await {
            let reply = self.handle(command.message);
            if command.reply.send(reply).is_err() {
                debug!(match_id = %self.id, "caller went away before the reply");
            }
        }
        debug!(match_id = %self.id, "session task stopped");
    }

    #[instrument(skip(self, message), fields(match_id = %self.id, kind = message.kind()))]
    fn handle(&mut self, message: ClientMessage) -> ServerMessage {
        let before = self.game.phase();
        let reply = match self.dispatch(message) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(code = ?err.code, reason = %err.message, "submission rejected");
                self.after(before);
                return ServerMessage::Error(err);
            }
        };
        self.after(before);
        match reply {
            ServerMessage::Ack(ack) => ServerMessage::Ack(self.ack(ack.submission)),
            other => other,
        }
    }

    fn dispatch(&mut self, message: ClientMessage) -> Result<ServerMessage, ServerError> {
        let submission = match message {
            ClientMessage::SubmitSetup { team, commitment } => {
                let root = commitment.root;
                let submission = self.game.submit_setup(team, commitment)?;
                if submission == Submission::Accepted {
                    self.emit(MatchEvent::SetupCommitted { team, root });
                }
                submission
            }
            ClientMessage::CommitMove { team, turn, hash } => {
                if turn < self.game.state().turn {
                    return self.late_retry(turn, team, |s| s.commit == Some(hash));
                }
                self.check_turn(turn)?;
                let submission = self.game.commit_move(team, hash)?;
                self.settled.entry((turn, team)).or_default().commit = Some(hash);
                submission
            }
            ClientMessage::ProveMove { team, turn, hidden } => {
                if turn < self.game.state().turn {
                    return self.late_retry(turn, team, |s| s.proof == Some(hidden));
                }
                self.check_turn(turn)?;
                let submission = self.game.prove_move(team, hidden)?;
                self.settled.entry((turn, team)).or_default().proof = Some(hidden);
                submission
            }
            ClientMessage::ProveRank { team, hidden, proof } => {
                match self.game.prove_rank(team, hidden, proof) {
                    Ok(submission) => submission,
                    Err(err) => return Err(self.penalize(team, err)),
                }
            }
            ClientMessage::Forfeit { team } => {
                self.game.forfeit(team)?;
                Submission::Accepted
            }
            ClientMessage::SyncRequest => return Ok(ServerMessage::Sync(self.snapshot())),
            ClientMessage::Ping { timestamp } => {
                let server_time = chrono::Utc::now().timestamp_millis().max(0) as u64;
                return Ok(ServerMessage::Pong { timestamp, server_time });
            }
        };
        Ok(ServerMessage::Ack(self.ack(submission)))
    }

    /// A rank proof that does not verify cannot be fixed by retrying, so
    /// the side loses the match unless the session is configured otherwise.
    fn penalize(&mut self, team: Team, err: ProtocolError) -> ServerError {
        if self.forfeit_on_bad_proof && matches!(err, ProtocolError::ProofMismatch(_)) {
            warn!(match_id = %self.id, %team, %err, "rank proof failed, side forfeits");
            if let Err(end) = self.game.forfeit(team) {
                warn!(match_id = %self.id, %end, "could not forfeit");
            }
        }
        err.into()
    }

    fn check_turn(&self, turn: u32) -> Result<(), ServerError> {
        let current = self.game.state().turn;
        if turn > current {
            return Err(ServerError {
                code: ErrorCode::WrongTurn,
                message: format!("turn {turn} has not started, current turn is {current}"),
            });
        }
        Ok(())
    }

    /// A retry for a turn that has already been resolved.
    fn late_retry(
        &self,
        turn: u32,
        team: Team,
        same: impl Fn(&Settled) -> bool,
    ) -> Result<ServerMessage, ServerError> {
        match self.settled.get(&(turn, team)) {
            Some(settled) if same(settled) => Ok(ServerMessage::Ack(self.ack(Submission::Duplicate))),
            Some(_) => Err(ProtocolError::ConflictingSubmission.into()),
            None => Err(ServerError {
                code: ErrorCode::WrongTurn,
                message: format!("turn {turn} is over"),
            }),
        }
    }

    /// Publish whatever the last accepted submission changed.
    fn after(&mut self, before: Phase) {
        if before == Phase::SetupCommit && self.game.phase() == Phase::MoveCommit {
            self.emit(MatchEvent::MatchStarted);
        }

        if self.game.phase() == Phase::RankProve {
            let fresh: Vec<PawnId> = self
                .game
                .pending_reveals()
                .iter()
                .filter(|p| !self.announced.contains(*p))
                .copied()
                .collect();
            if !fresh.is_empty() {
                self.announced.extend(fresh.iter().copied());
                self.emit(MatchEvent::RevealRequested { turn: self.game.state().turn, pawns: fresh });
            }
        }

        if self.game.phase() == Phase::Resolved {
            if let Some(delta) = self.game.last_delta() {
                self.emit(MatchEvent::TurnResolved { delta: Box::new(delta.clone()) });
            }
            self.announced.clear();
            self.close_turn();
        }

        if before != Phase::Ended && self.game.phase() == Phase::Ended {
            if let Some(outcome) = self.game.outcome() {
                info!(match_id = %self.id, ?outcome, turn = self.game.state().turn, "match over");
                self.emit(MatchEvent::MatchEnded { outcome, turn: self.game.state().turn });
            }
        }
        self.phase.send_replace(self.game.phase());
    }

    /// Leave `Resolved`, applying the turn cap.
    fn close_turn(&mut self) {
        let turn = self.game.state().turn;
        let result = if self.game.outcome().is_none() && turn >= self.max_turns {
            info!(match_id = %self.id, turn, "turn limit reached");
            self.game.end(MatchOutcome::Draw { reason: WinReason::TurnLimit })
        } else {
            self.game.advance().map(|_| ())
        };
        if let Err(err) = result {
            warn!(match_id = %self.id, %err, "could not close turn");
        }
        // Only the turn just resolved can still see retries
        self.settled.retain(|(t, _), _| t + 1 >= turn);
    }

    fn ack(&self, submission: Submission) -> Ack {
        Ack {
            submission,
            phase: self.game.phase(),
            turn: self.game.state().turn,
            pending: self.game.pending_reveals().iter().copied().collect(),
        }
    }

    fn snapshot(&self) -> MatchSnapshot {
        let state = self.game.state();
        MatchSnapshot {
            phase: self.game.phase(),
            turn: state.turn,
            pending: self.game.pending_reveals().iter().copied().collect(),
            pawns: state.pawns.values().cloned().collect(),
            state_hash: state.compute_hash(),
            outcome: self.game.outcome(),
        }
    }

    fn emit(&self, event: MatchEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Registry of running matches.
pub struct SessionManager {
    config: SessionConfig,
    board: Arc<Board>,
    rules: Arc<RankRules>,
    sessions: RwLock<BTreeMap<Uuid, MatchSession>>,
}

impl SessionManager {
    /// Manager for classic matches.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_rules(config, Arc::new(Board::classic()), Arc::new(RankRules::classic()))
    }

    /// Manager for matches on a custom board and rule set.
    pub fn with_rules(config: SessionConfig, board: Arc<Board>, rules: Arc<RankRules>) -> Self {
        Self {
            config,
            board,
            rules,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a new match.
    pub async fn create_session(&self) -> MatchSession {
        let id = Uuid::new_v4();
        let session = MatchSession::spawn(id, self.board.clone(), self.rules.clone(), &self.config);
        self.sessions.write().await.insert(id, session.clone());
        session
    }

    /// Look up a session.
    pub async fn get_session(&self, id: &Uuid) -> Result<MatchSession, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(SessionError::NotFound(*id))
    }

    /// Drop a session. Its task stops once every handle is gone.
    pub async fn remove_session(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Forget ended matches. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.phase() != Phase::Ended);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "ended sessions cleaned up");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::game::movement::legal_moves;
    use crate::game::setup::auto_setup;
    use crate::proof::agent::Agent;
    use crate::proof::vault::MemoryStore;

    type TestAgent = Agent<MemoryStore, DeterministicRng>;

    fn config() -> SessionConfig {
        SessionConfig { request_timeout: Duration::from_secs(2), ..Default::default() }
    }

    fn ack(reply: ServerMessage) -> Ack {
        match reply {
            ServerMessage::Ack(ack) => ack,
            other => panic!("expected ack, got {other:?}"),
        }
    }

    fn error_code(reply: ServerMessage) -> ErrorCode {
        match reply {
            ServerMessage::Error(err) => err.code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    async fn set_up(session: &MatchSession) -> [TestAgent; 2] {
        let board = Board::classic();
        let rules = RankRules::classic();
        let mut agents = [
            Agent::new(Team::Red, MemoryStore::new(session.id()), DeterministicRng::new(1)),
            Agent::new(Team::Blue, MemoryStore::new(session.id()), DeterministicRng::new(2)),
        ];
        for (seed, agent) in agents.iter_mut().enumerate() {
            let placement = auto_setup(&board, &rules, agent.team(), &mut DeterministicRng::new(seed as u64));
            let commitment = agent.prepare_setup(&board, &rules, &placement, true).unwrap();
            let reply = session
                .request(ClientMessage::SubmitSetup { team: agent.team(), commitment })
                .await
                .unwrap();
            assert_eq!(ack(reply).submission, Submission::Accepted);
        }
        agents
    }

    async fn synced_state(session: &MatchSession) -> crate::game::state::BoardState {
        let ServerMessage::Sync(snapshot) = session.request(ClientMessage::SyncRequest).await.unwrap() else {
            panic!("expected sync");
        };
        let mut state = crate::game::state::BoardState::new(
            Arc::new(Board::classic()),
            Arc::new(RankRules::classic()),
        );
        state.turn = snapshot.turn;
        state.pawns = snapshot.pawns.into_iter().map(|p| (p.id, p)).collect();
        state
    }

    /// Play one turn where each side makes its first legal move.
    async fn play_turn(session: &MatchSession, agents: &mut [TestAgent; 2]) -> Ack {
        let state = synced_state(session).await;
        let turn = state.turn;
        let mut hashes = Vec::new();
        for agent in agents.iter_mut() {
            let mv = legal_moves(&agent.view(&state), agent.team()).first().copied();
            let commitment = agent.prepare_move(&state, mv).unwrap();
            session
                .request(ClientMessage::CommitMove { team: agent.team(), turn, hash: commitment.hash })
                .await
                .unwrap();
            hashes.push(commitment.hash);
        }

        let mut last = None;
        for (agent, hash) in agents.iter_mut().zip(hashes) {
            let Some(hash) = hash else { continue };
            let hidden = agent.move_proof(&hash).unwrap();
            let reply = session
                .request(ClientMessage::ProveMove { team: agent.team(), turn, hidden })
                .await
                .unwrap();
            agent.acknowledge_move(&hash).unwrap();
            last = Some(ack(reply));
        }

        answer_reveals(session, agents, last.unwrap()).await
    }

    async fn answer_reveals(session: &MatchSession, agents: &mut [TestAgent; 2], mut last: Ack) -> Ack {
        while !last.pending.is_empty() {
            let pawn = last.pending[0];
            let agent = &mut agents[pawn.team as usize];
            let (hidden, proof) = agent.rank_proof(&pawn).unwrap();
            last = ack(session
                .request(ClientMessage::ProveRank { team: pawn.team, hidden, proof })
                .await
                .unwrap());
            agent.acknowledge_rank(&pawn).unwrap();
        }
        last
    }

    #[tokio::test]
    async fn test_setup_starts_match() {
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &config());
        let mut events = session.subscribe_events();
        set_up(&session).await;

        assert!(matches!(events.recv().await.unwrap(), MatchEvent::SetupCommitted { team: Team::Red, .. }));
        assert!(matches!(events.recv().await.unwrap(), MatchEvent::SetupCommitted { team: Team::Blue, .. }));
        assert_eq!(events.recv().await.unwrap(), MatchEvent::MatchStarted);
        assert_eq!(session.phase(), Phase::MoveCommit);
    }

    #[tokio::test]
    async fn test_turn_resolves_and_advances() {
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &config());
        let mut agents = set_up(&session).await;
        let mut events = session.subscribe_events();

        let last = play_turn(&session, &mut agents).await;
        assert_eq!(last.phase, Phase::MoveCommit);
        assert_eq!(last.turn, 1);

        let resolved = loop {
            if let MatchEvent::TurnResolved { delta } = events.recv().await.unwrap() {
                break delta;
            }
        };
        assert_eq!(resolved.turn, 1);
        assert_eq!(resolved.state_hash, synced_state(&session).await.compute_hash());
    }

    #[tokio::test]
    async fn test_late_retry_is_duplicate() {
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &config());
        let mut agents = set_up(&session).await;

        let state = synced_state(&session).await;
        let mv = legal_moves(&agents[0].view(&state), Team::Red)[0];
        let red = agents[0].prepare_move(&state, Some(mv)).unwrap();
        let commit = ClientMessage::CommitMove { team: Team::Red, turn: 0, hash: red.hash };
        assert_eq!(ack(session.request(commit.clone()).await.unwrap()).submission, Submission::Accepted);
        assert_eq!(ack(session.request(commit.clone()).await.unwrap()).submission, Submission::Duplicate);

        session
            .request(ClientMessage::CommitMove { team: Team::Blue, turn: 0, hash: None })
            .await
            .unwrap();
        let hidden = agents[0].move_proof(&red.hash.unwrap()).unwrap();
        let reply = ack(session
            .request(ClientMessage::ProveMove { team: Team::Red, turn: 0, hidden })
            .await
            .unwrap());
        let reply = answer_reveals(&session, &mut agents, reply).await;
        assert_eq!(reply.turn, 1);

        // Retried after the turn closed
        assert_eq!(ack(session.request(commit).await.unwrap()).submission, Submission::Duplicate);
        let other = ClientMessage::CommitMove { team: Team::Red, turn: 0, hash: Some([9; 32]) };
        assert_eq!(error_code(session.request(other).await.unwrap()), ErrorCode::ConflictingSubmission);
    }

    /// Red moves, Blue passes, and Blue's audit is left pending.
    async fn pass_audit(session: &MatchSession, agents: &mut [TestAgent; 2]) -> Ack {
        let state = synced_state(session).await;
        let mv = legal_moves(&agents[0].view(&state), Team::Red)[0];
        let red = agents[0].prepare_move(&state, Some(mv)).unwrap();
        for (team, hash) in [(Team::Red, red.hash), (Team::Blue, None)] {
            session.request(ClientMessage::CommitMove { team, turn: 0, hash }).await.unwrap();
        }
        let hidden = agents[0].move_proof(&red.hash.unwrap()).unwrap();
        ack(session
            .request(ClientMessage::ProveMove { team: Team::Red, turn: 0, hidden })
            .await
            .unwrap())
    }

    #[tokio::test]
    async fn test_bad_rank_proof_forfeits() {
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &config());
        let mut agents = set_up(&session).await;
        let mut events = session.subscribe_events();

        let pending = pass_audit(&session, &mut agents).await.pending;
        let pawn = *pending.iter().find(|p| p.team == Team::Blue).unwrap();
        let (mut hidden, proof) = agents[1].rank_proof(&pawn).unwrap();
        hidden.salt[0] ^= 1;
        let reply = session.request(ClientMessage::ProveRank { team: Team::Blue, hidden, proof }).await.unwrap();
        assert_eq!(error_code(reply), ErrorCode::ProofMismatch);
        assert_eq!(session.phase(), Phase::Ended);

        let ended = loop {
            if let MatchEvent::MatchEnded { outcome, .. } = events.recv().await.unwrap() {
                break outcome;
            }
        };
        assert_eq!(ended, MatchOutcome::Winner { team: Team::Red, reason: WinReason::Forfeit });
    }

    #[tokio::test]
    async fn test_bad_rank_proof_kept_open_when_configured() {
        let lenient = SessionConfig { forfeit_on_bad_proof: false, ..config() };
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &lenient);
        let mut agents = set_up(&session).await;

        let pending = pass_audit(&session, &mut agents).await.pending;
        let pawn = *pending.iter().find(|p| p.team == Team::Blue).unwrap();
        let (mut hidden, proof) = agents[1].rank_proof(&pawn).unwrap();
        hidden.salt[0] ^= 1;
        let reply = session.request(ClientMessage::ProveRank { team: Team::Blue, hidden, proof }).await.unwrap();
        assert_eq!(error_code(reply), ErrorCode::ProofMismatch);
        assert_eq!(session.phase(), Phase::RankProve);
    }

    #[tokio::test]
    async fn test_future_turn_rejected() {
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &config());
        set_up(&session).await;
        let reply = session
            .request(ClientMessage::CommitMove { team: Team::Red, turn: 4, hash: None })
            .await
            .unwrap();
        assert_eq!(error_code(reply), ErrorCode::WrongTurn);
        assert_eq!(session.phase(), Phase::MoveCommit);
    }

    #[tokio::test]
    async fn test_turn_limit_draws() {
        let capped = SessionConfig { max_turns: 1, ..config() };
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &capped);
        let mut agents = set_up(&session).await;
        let mut events = session.subscribe_events();

        let last = play_turn(&session, &mut agents).await;
        assert_eq!(last.phase, Phase::Ended);

        let ended = loop {
            if let MatchEvent::MatchEnded { outcome, .. } = events.recv().await.unwrap() {
                break outcome;
            }
        };
        assert_eq!(ended, MatchOutcome::Draw { reason: WinReason::TurnLimit });
    }

    #[tokio::test]
    async fn test_manager_forfeit_and_cleanup() {
        let manager = SessionManager::new(config());
        let session = manager.create_session().await;
        assert_eq!(manager.session_count().await, 1);
        assert!(manager.get_session(&session.id()).await.is_ok());
        assert_eq!(
            manager.get_session(&Uuid::nil()).await.unwrap_err(),
            SessionError::NotFound(Uuid::nil())
        );

        set_up(&session).await;
        let reply = session.request(ClientMessage::Forfeit { team: Team::Blue }).await.unwrap();
        assert_eq!(ack(reply).phase, Phase::Ended);
        let late = session.request(ClientMessage::Forfeit { team: Team::Red }).await.unwrap();
        assert_eq!(error_code(late), ErrorCode::Ended);

        let ServerMessage::Sync(snapshot) = session.request(ClientMessage::SyncRequest).await.unwrap() else {
            panic!("expected sync");
        };
        assert_eq!(snapshot.outcome.and_then(|o| o.winner()), Some(Team::Red));

        assert_eq!(manager.cleanup().await, 1);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_ping() {
        let session = MatchSession::spawn(Uuid::new_v4(), Arc::new(Board::classic()), Arc::new(RankRules::classic()), &config());
        let reply = session.request(ClientMessage::Ping { timestamp: 77 }).await.unwrap();
        assert!(matches!(reply, ServerMessage::Pong { timestamp: 77, .. }));
    }

    #[test]
    fn test_config_from_vars() {
        let vars: BTreeMap<&str, &str> = [
            ("STRATAGEM_SECURITY_MODE", "0"),
            ("STRATAGEM_REQUEST_TIMEOUT_MS", "250"),
            ("STRATAGEM_STORE_DIR", "/var/lib/stratagem"),
            ("STRATAGEM_MAX_TURNS", "not a number"),
            ("STRATAGEM_FORFEIT_ON_BAD_PROOF", "false"),
        ]
        .into_iter()
        .collect();
        let config = SessionConfig::from_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert!(!config.security_mode);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.store_dir, PathBuf::from("/var/lib/stratagem"));
        assert_eq!(config.max_turns, SessionConfig::default().max_turns);
        assert!(!config.forfeit_on_bad_proof);
    }
}
