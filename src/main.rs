//! Stratagem Match Server
//!
//! Runs a demo match between two local players through a match session,
//! then replays the revealed moves to check the engine is deterministic.

use std::sync::Arc;
use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stratagem::{
    VERSION,
    core::{
        coord::Coord,
        rng::{DeterministicRng, OsSaltSource, SaltSource},
    },
    game::{
        board::Board,
        movement::{legal_moves, QueuedMove},
        rank::RankRules,
        resolve::{resolve, MatchOutcome},
        setup::{auto_setup, place_army, Placement},
        state::{BoardState, PawnId, Team},
    },
    network::{
        client::{Client, ClientConfig, Transport},
        session::{SessionConfig, SessionManager},
    },
    proof::{
        agent::MoveCommitment,
        protocol::Phase,
        vault::{FileStore, MemoryStore, SecretStore},
        Agent,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Stratagem Server v{}", VERSION);
    let config = SessionConfig::from_env();
    info!(
        security_mode = config.security_mode,
        max_turns = config.max_turns,
        store_dir = %config.store_dir.display(),
        "session config"
    );

    demo_match(config).await
}

/// A finished demo match: everything needed to replay it.
struct Record {
    placements: [Placement; 2],
    moves: Vec<(Option<QueuedMove>, Option<QueuedMove>)>,
    outcome: Option<MatchOutcome>,
    state_hash: [u8; 32],
    positions: Vec<(PawnId, Coord, bool)>,
}

async fn demo_match(config: SessionConfig) -> Result<()> {
    info!("=== Starting Demo Match ===");

    let board = Arc::new(Board::classic());
    let rules = Arc::new(RankRules::classic());
    let manager = SessionManager::with_rules(config.clone(), board.clone(), rules.clone());
    let session = manager.create_session().await;
    let match_id = session.id();
    info!("Match ID: {}", hex::encode(match_id.as_bytes()));

    let client_config = ClientConfig::from_env();
    let vault = FileStore::open(&config.store_dir, match_id).context("failed to open red vault")?;
    let mut red = Client::new(
        session.clone(),
        Agent::new(Team::Red, vault, OsSaltSource),
        client_config.clone(),
        board.clone(),
        rules.clone(),
    );
    let mut blue = Client::new(
        session.clone(),
        Agent::new(Team::Blue, MemoryStore::new(match_id), OsSaltSource),
        client_config,
        board.clone(),
        rules.clone(),
    );

    let seed_of = |label: &[u8]| DeterministicRng::from_match_params(match_id.as_bytes(), label);
    let placements = [
        auto_setup(&board, &rules, Team::Red, &mut seed_of(b"red-setup")),
        auto_setup(&board, &rules, Team::Blue, &mut seed_of(b"blue-setup")),
    ];
    red.setup(&placements[0], config.security_mode).await?;
    blue.setup(&placements[1], config.security_mode).await?;

    let mut picker = seed_of(b"moves");
    let mut moves = Vec::new();
    loop {
        let (snapshot, state) = red.sync().await?;
        if snapshot.phase == Phase::Ended {
            break;
        }
        let red_move = pick(&red, &state, &mut picker);
        let blue_move = pick(&blue, &state, &mut picker);

        let (red_commit, _) = red.commit_move(&state, red_move).await?;
        let (blue_commit, _) = blue.commit_move(&state, blue_move).await?;
        let mut pending = prove(&mut red, state.turn, &red_commit).await?;
        pending = prove(&mut blue, state.turn, &blue_commit).await?.or(pending);

        while let Some(pawns) = pending.take().filter(|p| !p.is_empty()) {
            let after_red = red.answer_reveals(&pawns).await?;
            let after_blue = blue.answer_reveals(&pawns).await?;
            pending = after_blue.or(after_red).map(|ack| ack.pending);
        }
        moves.push((red_move, blue_move));

        if state.turn % 50 == 0 {
            info!("Turn {}: red {} alive, blue {} alive", state.turn, state.alive_count(Team::Red), state.alive_count(Team::Blue));
        }
    }

    let (snapshot, _) = red.sync().await?;
    red.finish()?;
    blue.finish()?;
    if let Err(err) = red.into_agent().into_store().destroy() {
        warn!(%err, "could not remove red vault");
    }
    manager.cleanup().await;

    info!("=== Match Results ===");
    match snapshot.outcome {
        Some(MatchOutcome::Winner { team, reason }) => info!("Winner: {} ({:?})", team, reason),
        Some(MatchOutcome::Draw { reason }) => info!("Draw ({:?})", reason),
        None => warn!("match ended without an outcome"),
    }
    info!("Turns played: {}", snapshot.turn);
    info!("Final State Hash: {}", hex::encode(snapshot.state_hash));

    let record = Record {
        placements,
        moves,
        outcome: snapshot.outcome,
        state_hash: snapshot.state_hash,
        positions: snapshot.pawns.iter().map(|p| (p.id, p.position, p.alive)).collect(),
    };
    verify_replay(&record, board, rules)
}

/// Pick a random legal move from the player's own view.
fn pick<T: Transport, S: SecretStore, R: SaltSource>(
    client: &Client<T, S, R>,
    state: &BoardState,
    rng: &mut DeterministicRng,
) -> Option<QueuedMove> {
    let view = client.agent().view(state);
    rng.choose(&legal_moves(&view, client.agent().team())).copied()
}

async fn prove<T: Transport, S: SecretStore, R: SaltSource>(
    client: &mut Client<T, S, R>,
    turn: u32,
    commitment: &MoveCommitment,
) -> Result<Option<Vec<PawnId>>> {
    Ok(client.prove_move(turn, commitment).await?.map(|ack| ack.pending))
}

/// Replay with every rank known and compare against the session's result.
fn verify_replay(record: &Record, board: Arc<Board>, rules: Arc<RankRules>) -> Result<()> {
    info!("=== Verifying Determinism ===");

    let replay = || -> Result<(BoardState, Option<MatchOutcome>)> {
        let mut state = BoardState::new(board.clone(), rules.clone());
        for (team, placement) in Team::BOTH.into_iter().zip(&record.placements) {
            place_army(&mut state, team, placement.iter().map(|(c, r)| (*c, Some(*r))))?;
        }
        let mut outcome = None;
        for (red, blue) in &record.moves {
            let (next, delta) = resolve(&state, red.as_ref(), blue.as_ref())?;
            state = next;
            outcome = delta.outcome;
        }
        Ok((state, outcome))
    };

    let (first, outcome) = replay()?;
    let (second, _) = replay()?;
    let first_hash = first.compute_hash();
    info!("Replay State Hash: {}", hex::encode(first_hash));
    info!("Session State Hash: {}", hex::encode(record.state_hash));

    if first_hash != second.compute_hash() {
        bail!("DETERMINISM FAILURE: replays disagree");
    }
    for (id, position, alive) in &record.positions {
        let pawn = first.pawn(id).context("replay lost a pawn")?;
        if pawn.position != *position || pawn.alive != *alive {
            bail!("DETERMINISM FAILURE: {} differs between session and replay", id);
        }
    }
    if let Some(outcome) = outcome {
        if record.outcome != Some(outcome) {
            bail!("DETERMINISM FAILURE: outcome {:?} vs {:?}", outcome, record.outcome);
        }
    }
    info!("DETERMINISM VERIFIED: replays agree with the session");
    Ok(())
}
