//! Player Agent
//!
//! The committing side of the protocol. Generates salted pre-images, keeps
//! them in a [`SecretStore`], and hands out exactly the proofs the verifier
//! asks for. Secrets are dropped only on acknowledgement or at match end, so
//! a failed submission can always be retried with the same payload.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::hash::{Digest, short_hex};
use crate::core::rng::SaltSource;
use crate::game::board::Board;
use crate::game::movement::{validate_move, QueuedMove};
use crate::game::rank::{Rank, RankRules};
use crate::game::setup::{validate_setup, Placement};
use crate::game::state::{BoardState, PawnId, Team};
use crate::proof::commitment::{HiddenMove, HiddenRank, SetupCommit};
use crate::proof::merkle::{MerkleProof, MerkleTree};
use crate::proof::protocol::{ProtocolError, SetupCommitment};
use crate::proof::vault::{RankSecret, SecretStore};

/// A team's move commitment for one turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCommitment {
    /// Committing team
    pub team: Team,
    /// Commitment hash, `None` to pass
    #[serde(with = "crate::core::hash::hex_serde::option")]
    pub hash: Option<Digest>,
}

/// One side's local player.
pub struct Agent<S: SecretStore, R: SaltSource> {
    team: Team,
    store: S,
    salts: R,
    army: BTreeMap<PawnId, Rank>,
    setup: Option<SetupCommitment>,
}

impl<S: SecretStore, R: SaltSource> Agent<S, R> {
    /// Create an agent with its vault and salt source.
    pub fn new(team: Team, store: S, salts: R) -> Self {
        Self {
            team,
            store,
            salts,
            army: BTreeMap::new(),
            setup: None,
        }
    }

    /// Side this agent plays.
    pub fn team(&self) -> Team {
        self.team
    }

    /// Own rank of a pawn.
    pub fn own_rank(&self, pawn: &PawnId) -> Option<Rank> {
        self.army.get(pawn).copied()
    }

    /// Vault access.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Take the vault back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Commit to a placement.
    ///
    /// Every rank pre-image and its Merkle proof go into the vault before
    /// the commitment is returned.
    pub fn prepare_setup(
        &mut self,
        board: &Board,
        rules: &RankRules,
        placement: &Placement,
        security_mode: bool,
    ) -> Result<SetupCommitment, ProtocolError> {
        if let Some(existing) = &self.setup {
            return Ok(existing.clone());
        }
        validate_setup(board, rules, self.team, placement)?;

        // Placement is keyed by coordinate, so pawn ids come out ascending
        let hidden: Vec<HiddenRank> = placement
            .iter()
            .map(|(coord, rank)| HiddenRank::new(PawnId::new(self.team, *coord), *rank, &mut self.salts))
            .collect();
        let leaves: Vec<Digest> = hidden.iter().map(HiddenRank::commit).collect();
        let tree = MerkleTree::build(&leaves);

        let secrets = hidden
            .iter()
            .enumerate()
            .map(|(i, h)| Ok(RankSecret { hidden: *h, proof: tree.proof(i)? }))
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        self.store.put_ranks(secrets)?;

        self.army = hidden.iter().map(|h| (h.pawn, h.rank)).collect();
        let commitment = SetupCommitment {
            team: self.team,
            commits: hidden.iter().map(SetupCommit::from).collect(),
            root: tree.root(),
            cleartext: (!security_mode).then(|| hidden.clone()),
        };
        info!(team = %self.team, pawns = hidden.len(), root = %short_hex(&commitment.root), "setup prepared");
        self.setup = Some(commitment.clone());
        Ok(commitment)
    }

    /// The verifier's board with this side's own ranks filled in.
    pub fn view(&self, state: &BoardState) -> BoardState {
        let mut view = state.clone();
        for (pawn, rank) in &self.army {
            view.learn_rank(pawn, *rank);
        }
        view
    }

    /// Commit to this turn's move (`None` passes).
    pub fn prepare_move(
        &mut self,
        state: &BoardState,
        mv: Option<QueuedMove>,
    ) -> Result<MoveCommitment, ProtocolError> {
        let Some(mv) = mv else {
            return Ok(MoveCommitment { team: self.team, hash: None });
        };
        validate_move(&self.view(state), &mv)?;

        let hidden = HiddenMove::new(&mv, &mut self.salts);
        let hash = self.store.put_move(hidden)?;
        debug!(team = %self.team, pawn = %mv.pawn, hash = %short_hex(&hash), "move prepared");
        Ok(MoveCommitment { team: self.team, hash: Some(hash) })
    }

    /// Pre-image behind a move commitment.
    pub fn move_proof(&self, hash: &Digest) -> Result<HiddenMove, ProtocolError> {
        self.store
            .hidden_move(hash)
            .copied()
            .ok_or_else(|| ProtocolError::MissingLocalSecret(format!("move {}", short_hex(hash))))
    }

    /// Rank pre-image and Merkle proof for a pawn.
    pub fn rank_proof(&self, pawn: &PawnId) -> Result<(HiddenRank, MerkleProof), ProtocolError> {
        self.store
            .rank(pawn)
            .map(|s| (s.hidden, s.proof.clone()))
            .ok_or_else(|| ProtocolError::MissingLocalSecret(format!("rank of {pawn}")))
    }

    /// Verifier accepted the move proof.
    pub fn acknowledge_move(&mut self, hash: &Digest) -> Result<(), ProtocolError> {
        self.store.discard_move(hash)?;
        Ok(())
    }

    /// Verifier accepted the rank proof.
    pub fn acknowledge_rank(&mut self, pawn: &PawnId) -> Result<(), ProtocolError> {
        self.store.discard_rank(pawn)?;
        Ok(())
    }

    /// Drop every secret.
    pub fn end_match(&mut self) -> Result<(), ProtocolError> {
        self.store.clear()?;
        self.setup = None;
        info!(team = %self.team, "secrets cleared");
        Ok(())
    }
}
