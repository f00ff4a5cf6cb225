//! Local Secret Vault
//!
//! The committing side's private cache of pre-images. Rank secrets and move
//! secrets stay here until the verifier acknowledges the matching proof or
//! the match ends; nothing in here is ever sent unless a proof is requested.
//!
//! [`FileStore`] writes the whole vault with bincode after every change so a
//! restarted client can still answer reveal requests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::hash::Digest;
use crate::game::state::PawnId;
use crate::proof::commitment::{HiddenMove, HiddenRank};
use crate::proof::merkle::MerkleProof;

/// Vault errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("vault io error: {0}")]
    Io(#[from] std::io::Error),

    /// Vault file could not be encoded or decoded.
    #[error("vault encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// The file on disk belongs to another match.
    #[error("vault belongs to match {found}, expected {expected}")]
    WrongMatch {
        /// Match we opened for
        expected: Uuid,
        /// Match recorded in the file
        found: Uuid,
    },
}

/// A rank pre-image with its inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSecret {
    /// Pre-image
    pub hidden: HiddenRank,
    /// Proof against the published setup root
    pub proof: MerkleProof,
}

/// Everything a vault holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    /// Match these secrets belong to
    pub match_id: Uuid,
    /// Rank secrets by pawn
    pub ranks: BTreeMap<PawnId, RankSecret>,
    /// Move secrets by commitment hash
    pub moves: BTreeMap<Digest, HiddenMove>,
    /// Last write
    pub updated_at: DateTime<Utc>,
}

impl Secrets {
    /// Empty vault for a match.
    pub fn new(match_id: Uuid) -> Self {
        Self {
            match_id,
            ranks: BTreeMap::new(),
            moves: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Private storage for commitment pre-images.
pub trait SecretStore: Send {
    /// Current contents.
    fn secrets(&self) -> &Secrets;

    /// Mutable contents; call [`SecretStore::flush`] afterwards.
    fn secrets_mut(&mut self) -> &mut Secrets;

    /// Persist the current contents.
    fn flush(&mut self) -> Result<(), StoreError>;

    /// Cache a rank secret.
    fn put_rank(&mut self, hidden: HiddenRank, proof: MerkleProof) -> Result<(), StoreError> {
        self.secrets_mut().ranks.insert(hidden.pawn, RankSecret { hidden, proof });
        self.flush()
    }

    /// Cache many rank secrets with a single write.
    fn put_ranks(&mut self, secrets: Vec<RankSecret>) -> Result<(), StoreError> {
        let ranks = &mut self.secrets_mut().ranks;
        for secret in secrets {
            ranks.insert(secret.hidden.pawn, secret);
        }
        self.flush()
    }

    /// Rank secret of a pawn.
    fn rank(&self, pawn: &PawnId) -> Option<&RankSecret> {
        self.secrets().ranks.get(pawn)
    }

    /// Forget a rank secret. Returns whether it existed.
    fn discard_rank(&mut self, pawn: &PawnId) -> Result<bool, StoreError> {
        let existed = self.secrets_mut().ranks.remove(pawn).is_some();
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    /// Cache a move secret under its commitment hash.
    fn put_move(&mut self, hidden: HiddenMove) -> Result<Digest, StoreError> {
        let hash = hidden.commit();
        self.secrets_mut().moves.insert(hash, hidden);
        self.flush()?;
        Ok(hash)
    }

    /// Move secret behind a commitment.
    fn hidden_move(&self, hash: &Digest) -> Option<&HiddenMove> {
        self.secrets().moves.get(hash)
    }

    /// Forget a move secret. Returns whether it existed.
    fn discard_move(&mut self, hash: &Digest) -> Result<bool, StoreError> {
        let existed = self.secrets_mut().moves.remove(hash).is_some();
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    /// Forget everything.
    fn clear(&mut self) -> Result<(), StoreError> {
        let secrets = self.secrets_mut();
        secrets.ranks.clear();
        secrets.moves.clear();
        self.flush()
    }
}

/// In-memory vault. Lost on restart.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    secrets: Secrets,
}

impl MemoryStore {
    /// Empty vault.
    pub fn new(match_id: Uuid) -> Self {
        Self { secrets: Secrets::new(match_id) }
    }
}

impl SecretStore for MemoryStore {
    fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    fn secrets_mut(&mut self) -> &mut Secrets {
        &mut self.secrets
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.secrets.updated_at = Utc::now();
        Ok(())
    }
}

/// Vault persisted as one bincode file per match.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    secrets: Secrets,
}

impl FileStore {
    /// Open (or create) the vault for a match under `dir`.
    pub fn open(dir: impl AsRef<Path>, match_id: Uuid) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{match_id}.vault"));

        let secrets = if path.exists() {
            let bytes = fs::read(&path)?;
            let secrets: Secrets = bincode::deserialize(&bytes)?;
            if secrets.match_id != match_id {
                return Err(StoreError::WrongMatch { expected: match_id, found: secrets.match_id });
            }
            debug!(
                %match_id,
                ranks = secrets.ranks.len(),
                moves = secrets.moves.len(),
                "vault reopened"
            );
            secrets
        } else {
            Secrets::new(match_id)
        };

        Ok(Self { path, secrets })
    }

    /// File backing this vault.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the vault file.
    pub fn destroy(self) -> Result<(), StoreError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl SecretStore for FileStore {
    fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    fn secrets_mut(&mut self) -> &mut Secrets {
        &mut self.secrets
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.secrets.updated_at = Utc::now();
        let bytes = bincode::serialize(&self.secrets)?;
        let tmp = self.path.with_extension("vault.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
