//! Commit-Reveal Proof System
//!
//! Lets each side commit to hidden data up front and disclose only what a
//! turn actually needs:
//! - salted hash commitments for ranks and moves
//! - a Merkle tree over the setup so single ranks can be proven
//! - the verifier's phase machine
//! - the committing side's agent and its private vault
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - Salted rank and move commitments         │
//! │  merkle.rs       - Binary Merkle tree over setup leaves     │
//! │  protocol.rs     - Verifier phase machine (Match)           │
//! │  vault.rs        - Local secret storage (memory / file)     │
//! │  agent.rs        - Committing player                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod merkle;
pub mod commitment;
pub mod protocol;
pub mod vault;
pub mod agent;

// Re-export key types
pub use merkle::{MerkleTree, MerkleProof, MerkleError, verify, empty_hash};
pub use commitment::{HiddenRank, HiddenMove, SetupCommit};
pub use protocol::{Match, Phase, ProtocolError, SetupCommitment, Submission};
pub use vault::{SecretStore, MemoryStore, FileStore, StoreError, RankSecret, Secrets};
pub use agent::{Agent, MoveCommitment};
