//! Turn resolution and proof verification benchmarks.

use std::sync::Arc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use stratagem::core::hash::Digest;
use stratagem::core::rng::DeterministicRng;
use stratagem::game::board::Board;
use stratagem::game::movement::legal_moves;
use stratagem::game::rank::RankRules;
use stratagem::game::resolve::{plan, resolve};
use stratagem::game::setup::{auto_setup, place_army};
use stratagem::game::state::{BoardState, Team};
use stratagem::proof::commitment::HiddenRank;
use stratagem::proof::merkle::{verify, MerkleTree};

fn full_board() -> BoardState {
    let board = Arc::new(Board::classic());
    let rules = Arc::new(RankRules::classic());
    let mut state = BoardState::new(board.clone(), rules.clone());
    for (seed, team) in Team::BOTH.into_iter().enumerate() {
        let placement = auto_setup(&board, &rules, team, &mut DeterministicRng::new(seed as u64));
        place_army(&mut state, team, placement.into_iter().map(|(c, r)| (c, Some(r))))
            .expect("auto setup fits the board");
    }
    state
}

fn bench_resolve(c: &mut Criterion) {
    let state = full_board();
    let red = legal_moves(&state, Team::Red)[0];
    let blue = legal_moves(&state, Team::Blue)[0];

    c.bench_function("plan_opening_turn", |b| {
        b.iter(|| plan(black_box(&state), Some(&red), Some(&blue)))
    });
    c.bench_function("resolve_opening_turn", |b| {
        b.iter(|| resolve(black_box(&state), Some(&red), Some(&blue)).expect("legal turn"))
    });
    c.bench_function("legal_moves_full_army", |b| {
        b.iter(|| legal_moves(black_box(&state), Team::Red))
    });
}

fn bench_merkle(c: &mut Criterion) {
    let state = full_board();
    let mut rng = DeterministicRng::new(9);
    let leaves: Vec<Digest> = state
        .team_pawns(Team::Red)
        .filter_map(|p| Some(HiddenRank::new(p.id, p.rank?, &mut rng).commit()))
        .collect();
    let tree = MerkleTree::build(&leaves);
    let proof = tree.proof(17).expect("40 leaves");

    c.bench_function("merkle_build_40", |b| b.iter(|| MerkleTree::build(black_box(&leaves))));
    c.bench_function("merkle_verify_40", |b| {
        b.iter(|| verify(&tree.root(), black_box(&leaves[17]), &proof))
    });
}

criterion_group!(benches, bench_resolve, bench_merkle);
criterion_main!(benches);
