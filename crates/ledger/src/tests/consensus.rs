use std::collections::VecDeque;

use strata_primitives::ClusterId;

use super::*;
use crate::types::{SnapshotRegister, TxBody, TxKind};
use crate::validator::Validator;

fn node(id: &str) -> NodeId {
    NodeId::new(id).expect("valid id")
}

fn validators(n: usize) -> (Vec<Keypair>, ValidatorSet) {
    let keypairs: Vec<Keypair> = (0..n).map(|_| Keypair::random()).collect();
    let set = ValidatorSet::new(
        keypairs
            .iter()
            .enumerate()
            .map(|(i, kp)| Validator {
                id: node(&format!("v{i}")),
                public_key: kp.public(),
            })
            .collect(),
        None,
    );
    (keypairs, set)
}

fn states(n: usize) -> (Vec<Keypair>, Vec<RoundState>) {
    let (keypairs, set) = validators(n);
    let states = keypairs
        .iter()
        .enumerate()
        .map(|(i, kp)| {
            RoundState::new(
                node(&format!("v{i}")),
                kp.clone(),
                set.clone(),
                StepTimeouts::default(),
            )
        })
        .collect();
    (keypairs, states)
}

fn sample_tx(keypair: &Keypair, origin: &str) -> Transaction {
    let payload = borsh::to_vec(&SnapshotRegister {
        snapshot_id: strata_primitives::SnapshotId::new("snap-1").expect("valid id"),
        root: Hash::digest(b"root"),
        size: 1,
        source_cluster: ClusterId::new("c1").expect("valid id"),
        created_at: 0,
    })
    .expect("serializes");

    Transaction::sign(
        TxBody {
            kind: TxKind::SnapshotRegister,
            payload,
            origin: node(origin),
        },
        keypair,
    )
}

/// Delivers every broadcast to every other validator until the network
/// quiesces; returns each node's committed block, if any.
fn pump(states: &mut [RoundState], initial: Vec<(usize, Vec<Effect>)>) -> Vec<Option<Block>> {
    let mut committed: Vec<Option<Block>> = vec![None; states.len()];
    let mut queue: VecDeque<(usize, ConsensusMsg)> = VecDeque::new();

    let mut absorb =
        |from: usize,
         effects: Vec<Effect>,
         queue: &mut VecDeque<(usize, ConsensusMsg)>,
         committed: &mut Vec<Option<Block>>| {
            for effect in effects {
                match effect {
                    Effect::Broadcast(msg) => queue.push_back((from, msg)),
                    Effect::Commit(block) => {
                        assert!(committed[from].is_none(), "double commit at one height");
                        committed[from] = Some(block);
                    }
                    Effect::ScheduleTimeout { .. } => {}
                }
            }
        };

    for (from, effects) in initial {
        absorb(from, effects, &mut queue, &mut committed);
    }

    while let Some((from, msg)) = queue.pop_front() {
        for (idx, state) in states.iter_mut().enumerate() {
            if idx == from {
                continue;
            }
            let effects = state.on_message(msg.clone());
            absorb(idx, effects, &mut queue, &mut committed);
        }
    }

    committed
}

#[test]
fn test_single_validator_commits_alone() {
    let (keypairs, mut states) = states(1);

    let tx = sample_tx(&keypairs[0], "v0");
    let effects = states[0].start_height(1, Hash::ZERO, vec![tx.clone()]);
    let committed = pump(&mut states, vec![(0, effects)]);

    let block = committed[0].clone().expect("should commit");
    assert_eq!(block.header.height, 1);
    assert_eq!(block.transactions, vec![tx]);
    assert_eq!(block.commits.len(), 1);
}

#[test]
fn test_four_validators_commit_the_same_block() {
    let (keypairs, mut states) = states(4);

    // Height 1, round 0: proposer is v1.
    let tx = sample_tx(&keypairs[1], "v1");
    let mut initial = Vec::new();
    for (i, state) in states.iter_mut().enumerate() {
        let candidates = if i == 1 { vec![tx.clone()] } else { Vec::new() };
        initial.push((i, state.start_height(1, Hash::ZERO, candidates)));
    }

    let committed = pump(&mut states, initial);

    let first = committed[0].clone().expect("v0 should commit");
    for block in &committed {
        let block = block.as_ref().expect("every validator commits");
        assert_eq!(block.hash(), first.hash(), "single block per height");
        assert_eq!(block.header.proposer, node("v1"));
        assert!(block.commits.len() as u64 >= states[0].validators().quorum());
    }
}

#[test]
fn test_commit_signatures_satisfy_proof_quorum() {
    let (keypairs, mut states) = states(4);

    let tx = sample_tx(&keypairs[1], "v1");
    let mut initial = Vec::new();
    for (i, state) in states.iter_mut().enumerate() {
        let candidates = if i == 1 { vec![tx.clone()] } else { Vec::new() };
        initial.push((i, state.start_height(1, Hash::ZERO, candidates)));
    }
    let committed = pump(&mut states, initial);
    let block = committed[0].clone().expect("should commit");

    let message = vote_signing_bytes(VoteStep::Precommit, 1, Some(block.hash()));
    for commit in &block.commits {
        let public = states[0]
            .validators()
            .public_key(&commit.validator)
            .expect("known validator");
        assert!(strata_crypto::verify(public, &message, &commit.signature).is_ok());
    }
}

#[test]
fn test_minority_cannot_commit() {
    // 4 validators, quorum 3: with only the proposer and one peer online,
    // precommit quorum is unreachable.
    let (keypairs, mut states) = states(4);

    let tx = sample_tx(&keypairs[1], "v1");
    let effects_proposer = states[1].start_height(1, Hash::ZERO, vec![tx]);
    let effects_peer = states[2].start_height(1, Hash::ZERO, Vec::new());

    // Only route between v1 and v2.
    let set = states[0].validators().clone();
    let placeholder = |name: &str| {
        RoundState::new(
            node(name),
            keypairs[0].clone(),
            set.clone(),
            StepTimeouts::default(),
        )
    };
    let mut pair = [
        std::mem::replace(&mut states[1], placeholder("placeholder-a")),
        std::mem::replace(&mut states[2], placeholder("placeholder-b")),
    ];
    let committed = pump(&mut pair, vec![(0, effects_proposer), (1, effects_peer)]);

    assert!(committed.iter().all(Option::is_none));
}

#[test]
fn test_timeout_rotates_proposer_and_doubles_delay() {
    let (_, mut states) = states(4);

    // v0 is not the proposer at (1, 0); nothing to propose, so only the
    // propose timeout is scheduled.
    let effects = states[0].start_height(1, Hash::ZERO, Vec::new());
    assert_eq!(effects.len(), 1);
    let Effect::ScheduleTimeout { step, round, delay } = &effects[0] else {
        panic!("expected a scheduled timeout");
    };
    assert_eq!((*step, *round), (Step::Propose, 0));
    let base = *delay;

    let effects = states[0].on_timeout(Step::Propose, 0);
    assert_eq!(states[0].round(), 1);
    let Effect::ScheduleTimeout { delay, round, .. } = &effects[0] else {
        panic!("expected a scheduled timeout");
    };
    assert_eq!(*round, 1);
    assert_eq!(*delay, base * 2);

    // A stale timeout from the old round is ignored.
    assert!(states[0].on_timeout(Step::Propose, 0).is_empty());
}

#[test]
fn test_wrong_proposer_is_refused() {
    let (keypairs, mut states) = states(4);

    // v2 proposes at (1, 0) even though v1 holds the slot.
    let tx = sample_tx(&keypairs[2], "v2");
    let effects = states[2].start_height(1, Hash::ZERO, vec![tx]);
    // v2 is not the proposer, so it must not broadcast a proposal.
    assert!(effects
        .iter()
        .all(|e| !matches!(e, Effect::Broadcast(ConsensusMsg::Proposal(_)))));

    // Forge one anyway and make sure honest validators prevote nil.
    let block = Block {
        header: BlockHeader {
            height: 1,
            prev_hash: Hash::ZERO,
            merkle_root: Hash::ZERO,
            proposer: node("v2"),
            timestamp: 0,
        },
        transactions: Vec::new(),
        commits: Vec::new(),
    };
    let forged = Proposal {
        round: 0,
        block,
        proposer: node("v2"),
        signature: keypairs[2].sign(b"not the canonical bytes"),
    };

    let _ = states[0].start_height(1, Hash::ZERO, Vec::new());
    let effects = states[0].on_message(ConsensusMsg::Proposal(forged));

    let nil_prevote = effects.iter().any(|e| {
        matches!(
            e,
            Effect::Broadcast(ConsensusMsg::Vote(Vote {
                step: VoteStep::Prevote,
                block_hash: None,
                ..
            }))
        )
    });
    assert!(nil_prevote);
}

#[test]
fn test_votes_from_strangers_are_ignored() {
    let (_, mut states) = states(4);
    let stranger = Keypair::random();

    let _ = states[0].start_height(1, Hash::ZERO, Vec::new());

    let vote = Vote {
        height: 1,
        round: 0,
        step: VoteStep::Prevote,
        block_hash: Some(Hash::digest(b"whatever")),
        voter: node("intruder"),
        signature: stranger.sign(b"junk"),
    };
    assert!(states[0].on_message(ConsensusMsg::Vote(vote)).is_empty());
}
