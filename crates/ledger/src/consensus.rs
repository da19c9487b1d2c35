use core::time::Duration;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use borsh::{to_vec as to_borsh_vec, BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_crypto::Keypair;
use strata_primitives::{Hash, NodeId, Signature};
use tracing::{debug, warn};

use crate::types::{Block, BlockHeader, CommitSig, Transaction};
use crate::validator::ValidatorSet;

/// Consensus steps for one `(height, round)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Propose,
    Prevote,
    Precommit,
    Commit,
}

/// Which vote family a [`Vote`] belongs to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VoteStep {
    Prevote,
    Precommit,
}

/// Canonical bytes a vote signs.
///
/// The round is deliberately excluded: a precommit for the same block at
/// any round carries identical bytes, which lets the commit signature set
/// double as the proof quorum without tracking per-round signatures.
#[must_use]
pub fn vote_signing_bytes(step: VoteStep, height: u64, block_hash: Option<Hash>) -> Vec<u8> {
    to_borsh_vec(&(step, height, block_hash)).expect("vote tuple serializes")
}

/// A prevote or precommit; `block_hash: None` is the nil vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub height: u64,
    pub round: u32,
    pub step: VoteStep,
    pub block_hash: Option<Hash>,
    pub voter: NodeId,
    pub signature: Signature,
}

impl Vote {
    fn sign(
        height: u64,
        round: u32,
        step: VoteStep,
        block_hash: Option<Hash>,
        voter: NodeId,
        keypair: &Keypair,
    ) -> Self {
        let signature = keypair.sign(&vote_signing_bytes(step, height, block_hash));
        Self {
            height,
            round,
            step,
            block_hash,
            voter,
            signature,
        }
    }

    #[must_use]
    pub fn verify(&self, validators: &ValidatorSet) -> bool {
        let Some(public) = validators.public_key(&self.voter) else {
            return false;
        };
        strata_crypto::verify(
            public,
            &vote_signing_bytes(self.step, self.height, self.block_hash),
            &self.signature,
        )
        .is_ok()
    }
}

/// A block candidate broadcast by the round's designated proposer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub round: u32,
    pub block: Block,
    pub proposer: NodeId,
    pub signature: Signature,
}

impl Proposal {
    fn signing_bytes(height: u64, round: u32, block_hash: &Hash) -> Vec<u8> {
        to_borsh_vec(&(height, round, block_hash)).expect("proposal tuple serializes")
    }

    fn sign(round: u32, block: Block, proposer: NodeId, keypair: &Keypair) -> Self {
        let signature = keypair.sign(&Self::signing_bytes(
            block.header.height,
            round,
            &block.hash(),
        ));
        Self {
            round,
            block,
            proposer,
            signature,
        }
    }

    #[must_use]
    pub fn verify(&self, validators: &ValidatorSet) -> bool {
        let Some(public) = validators.public_key(&self.proposer) else {
            return false;
        };
        strata_crypto::verify(
            public,
            &Self::signing_bytes(self.block.header.height, self.round, &self.block.hash()),
            &self.signature,
        )
        .is_ok()
    }
}

/// Everything that crosses the wire between validators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum ConsensusMsg {
    Proposal(Proposal),
    Vote(Vote),
}

/// Per-step base timeouts; each doubles per round so rounds eventually
/// outlast network delays.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StepTimeouts {
    pub propose: Duration,
    pub prevote: Duration,
    pub precommit: Duration,
    pub commit: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            propose: Duration::from_secs(3),
            prevote: Duration::from_secs(1),
            precommit: Duration::from_secs(1),
            commit: Duration::from_secs(1),
        }
    }
}

impl StepTimeouts {
    /// Base timeout for `step`, doubled per elapsed round (capped).
    #[must_use]
    pub fn scaled(&self, step: Step, round: u32) -> Duration {
        let base = match step {
            Step::Propose => self.propose,
            Step::Prevote => self.prevote,
            Step::Precommit => self.precommit,
            Step::Commit => self.commit,
        };
        base * 2u32.saturating_pow(round.min(10))
    }
}

/// What the state machine asks its driver to do.
#[derive(Debug)]
pub enum Effect {
    Broadcast(ConsensusMsg),
    ScheduleTimeout {
        step: Step,
        round: u32,
        delay: Duration,
    },
    Commit(Block),
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// The BFT round state machine for a single height.
///
/// Pure with respect to I/O: inputs are proposals, votes and timeout
/// firings; outputs are [`Effect`]s. The driver owns the clock, the
/// network and the block store. Safety holds for up to `⌊(N-1)/3⌋`
/// Byzantine validators; liveness relies on the doubling timeouts.
#[derive(Debug)]
pub struct RoundState {
    node: NodeId,
    keypair: Keypair,
    validators: ValidatorSet,
    timeouts: StepTimeouts,

    height: u64,
    round: u32,
    step: Step,
    prev_hash: Hash,
    candidate_txs: Vec<Transaction>,

    proposal: Option<Block>,
    /// Block this node has precommitted at this height. While locked, the
    /// node only prevotes for the locked block and re-proposes it when it
    /// becomes proposer, which keeps commits at one height unequivocal.
    locked: Option<Block>,
    prevotes: BTreeMap<NodeId, Option<Hash>>,
    precommits: BTreeMap<NodeId, Vote>,
    committed: bool,
}

impl RoundState {
    #[must_use]
    pub fn new(
        node: NodeId,
        keypair: Keypair,
        validators: ValidatorSet,
        timeouts: StepTimeouts,
    ) -> Self {
        Self {
            node,
            keypair,
            validators,
            timeouts,
            height: 0,
            round: 0,
            step: Step::Commit,
            prev_hash: Hash::ZERO,
            candidate_txs: Vec::new(),
            proposal: None,
            locked: None,
            prevotes: BTreeMap::new(),
            precommits: BTreeMap::new(),
            committed: true,
        }
    }

    #[must_use]
    pub const fn height(&self) -> u64 {
        self.height
    }

    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub const fn step(&self) -> Step {
        self.step
    }

    #[must_use]
    pub const fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// Swaps the validator set (after a committed rotation took effect).
    pub fn set_validators(&mut self, validators: ValidatorSet) {
        self.validators = validators;
    }

    /// Uncommitted candidates, returned to the mempool between heights.
    pub fn take_candidates(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.candidate_txs)
    }

    /// Begins consensus for `height` with this node's drained candidate
    /// batch (empty when another validator proposes).
    pub fn start_height(
        &mut self,
        height: u64,
        prev_hash: Hash,
        candidate_txs: Vec<Transaction>,
    ) -> Vec<Effect> {
        self.height = height;
        self.round = 0;
        self.prev_hash = prev_hash;
        self.candidate_txs = candidate_txs;
        self.locked = None;
        self.committed = false;
        self.begin_round()
    }

    fn begin_round(&mut self) -> Vec<Effect> {
        self.step = Step::Propose;
        self.proposal = None;
        self.prevotes.clear();
        self.precommits.clear();

        let mut effects = vec![Effect::ScheduleTimeout {
            step: Step::Propose,
            round: self.round,
            delay: self.timeouts.scaled(Step::Propose, self.round),
        }];

        let proposer = self.validators.proposer(self.height, self.round).id.clone();
        if proposer == self.node && (self.locked.is_some() || !self.candidate_txs.is_empty()) {
            // Re-propose the locked block if we precommitted one in an
            // earlier round; otherwise build a fresh candidate.
            let block = self.locked.clone().unwrap_or_else(|| {
                let transactions = self.candidate_txs.clone();
                Block {
                    header: BlockHeader {
                        height: self.height,
                        prev_hash: self.prev_hash,
                        merkle_root: Block::compute_tx_root(&transactions),
                        proposer: self.node.clone(),
                        timestamp: now_secs(),
                    },
                    transactions,
                    commits: Vec::new(),
                }
            });

            debug!(height = self.height, round = self.round, "proposing block");
            let proposal =
                Proposal::sign(self.round, block.clone(), self.node.clone(), &self.keypair);
            effects.push(Effect::Broadcast(ConsensusMsg::Proposal(proposal)));
            effects.extend(self.accept_proposal(block));
        }

        effects
    }

    /// Handles an inbound message for the current height.
    pub fn on_message(&mut self, msg: ConsensusMsg) -> Vec<Effect> {
        if self.committed {
            return Vec::new();
        }
        match msg {
            ConsensusMsg::Proposal(proposal) => self.on_proposal(proposal),
            ConsensusMsg::Vote(vote) => self.on_vote(vote),
        }
    }

    fn on_proposal(&mut self, proposal: Proposal) -> Vec<Effect> {
        let header = &proposal.block.header;
        if header.height != self.height || proposal.round != self.round {
            return Vec::new();
        }
        if self.proposal.is_some() || self.step > Step::Propose {
            return Vec::new();
        }

        let expected = &self.validators.proposer(self.height, self.round).id;
        let structurally_valid = proposal.proposer == *expected
            && proposal.verify(&self.validators)
            && header.prev_hash == self.prev_hash
            && header.merkle_root == Block::compute_tx_root(&proposal.block.transactions)
            && proposal.block.transactions.iter().all(|tx| {
                self.validators
                    .public_key(&tx.body.origin)
                    .is_some_and(|public| tx.verify(public).is_ok())
            });

        if structurally_valid {
            self.accept_proposal(proposal.block)
        } else {
            warn!(
                height = self.height,
                round = self.round,
                proposer = %proposal.proposer,
                "invalid proposal, prevoting nil"
            );
            self.step = Step::Prevote;
            let mut effects = vec![Effect::ScheduleTimeout {
                step: Step::Prevote,
                round: self.round,
                delay: self.timeouts.scaled(Step::Prevote, self.round),
            }];
            effects.extend(self.cast_vote(VoteStep::Prevote, None));
            effects
        }
    }

    fn accept_proposal(&mut self, block: Block) -> Vec<Effect> {
        let block_hash = block.hash();

        // While locked on an earlier precommit, only the locked block
        // earns our prevote.
        let prevote_for = match &self.locked {
            Some(locked) if locked.hash() != block_hash => None,
            _ => Some(block_hash),
        };

        self.proposal = Some(block);
        self.step = Step::Prevote;

        let mut effects = vec![Effect::ScheduleTimeout {
            step: Step::Prevote,
            round: self.round,
            delay: self.timeouts.scaled(Step::Prevote, self.round),
        }];
        effects.extend(self.cast_vote(VoteStep::Prevote, prevote_for));
        effects
    }

    fn cast_vote(&mut self, step: VoteStep, block_hash: Option<Hash>) -> Vec<Effect> {
        let vote = Vote::sign(
            self.height,
            self.round,
            step,
            block_hash,
            self.node.clone(),
            &self.keypair,
        );

        let mut effects = vec![Effect::Broadcast(ConsensusMsg::Vote(vote.clone()))];
        effects.extend(self.record_vote(vote));
        effects
    }

    fn on_vote(&mut self, vote: Vote) -> Vec<Effect> {
        if vote.height != self.height || !vote.verify(&self.validators) {
            return Vec::new();
        }
        self.record_vote(vote)
    }

    fn record_vote(&mut self, vote: Vote) -> Vec<Effect> {
        match vote.step {
            VoteStep::Prevote => {
                let _ = self.prevotes.insert(vote.voter.clone(), vote.block_hash);
                self.check_prevote_quorum()
            }
            VoteStep::Precommit => {
                let _ = self.precommits.insert(vote.voter.clone(), vote);
                self.check_precommit_quorum()
            }
        }
    }

    fn check_prevote_quorum(&mut self) -> Vec<Effect> {
        if self.step != Step::Prevote {
            return Vec::new();
        }
        let Some(block) = &self.proposal else {
            return Vec::new();
        };

        let block_hash = block.hash();
        let agreeing = self
            .prevotes
            .values()
            .filter(|hash| **hash == Some(block_hash))
            .count() as u64;

        if agreeing < self.validators.quorum() {
            return Vec::new();
        }

        debug!(height = self.height, round = self.round, "prevote quorum");
        self.step = Step::Precommit;
        self.locked = self.proposal.clone();

        let mut effects = vec![Effect::ScheduleTimeout {
            step: Step::Precommit,
            round: self.round,
            delay: self.timeouts.scaled(Step::Precommit, self.round),
        }];
        effects.extend(self.cast_vote(VoteStep::Precommit, Some(block_hash)));
        effects
    }

    fn check_precommit_quorum(&mut self) -> Vec<Effect> {
        if self.committed {
            return Vec::new();
        }
        let Some(block) = &self.proposal else {
            return Vec::new();
        };

        let block_hash = block.hash();
        let agreeing: Vec<&Vote> = self
            .precommits
            .values()
            .filter(|vote| vote.block_hash == Some(block_hash))
            .collect();

        if (agreeing.len() as u64) < self.validators.quorum() {
            return Vec::new();
        }

        let commits = agreeing
            .iter()
            .map(|vote| CommitSig {
                validator: vote.voter.clone(),
                signature: vote.signature,
            })
            .collect();

        let mut committed = block.clone();
        committed.commits = commits;

        debug!(height = self.height, round = self.round, "precommit quorum, committing");
        self.step = Step::Commit;
        self.committed = true;
        vec![Effect::Commit(committed)]
    }

    /// A scheduled timeout fired. Stale firings (older round, or a step
    /// the machine has moved past) are ignored; otherwise the round
    /// advances with the proposer rotated and timeouts doubled.
    pub fn on_timeout(&mut self, step: Step, round: u32) -> Vec<Effect> {
        if self.committed || round != self.round || step < self.step {
            return Vec::new();
        }

        debug!(
            height = self.height,
            round = self.round,
            ?step,
            "step timed out, advancing round"
        );
        self.round += 1;
        self.begin_round()
    }
}

#[cfg(test)]
#[path = "tests/consensus.rs"]
mod tests;
