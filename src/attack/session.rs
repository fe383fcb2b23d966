//! Private-fork double-spend sessions
//!
//! A session runs through a fixed sequence of phases:
//!
//! ```text
//! INITIATED -> LEGITIMATE_TX_BROADCAST -> PRIVATE_FORK_MINING -> RACE_EVALUATION -> RESOLVED
//! ```
//!
//! All work happens on a copy of the public chain. The copy replaces the
//! caller's chain only when the session resolves, so an error at any phase
//! leaves the public chain exactly as it was.

use crate::attack::model::{ModelError, SuccessModel};
use crate::core::{
    Amount, Chain, ForkChoice, Transaction, ValidationError, SYSTEM_WALLET,
};
use crate::mining::{Miner, MiningError, RejectionReason};
use crate::network::{adopt_candidate, Candidate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default number of blocks the honest network mines on top of the
/// legitimate transaction before the race is evaluated
pub const DEFAULT_HONEST_CONFIRMATIONS: u64 = 1;

/// Default honest miner identity
pub const DEFAULT_HONEST_MINER: &str = "honest-miner";

/// Attack errors
#[derive(Error, Debug)]
pub enum AttackError {
    #[error("Invalid attack parameters: {0}")]
    InvalidParameters(String),
    #[error("Invalid success model: {0}")]
    Model(#[from] ModelError),
    #[error("Transaction rejected: {0}")]
    Rejected(#[from] RejectionReason),
    #[error("Mining failed: {0}")]
    Mining(#[from] MiningError),
    #[error("Invalid branch: {0}")]
    Validation(#[from] ValidationError),
    #[error("Private branch (length {private_length}) did not replace the public chain (length {public_length})")]
    ForkRejected {
        private_length: usize,
        public_length: usize,
    },
}

/// Phases of an attack session, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackPhase {
    Initiated,
    LegitimateTxBroadcast,
    PrivateForkMining,
    RaceEvaluation,
    Resolved,
}

impl AttackPhase {
    /// The phase that follows, or `None` once resolved
    pub fn next(self) -> Option<AttackPhase> {
        match self {
            AttackPhase::Initiated => Some(AttackPhase::LegitimateTxBroadcast),
            AttackPhase::LegitimateTxBroadcast => Some(AttackPhase::PrivateForkMining),
            AttackPhase::PrivateForkMining => Some(AttackPhase::RaceEvaluation),
            AttackPhase::RaceEvaluation => Some(AttackPhase::Resolved),
            AttackPhase::Resolved => None,
        }
    }
}

impl fmt::Display for AttackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttackPhase::Initiated => "INITIATED",
            AttackPhase::LegitimateTxBroadcast => "LEGITIMATE_TX_BROADCAST",
            AttackPhase::PrivateForkMining => "PRIVATE_FORK_MINING",
            AttackPhase::RaceEvaluation => "RACE_EVALUATION",
            AttackPhase::Resolved => "RESOLVED",
        };
        f.write_str(name)
    }
}

/// One entry of the session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackStep {
    pub phase: AttackPhase,
    pub message: String,
}

/// Parameters of one attack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackRequest {
    pub attacker: String,
    pub victim: String,
    /// Attacker-controlled wallet receiving the conflicting payment
    #[serde(default)]
    pub shadow_wallet: Option<String>,
    pub amount: Amount,
    pub blocks_to_mine: u64,
    /// Block the private branch starts from (defaults to the public tip)
    #[serde(default)]
    pub fork_point: Option<u64>,
    /// Overrides the simulator's default model
    #[serde(default)]
    pub success_model: Option<SuccessModel>,
}

impl AttackRequest {
    pub fn new(attacker: &str, victim: &str, amount: Amount, blocks_to_mine: u64) -> Self {
        Self {
            attacker: attacker.to_string(),
            victim: victim.to_string(),
            shadow_wallet: None,
            amount,
            blocks_to_mine,
            fork_point: None,
            success_model: None,
        }
    }

    pub fn with_shadow_wallet(mut self, wallet: &str) -> Self {
        self.shadow_wallet = Some(wallet.to_string());
        self
    }

    pub fn with_fork_point(mut self, index: u64) -> Self {
        self.fork_point = Some(index);
        self
    }

    pub fn with_success_model(mut self, model: SuccessModel) -> Self {
        self.success_model = Some(model);
        self
    }

    /// The shadow wallet, `<attacker>-shadow` unless set
    pub fn shadow_wallet(&self) -> String {
        self.shadow_wallet
            .clone()
            .unwrap_or_else(|| format!("{}-shadow", self.attacker))
    }
}

/// Terminal result of an attack session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub successful: bool,
    pub steps: Vec<AttackStep>,
    pub probability_used: f64,
    pub model: SuccessModel,
    /// Whether the private branch was strictly longer before any catch-up
    pub natural_win: bool,
    pub fork_point: u64,
    /// Final private branch length
    pub private_length: usize,
    /// Public chain length when the race was evaluated
    pub public_length: usize,
    pub catch_up_blocks: u64,
    pub legitimate_tx_id: String,
    pub shadow_tx_id: String,
    pub attacker: String,
    pub victim: String,
    pub shadow_wallet: String,
    pub amount: Amount,
    pub hash_power_share: Option<f64>,
}

/// Session log that only ever moves forward through the phases
struct SessionLog {
    phase: AttackPhase,
    steps: Vec<AttackStep>,
}

impl SessionLog {
    fn start(message: String) -> Self {
        let mut log = Self {
            phase: AttackPhase::Initiated,
            steps: Vec::new(),
        };
        log.note(message);
        log
    }

    /// Move to the next phase and record its first step
    fn advance(&mut self, message: String) {
        if let Some(next) = self.phase.next() {
            self.phase = next;
        }
        self.note(message);
    }

    fn note(&mut self, message: String) {
        log::info!("[{}] {}", self.phase, message);
        self.steps.push(AttackStep {
            phase: self.phase,
            message,
        });
    }
}

/// Runs attack sessions against a chain
#[derive(Debug, Clone)]
pub struct AttackSimulator {
    /// Miner extending the public chain during the attack
    pub honest_miner: String,
    /// Public blocks mined after the legitimate transaction is broadcast
    pub honest_confirmations: u64,
    /// Model used when a request does not carry one
    pub default_model: SuccessModel,
}

impl Default for AttackSimulator {
    fn default() -> Self {
        Self {
            honest_miner: DEFAULT_HONEST_MINER.to_string(),
            honest_confirmations: DEFAULT_HONEST_CONFIRMATIONS,
            default_model: SuccessModel::default(),
        }
    }
}

impl AttackSimulator {
    pub fn new(honest_miner: &str, honest_confirmations: u64, default_model: SuccessModel) -> Self {
        Self {
            honest_miner: honest_miner.to_string(),
            honest_confirmations,
            default_model,
        }
    }

    fn check(&self, public: &Chain, request: &AttackRequest, model: &SuccessModel) -> Result<(), AttackError> {
        let invalid = |msg: String| Err(AttackError::InvalidParameters(msg));
        let shadow = request.shadow_wallet();

        for (role, wallet) in [
            ("attacker", request.attacker.as_str()),
            ("victim", request.victim.as_str()),
            ("shadow wallet", shadow.as_str()),
        ] {
            if wallet.trim().is_empty() {
                return invalid(format!("{} must not be empty", role));
            }
            if wallet == SYSTEM_WALLET {
                return invalid(format!("{} cannot be the system wallet", role));
            }
        }
        if request.attacker == request.victim {
            return invalid("attacker and victim must differ".to_string());
        }
        if shadow == request.victim || shadow == request.attacker {
            return invalid("shadow wallet must differ from attacker and victim".to_string());
        }
        if !request.amount.is_positive() {
            return invalid(format!("amount must be positive, got {}", request.amount));
        }
        if request.blocks_to_mine == 0 {
            return invalid("blocks_to_mine must be at least 1".to_string());
        }
        if let Some(index) = request.fork_point {
            if index > public.height() {
                return invalid(format!(
                    "fork point {} is beyond the tip ({})",
                    index,
                    public.height()
                ));
            }
        }
        model.validate()?;
        Ok(())
    }

    /// Run one attack session against `public`
    ///
    /// On `Ok` the public chain reflects the resolved race: either the
    /// honest branch with the legitimate payment, or the attacker's branch
    /// with the shadow payment. On `Err` it is untouched.
    pub fn run<R: Rng + ?Sized>(
        &self,
        public: &mut Chain,
        request: &AttackRequest,
        rng: &mut R,
    ) -> Result<AttackOutcome, AttackError> {
        let model = request.success_model.unwrap_or(self.default_model);
        self.check(public, request, &model)?;

        let attacker = request.attacker.as_str();
        let victim = request.victim.as_str();
        let shadow = request.shadow_wallet();
        let amount = request.amount;
        let fork_point = request.fork_point.unwrap_or_else(|| public.height());
        let mut working = public.clone();

        let mut session = SessionLog::start(format!(
            "{} targets {} for {} (fork point {}, {} private block(s), {})",
            attacker, victim, amount, fork_point, request.blocks_to_mine, model
        ));

        // Legitimate payment, confirmed by the honest network
        let legitimate = Transaction::new(attacker, victim, amount);
        working.submit_transaction(legitimate.clone())?;
        session.advance(format!(
            "Broadcast {} -> {} for {} as {}",
            attacker,
            victim,
            amount,
            legitimate.short_id()
        ));
        let honest = Miner::new(&self.honest_miner);
        for (block, _) in honest.mine_continuously(&mut working, self.honest_confirmations)? {
            session.note(format!(
                "{} mined public block {} ({} transaction(s))",
                self.honest_miner,
                block.index,
                block.tx_count()
            ));
        }
        if working.is_confirmed(legitimate.id()) {
            session.note(format!("{} received {} on the public chain", victim, amount));
        }

        // Conflicting payment on a branch nobody else sees
        let mut private = working.fork_at(fork_point)?;
        let shadow_tx = Transaction::with_timestamp(attacker, &shadow, amount, legitimate.timestamp());
        private.submit_transaction(shadow_tx.clone())?;
        session.advance(format!(
            "Forked at block {}; shadow payment {} -> {} for {} as {}",
            fork_point,
            attacker,
            shadow,
            amount,
            shadow_tx.short_id()
        ));
        if shadow_tx.conflicts_with(&legitimate, private.balance_of(attacker)) {
            session.note(format!(
                "{} cannot fund both payments ({} available at the fork point)",
                attacker,
                private.balance_of(attacker)
            ));
        }
        let private_miner = Miner::new(attacker);
        for (block, _) in private_miner.mine_continuously(&mut private, request.blocks_to_mine)? {
            session.note(format!("{} mined private block {}", attacker, block.index));
        }

        // Race
        let public_length = working.len();
        let natural_win = working.evaluate_candidate(private.blocks())? == ForkChoice::Replace;
        let (successful, probability_used) = model.decide(rng);
        session.advance(format!(
            "Private branch {} vs public {} block(s): {} on length; {} gives p={:.3}, decision: {}",
            private.len(),
            public_length,
            if natural_win { "ahead" } else { "not ahead" },
            model,
            probability_used,
            if successful { "success" } else { "failure" }
        ));

        let mut catch_up_blocks = 0;
        if successful && !natural_win {
            while private.len() <= working.len() {
                private_miner.mine(&mut private)?;
                catch_up_blocks += 1;
            }
            session.note(format!(
                "{} mined {} catch-up block(s), private branch now {} block(s)",
                attacker,
                catch_up_blocks,
                private.len()
            ));
        }

        let private_length = private.len();
        if successful {
            let candidate = Candidate {
                source: format!("{} (private branch)", attacker),
                blocks: private.into_blocks(),
            };
            if adopt_candidate(&mut working, candidate)? != ForkChoice::Replace {
                return Err(AttackError::ForkRejected {
                    private_length,
                    public_length: working.len(),
                });
            }
            session.advance(format!(
                "Private branch adopted; {} holds {}, {} holds {}",
                victim,
                working.balance_of(victim),
                shadow,
                working.balance_of(&shadow)
            ));
        } else {
            session.advance(format!(
                "Private branch discarded; public chain keeps {} -> {}",
                attacker, victim
            ));
        }

        *public = working;

        Ok(AttackOutcome {
            successful,
            steps: session.steps,
            probability_used,
            model,
            natural_win,
            fork_point,
            private_length,
            public_length,
            catch_up_blocks,
            legitimate_tx_id: legitimate.id().to_string(),
            shadow_tx_id: shadow_tx.id().to_string(),
            attacker: attacker.to_string(),
            victim: victim.to_string(),
            shadow_wallet: shadow,
            amount,
            hash_power_share: model.hash_power_share(),
        })
    }
}
