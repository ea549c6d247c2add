//! in-memory ledger for tests and local dry runs.
//!
//! accounts live in a hash map. every first broadcast of a signature consumes
//! one scripted [`SendBehavior`] (default `Confirm`); re-broadcasts of a known
//! signature are counted and otherwise ignored. a landing transaction runs the
//! registered effect hook against the account map, which is how callers model
//! program side effects (counter advance, mint account creation).

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::{LedgerClient, LedgerError, SignatureStatus, SimulationOutcome};

pub type AccountMap = HashMap<Pubkey, Vec<u8>>;

/// program side effects of a landed transaction.
pub type Effect = Box<dyn Fn(&Transaction, &mut AccountMap) + Send + Sync>;

/// rent per byte-year times the two-year exemption threshold.
const RENT_LAMPORTS_PER_BYTE: u64 = 6_960;
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

/// what happens to the next new signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendBehavior {
    /// lands and reports confirmed.
    Confirm,
    /// never lands.
    Drop,
    /// lands (effects applied) but no status is ever reported.
    LandUnseen,
    /// lands with an execution error; simulation reports the message as a program log.
    Reject(String),
}

struct State {
    accounts: AccountMap,
    balances: HashMap<Pubkey, u64>,
    statuses: HashMap<Signature, SignatureStatus>,
    rejections: HashMap<Signature, String>,
    script: VecDeque<SendBehavior>,
    sent: Vec<Transaction>,
    broadcasts: usize,
    blockhash: Hash,
    read_failure: Option<String>,
    clean_logs: Vec<String>,
    effect: Option<Effect>,
}

pub struct MemoryLedger {
    state: Mutex<State>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                accounts: HashMap::new(),
                balances: HashMap::new(),
                statuses: HashMap::new(),
                rejections: HashMap::new(),
                script: VecDeque::new(),
                sent: Vec::new(),
                broadcasts: 0,
                blockhash: Hash::new_unique(),
                read_failure: None,
                clean_logs: Vec::new(),
                effect: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_account(&self, key: Pubkey, data: Vec<u8>) {
        self.state().accounts.insert(key, data);
    }

    pub fn account(&self, key: &Pubkey) -> Option<Vec<u8>> {
        self.state().accounts.get(key).cloned()
    }

    pub fn set_balance(&self, key: Pubkey, lamports: u64) {
        self.state().balances.insert(key, lamports);
    }

    /// queue behaviors for the next new signatures, in order.
    pub fn script_sends(&self, behaviors: impl IntoIterator<Item = SendBehavior>) {
        self.state().script.extend(behaviors);
    }

    pub fn on_land(&self, effect: impl Fn(&Transaction, &mut AccountMap) + Send + Sync + 'static) {
        self.state().effect = Some(Box::new(effect));
    }

    /// program log lines a clean simulation reports, as real programs emit them.
    pub fn simulation_logs(&self, lines: impl IntoIterator<Item = impl Into<String>>) {
        self.state().clean_logs = lines.into_iter().map(Into::into).collect();
    }

    /// make every read fail with an rpc error until cleared with `None`.
    pub fn fail_reads(&self, message: Option<&str>) {
        self.state().read_failure = message.map(str::to_string);
    }

    /// report a previously dropped or unseen signature as confirmed.
    pub fn confirm(&self, signature: &Signature) {
        self.state()
            .statuses
            .insert(*signature, SignatureStatus::Confirmed);
    }

    /// distinct transactions broadcast so far.
    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state().sent.clone()
    }

    /// total broadcasts including re-sends.
    pub fn broadcast_count(&self) -> usize {
        self.state().broadcasts
    }

    fn check_reads(state: &State) -> Result<(), LedgerError> {
        match &state.read_failure {
            Some(message) => Err(LedgerError::Rpc(message.clone())),
            None => Ok(()),
        }
    }
}

fn first_signature(tx: &Transaction) -> Result<Signature, LedgerError> {
    tx.signatures
        .first()
        .copied()
        .ok_or_else(|| LedgerError::InvalidResponse("unsigned transaction".to_string()))
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_account_data(&self, key: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let state = self.state();
        Self::check_reads(&state)?;
        Ok(state.accounts.get(key).cloned())
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        let mut state = self.state();
        Self::check_reads(&state)?;
        // every request sees a newer block
        state.blockhash = Hash::new_unique();
        Ok(state.blockhash)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, LedgerError> {
        let signature = first_signature(tx)?;
        let mut guard = self.state();
        let state = &mut *guard;
        state.broadcasts += 1;

        if state.statuses.contains_key(&signature) {
            return Ok(signature);
        }

        state.sent.push(tx.clone());
        let behavior = state.script.pop_front().unwrap_or(SendBehavior::Confirm);

        let lands = !matches!(behavior, SendBehavior::Drop | SendBehavior::Reject(_));
        if lands {
            if let Some(effect) = state.effect.as_ref() {
                effect(tx, &mut state.accounts);
            }
        }

        let status = match behavior {
            SendBehavior::Confirm => SignatureStatus::Confirmed,
            SendBehavior::Drop | SendBehavior::LandUnseen => SignatureStatus::Pending,
            SendBehavior::Reject(message) => {
                state.rejections.insert(signature, message.clone());
                SignatureStatus::Failed(message)
            }
        };
        state.statuses.insert(signature, status);
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, LedgerError> {
        let state = self.state();
        Self::check_reads(&state)?;
        Ok(state
            .statuses
            .get(signature)
            .cloned()
            .unwrap_or(SignatureStatus::Pending))
    }

    async fn wait_signature_event(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, LedgerError> {
        let status = self.state().statuses.get(signature).cloned();
        match status {
            Some(status) if status.is_terminal() => Ok(status),
            _ => futures::future::pending().await,
        }
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, LedgerError> {
        let signature = first_signature(tx)?;
        let state = self.state();
        Ok(match state.rejections.get(&signature) {
            Some(message) => SimulationOutcome {
                err: Some("custom program error".to_string()),
                logs: vec![format!("Program log: {}", message)],
            },
            None => SimulationOutcome {
                err: None,
                logs: state.clean_logs.clone(),
            },
        })
    }

    async fn minimum_balance_for_rent_exemption(&self, len: usize) -> Result<u64, LedgerError> {
        Ok((len as u64 + ACCOUNT_STORAGE_OVERHEAD) * RENT_LAMPORTS_PER_BYTE)
    }

    async fn balance(&self, key: &Pubkey) -> Result<u64, LedgerError> {
        let state = self.state();
        Self::check_reads(&state)?;
        Ok(state.balances.get(key).copied().unwrap_or(0))
    }
}
