//! transaction submission and confirmation.
//!
//! `submit` signs with a fresh blockhash and broadcasts once. `await_confirmation`
//! drives a single select loop over four sources: the rebroadcast ticker, the
//! status poll ticker, the ledger's push notification and the deadline. the
//! first decisive source wins. explicit errors and deadlines are classified
//! with a non-mutating simulation. nothing here retries a failed transaction.

use std::time::Duration;

use crank_traits::{LedgerClient, LedgerError, SignatureStatus};
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("insufficient funds: need {needed} lamports, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
}

/// how a broadcast transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    /// no confirmation before the deadline and a clean simulation.
    TimedOut,
    /// explicit failure; `reason` is the last program log line or the raw error.
    Rejected { reason: String },
}

/// a signed, broadcast transaction awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub signature: Signature,
    pub transaction: Transaction,
    pub instructions: Vec<Instruction>,
    pub signers: Vec<Pubkey>,
    pub first_broadcast: Instant,
}

/// confirmation timing.
#[derive(Debug, Clone, Copy)]
pub struct SubmitterConfig {
    pub rebroadcast_interval: Duration,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl From<&Config> for SubmitterConfig {
    fn from(config: &Config) -> Self {
        Self {
            rebroadcast_interval: config.rebroadcast_interval,
            poll_interval: config.poll_interval,
            confirm_timeout: config.confirm_timeout,
        }
    }
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

pub struct TransactionSubmitter<L> {
    ledger: L,
    config: SubmitterConfig,
}

impl<L: LedgerClient> TransactionSubmitter<L> {
    pub fn new(ledger: L, config: SubmitterConfig) -> Self {
        Self { ledger, config }
    }

    #[inline]
    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    #[inline]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// fail before any broadcast if `payer` holds less than `needed` lamports.
    pub async fn ensure_funds(&self, payer: &Pubkey, needed: u64) -> Result<u64, SubmitError> {
        let available = self.ledger.balance(payer).await?;
        if available < needed {
            return Err(SubmitError::InsufficientFunds { needed, available });
        }
        Ok(available)
    }

    /// sign with a fresh blockhash and broadcast once. the first signer pays fees.
    pub async fn submit(
        &self,
        instructions: Vec<Instruction>,
        signers: &[&Keypair],
    ) -> Result<PendingTransaction, SubmitError> {
        let payer = signers
            .first()
            .map(|k| k.pubkey())
            .ok_or_else(|| SubmitError::Signing("no fee payer".to_string()))?;

        let blockhash = self.ledger.latest_blockhash().await?;
        let message = Message::new(&instructions, Some(&payer));
        let mut transaction = Transaction::new_unsigned(message);
        transaction
            .try_sign(signers, blockhash)
            .map_err(|e| SubmitError::Signing(e.to_string()))?;

        let signature = self.ledger.send_transaction(&transaction).await?;
        tracing::debug!(%signature, instructions = instructions.len(), "transaction sent");

        Ok(PendingTransaction {
            signature,
            transaction,
            instructions,
            signers: signers.iter().map(|k| k.pubkey()).collect(),
            first_broadcast: Instant::now(),
        })
    }

    /// wait for `pending` to confirm, rebroadcasting until the deadline.
    pub async fn await_confirmation(
        &self,
        pending: &PendingTransaction,
        timeout: Duration,
    ) -> Result<Confirmation, SubmitError> {
        let signature = &pending.signature;
        let start = Instant::now();

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut rebroadcast = interval_at(
            start + self.config.rebroadcast_interval,
            self.config.rebroadcast_interval,
        );
        rebroadcast.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = interval_at(start + self.config.poll_interval, self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let notification = self.ledger.wait_signature_event(signature);
        tokio::pin!(notification);
        let mut notification_live = true;

        loop {
            tokio::select! {
                event = &mut notification, if notification_live => {
                    notification_live = false;
                    match event {
                        Ok(SignatureStatus::Confirmed) => return Ok(self.confirmed(pending)),
                        Ok(SignatureStatus::Failed(err)) => {
                            return self.classify(pending, Some(err)).await;
                        }
                        Ok(SignatureStatus::Pending) => {}
                        Err(e) => tracing::debug!(%signature, "notification unavailable: {}", e),
                    }
                }
                _ = poll.tick() => {
                    match self.ledger.signature_status(signature).await {
                        Ok(SignatureStatus::Confirmed) => return Ok(self.confirmed(pending)),
                        Ok(SignatureStatus::Failed(err)) => {
                            return self.classify(pending, Some(err)).await;
                        }
                        Ok(SignatureStatus::Pending) => {}
                        Err(e) => tracing::debug!(%signature, "status poll failed: {}", e),
                    }
                }
                _ = rebroadcast.tick() => {
                    if let Err(e) = self.ledger.send_transaction(&pending.transaction).await {
                        tracing::debug!(%signature, "rebroadcast failed: {}", e);
                    }
                }
                _ = &mut deadline => break,
            }
        }

        // a late landing still counts.
        match self.ledger.signature_status(signature).await {
            Ok(SignatureStatus::Confirmed) => Ok(self.confirmed(pending)),
            Ok(SignatureStatus::Failed(err)) => self.classify(pending, Some(err)).await,
            Ok(SignatureStatus::Pending) => self.classify(pending, None).await,
            Err(e) => {
                tracing::debug!(%signature, "final status check failed: {}", e);
                self.classify(pending, None).await
            }
        }
    }

    /// submit and wait with the configured timeout.
    pub async fn send_and_confirm(
        &self,
        instructions: Vec<Instruction>,
        signers: &[&Keypair],
    ) -> Result<(PendingTransaction, Confirmation), SubmitError> {
        let pending = self.submit(instructions, signers).await?;
        let confirmation = self
            .await_confirmation(&pending, self.config.confirm_timeout)
            .await?;
        Ok((pending, confirmation))
    }

    fn confirmed(&self, pending: &PendingTransaction) -> Confirmation {
        tracing::debug!(
            signature = %pending.signature,
            elapsed_ms = pending.first_broadcast.elapsed().as_millis() as u64,
            "transaction confirmed"
        );
        Confirmation::Confirmed
    }

    /// diagnose a failed or silent transaction with a simulation.
    async fn classify(
        &self,
        pending: &PendingTransaction,
        explicit: Option<String>,
    ) -> Result<Confirmation, SubmitError> {
        let simulation = match self.ledger.simulate(&pending.transaction).await {
            Ok(simulation) => simulation,
            Err(e) => {
                tracing::warn!(signature = %pending.signature, "simulation failed: {}", e);
                return Ok(match explicit {
                    Some(reason) => Confirmation::Rejected { reason },
                    None => Confirmation::TimedOut,
                });
            }
        };

        // successful programs log too; logs only explain a failed simulation.
        let logged = simulation.last_program_log().map(str::to_string);
        let reason = match simulation.err {
            Some(err) => Some(logged.unwrap_or(err)),
            None => explicit,
        };

        Ok(match reason {
            Some(reason) => {
                tracing::warn!(signature = %pending.signature, %reason, "transaction rejected");
                Confirmation::Rejected { reason }
            }
            None => {
                tracing::warn!(
                    signature = %pending.signature,
                    elapsed_ms = pending.first_broadcast.elapsed().as_millis() as u64,
                    "transaction timed out"
                );
                Confirmation::TimedOut
            }
        })
    }
}
