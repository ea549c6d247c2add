//! one crank cycle: allocate, mint, publish, finalize, persist.
//!
//! ```text
//! AllocateSlot -> BuildAndSubmitMint -> ConfirmMint -> PublishContent
//!              -> ReconcileMetadata -> PersistRecord -> done
//! ```
//!
//! every step may end the cycle as `Failed`. the record for the recipient
//! decides where a cycle resumes, so a tick interrupted after any on-ledger
//! effect picks up at the next step instead of minting again.

use std::path::PathBuf;
use std::time::Duration;

use crank_codec::MINT_ACCOUNT_LEN;
use crank_content::{ContentPublisher, StorageGateway};
use crank_ledger::{
    Allocation, AllocatorConfig, Confirmation, Recipient, RouterSnapshot, SlotAllocator,
    SubmitterConfig, TransactionSubmitter,
};
use crank_mint::{
    metadata_address, AssetLocator, AssetPayload, ContentDigests, FinalizationState,
    MetadataReconciler, TransactionBuilder,
};
use crank_record::{MintRecord, MintState, RecordStore};
use crank_traits::LedgerClient;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tokio::time::Instant;

use crate::error::{AtStep, CycleError, CycleStep, StepFailure};
use crate::retry::RetryPolicy;

/// spl token account size.
pub const TOKEN_ACCOUNT_LEN: usize = 165;
/// metadata account size.
pub const METADATA_ACCOUNT_LEN: usize = 679;
/// master edition account size.
pub const MASTER_EDITION_LEN: usize = 282;
/// lamports per signature.
pub const SIGNATURE_FEE: u64 = 5_000;

/// mint transaction signs twice, finalize once.
const SIGNATURES_PER_MINT: u64 = 3;

/// why a cycle ended without minting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// asset ordinal at or past the configured supply.
    SoldOut,
    /// the vault has no recipient at the current index yet.
    Drained,
    /// the recipient's record is finalized.
    AlreadyMinted,
    /// the recipient's record failed and needs an operator.
    NeedsReconciliation,
}

impl IdleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdleReason::SoldOut => "sold_out",
            IdleReason::Drained => "drained",
            IdleReason::AlreadyMinted => "already_minted",
            IdleReason::NeedsReconciliation => "needs_reconciliation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Minted,
    Idle(IdleReason),
    Failed { error: CycleError, step: CycleStep },
}

/// what one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub recipient: Option<Pubkey>,
    pub asset_index: Option<u64>,
    pub mint: Option<Pubkey>,
    pub signature: Option<String>,
    pub duration: Duration,
}

impl CycleReport {
    fn empty() -> Self {
        Self {
            outcome: CycleOutcome::Idle(IdleReason::Drained),
            recipient: None,
            asset_index: None,
            mint: None,
            signature: None,
            duration: Duration::ZERO,
        }
    }

    #[inline]
    pub fn is_minted(&self) -> bool {
        self.outcome == CycleOutcome::Minted
    }

    /// copy mint address and last signature from the record.
    fn note(&mut self, record: &MintRecord) {
        self.mint = record.mint_address;
        self.signature = record.last_signature.clone();
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "recipient": self.recipient.map(|k| k.to_string()),
            "assetIndex": self.asset_index,
            "mint": self.mint.map(|k| k.to_string()),
            "signature": self.signature,
            "durationMs": self.duration.as_millis() as u64,
        });
        match &self.outcome {
            CycleOutcome::Minted => {
                value["outcome"] = json!("minted");
            }
            CycleOutcome::Idle(reason) => {
                value["outcome"] = json!("idle");
                value["reason"] = json!(reason.as_str());
            }
            CycleOutcome::Failed { error, step } => {
                value["outcome"] = json!("failed");
                value["step"] = json!(step.as_str());
                value["error"] = error.to_json();
            }
        }
        value
    }
}

/// static inputs of a cycle.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub allocator: AllocatorConfig,
    pub submitter: SubmitterConfig,
    pub images_folder: PathBuf,
    pub items_available: u64,
    /// edition cap written at finalization.
    pub max_supply: Option<u64>,
    pub mint_policy: RetryPolicy,
}

/// where a recipient's record says to continue.
enum Resume {
    Mint,
    Publish,
    Finalize,
    Done(CycleOutcome),
}

/// state lent to each mint attempt.
struct MintAttempt<'c, L, G, S> {
    cycle: &'c CrankCycle<L, G, S>,
    record: &'c mut MintRecord,
    recipient: &'c Recipient,
    asset: &'c AssetPayload,
    digests: &'c ContentDigests,
    mint: &'c Keypair,
    mint_rent: u64,
}

pub struct CrankCycle<L, G, S> {
    allocator: SlotAllocator<L>,
    submitter: TransactionSubmitter<L>,
    locator: AssetLocator,
    builder: TransactionBuilder,
    publisher: ContentPublisher<G>,
    records: S,
    payer: Keypair,
    items_available: u64,
    max_supply: Option<u64>,
    mint_policy: RetryPolicy,
}

impl<L, G, S> CrankCycle<L, G, S>
where
    L: LedgerClient + Clone,
    G: StorageGateway,
    S: RecordStore,
{
    /// `payer` pays fees and rent, owns the mint and signs router rollovers.
    pub fn new(ledger: L, payer: Keypair, gateway: G, records: S, config: CycleConfig) -> Self {
        Self {
            allocator: SlotAllocator::new(ledger.clone(), config.allocator),
            submitter: TransactionSubmitter::new(ledger, config.submitter),
            locator: AssetLocator::new(config.images_folder),
            builder: TransactionBuilder,
            publisher: ContentPublisher::new(gateway),
            records,
            payer,
            items_available: config.items_available,
            max_supply: config.max_supply,
            mint_policy: config.mint_policy,
        }
    }

    #[inline]
    pub fn records(&self) -> &S {
        &self.records
    }

    #[inline]
    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    /// run one cycle to completion. never panics on ledger or store errors.
    pub async fn run(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::empty();

        let result = self.execute(&mut report).await;
        report.outcome = match result {
            Ok(outcome) => outcome,
            Err(StepFailure { step, error }) => {
                let recipient = report.recipient.map(|k| k.to_string());
                let mint = report.mint.map(|k| k.to_string());
                if let CycleError::PersistenceFailure(_) = error {
                    tracing::error!(
                        step = step.as_str(),
                        recipient = recipient.as_deref(),
                        asset_index = report.asset_index,
                        mint = mint.as_deref(),
                        signature = report.signature.as_deref(),
                        "record write failed after ledger effect, needs reconciliation: {}",
                        error
                    );
                } else {
                    tracing::warn!(
                        step = step.as_str(),
                        kind = error.kind(),
                        recipient = recipient.as_deref(),
                        asset_index = report.asset_index,
                        mint = mint.as_deref(),
                        signature = report.signature.as_deref(),
                        "cycle failed: {}",
                        error
                    );
                }
                CycleOutcome::Failed { error, step }
            }
        };
        report.duration = started.elapsed();
        report
    }

    async fn execute(&self, report: &mut CycleReport) -> Result<CycleOutcome, StepFailure> {
        let recipient = match self.allocate_slot().await? {
            Ok(recipient) => recipient,
            Err(reason) => return Ok(CycleOutcome::Idle(reason)),
        };
        report.recipient = Some(recipient.key);
        report.asset_index = Some(recipient.asset_ordinal);

        if recipient.asset_ordinal >= self.items_available {
            tracing::info!(
                asset_index = recipient.asset_ordinal,
                items_available = self.items_available,
                "sold out"
            );
            return Ok(CycleOutcome::Idle(IdleReason::SoldOut));
        }

        let mut record = match self
            .records
            .get_by_recipient(&recipient.key)
            .await
            .at(CycleStep::PersistRecord)?
        {
            Some(record) => record,
            None => self
                .records
                .insert(MintRecord::pending(
                    recipient.key,
                    recipient.asset_ordinal,
                    recipient.account_index,
                    recipient.sub_index,
                ))
                .await
                .at(CycleStep::PersistRecord)?,
        };
        report.note(&record);

        let mut resume = self.resume_point(&mut record).await?;
        report.note(&record);

        if let Resume::Mint = resume {
            let asset = self
                .locator
                .load_index(record.asset_index)
                .await
                .at(CycleStep::BuildAndSubmitMint)?;
            let minted = self.mint(&mut record, &recipient, &asset).await;
            report.note(&record);
            minted?;

            let uri = self.publish(&mut record, Some(&asset)).await?;
            report.note(&record);
            tracing::debug!(%uri, "content ready for finalization");
            resume = Resume::Finalize;
        } else if let Resume::Publish = resume {
            self.publish(&mut record, None).await?;
            resume = Resume::Finalize;
        }

        let outcome = match resume {
            Resume::Done(outcome) => outcome,
            _ => {
                self.finalize(&mut record).await?;
                report.note(&record);
                CycleOutcome::Minted
            }
        };

        if outcome == CycleOutcome::Minted {
            tracing::info!(
                recipient = %recipient.key,
                asset_index = record.asset_index,
                mint = ?record.mint_address,
                signature = record.last_signature.as_deref(),
                "mint finalized"
            );
            self.proactive_rollover().await;
        }
        Ok(outcome)
    }

    /// pick the recipient, rolling the router over once if the sub-account is full.
    async fn allocate_slot(&self) -> Result<Result<Recipient, IdleReason>, StepFailure> {
        let (snapshot, allocation) = self.allocator.allocate().await.at(CycleStep::AllocateSlot)?;
        let allocation = match allocation {
            Allocation::NeedsRollover { account_index, .. } => {
                self.rollover(&snapshot, account_index).await?;
                let (_, fresh) = self.allocator.allocate().await.at(CycleStep::AllocateSlot)?;
                fresh
            }
            other => other,
        };

        match allocation {
            Allocation::Recipient(recipient) => Ok(Ok(recipient)),
            Allocation::Drained {
                account_index,
                sub_index,
                vault_account,
            } => {
                tracing::info!(account_index, sub_index, %vault_account, "vault drained");
                Ok(Err(IdleReason::Drained))
            }
            Allocation::NeedsRollover { account_index, .. } => Err(StepFailure {
                step: CycleStep::AllocateSlot,
                error: CycleError::AllocationExhausted {
                    account_index,
                    reason: "still exhausted after rollover".to_string(),
                },
            }),
        }
    }

    /// submit the rollover for an exhausted read and wait for it.
    async fn rollover(&self, snapshot: &RouterSnapshot, account_index: u32) -> Result<(), StepFailure> {
        let instruction = self.allocator.claim_rollover(snapshot).at(CycleStep::AllocateSlot)?;
        let (pending, confirmation) = self
            .submitter
            .send_and_confirm(vec![instruction], &[&self.payer])
            .await
            .at(CycleStep::AllocateSlot)?;

        let reason = match confirmation {
            Confirmation::Confirmed => {
                tracing::info!(account_index, signature = %pending.signature, "router rolled over");
                return Ok(());
            }
            Confirmation::TimedOut => format!("rollover {} timed out", pending.signature),
            Confirmation::Rejected { reason } => {
                format!("rollover {} rejected: {}", pending.signature, reason)
            }
        };
        Err(StepFailure {
            step: CycleStep::AllocateSlot,
            error: CycleError::AllocationExhausted {
                account_index,
                reason,
            },
        })
    }

    /// roll over right after a mint that filled the sub-account.
    async fn proactive_rollover(&self) {
        let result = async {
            let (snapshot, allocation) = self.allocator.allocate().await.at(CycleStep::AllocateSlot)?;
            if let Allocation::NeedsRollover { account_index, .. } = allocation {
                self.rollover(&snapshot, account_index).await?;
            }
            Ok::<_, StepFailure>(())
        }
        .await;
        if let Err(failure) = result {
            tracing::warn!(kind = failure.error.kind(), "post-mint rollover failed: {}", failure.error);
        }
    }

    /// decide where to continue from the stored record.
    async fn resume_point(&self, record: &mut MintRecord) -> Result<Resume, StepFailure> {
        match record.state {
            MintState::Finalized => Ok(Resume::Done(CycleOutcome::Idle(IdleReason::AlreadyMinted))),
            MintState::Failed => {
                tracing::warn!(
                    recipient = %record.recipient,
                    asset_index = record.asset_index,
                    failure = record.failure.as_deref(),
                    "record failed earlier, skipping until reconciled"
                );
                Ok(Resume::Done(CycleOutcome::Idle(IdleReason::NeedsReconciliation)))
            }
            MintState::Pending | MintState::Submitted => {
                let Some(mint) = record.mint_address else {
                    return Ok(Resume::Mint);
                };
                if !self.mint_exists(&mint).await.at(CycleStep::ConfirmMint)? {
                    return Ok(Resume::Mint);
                }
                tracing::info!(recipient = %record.recipient, %mint, "earlier mint landed, resuming");
                if record.state == MintState::Pending {
                    record.metadata_address = Some(metadata_address(&mint));
                    record.transition(MintState::Submitted).at(CycleStep::PersistRecord)?;
                }
                record.mark_confirmed().at(CycleStep::PersistRecord)?;
                self.records.update(record).await.at(CycleStep::PersistRecord)?;
                Ok(Resume::Publish)
            }
            MintState::Confirmed => Ok(Resume::Publish),
            MintState::ContentPublished => {
                let (mint, uri) = match (record.mint_address, record.content_uri.clone()) {
                    (Some(mint), Some(uri)) => (mint, uri),
                    _ => {
                        return Err(StepFailure {
                            step: CycleStep::ReconcileMetadata,
                            error: CycleError::SchemaMismatch(format!(
                                "record {} is published without mint or uri",
                                record.id
                            )),
                        })
                    }
                };
                let state = MetadataReconciler::new(&self.submitter)
                    .inspect(&mint, &uri)
                    .await
                    .at(CycleStep::ReconcileMetadata)?;
                match state {
                    FinalizationState::NotStarted => Ok(Resume::Finalize),
                    FinalizationState::Complete => {
                        record.mark_finalized(None).at(CycleStep::PersistRecord)?;
                        self.records.update(record).await.at(CycleStep::PersistRecord)?;
                        Ok(Resume::Done(CycleOutcome::Minted))
                    }
                    FinalizationState::Partial { reason } => {
                        tracing::error!(
                            recipient = %record.recipient,
                            %mint,
                            "partial finalization, needs reconciliation: {}",
                            reason
                        );
                        record.mark_failed(reason).at(CycleStep::PersistRecord)?;
                        self.records.update(record).await.at(CycleStep::PersistRecord)?;
                        Ok(Resume::Done(CycleOutcome::Idle(IdleReason::NeedsReconciliation)))
                    }
                }
            }
        }
    }

    async fn mint_exists(&self, mint: &Pubkey) -> Result<bool, CycleError> {
        Ok(self.submitter.ledger().get_account_data(mint).await?.is_some())
    }

    /// lamports for every account the mint and finalize transactions create, plus fees.
    async fn required_lamports(&self) -> Result<(u64, u64), CycleError> {
        let ledger = self.submitter.ledger();
        let mint_rent = ledger.minimum_balance_for_rent_exemption(MINT_ACCOUNT_LEN).await?;
        let mut needed = mint_rent;
        for len in [TOKEN_ACCOUNT_LEN, METADATA_ACCOUNT_LEN, MASTER_EDITION_LEN] {
            needed = needed.saturating_add(ledger.minimum_balance_for_rent_exemption(len).await?);
        }
        Ok((mint_rent, needed.saturating_add(SIGNATURE_FEE * SIGNATURES_PER_MINT)))
    }

    /// build, submit and confirm the mint transaction under the retry policy.
    async fn mint(
        &self,
        record: &mut MintRecord,
        recipient: &Recipient,
        asset: &AssetPayload,
    ) -> Result<(), StepFailure> {
        let (mint_rent, needed) = self.required_lamports().await.at(CycleStep::BuildAndSubmitMint)?;

        // balance lookup overlaps with hashing
        let payer_key = self.payer.pubkey();
        let (funds, digests) = tokio::join!(
            self.submitter.ensure_funds(&payer_key, needed),
            async { asset.digests() }
        );
        funds.at(CycleStep::BuildAndSubmitMint)?;

        let mint = Keypair::new();
        record.mint_address = Some(mint.pubkey());
        record.metadata_address = Some(metadata_address(&mint.pubkey()));
        self.records.update(record).await.at(CycleStep::PersistRecord)?;

        let mut attempt = MintAttempt {
            cycle: self,
            record: &mut *record,
            recipient,
            asset,
            digests: &digests,
            mint: &mint,
            mint_rent,
        };
        let result = self
            .mint_policy
            .retry_with(&mut attempt, Self::mint_attempt, |f: &StepFailure| {
                f.error.retryable()
            })
            .await;

        match result {
            Ok(()) => {
                record.mark_confirmed().at(CycleStep::PersistRecord)?;
                self.records.update(record).await.at(CycleStep::PersistRecord)?;
                Ok(())
            }
            Err(failure) => {
                if let CycleError::TransactionRejected { .. } = failure.error {
                    self.fail_record(record, &failure.error).await;
                }
                Err(failure)
            }
        }
    }

    fn mint_attempt<'a>(
        ctx: &'a mut MintAttempt<'_, L, G, S>,
        attempt: usize,
    ) -> BoxFuture<'a, Result<(), StepFailure>> {
        async move {
            let cycle = ctx.cycle;
            let mint_key = ctx.mint.pubkey();

            if attempt > 0 && cycle.mint_exists(&mint_key).await.at(CycleStep::ConfirmMint)? {
                tracing::info!(mint = %mint_key, attempt, "earlier attempt landed late");
                return Ok(());
            }

            let plan = cycle
                .builder
                .build(
                    &ctx.recipient.key,
                    ctx.asset,
                    ctx.digests,
                    &cycle.payer,
                    ctx.mint,
                    ctx.mint_rent,
                )
                .at(CycleStep::BuildAndSubmitMint)?;
            let pending = cycle
                .submitter
                .submit(plan.instructions, &plan.signers)
                .await
                .at(CycleStep::BuildAndSubmitMint)?;

            let signature = pending.signature.to_string();
            ctx.record
                .mark_submitted(plan.mint, plan.metadata, signature.clone())
                .at(CycleStep::PersistRecord)?;
            cycle
                .records
                .update(ctx.record)
                .await
                .at(CycleStep::PersistRecord)?;
            tracing::debug!(mint = %mint_key, %signature, attempt, "mint submitted");

            let timeout = cycle.submitter.config().confirm_timeout;
            let confirmation = cycle
                .submitter
                .await_confirmation(&pending, timeout)
                .await
                .at(CycleStep::ConfirmMint)?;
            let error = match confirmation {
                Confirmation::Confirmed => return Ok(()),
                Confirmation::TimedOut => CycleError::TransactionTimedOut { signature },
                Confirmation::Rejected { reason } => {
                    CycleError::TransactionRejected { signature, reason }
                }
            };
            Err(StepFailure {
                step: CycleStep::ConfirmMint,
                error,
            })
        }
        .boxed()
    }

    /// upload image and manifest, then store the uri on the record.
    async fn publish(
        &self,
        record: &mut MintRecord,
        loaded: Option<&AssetPayload>,
    ) -> Result<String, StepFailure> {
        let reloaded;
        let asset = match loaded {
            Some(asset) => asset,
            None => {
                reloaded = self
                    .locator
                    .load_index(record.asset_index)
                    .await
                    .at(CycleStep::PublishContent)?;
                &reloaded
            }
        };

        let uri = self
            .publisher
            .publish(&asset.image, &asset.metadata)
            .await
            .at(CycleStep::PublishContent)?;
        record.mark_published(uri.clone()).at(CycleStep::PersistRecord)?;
        self.records.update(record).await.at(CycleStep::PersistRecord)?;
        Ok(uri)
    }

    /// write the uri, mint the unit and lock the edition.
    async fn finalize(&self, record: &mut MintRecord) -> Result<(), StepFailure> {
        let (mint, uri) = match (record.mint_address, record.content_uri.clone()) {
            (Some(mint), Some(uri)) => (mint, uri),
            _ => {
                return Err(StepFailure {
                    step: CycleStep::ReconcileMetadata,
                    error: CycleError::SchemaMismatch(format!(
                        "record {} has no mint or uri to finalize",
                        record.id
                    )),
                })
            }
        };
        let metadata = record.metadata_address.unwrap_or_else(|| metadata_address(&mint));

        let (pending, confirmation) = MetadataReconciler::new(&self.submitter)
            .finalize(&metadata, &record.recipient, &uri, self.max_supply, &self.payer)
            .await
            .at(CycleStep::ReconcileMetadata)?;
        let signature = pending.signature.to_string();

        let error = match confirmation {
            Confirmation::Confirmed => {
                record
                    .mark_finalized(Some(signature))
                    .at(CycleStep::PersistRecord)?;
                self.records.update(record).await.at(CycleStep::PersistRecord)?;
                return Ok(());
            }
            Confirmation::TimedOut => CycleError::TransactionTimedOut { signature },
            Confirmation::Rejected { reason } => {
                let error = CycleError::TransactionRejected { signature, reason };
                self.fail_record(record, &error).await;
                error
            }
        };
        Err(StepFailure {
            step: CycleStep::ReconcileMetadata,
            error,
        })
    }

    /// best effort: the cycle already reports `error`.
    async fn fail_record(&self, record: &mut MintRecord, error: &CycleError) {
        let result = match record.mark_failed(error.to_string()) {
            Ok(()) => self.records.update(record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(
                recipient = %record.recipient,
                asset_index = record.asset_index,
                mint = ?record.mint_address,
                signature = record.last_signature.as_deref(),
                "could not mark record failed: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: CycleOutcome) -> CycleReport {
        CycleReport {
            outcome,
            recipient: Some(Pubkey::new_unique()),
            asset_index: Some(12),
            mint: None,
            signature: Some("sig".into()),
            duration: Duration::from_millis(1_500),
        }
    }

    #[test]
    fn test_report_json_minted() {
        let value = report(CycleOutcome::Minted).to_json();
        assert_eq!(value["outcome"], "minted");
        assert_eq!(value["assetIndex"], 12);
        assert_eq!(value["durationMs"], 1_500);
        assert!(value["mint"].is_null());
        assert_eq!(value["signature"], "sig");
    }

    #[test]
    fn test_report_json_idle_and_failed() {
        let value = report(CycleOutcome::Idle(IdleReason::SoldOut)).to_json();
        assert_eq!(value["outcome"], "idle");
        assert_eq!(value["reason"], "sold_out");

        let value = report(CycleOutcome::Failed {
            error: CycleError::ContentUploadFailed("gateway down".into()),
            step: CycleStep::PublishContent,
        })
        .to_json();
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["step"], "publish_content");
        assert_eq!(value["error"]["kind"], "ContentUploadFailed");
    }

    #[test]
    fn test_note_copies_record_fields() {
        let mut record = MintRecord::pending(Pubkey::new_unique(), 0, 0, 0);
        let mint = Pubkey::new_unique();
        record
            .mark_submitted(mint, metadata_address(&mint), "abc".into())
            .unwrap();

        let mut report = CycleReport::empty();
        report.note(&record);
        assert_eq!(report.mint, Some(mint));
        assert_eq!(report.signature.as_deref(), Some("abc"));
        assert!(!report.is_minted());
    }
}
