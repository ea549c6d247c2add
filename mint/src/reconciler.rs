//! metadata finalization after content publication.
//!
//! one transaction: update metadata with the permanent uri, mint one unit to
//! the recipient's token account, create the master edition. partial states
//! are reported, never repaired here.

use crank_codec::{
    decode_account, AccountKind, CodecError, CreateMasterEditionArgs, Layout, MetadataAccount,
    MetadataData, MintToArgs, UpdateMetadataArgs,
};
use crank_ledger::{Confirmation, PendingTransaction, SubmitError, TransactionSubmitter};
use crank_traits::{LedgerClient, LedgerError};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::{system_program, sysvar};

use crate::programs::{
    associated_token_address, edition_address, metadata_address, METADATA_PROGRAM_ID,
    TOKEN_PROGRAM_ID,
};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("metadata account {0} does not exist")]
    MissingMetadata(Pubkey),
}

/// on-ledger finalization progress of one mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizationState {
    /// metadata still carries the blank uri, no edition.
    NotStarted,
    /// edition exists and the uri matches.
    Complete,
    /// anything else; needs manual reconciliation.
    Partial { reason: String },
}

/// addresses the finalize transaction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeTarget {
    pub mint: Pubkey,
    pub metadata: Pubkey,
    pub edition: Pubkey,
    pub recipient_token_account: Pubkey,
}

impl FinalizeTarget {
    pub fn new(mint: Pubkey, recipient: &Pubkey) -> Self {
        Self {
            mint,
            metadata: metadata_address(&mint),
            edition: edition_address(&mint),
            recipient_token_account: associated_token_address(recipient, &mint),
        }
    }
}

/// the three finalize instructions, in order. payer is update, mint and edition authority.
pub fn finalize_instructions(
    target: &FinalizeTarget,
    data: MetadataData,
    payer: &Pubkey,
    max_supply: Option<u64>,
) -> Result<Vec<Instruction>, CodecError> {
    let update = Instruction {
        program_id: METADATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(target.metadata, false),
            AccountMeta::new_readonly(*payer, true),
        ],
        data: UpdateMetadataArgs {
            data: Some(data),
            update_authority: None,
            primary_sale_happened: None,
        }
        .encode()?,
    };

    let mint_to = Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(target.mint, false),
            AccountMeta::new(target.recipient_token_account, false),
            AccountMeta::new_readonly(*payer, true),
        ],
        data: MintToArgs { amount: 1 }.encode()?,
    };

    let master_edition = Instruction {
        program_id: METADATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(target.edition, false),
            AccountMeta::new(target.mint, false),
            AccountMeta::new_readonly(*payer, true), // update authority
            AccountMeta::new_readonly(*payer, true), // mint authority
            AccountMeta::new_readonly(*payer, true), // payer
            AccountMeta::new_readonly(target.metadata, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ],
        data: CreateMasterEditionArgs { max_supply }.encode()?,
    };

    Ok(vec![update, mint_to, master_edition])
}

pub struct MetadataReconciler<'s, L> {
    submitter: &'s TransactionSubmitter<L>,
}

impl<'s, L: LedgerClient> MetadataReconciler<'s, L> {
    pub fn new(submitter: &'s TransactionSubmitter<L>) -> Self {
        Self { submitter }
    }

    async fn read_metadata(&self, key: &Pubkey) -> Result<MetadataAccount, ReconcileError> {
        let data = self
            .submitter
            .ledger()
            .get_account_data(key)
            .await?
            .ok_or(ReconcileError::MissingMetadata(*key))?;
        Ok(MetadataAccount::decode_padded(&data)?)
    }

    /// patch the permanent uri in, mint one unit, lock the edition.
    ///
    /// the current on-ledger `Data` is reused so name, symbol and creators
    /// stay as created.
    pub async fn finalize(
        &self,
        metadata_account: &Pubkey,
        recipient: &Pubkey,
        content_uri: &str,
        max_supply: Option<u64>,
        payer: &Keypair,
    ) -> Result<(PendingTransaction, Confirmation), ReconcileError> {
        let account = self.read_metadata(metadata_account).await?;
        let target = FinalizeTarget::new(account.mint, recipient);

        let mut data = account.data;
        data.uri = content_uri.to_string();
        let instructions = finalize_instructions(&target, data, &payer.pubkey(), max_supply)?;

        let (pending, confirmation) = self
            .submitter
            .send_and_confirm(instructions, &[payer])
            .await?;
        tracing::info!(
            mint = %target.mint,
            signature = %pending.signature,
            outcome = ?confirmation,
            "finalize submitted"
        );
        Ok((pending, confirmation))
    }

    /// read the edition and metadata accounts for `mint`.
    pub async fn inspect(
        &self,
        mint: &Pubkey,
        expected_uri: &str,
    ) -> Result<FinalizationState, ReconcileError> {
        let target_metadata = metadata_address(mint);
        let metadata = self.read_metadata(&target_metadata).await?;
        let edition = self
            .submitter
            .ledger()
            .get_account_data(&edition_address(mint))
            .await?;

        let uri = metadata.uri();
        let state = match edition {
            Some(bytes) => {
                decode_account(AccountKind::MasterEdition, &bytes)?;
                if uri == expected_uri.trim_end() {
                    FinalizationState::Complete
                } else {
                    FinalizationState::Partial {
                        reason: format!("edition exists but uri is {:?}", uri),
                    }
                }
            }
            None if uri.is_empty() => FinalizationState::NotStarted,
            None => FinalizationState::Partial {
                reason: format!("uri set to {:?} without edition", uri),
            },
        };
        Ok(state)
    }
}
