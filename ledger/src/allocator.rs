//! slot allocation against the router + vault index.
//!
//! the router points at one vault sub-account; the sub-account's fill index
//! selects the recipient key inside that vault. both counters are advanced by
//! the ledger programs only. this module reads them and, when a sub-account
//! is exhausted, hands out exactly one rollover instruction per read.

use std::sync::atomic::{AtomicU64, Ordering};

use crank_codec::{CodecError, Layout, RolloverArgs, RouterState, SubAccountRef, VaultState};
use crank_traits::{LedgerClient, LedgerError};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

/// recipients per vault sub-account.
pub const SUB_ACCOUNT_CAPACITY: u8 = 240;

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("ledger read failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("account {0} does not exist")]
    MissingAccount(Pubkey),
    #[error("rollover already requested for this router read")]
    RolloverAlreadyRequested,
    #[error("sub-account {account_index} is not exhausted")]
    NotExhausted { account_index: u32 },
}

/// the recipient selected for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub key: Pubkey,
    pub vault_account: Pubkey,
    pub account_index: u32,
    pub sub_index: u8,
    /// global asset ordinal, `account_index * capacity + sub_index`.
    pub asset_ordinal: u64,
}

/// outcome of one allocation read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Recipient(Recipient),
    /// the current sub-account is full; nothing can be minted until rollover.
    NeedsRollover {
        account_index: u32,
        sub_account: SubAccountRef,
    },
    /// the vault has no key at the current index yet.
    Drained {
        account_index: u32,
        sub_index: u8,
        vault_account: Pubkey,
    },
}

/// a router read, tagged so rollover requests can be tied to it.
#[derive(Debug, Clone)]
pub struct RouterSnapshot {
    pub state: RouterState,
    generation: u64,
}

impl RouterSnapshot {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// router account layout owner and addresses.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    pub router_program: Pubkey,
    pub router_account: Pubkey,
    /// signer of the rollover instruction.
    pub authority: Pubkey,
    pub capacity: u8,
}

/// build the router `update_current_account_index` instruction.
pub fn rollover_instruction(
    router_program: &Pubkey,
    router_account: &Pubkey,
    authority: &Pubkey,
) -> Result<Instruction, CodecError> {
    Ok(Instruction {
        program_id: *router_program,
        accounts: vec![
            AccountMeta::new(*router_account, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data: RolloverArgs.encode()?,
    })
}

/// global asset ordinal for a router position.
#[inline]
pub fn asset_ordinal(account_index: u32, sub_index: u8, capacity: u8) -> u64 {
    account_index as u64 * capacity as u64 + sub_index as u64
}

pub struct SlotAllocator<L> {
    ledger: L,
    config: AllocatorConfig,
    reads: AtomicU64,
    rollover_claimed: AtomicU64,
}

impl<L: LedgerClient> SlotAllocator<L> {
    pub fn new(ledger: L, config: AllocatorConfig) -> Self {
        Self {
            ledger,
            config,
            reads: AtomicU64::new(0),
            rollover_claimed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// fetch and decode the router account.
    pub async fn read_router(&self) -> Result<RouterSnapshot, AllocationError> {
        let key = self.config.router_account;
        let data = self
            .ledger
            .get_account_data(&key)
            .await?
            .ok_or(AllocationError::MissingAccount(key))?;

        let state = RouterState::decode_padded(&data)?;
        let generation = self.reads.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(
            generation,
            current_account_index = state.current_account_index,
            sub_accounts = state.sub_accounts.len(),
            "router read"
        );
        Ok(RouterSnapshot { state, generation })
    }

    /// fetch and decode a vault account.
    pub async fn read_vault(&self, key: &Pubkey) -> Result<VaultState, AllocationError> {
        let data = self
            .ledger
            .get_account_data(key)
            .await?
            .ok_or(AllocationError::MissingAccount(*key))?;
        Ok(VaultState::decode_padded(&data)?)
    }

    /// select the next recipient from a router read.
    pub async fn next_recipient(&self, router: &RouterState) -> Result<Allocation, AllocationError> {
        let account_index = router.current_account_index;
        let sub_account = *router.current_sub_account()?;
        let sub_index = sub_account.current_sub_account_index;

        if sub_index >= self.config.capacity {
            return Ok(Allocation::NeedsRollover {
                account_index,
                sub_account,
            });
        }

        let vault = self.read_vault(&sub_account.vault_account).await?;
        match vault.recipient_keys.get(sub_index as usize) {
            Some(key) => Ok(Allocation::Recipient(Recipient {
                key: *key,
                vault_account: sub_account.vault_account,
                account_index,
                sub_index,
                asset_ordinal: asset_ordinal(account_index, sub_index, self.config.capacity),
            })),
            None => Ok(Allocation::Drained {
                account_index,
                sub_index,
                vault_account: sub_account.vault_account,
            }),
        }
    }

    /// read the router and allocate in one step.
    pub async fn allocate(&self) -> Result<(RouterSnapshot, Allocation), AllocationError> {
        let snapshot = self.read_router().await?;
        let allocation = self.next_recipient(&snapshot.state).await?;
        Ok((snapshot, allocation))
    }

    /// hand out the rollover instruction for an exhausted read.
    ///
    /// at most once per read; a stale or repeated read is refused.
    pub fn claim_rollover(&self, snapshot: &RouterSnapshot) -> Result<Instruction, AllocationError> {
        let sub_account = snapshot.state.current_sub_account()?;
        if sub_account.current_sub_account_index < self.config.capacity {
            return Err(AllocationError::NotExhausted {
                account_index: snapshot.state.current_account_index,
            });
        }

        let previous = self
            .rollover_claimed
            .fetch_max(snapshot.generation, Ordering::AcqRel);
        if previous >= snapshot.generation {
            return Err(AllocationError::RolloverAlreadyRequested);
        }

        Ok(rollover_instruction(
            &self.config.router_program,
            &self.config.router_account,
            &self.config.authority,
        )?)
    }
}
