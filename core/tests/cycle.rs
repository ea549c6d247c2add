//! full cycles against the in-memory ledger, a scripted gateway and memory records.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crank_codec::{
    CreateAccountArgs, CreateMasterEditionArgs, CreateMetadataArgs, Layout, MasterEditionV2,
    MetadataAccount, MintAccount, RolloverArgs, RouterConfig, RouterState, SubAccountRef,
    UpdateMetadataArgs, VaultState,
};
use crank_content::{ContentError, StorageGateway, UploadFile, UploadReceipt};
use crank_core::{
    CrankCycle, CycleConfig, CycleError, CycleOutcome, CycleStep, IdleReason, RetryPolicy,
};
use crank_ledger::{AllocatorConfig, SubmitterConfig};
use crank_mint::programs::METADATA_PROGRAM_ID;
use crank_mint::{edition_address, metadata_address};
use crank_record::{MemoryRecordStore, MintRecord, MintState, RecordError, RecordStore};
use crank_traits::memory::{AccountMap, MemoryLedger, SendBehavior};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;

const METADATA_LEN: usize = 679;

const MANIFEST: &str = r#"{
    "name": "Item #N",
    "symbol": "ITM",
    "description": "test item",
    "seller_fee_basis_points": 500,
    "image": "N.png",
    "properties": {"files": [{"uri": "N.png", "type": "image/png"}], "creators": []}
}"#;

/// gateway that records uploads and can fail the next ones.
#[derive(Default)]
struct ScriptedGateway {
    uploads: AtomicUsize,
    failures: AtomicUsize,
    files: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageGateway for ScriptedGateway {
    async fn price(&self, bytes: u64) -> Result<u64, ContentError> {
        Ok(1_000 + bytes)
    }

    async fn balance(&self) -> Result<u64, ContentError> {
        Ok(u64::MAX / 2)
    }

    async fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<UploadReceipt>, ContentError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ContentError::UploadFailed("gateway unavailable".into()));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        let mut names = self.files.lock().unwrap();
        Ok(files
            .into_iter()
            .map(|f| {
                names.push(f.filename.clone());
                UploadReceipt {
                    transaction_id: format!("{}-{}", f.filename.replace('.', "-"), n),
                    filename: f.filename,
                    status: "success".into(),
                }
            })
            .collect())
    }

    fn content_uri(&self, transaction_id: &str) -> String {
        format!("https://arweave.net/{}", transaction_id)
    }
}

/// memory records that journal every persisted state.
#[derive(Default)]
struct JournaledRecords {
    inner: MemoryRecordStore,
    states: Mutex<Vec<MintState>>,
}

impl JournaledRecords {
    async fn len(&self) -> usize {
        self.inner.len().await
    }

    async fn is_empty(&self) -> bool {
        self.inner.is_empty().await
    }

    /// persisted states with repeats collapsed.
    fn transitions(&self) -> Vec<MintState> {
        let mut states = self.states.lock().unwrap().clone();
        states.dedup();
        states
    }
}

#[async_trait]
impl RecordStore for JournaledRecords {
    async fn get_by_recipient(&self, recipient: &Pubkey) -> Result<Option<MintRecord>, RecordError> {
        self.inner.get_by_recipient(recipient).await
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<MintRecord>, RecordError> {
        self.inner.get_by_id(id).await
    }

    async fn insert(&self, record: MintRecord) -> Result<MintRecord, RecordError> {
        let record = self.inner.insert(record).await?;
        self.states.lock().unwrap().push(record.state);
        Ok(record)
    }

    async fn update(&self, record: &MintRecord) -> Result<(), RecordError> {
        self.inner.update(record).await?;
        self.states.lock().unwrap().push(record.state);
        Ok(())
    }
}

type Cycle = CrankCycle<Arc<MemoryLedger>, Arc<ScriptedGateway>, Arc<JournaledRecords>>;

struct Harness {
    ledger: Arc<MemoryLedger>,
    gateway: Arc<ScriptedGateway>,
    records: Arc<JournaledRecords>,
    cycle: Cycle,
    router_account: Pubkey,
    vaults: Vec<Pubkey>,
    _images: tempfile::TempDir,
}

struct Setup {
    /// (fill index, vault size) per sub-account.
    sub_accounts: Vec<(u8, usize)>,
    current_account_index: u32,
    capacity: u8,
    items_available: u64,
    balance: u64,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            sub_accounts: vec![(0, 3)],
            current_account_index: 0,
            capacity: 240,
            items_available: 100,
            balance: 10_000_000_000,
        }
    }
}

fn images(count: u64) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..count {
        fs::write(dir.path().join(format!("{}.png", i)), [0x89, b'P', b'N', b'G', i as u8]).unwrap();
        fs::write(
            dir.path().join(format!("{}.json", i)),
            MANIFEST.replace('N', &i.to_string()),
        )
        .unwrap();
    }
    dir
}

/// program side effects the crank relies on.
fn install_effects(ledger: &MemoryLedger, router_program: Pubkey, router_account: Pubkey) {
    ledger.on_land(move |tx: &Transaction, accounts: &mut AccountMap| {
        let keys = &tx.message.account_keys;
        for ix in &tx.message.instructions {
            let program = keys[ix.program_id_index as usize];
            let account = |i: usize| keys[ix.accounts[i] as usize];

            if program == system_program::ID && CreateAccountArgs::decode(&ix.data).is_ok() {
                let mint = MintAccount {
                    mint_authority: Some(keys[0]),
                    supply: 0,
                    decimals: 0,
                    is_initialized: true,
                    freeze_authority: Some(keys[0]),
                };
                accounts.insert(account(1), mint.encode().unwrap());
            } else if program == METADATA_PROGRAM_ID {
                if let Ok(args) = CreateMetadataArgs::decode(&ix.data) {
                    let metadata = MetadataAccount {
                        update_authority: account(4),
                        mint: account(1),
                        data: args.data,
                        primary_sale_happened: false,
                        is_mutable: args.is_mutable,
                    };
                    let mut bytes = metadata.encode().unwrap();
                    bytes.resize(METADATA_LEN, 0);
                    accounts.insert(account(0), bytes);
                } else if let Ok(args) = UpdateMetadataArgs::decode(&ix.data) {
                    let key = account(0);
                    let mut metadata =
                        MetadataAccount::decode_padded(&accounts[&key]).unwrap();
                    if let Some(data) = args.data {
                        metadata.data = data;
                    }
                    let mut bytes = metadata.encode().unwrap();
                    bytes.resize(METADATA_LEN, 0);
                    accounts.insert(key, bytes);
                } else if let Ok(args) = CreateMasterEditionArgs::decode(&ix.data) {
                    let edition = MasterEditionV2 {
                        supply: 0,
                        max_supply: args.max_supply,
                    };
                    accounts.insert(account(0), edition.encode().unwrap());
                }
            } else if program == router_program && RolloverArgs::decode(&ix.data).is_ok() {
                let mut router = RouterState::decode_padded(&accounts[&router_account]).unwrap();
                router.current_account_index += 1;
                accounts.insert(router_account, router.encode().unwrap());
            }
        }
    });
}

fn harness(setup: Setup) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    // clean simulations log like the real programs do
    ledger.simulation_logs([
        "Program log: Instruction: InitializeMint",
        "Program log: IX: Create Metadata Accounts",
    ]);
    let payer = Keypair::new();
    ledger.set_balance(payer.pubkey(), setup.balance);

    let mut sub_accounts = Vec::new();
    let mut vaults = Vec::new();
    for (fill, size) in &setup.sub_accounts {
        let vault = Pubkey::new_unique();
        let state = VaultState {
            authority: Pubkey::new_unique(),
            recipient_keys: (0..*size).map(|_| Pubkey::new_unique()).collect(),
        };
        ledger.set_account(vault, state.encode().unwrap());
        sub_accounts.push(SubAccountRef {
            vault_account: vault,
            current_sub_account_index: *fill,
        });
        vaults.push(vault);
    }

    let router_program = Pubkey::new_unique();
    let router_account = Pubkey::new_unique();
    let router = RouterState {
        current_account_index: setup.current_account_index,
        sub_accounts,
        authority: payer.pubkey(),
        config: RouterConfig {
            price: 0,
            go_live_date: None,
            uuid: "crank".to_string(),
            items_available: setup.items_available,
        },
        wallet: Pubkey::new_unique(),
    };
    ledger.set_account(router_account, router.encode().unwrap());
    install_effects(&ledger, router_program, router_account);

    let images = images(setup.items_available.min(600));
    let gateway = Arc::new(ScriptedGateway::default());
    let records = Arc::new(JournaledRecords::default());

    let config = CycleConfig {
        allocator: AllocatorConfig {
            router_program,
            router_account,
            authority: payer.pubkey(),
            capacity: setup.capacity,
        },
        submitter: SubmitterConfig::default(),
        images_folder: images.path().to_path_buf(),
        items_available: setup.items_available,
        max_supply: Some(0),
        mint_policy: RetryPolicy::mint(),
    };
    let cycle = CrankCycle::new(
        Arc::clone(&ledger),
        payer,
        Arc::clone(&gateway),
        Arc::clone(&records),
        config,
    );

    Harness {
        ledger,
        gateway,
        records,
        cycle,
        router_account,
        vaults,
        _images: images,
    }
}

impl Harness {
    fn recipient(&self, vault: usize, index: usize) -> Pubkey {
        let state = VaultState::decode(&self.ledger.account(&self.vaults[vault]).unwrap()).unwrap();
        state.recipient_keys[index]
    }

    fn metadata_uri(&self, mint: &Pubkey) -> String {
        let data = self.ledger.account(&metadata_address(mint)).unwrap();
        MetadataAccount::decode_padded(&data).unwrap().uri().to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_cycle_reaches_finalized() {
    let h = harness(Setup::default());
    let recipient = h.recipient(0, 0);

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Minted);
    assert_eq!(report.recipient, Some(recipient));
    assert_eq!(report.asset_index, Some(0));

    let record = h.records.get_by_recipient(&recipient).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Finalized);
    let mint = record.mint_address.unwrap();
    assert_eq!(report.mint, Some(mint));
    assert_eq!(record.metadata_address, Some(metadata_address(&mint)));
    assert_eq!(record.content_uri.as_deref(), Some("https://arweave.net/manifest-json-2"));
    assert_eq!(report.signature, record.last_signature);

    // mint, then finalize
    assert_eq!(h.ledger.sent_transactions().len(), 2);
    assert_eq!(h.metadata_uri(&mint), "https://arweave.net/manifest-json-2");
    assert!(h.ledger.account(&edition_address(&mint)).is_some());
    assert_eq!(
        *h.gateway.files.lock().unwrap(),
        vec!["image.png".to_string(), "manifest.json".to_string()]
    );

    let json = report.to_json();
    assert_eq!(json["outcome"], "minted");
    assert_eq!(json["mint"], mint.to_string());
}

#[tokio::test(start_paused = true)]
async fn test_record_walks_every_state_in_order() {
    let h = harness(Setup::default());
    assert!(h.cycle.run().await.is_minted());

    assert_eq!(
        h.records.transitions(),
        vec![
            MintState::Pending,
            MintState::Submitted,
            MintState::Confirmed,
            MintState::ContentPublished,
            MintState::Finalized,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropped_mint_with_clean_program_logs_is_retried() {
    let h = harness(Setup::default());
    h.ledger.script_sends([SendBehavior::Drop]);

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Minted);

    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Finalized);
    assert!(!h.records.transitions().contains(&MintState::Failed));
    // dropped mint, retried mint, finalize
    assert_eq!(h.ledger.sent_transactions().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_finalized_recipient_is_not_minted_twice() {
    let h = harness(Setup::default());
    assert!(h.cycle.run().await.is_minted());

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Idle(IdleReason::AlreadyMinted));
    assert_eq!(h.ledger.sent_transactions().len(), 2);
    assert_eq!(h.gateway.uploads.load(Ordering::SeqCst), 2);
    assert_eq!(h.records.len().await, 1);
}

#[tokio::test]
async fn test_sold_out_is_idle() {
    let h = harness(Setup {
        sub_accounts: vec![(2, 5)],
        items_available: 2,
        ..Setup::default()
    });

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Idle(IdleReason::SoldOut));
    assert_eq!(report.asset_index, Some(2));
    assert!(h.records.is_empty().await);
    assert!(h.ledger.sent_transactions().is_empty());
}

#[tokio::test]
async fn test_drained_vault_is_idle() {
    let h = harness(Setup {
        sub_accounts: vec![(3, 3)],
        ..Setup::default()
    });

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Idle(IdleReason::Drained));
    assert!(report.recipient.is_none());
    assert!(h.ledger.sent_transactions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_sub_account_rolls_over_then_mints() {
    let h = harness(Setup {
        sub_accounts: vec![(2, 2), (0, 2)],
        capacity: 2,
        ..Setup::default()
    });
    let recipient = h.recipient(1, 0);

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Minted);
    assert_eq!(report.recipient, Some(recipient));
    assert_eq!(report.asset_index, Some(2));

    // rollover, mint, finalize
    let sent = h.ledger.sent_transactions();
    assert_eq!(sent.len(), 3);
    let router = RouterState::decode_padded(&h.ledger.account(&h.router_account).unwrap()).unwrap();
    assert_eq!(router.current_account_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_rollover_blocks_the_tick() {
    let h = harness(Setup {
        sub_accounts: vec![(2, 2), (0, 2)],
        capacity: 2,
        ..Setup::default()
    });
    h.ledger
        .script_sends([SendBehavior::Reject("router: unauthorized".into())]);

    let report = h.cycle.run().await;
    match report.outcome {
        CycleOutcome::Failed { error, step } => {
            assert_eq!(step, CycleStep::AllocateSlot);
            assert!(matches!(error, CycleError::AllocationExhausted { account_index: 0, .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.ledger.sent_transactions().len(), 1);
    assert!(h.records.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_sends_nothing() {
    let h = harness(Setup {
        balance: 1_000,
        ..Setup::default()
    });

    let report = h.cycle.run().await;
    match report.outcome {
        CycleOutcome::Failed { error, step } => {
            assert_eq!(step, CycleStep::BuildAndSubmitMint);
            assert!(matches!(
                error,
                CycleError::InsufficientFunds { unit: "lamports", available: 1_000, .. }
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(h.ledger.sent_transactions().is_empty());

    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Pending);
    assert!(record.mint_address.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_retry_three_times_then_resume_mints_once() {
    let h = harness(Setup::default());
    h.ledger
        .script_sends([SendBehavior::Drop, SendBehavior::Drop, SendBehavior::Drop]);

    let report = h.cycle.run().await;
    match &report.outcome {
        CycleOutcome::Failed { error, step } => {
            assert_eq!(*step, CycleStep::ConfirmMint);
            assert!(error.retryable());
        }
        other => panic!("unexpected {:?}", other),
    }
    // three attempts, one mint keypair
    let sent = h.ledger.sent_transactions();
    assert_eq!(sent.len(), 3);
    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Submitted);
    let first_mint = record.mint_address.unwrap();
    assert!(sent.iter().all(|tx| tx.message.account_keys.contains(&first_mint)));

    // nothing landed; the next tick mints with a fresh keypair
    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Minted);
    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Finalized);
    assert_ne!(record.mint_address, Some(first_mint));
    assert_eq!(h.ledger.sent_transactions().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_late_landing_is_not_minted_again() {
    let h = harness(Setup::default());
    h.ledger.script_sends([SendBehavior::LandUnseen]);

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Minted);
    // one mint despite the timeout, then finalize
    assert_eq!(h.ledger.sent_transactions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_mint_stops_and_fails_record() {
    let h = harness(Setup::default());
    h.ledger
        .script_sends([SendBehavior::Reject("custom program error: 0x1".into())]);

    let report = h.cycle.run().await;
    match &report.outcome {
        CycleOutcome::Failed { error, step } => {
            assert_eq!(*step, CycleStep::ConfirmMint);
            match error {
                CycleError::TransactionRejected { reason, .. } => {
                    assert!(reason.contains("custom program error"))
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.ledger.sent_transactions().len(), 1);

    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Failed);
    assert!(record.failure.is_some());

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Idle(IdleReason::NeedsReconciliation));
    assert_eq!(h.ledger.sent_transactions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_resumes_without_new_mint() {
    let h = harness(Setup::default());
    h.gateway.fail_next(1);

    let report = h.cycle.run().await;
    match &report.outcome {
        CycleOutcome::Failed { error, step } => {
            assert_eq!(*step, CycleStep::PublishContent);
            assert_eq!(error.kind(), "ContentUploadFailed");
        }
        other => panic!("unexpected {:?}", other),
    }
    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Confirmed);
    let mint = record.mint_address.unwrap();

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Minted);
    assert_eq!(report.mint, Some(mint));
    assert_eq!(h.ledger.sent_transactions().len(), 2);
    assert_eq!(h.metadata_uri(&mint), "https://arweave.net/manifest-json-2");
}

#[tokio::test(start_paused = true)]
async fn test_unseen_finalize_is_recognized_on_next_tick() {
    let h = harness(Setup::default());
    h.ledger
        .script_sends([SendBehavior::Confirm, SendBehavior::LandUnseen]);

    let report = h.cycle.run().await;
    match &report.outcome {
        CycleOutcome::Failed { error, step } => {
            assert_eq!(*step, CycleStep::ReconcileMetadata);
            assert!(matches!(error, CycleError::TransactionTimedOut { .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::ContentPublished);

    let report = h.cycle.run().await;
    assert_eq!(report.outcome, CycleOutcome::Minted);
    let record = h.records.get_by_recipient(&h.recipient(0, 0)).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Finalized);
    assert_eq!(h.ledger.sent_transactions().len(), 2);
}

#[tokio::test]
async fn test_ledger_outage_is_reported() {
    let h = harness(Setup::default());
    h.ledger.fail_reads(Some("connection refused"));

    let report = h.cycle.run().await;
    match report.outcome {
        CycleOutcome::Failed { error, step } => {
            assert_eq!(step, CycleStep::AllocateSlot);
            assert_eq!(error.kind(), "LedgerReadFailed");
        }
        other => panic!("unexpected {:?}", other),
    }
}
