//! typed ledger accounts.

use solana_sdk::pubkey::Pubkey;

use crate::discriminator::account_discriminator;
use crate::error::{CodecError, MismatchReason};
use crate::layout::Layout;
use crate::schema::{as_i64, as_pubkey, as_u64, Fields, Schema, Value};
use crate::table;

/// metadata program account keys.
pub const METADATA_KEY_V1: u8 = 4;
pub const MASTER_EDITION_KEY_V2: u8 = 6;
pub const EDITION_MARKER_KEY: u8 = 7;

/// size of an spl token mint account.
pub const MINT_ACCOUNT_LEN: usize = 82;

pub(crate) fn pubkey_value(key: &Pubkey) -> Value {
    Value::Pubkey(key.to_bytes())
}

pub(crate) fn read_pubkey(fields: &mut Fields) -> Result<Pubkey, CodecError> {
    Ok(Pubkey::new_from_array(fields.pubkey()?))
}

fn pubkey_of(value: Value, schema: &'static Schema) -> Result<Pubkey, CodecError> {
    as_pubkey(value, schema).map(Pubkey::new_from_array)
}

/// one router slot: a vault account and its fill level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAccountRef {
    pub vault_account: Pubkey,
    pub current_sub_account_index: u8,
}

impl Layout for SubAccountRef {
    const SCHEMA: &'static Schema = &table::SUB_ACCOUNT_REF;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            pubkey_value(&self.vault_account),
            Value::U8(self.current_sub_account_index),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        Ok(Self {
            vault_account: read_pubkey(f)?,
            current_sub_account_index: f.u8()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub price: u64,
    pub go_live_date: Option<i64>,
    pub uuid: String,
    pub items_available: u64,
}

impl Layout for RouterConfig {
    const SCHEMA: &'static Schema = &table::ROUTER_CONFIG;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U64(self.price),
            Value::Option(self.go_live_date.map(|d| Box::new(Value::I64(d)))),
            Value::Str(self.uuid.clone()),
            Value::U64(self.items_available),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        Ok(Self {
            price: f.u64()?,
            go_live_date: f.option(|v| as_i64(v, Self::SCHEMA))?,
            uuid: f.string()?,
            items_available: f.u64()?,
        })
    }
}

/// router account: the two-tier allocation index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterState {
    pub current_account_index: u32,
    pub sub_accounts: Vec<SubAccountRef>,
    pub authority: Pubkey,
    pub config: RouterConfig,
    pub wallet: Pubkey,
}

impl RouterState {
    pub fn discriminator() -> [u8; 8] {
        account_discriminator("RouterData")
    }

    /// the sub-account the counter currently points at.
    ///
    /// an index outside `sub_accounts` is corrupt router state.
    pub fn current_sub_account(&self) -> Result<&SubAccountRef, CodecError> {
        self.sub_accounts
            .get(self.current_account_index as usize)
            .ok_or_else(|| {
                CodecError::mismatch(
                    table::ROUTER_DATA.name,
                    MismatchReason::Invalid("current_account_index outside sub_accounts"),
                )
            })
    }
}

impl Layout for RouterState {
    const SCHEMA: &'static Schema = &table::ROUTER_DATA;

    fn to_value(&self) -> Value {
        let tracker = Value::Struct(vec![
            Value::U32(self.current_account_index),
            Value::Vec(self.sub_accounts.iter().map(SubAccountRef::to_value).collect()),
        ]);
        Value::Struct(vec![
            Value::Bytes(Self::discriminator().to_vec()),
            tracker,
            pubkey_value(&self.authority),
            self.config.to_value(),
            pubkey_value(&self.wallet),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_discriminator(Self::discriminator())?;

        let mut tracker = Fields::new(&table::ACCOUNT_TRACKER, f.next()?)?;
        let current_account_index = tracker.u32()?;
        let sub_accounts = tracker.vec(SubAccountRef::from_value)?;

        Ok(Self {
            current_account_index,
            sub_accounts,
            authority: read_pubkey(f)?,
            config: RouterConfig::from_value(f.next()?)?,
            wallet: read_pubkey(f)?,
        })
    }
}

/// vault account: an ordered list of recipient keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultState {
    pub authority: Pubkey,
    pub recipient_keys: Vec<Pubkey>,
}

impl VaultState {
    pub fn discriminator() -> [u8; 8] {
        account_discriminator("UserVaultAccount")
    }
}

impl Layout for VaultState {
    const SCHEMA: &'static Schema = &table::USER_VAULT;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::Bytes(Self::discriminator().to_vec()),
            pubkey_value(&self.authority),
            Value::Vec(self.recipient_keys.iter().map(pubkey_value).collect()),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_discriminator(Self::discriminator())?;
        Ok(Self {
            authority: read_pubkey(f)?,
            recipient_keys: f.vec(|v| pubkey_of(v, Self::SCHEMA))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Creator {
    pub address: Pubkey,
    pub share: u8,
    pub verified: bool,
}

impl Layout for Creator {
    const SCHEMA: &'static Schema = &table::CREATOR;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            pubkey_value(&self.address),
            Value::U8(self.share),
            Value::Bool(self.verified),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        Ok(Self {
            address: read_pubkey(f)?,
            share: f.u8()?,
            verified: f.bool()?,
        })
    }
}

/// metadata `Data` block, shared by the account and its instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataData {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
    pub creators: Option<Vec<Creator>>,
}

impl Layout for MetadataData {
    const SCHEMA: &'static Schema = &table::METADATA_DATA;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::Str(self.name.clone()),
            Value::Str(self.symbol.clone()),
            Value::Str(self.uri.clone()),
            Value::U16(self.seller_fee_basis_points),
            Value::Option(self.creators.as_ref().map(|list| {
                Box::new(Value::Vec(list.iter().map(Creator::to_value).collect()))
            })),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        let name = f.string()?;
        let symbol = f.string()?;
        let uri = f.string()?;
        let seller_fee_basis_points = f.u16()?;
        let creators = f.option(|v| match v {
            Value::Vec(items) => items.into_iter().map(Creator::from_value).collect(),
            _ => Err(CodecError::mismatch(
                table::METADATA_DATA.name,
                MismatchReason::Shape {
                    field: "creators",
                    expected: "vec",
                },
            )),
        })?;
        Ok(Self {
            name,
            symbol,
            uri,
            seller_fee_basis_points,
            creators,
        })
    }
}

/// metadata program account for one mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataAccount {
    pub update_authority: Pubkey,
    pub mint: Pubkey,
    pub data: MetadataData,
    pub primary_sale_happened: bool,
    pub is_mutable: bool,
}

impl MetadataAccount {
    /// uri with the on-ledger padding stripped.
    pub fn uri(&self) -> &str {
        self.data.uri.trim_end_matches(['\0', ' '])
    }
}

impl Layout for MetadataAccount {
    const SCHEMA: &'static Schema = &table::METADATA;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U8(METADATA_KEY_V1),
            pubkey_value(&self.update_authority),
            pubkey_value(&self.mint),
            self.data.to_value(),
            Value::Bool(self.primary_sale_happened),
            Value::Bool(self.is_mutable),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(METADATA_KEY_V1)?;
        Ok(Self {
            update_authority: read_pubkey(f)?,
            mint: read_pubkey(f)?,
            data: MetadataData::from_value(f.next()?)?,
            primary_sale_happened: f.bool()?,
            is_mutable: f.bool()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterEditionV2 {
    pub supply: u64,
    pub max_supply: Option<u64>,
}

impl Layout for MasterEditionV2 {
    const SCHEMA: &'static Schema = &table::MASTER_EDITION_V2;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U8(MASTER_EDITION_KEY_V2),
            Value::U64(self.supply),
            Value::Option(self.max_supply.map(|m| Box::new(Value::U64(m)))),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(MASTER_EDITION_KEY_V2)?;
        Ok(Self {
            supply: f.u64()?,
            max_supply: f.option(|v| as_u64(v, Self::SCHEMA))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditionMarker {
    pub ledger: [u8; 31],
}

impl Layout for EditionMarker {
    const SCHEMA: &'static Schema = &table::EDITION_MARKER;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U8(EDITION_MARKER_KEY),
            Value::Bytes(self.ledger.to_vec()),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(EDITION_MARKER_KEY)?;
        Ok(Self {
            ledger: f.bytes::<31>()?,
        })
    }
}

/// spl token mint account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintAccount {
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority: Option<Pubkey>,
}

impl Layout for MintAccount {
    const SCHEMA: &'static Schema = &table::MINT_ACCOUNT;

    fn to_value(&self) -> Value {
        let opt = |k: &Option<Pubkey>| Value::Option(k.as_ref().map(|k| Box::new(pubkey_value(k))));
        Value::Struct(vec![
            opt(&self.mint_authority),
            Value::U64(self.supply),
            Value::U8(self.decimals),
            Value::Bool(self.is_initialized),
            opt(&self.freeze_authority),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        Ok(Self {
            mint_authority: f.option(|v| pubkey_of(v, Self::SCHEMA))?,
            supply: f.u64()?,
            decimals: f.u8()?,
            is_initialized: f.bool()?,
            freeze_authority: f.option(|v| pubkey_of(v, Self::SCHEMA))?,
        })
    }
}

/// which account layout to decode with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Router,
    Vault,
    Metadata,
    MasterEdition,
    EditionMarker,
    Mint,
}

/// every ledger account the crank reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAccount {
    Router(RouterState),
    Vault(VaultState),
    Metadata(MetadataAccount),
    MasterEdition(MasterEditionV2),
    EditionMarker(EditionMarker),
    Mint(MintAccount),
}

impl LedgerAccount {
    pub fn kind(&self) -> AccountKind {
        match self {
            LedgerAccount::Router(_) => AccountKind::Router,
            LedgerAccount::Vault(_) => AccountKind::Vault,
            LedgerAccount::Metadata(_) => AccountKind::Metadata,
            LedgerAccount::MasterEdition(_) => AccountKind::MasterEdition,
            LedgerAccount::EditionMarker(_) => AccountKind::EditionMarker,
            LedgerAccount::Mint(_) => AccountKind::Mint,
        }
    }
}

/// decode raw account data. allocated accounts may be zero padded.
pub fn decode_account(kind: AccountKind, bytes: &[u8]) -> Result<LedgerAccount, CodecError> {
    Ok(match kind {
        AccountKind::Router => LedgerAccount::Router(RouterState::decode_padded(bytes)?),
        AccountKind::Vault => LedgerAccount::Vault(VaultState::decode_padded(bytes)?),
        AccountKind::Metadata => LedgerAccount::Metadata(MetadataAccount::decode_padded(bytes)?),
        AccountKind::MasterEdition => {
            LedgerAccount::MasterEdition(MasterEditionV2::decode_padded(bytes)?)
        }
        AccountKind::EditionMarker => {
            LedgerAccount::EditionMarker(EditionMarker::decode_padded(bytes)?)
        }
        AccountKind::Mint => LedgerAccount::Mint(MintAccount::decode(bytes)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> RouterState {
        RouterState {
            current_account_index: 1,
            sub_accounts: vec![
                SubAccountRef {
                    vault_account: Pubkey::new_unique(),
                    current_sub_account_index: 240,
                },
                SubAccountRef {
                    vault_account: Pubkey::new_unique(),
                    current_sub_account_index: 12,
                },
            ],
            authority: Pubkey::new_unique(),
            config: RouterConfig {
                price: 1_000_000,
                go_live_date: Some(1_640_000_000),
                uuid: "abc123".to_string(),
                items_available: 480,
            },
            wallet: Pubkey::new_unique(),
        }
    }

    fn metadata() -> MetadataAccount {
        MetadataAccount {
            update_authority: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            data: MetadataData {
                name: "Item #3".to_string(),
                symbol: "ITM".to_string(),
                uri: "https://arweave.net/abc".to_string(),
                seller_fee_basis_points: 500,
                creators: Some(vec![Creator {
                    address: Pubkey::new_unique(),
                    share: 100,
                    verified: true,
                }]),
            },
            primary_sale_happened: false,
            is_mutable: true,
        }
    }

    #[test]
    fn test_router_round_trip() {
        let state = router();
        let bytes = state.encode().unwrap();
        assert_eq!(&bytes[..8], &RouterState::discriminator());
        assert_eq!(RouterState::decode(&bytes).unwrap(), state);
        assert_eq!(
            state.current_sub_account().unwrap().current_sub_account_index,
            12
        );
    }

    #[test]
    fn test_router_index_out_of_range() {
        let mut state = router();
        state.current_account_index = 2;
        let err = state.current_sub_account().unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_router_wrong_discriminator() {
        let mut bytes = router().encode().unwrap();
        bytes[0] ^= 0xff;
        let err = RouterState::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::SchemaMismatch {
                reason: MismatchReason::Discriminator { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_vault_round_trip_padded() {
        let vault = VaultState {
            authority: Pubkey::new_unique(),
            recipient_keys: (0..5).map(|_| Pubkey::new_unique()).collect(),
        };
        let mut bytes = vault.encode().unwrap();
        bytes.resize(bytes.len() + 1000, 0);

        assert!(VaultState::decode(&bytes).is_err());
        match decode_account(AccountKind::Vault, &bytes).unwrap() {
            LedgerAccount::Vault(decoded) => assert_eq!(decoded, vault),
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn test_vault_discriminator_rejects_router() {
        let bytes = router().encode().unwrap();
        assert!(decode_account(AccountKind::Vault, &bytes).is_err());
    }

    #[test]
    fn test_metadata_round_trip() {
        let account = metadata();
        let bytes = account.encode().unwrap();
        assert_eq!(bytes[0], METADATA_KEY_V1);
        assert_eq!(MetadataAccount::decode(&bytes).unwrap(), account);
    }

    #[test]
    fn test_metadata_uri_trims_padding() {
        let mut account = metadata();
        account.data.uri = format!("{}{}", "https://arweave.net/x", "\0".repeat(10));
        assert_eq!(account.uri(), "https://arweave.net/x");
        account.data.uri = " ".repeat(64);
        assert_eq!(account.uri(), "");
    }

    #[test]
    fn test_master_edition_round_trip() {
        for max_supply in [None, Some(0), Some(10)] {
            let edition = MasterEditionV2 {
                supply: 0,
                max_supply,
            };
            let bytes = edition.encode().unwrap();
            assert_eq!(MasterEditionV2::decode(&bytes).unwrap(), edition);
        }
    }

    #[test]
    fn test_master_edition_wrong_key() {
        let mut bytes = MasterEditionV2 {
            supply: 1,
            max_supply: None,
        }
        .encode()
        .unwrap();
        bytes[0] = METADATA_KEY_V1;
        assert!(MasterEditionV2::decode(&bytes).is_err());
    }

    #[test]
    fn test_edition_marker_round_trip() {
        let marker = EditionMarker { ledger: [3; 31] };
        let bytes = marker.encode().unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(EditionMarker::decode(&bytes).unwrap(), marker);
    }

    #[test]
    fn test_mint_account_layout() {
        let payer = Pubkey::new_unique();
        let mint = MintAccount {
            mint_authority: Some(payer),
            supply: 1,
            decimals: 0,
            is_initialized: true,
            freeze_authority: None,
        };
        let bytes = mint.encode().unwrap();
        assert_eq!(bytes.len(), MINT_ACCOUNT_LEN);
        assert_eq!(&bytes[..4], &[1, 0, 0, 0]);
        assert_eq!(MintAccount::decode(&bytes).unwrap(), mint);
    }

    #[test]
    fn test_truncated_router() {
        let bytes = router().encode().unwrap();
        assert!(RouterState::decode(&bytes[..bytes.len() - 3]).is_err());
        assert!(decode_account(AccountKind::Router, &bytes[..20]).is_err());
    }
}
