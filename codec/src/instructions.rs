//! typed instruction payloads.

use solana_sdk::pubkey::Pubkey;

use crate::accounts::{pubkey_value, read_pubkey, MetadataData};
use crate::discriminator::instruction_discriminator;
use crate::error::CodecError;
use crate::layout::Layout;
use crate::schema::{as_bool, as_pubkey, Fields, Schema, Value};
use crate::table;

pub const CREATE_METADATA_IX: u8 = 0;
pub const UPDATE_METADATA_IX: u8 = 1;
pub const CREATE_MASTER_EDITION_IX: u8 = 10;
pub const INITIALIZE_MINT_IX: u8 = 0;
pub const MINT_TO_IX: u8 = 7;
pub const CREATE_ACCOUNT_IX: u32 = 0;

/// router `update_current_account_index`; no arguments past the discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloverArgs;

impl RolloverArgs {
    pub fn discriminator() -> [u8; 8] {
        instruction_discriminator("update_current_account_index")
    }
}

impl Layout for RolloverArgs {
    const SCHEMA: &'static Schema = &table::ROLLOVER;

    fn to_value(&self) -> Value {
        Value::Struct(vec![Value::Bytes(Self::discriminator().to_vec())])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_discriminator(Self::discriminator())?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMetadataArgs {
    pub data: MetadataData,
    pub is_mutable: bool,
}

impl Layout for CreateMetadataArgs {
    const SCHEMA: &'static Schema = &table::CREATE_METADATA;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U8(CREATE_METADATA_IX),
            self.data.to_value(),
            Value::Bool(self.is_mutable),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(CREATE_METADATA_IX)?;
        Ok(Self {
            data: MetadataData::from_value(f.next()?)?,
            is_mutable: f.bool()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateMetadataArgs {
    pub data: Option<MetadataData>,
    pub update_authority: Option<Pubkey>,
    pub primary_sale_happened: Option<bool>,
}

impl Layout for UpdateMetadataArgs {
    const SCHEMA: &'static Schema = &table::UPDATE_METADATA;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U8(UPDATE_METADATA_IX),
            Value::Option(self.data.as_ref().map(|d| Box::new(d.to_value()))),
            Value::Option(self.update_authority.as_ref().map(|k| Box::new(pubkey_value(k)))),
            Value::Option(self.primary_sale_happened.map(|b| Box::new(Value::Bool(b)))),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(UPDATE_METADATA_IX)?;
        Ok(Self {
            data: f.option(MetadataData::from_value)?,
            update_authority: f
                .option(|v| as_pubkey(v, Self::SCHEMA))?
                .map(Pubkey::new_from_array),
            primary_sale_happened: f.option(|v| as_bool(v, Self::SCHEMA))?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateMasterEditionArgs {
    /// `None` leaves the edition supply open.
    pub max_supply: Option<u64>,
}

impl Layout for CreateMasterEditionArgs {
    const SCHEMA: &'static Schema = &table::CREATE_MASTER_EDITION;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U8(CREATE_MASTER_EDITION_IX),
            Value::Option(self.max_supply.map(|m| Box::new(Value::U64(m)))),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(CREATE_MASTER_EDITION_IX)?;
        Ok(Self {
            max_supply: f.option(|v| crate::schema::as_u64(v, Self::SCHEMA))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializeMintArgs {
    pub decimals: u8,
    pub mint_authority: Pubkey,
    pub freeze_authority: Option<Pubkey>,
}

impl Layout for InitializeMintArgs {
    const SCHEMA: &'static Schema = &table::INITIALIZE_MINT;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U8(INITIALIZE_MINT_IX),
            Value::U8(self.decimals),
            pubkey_value(&self.mint_authority),
            Value::Option(self.freeze_authority.as_ref().map(|k| Box::new(pubkey_value(k)))),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(INITIALIZE_MINT_IX)?;
        Ok(Self {
            decimals: f.u8()?,
            mint_authority: read_pubkey(f)?,
            freeze_authority: f
                .option(|v| as_pubkey(v, Self::SCHEMA))?
                .map(Pubkey::new_from_array),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintToArgs {
    pub amount: u64,
}

impl Layout for MintToArgs {
    const SCHEMA: &'static Schema = &table::MINT_TO;

    fn to_value(&self) -> Value {
        Value::Struct(vec![Value::U8(MINT_TO_IX), Value::U64(self.amount)])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u8(MINT_TO_IX)?;
        Ok(Self { amount: f.u64()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateAccountArgs {
    pub lamports: u64,
    pub space: u64,
    pub owner: Pubkey,
}

impl Layout for CreateAccountArgs {
    const SCHEMA: &'static Schema = &table::CREATE_ACCOUNT;

    fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::U32(CREATE_ACCOUNT_IX),
            Value::U64(self.lamports),
            Value::U64(self.space),
            pubkey_value(&self.owner),
        ])
    }

    fn from_fields(f: &mut Fields) -> Result<Self, CodecError> {
        f.expect_u32(CREATE_ACCOUNT_IX)?;
        Ok(Self {
            lamports: f.u64()?,
            space: f.u64()?,
            owner: read_pubkey(f)?,
        })
    }
}

/// memo payload: raw utf-8, no framing.
pub fn memo_data(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}
