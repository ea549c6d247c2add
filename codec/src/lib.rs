//! account codec for the mint crank.
//!
//! byte-exact encode/decode of router, vault, metadata, edition and token
//! accounts plus every instruction payload the crank submits. pure, no i/o.
//!
//! two layers:
//! - [`schema`]: flat `{name, wire-type}` schemas, the dynamic [`Value`] tree
//!   and the generic [`encode`]/[`decode`] pair
//! - [`Layout`]: typed structs on top, with [`LedgerAccount`] as the tagged
//!   union downstream code matches on

pub mod accounts;
pub mod discriminator;
pub mod error;
pub mod instructions;
pub mod layout;
pub mod schema;
pub mod table;

pub use accounts::{
    decode_account, AccountKind, Creator, EditionMarker, LedgerAccount, MasterEditionV2,
    MetadataAccount, MetadataData, MintAccount, RouterConfig, RouterState, SubAccountRef,
    VaultState, MINT_ACCOUNT_LEN,
};
pub use error::{CodecError, MismatchReason};
pub use instructions::{
    memo_data, CreateAccountArgs, CreateMasterEditionArgs, CreateMetadataArgs,
    InitializeMintArgs, MintToArgs, RolloverArgs, UpdateMetadataArgs,
};
pub use layout::Layout;
pub use schema::{decode, decode_padded, encode, Field, Schema, Value, WireType};
pub use table::{SCHEMA_TABLE, SCHEMA_VERSION};
