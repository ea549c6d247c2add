//! the versioned schema table.
//!
//! one entry per account or instruction shape the crank reads or writes.
//! bump [`SCHEMA_VERSION`] whenever an entry changes shape.

use crate::error::CodecError;
use crate::schema::{Field, Schema, WireType};

pub const SCHEMA_VERSION: u32 = 1;

const DISCRIMINATOR: WireType = WireType::Bytes(8);

// router program (anchor)

pub const SUB_ACCOUNT_REF: Schema = Schema {
    name: "NftSubAccount",
    fields: &[
        Field::new("nft_sub_account", WireType::Pubkey),
        Field::new("current_sub_account_index", WireType::U8),
    ],
};

pub const ACCOUNT_TRACKER: Schema = Schema {
    name: "NftAccountTracker",
    fields: &[
        Field::new("current_account_index", WireType::U32),
        Field::new("sub_accounts", WireType::Vec(&WireType::Struct(&SUB_ACCOUNT_REF))),
    ],
};

pub const ROUTER_CONFIG: Schema = Schema {
    name: "ConfigData",
    fields: &[
        Field::new("price", WireType::U64),
        Field::new("go_live_date", WireType::Option(&WireType::I64)),
        Field::new("uuid", WireType::Str),
        Field::new("items_available", WireType::U64),
    ],
};

pub const ROUTER_DATA: Schema = Schema {
    name: "RouterData",
    fields: &[
        Field::new("discriminator", DISCRIMINATOR),
        Field::new("data", WireType::Struct(&ACCOUNT_TRACKER)),
        Field::new("authority", WireType::Pubkey),
        Field::new("config", WireType::Struct(&ROUTER_CONFIG)),
        Field::new("wallet", WireType::Pubkey),
    ],
};

pub const ROLLOVER: Schema = Schema {
    name: "update_current_account_index",
    fields: &[Field::new("discriminator", DISCRIMINATOR)],
};

// vault program (anchor)

pub const USER_VAULT: Schema = Schema {
    name: "UserVaultAccount",
    fields: &[
        Field::new("discriminator", DISCRIMINATOR),
        Field::new("authority", WireType::Pubkey),
        Field::new("users_pub_key", WireType::Vec(&WireType::Pubkey)),
    ],
};

// metadata program

pub const CREATOR: Schema = Schema {
    name: "Creator",
    fields: &[
        Field::new("address", WireType::Pubkey),
        Field::new("share", WireType::U8),
        Field::new("verified", WireType::Bool),
    ],
};

pub const METADATA_DATA: Schema = Schema {
    name: "Data",
    fields: &[
        Field::new("name", WireType::Str),
        Field::new("symbol", WireType::Str),
        Field::new("uri", WireType::Str),
        Field::new("seller_fee_basis_points", WireType::U16),
        Field::new(
            "creators",
            WireType::Option(&WireType::Vec(&WireType::Struct(&CREATOR))),
        ),
    ],
};

pub const METADATA: Schema = Schema {
    name: "Metadata",
    fields: &[
        Field::new("key", WireType::U8),
        Field::new("update_authority", WireType::Pubkey),
        Field::new("mint", WireType::Pubkey),
        Field::new("data", WireType::Struct(&METADATA_DATA)),
        Field::new("primary_sale_happened", WireType::Bool),
        Field::new("is_mutable", WireType::Bool),
    ],
};

pub const MASTER_EDITION_V2: Schema = Schema {
    name: "MasterEditionV2",
    fields: &[
        Field::new("key", WireType::U8),
        Field::new("supply", WireType::U64),
        Field::new("max_supply", WireType::Option(&WireType::U64)),
    ],
};

pub const EDITION_MARKER: Schema = Schema {
    name: "EditionMarker",
    fields: &[
        Field::new("key", WireType::U8),
        Field::new("ledger", WireType::Bytes(31)),
    ],
};

pub const CREATE_METADATA: Schema = Schema {
    name: "CreateMetadataArgs",
    fields: &[
        Field::new("instruction", WireType::U8),
        Field::new("data", WireType::Struct(&METADATA_DATA)),
        Field::new("is_mutable", WireType::Bool),
    ],
};

pub const UPDATE_METADATA: Schema = Schema {
    name: "UpdateMetadataArgs",
    fields: &[
        Field::new("instruction", WireType::U8),
        Field::new("data", WireType::Option(&WireType::Struct(&METADATA_DATA))),
        Field::new("update_authority", WireType::Option(&WireType::Pubkey)),
        Field::new("primary_sale_happened", WireType::Option(&WireType::Bool)),
    ],
};

pub const CREATE_MASTER_EDITION: Schema = Schema {
    name: "CreateMasterEditionArgs",
    fields: &[
        Field::new("instruction", WireType::U8),
        Field::new("max_supply", WireType::Option(&WireType::U64)),
    ],
};

// token program

pub const MINT_ACCOUNT: Schema = Schema {
    name: "Mint",
    fields: &[
        Field::new("mint_authority", WireType::COption(&WireType::Pubkey)),
        Field::new("supply", WireType::U64),
        Field::new("decimals", WireType::U8),
        Field::new("is_initialized", WireType::Bool),
        Field::new("freeze_authority", WireType::COption(&WireType::Pubkey)),
    ],
};

pub const INITIALIZE_MINT: Schema = Schema {
    name: "InitializeMint",
    fields: &[
        Field::new("instruction", WireType::U8),
        Field::new("decimals", WireType::U8),
        Field::new("mint_authority", WireType::Pubkey),
        Field::new("freeze_authority", WireType::Option(&WireType::Pubkey)),
    ],
};

pub const MINT_TO: Schema = Schema {
    name: "MintTo",
    fields: &[
        Field::new("instruction", WireType::U8),
        Field::new("amount", WireType::U64),
    ],
};

// system program

pub const CREATE_ACCOUNT: Schema = Schema {
    name: "CreateAccount",
    fields: &[
        Field::new("instruction", WireType::U32),
        Field::new("lamports", WireType::U64),
        Field::new("space", WireType::U64),
        Field::new("owner", WireType::Pubkey),
    ],
};

/// every schema known to this build.
pub const SCHEMA_TABLE: &[&Schema] = &[
    &SUB_ACCOUNT_REF,
    &ACCOUNT_TRACKER,
    &ROUTER_CONFIG,
    &ROUTER_DATA,
    &ROLLOVER,
    &USER_VAULT,
    &CREATOR,
    &METADATA_DATA,
    &METADATA,
    &MASTER_EDITION_V2,
    &EDITION_MARKER,
    &CREATE_METADATA,
    &UPDATE_METADATA,
    &CREATE_MASTER_EDITION,
    &MINT_ACCOUNT,
    &INITIALIZE_MINT,
    &MINT_TO,
    &CREATE_ACCOUNT,
];

/// look a schema up by name.
pub fn schema(name: &str) -> Result<&'static Schema, CodecError> {
    SCHEMA_TABLE
        .iter()
        .copied()
        .find(|s| s.name == name)
        .ok_or_else(|| CodecError::UnknownSchema(name.to_string()))
}
