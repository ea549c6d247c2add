//! mint transaction assembly.
//!
//! fixed instruction order:
//! 1. memo: hex sha-256 of the image
//! 2. memo: hex sha-256 of the rewritten metadata
//! 3. system create account for the mint (token program owned, 82 bytes)
//! 4. token initialize mint (decimals 0, mint + freeze authority = payer)
//! 5. associated token account for the recipient
//! 6. metadata account with a blank 64 char uri, patched after publication

use crank_codec::{
    memo_data, CodecError, CreateAccountArgs, CreateMetadataArgs, Creator, InitializeMintArgs,
    Layout, MetadataData, MINT_ACCOUNT_LEN,
};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::{system_program, sysvar};

use crate::assets::{AssetPayload, ContentDigests, Manifest};
use crate::programs::{
    associated_token_address, metadata_address, ASSOCIATED_TOKEN_PROGRAM_ID, MEMO_PROGRAM_ID,
    METADATA_PROGRAM_ID, TOKEN_PROGRAM_ID,
};

/// uri slot reserved at creation; the permanent uri is written later.
pub const URI_PLACEHOLDER_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid creator address {0}")]
    InvalidCreator(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// assembled mint transaction content.
#[derive(Debug)]
pub struct MintPlan<'a> {
    pub instructions: Vec<Instruction>,
    /// payer first, then the mint keypair.
    pub signers: Vec<&'a Keypair>,
    pub mint: Pubkey,
    pub metadata: Pubkey,
    pub recipient_token_account: Pubkey,
}

/// metadata `Data` derived from a manifest with the given uri.
pub fn metadata_data(
    manifest: &Manifest,
    uri: String,
    payer: &Pubkey,
) -> Result<MetadataData, BuildError> {
    Ok(MetadataData {
        name: manifest.name.clone(),
        symbol: manifest.symbol.clone(),
        uri,
        seller_fee_basis_points: manifest.seller_fee_basis_points,
        creators: creators(manifest, payer)?,
    })
}

/// creators from the manifest. a creator equal to the payer is verified by its signature.
fn creators(manifest: &Manifest, payer: &Pubkey) -> Result<Option<Vec<Creator>>, BuildError> {
    let list = &manifest.properties.creators;
    if list.is_empty() {
        return Ok(None);
    }

    let mut out = Vec::with_capacity(list.len());
    for creator in list {
        let address: Pubkey = creator
            .address
            .parse()
            .map_err(|_| BuildError::InvalidCreator(creator.address.clone()))?;
        out.push(Creator {
            address,
            share: creator.share,
            verified: address == *payer,
        });
    }

    let total: u32 = out.iter().map(|c| c.share as u32).sum();
    if total != 100 {
        tracing::warn!(
            name = %manifest.name,
            total,
            "creator shares do not sum to 100, dropping creators"
        );
        return Ok(None);
    }
    Ok(Some(out))
}

pub fn memo_instruction(text: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: vec![],
        data: memo_data(text),
    }
}

/// builds the mint transaction. pure: the mint keypair and rent are inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionBuilder;

impl TransactionBuilder {
    pub fn build<'a>(
        &self,
        recipient: &Pubkey,
        asset: &AssetPayload,
        digests: &ContentDigests,
        payer: &'a Keypair,
        mint: &'a Keypair,
        mint_rent: u64,
    ) -> Result<MintPlan<'a>, BuildError> {
        let payer_key = payer.pubkey();
        let mint_key = mint.pubkey();
        let metadata = metadata_address(&mint_key);
        let recipient_token_account = associated_token_address(recipient, &mint_key);

        let create_mint = Instruction {
            program_id: system_program::ID,
            accounts: vec![
                AccountMeta::new(payer_key, true),
                AccountMeta::new(mint_key, true),
            ],
            data: CreateAccountArgs {
                lamports: mint_rent,
                space: MINT_ACCOUNT_LEN as u64,
                owner: TOKEN_PROGRAM_ID,
            }
            .encode()?,
        };

        let init_mint = Instruction {
            program_id: TOKEN_PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(mint_key, false),
                AccountMeta::new_readonly(sysvar::rent::ID, false),
            ],
            data: InitializeMintArgs {
                decimals: 0,
                mint_authority: payer_key,
                freeze_authority: Some(payer_key),
            }
            .encode()?,
        };

        let create_ata = Instruction {
            program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(payer_key, true),
                AccountMeta::new(recipient_token_account, false),
                AccountMeta::new_readonly(*recipient, false),
                AccountMeta::new_readonly(mint_key, false),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
                AccountMeta::new_readonly(sysvar::rent::ID, false),
            ],
            data: vec![],
        };

        let data = metadata_data(&asset.manifest, " ".repeat(URI_PLACEHOLDER_LEN), &payer_key)?;
        let create_metadata = Instruction {
            program_id: METADATA_PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(metadata, false),
                AccountMeta::new_readonly(mint_key, false),
                AccountMeta::new_readonly(payer_key, true), // mint authority
                AccountMeta::new_readonly(payer_key, true), // payer
                AccountMeta::new_readonly(payer_key, false), // update authority
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new_readonly(sysvar::rent::ID, false),
            ],
            data: CreateMetadataArgs {
                data,
                is_mutable: true,
            }
            .encode()?,
        };

        Ok(MintPlan {
            instructions: vec![
                memo_instruction(&digests.image),
                memo_instruction(&digests.metadata),
                create_mint,
                init_mint,
                create_ata,
                create_metadata,
            ],
            signers: vec![payer, mint],
            mint: mint_key,
            metadata,
            recipient_token_account,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ManifestCreator, ManifestProperties};

    fn asset(creators: Vec<ManifestCreator>) -> AssetPayload {
        AssetPayload {
            index: 3,
            image: vec![1, 2, 3],
            metadata: b"{}".to_vec(),
            manifest: Manifest {
                name: "Item #3".into(),
                symbol: "ITM".into(),
                description: String::new(),
                seller_fee_basis_points: 250,
                image: Some("image.png".into()),
                properties: ManifestProperties {
                    creators,
                    files: vec![],
                },
            },
        }
    }

    #[test]
    fn test_instruction_order_and_signers() {
        let payer = Keypair::new();
        let mint = Keypair::new();
        let recipient = Pubkey::new_unique();
        let asset = asset(vec![]);
        let digests = asset.digests();

        let plan = TransactionBuilder
            .build(&recipient, &asset, &digests, &payer, &mint, 1_461_600)
            .unwrap();

        let programs: Vec<Pubkey> = plan.instructions.iter().map(|ix| ix.program_id).collect();
        assert_eq!(
            programs,
            vec![
                MEMO_PROGRAM_ID,
                MEMO_PROGRAM_ID,
                system_program::ID,
                TOKEN_PROGRAM_ID,
                ASSOCIATED_TOKEN_PROGRAM_ID,
                METADATA_PROGRAM_ID,
            ]
        );
        assert_eq!(plan.instructions[0].data, digests.image.as_bytes());
        assert_eq!(plan.instructions[1].data, digests.metadata.as_bytes());

        let signer_keys: Vec<Pubkey> = plan.signers.iter().map(|k| k.pubkey()).collect();
        assert_eq!(signer_keys, vec![payer.pubkey(), mint.pubkey()]);
        assert_eq!(plan.mint, mint.pubkey());
        assert_eq!(plan.metadata, metadata_address(&mint.pubkey()));
        assert_eq!(
            plan.recipient_token_account,
            associated_token_address(&recipient, &mint.pubkey())
        );
    }

    #[test]
    fn test_payloads() {
        let payer = Keypair::new();
        let mint = Keypair::new();
        let asset = asset(vec![]);
        let plan = TransactionBuilder
            .build(&Pubkey::new_unique(), &asset, &asset.digests(), &payer, &mint, 42)
            .unwrap();

        let create = CreateAccountArgs::decode(&plan.instructions[2].data).unwrap();
        assert_eq!(create.lamports, 42);
        assert_eq!(create.space, 82);
        assert_eq!(create.owner, TOKEN_PROGRAM_ID);

        let init = InitializeMintArgs::decode(&plan.instructions[3].data).unwrap();
        assert_eq!(init.decimals, 0);
        assert_eq!(init.mint_authority, payer.pubkey());
        assert_eq!(init.freeze_authority, Some(payer.pubkey()));

        assert!(plan.instructions[4].data.is_empty());

        let metadata = CreateMetadataArgs::decode(&plan.instructions[5].data).unwrap();
        assert_eq!(metadata.data.uri, " ".repeat(64));
        assert_eq!(metadata.data.name, "Item #3");
        assert_eq!(metadata.data.seller_fee_basis_points, 250);
        assert_eq!(metadata.data.creators, None);
        assert!(metadata.is_mutable);
    }

    #[test]
    fn test_deterministic() {
        let payer = Keypair::new();
        let mint = Keypair::new();
        let recipient = Pubkey::new_unique();
        let asset = asset(vec![]);
        let digests = asset.digests();

        let a = TransactionBuilder
            .build(&recipient, &asset, &digests, &payer, &mint, 7)
            .unwrap();
        let b = TransactionBuilder
            .build(&recipient, &asset, &digests, &payer, &mint, 7)
            .unwrap();
        assert_eq!(a.instructions, b.instructions);
    }

    #[test]
    fn test_payer_creator_is_verified() {
        let payer = Keypair::new();
        let other = Pubkey::new_unique();
        let asset = asset(vec![
            ManifestCreator {
                address: payer.pubkey().to_string(),
                share: 60,
            },
            ManifestCreator {
                address: other.to_string(),
                share: 40,
            },
        ]);
        let data = metadata_data(&asset.manifest, String::new(), &payer.pubkey()).unwrap();
        let creators = data.creators.unwrap();
        assert!(creators[0].verified);
        assert!(!creators[1].verified);
        assert_eq!(creators[1].address, other);
    }

    #[test]
    fn test_bad_shares_drop_creators() {
        let asset = asset(vec![ManifestCreator {
            address: Pubkey::new_unique().to_string(),
            share: 50,
        }]);
        let data = metadata_data(&asset.manifest, String::new(), &Pubkey::new_unique()).unwrap();
        assert_eq!(data.creators, None);
    }

    #[test]
    fn test_invalid_creator_address() {
        let asset = asset(vec![ManifestCreator {
            address: "not-a-key".into(),
            share: 100,
        }]);
        assert!(matches!(
            metadata_data(&asset.manifest, String::new(), &Pubkey::new_unique()),
            Err(BuildError::InvalidCreator(_))
        ));
    }
}
