//! the mint record and its lifecycle.
//!
//! ```text
//! Pending -> Submitted -> Confirmed -> ContentPublished -> Finalized
//!    \___________\____________\______________\_______-> Failed
//! ```
//!
//! `Submitted -> Submitted` is allowed: a retried or re-issued mint replaces
//! the mint address and signature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MintState {
    Pending,
    Submitted,
    Confirmed,
    ContentPublished,
    Finalized,
    Failed,
}

impl MintState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, MintState::Finalized | MintState::Failed)
    }

    pub fn can_transition_to(self, to: MintState) -> bool {
        use MintState::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Submitted)
            | (Submitted, Submitted)
            | (Submitted, Confirmed)
            | (Confirmed, ContentPublished)
            | (ContentPublished, Finalized) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    /// assigned by the store on insert.
    pub id: u64,
    #[serde(with = "pubkey_str")]
    pub recipient: Pubkey,
    pub asset_index: u64,
    pub account_index: u32,
    pub sub_index: u8,
    #[serde(default, with = "opt_pubkey_str")]
    pub mint_address: Option<Pubkey>,
    #[serde(default, with = "opt_pubkey_str")]
    pub metadata_address: Option<Pubkey>,
    #[serde(default)]
    pub content_uri: Option<String>,
    #[serde(default)]
    pub last_signature: Option<String>,
    pub state: MintState,
    #[serde(default)]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MintRecord {
    /// a fresh `Pending` record, not yet stored.
    pub fn pending(recipient: Pubkey, asset_index: u64, account_index: u32, sub_index: u8) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            recipient,
            asset_index,
            account_index,
            sub_index,
            mint_address: None,
            metadata_address: None,
            content_uri: None,
            last_signature: None,
            state: MintState::Pending,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// move to `to`, refusing transitions outside the lifecycle.
    pub fn transition(&mut self, to: MintState) -> Result<(), RecordError> {
        if !self.state.can_transition_to(to) {
            return Err(RecordError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_submitted(
        &mut self,
        mint: Pubkey,
        metadata: Pubkey,
        signature: String,
    ) -> Result<(), RecordError> {
        self.transition(MintState::Submitted)?;
        self.mint_address = Some(mint);
        self.metadata_address = Some(metadata);
        self.last_signature = Some(signature);
        Ok(())
    }

    pub fn mark_confirmed(&mut self) -> Result<(), RecordError> {
        self.transition(MintState::Confirmed)
    }

    pub fn mark_published(&mut self, uri: String) -> Result<(), RecordError> {
        self.transition(MintState::ContentPublished)?;
        self.content_uri = Some(uri);
        Ok(())
    }

    pub fn mark_finalized(&mut self, signature: Option<String>) -> Result<(), RecordError> {
        self.transition(MintState::Finalized)?;
        if signature.is_some() {
            self.last_signature = signature;
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), RecordError> {
        self.transition(MintState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }
}

mod pubkey_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

mod opt_pubkey_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(key: &Option<Pubkey>, s: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(key) => s.collect_str(key),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Pubkey>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| text.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut record = MintRecord::pending(Pubkey::new_unique(), 5, 0, 5);
        let mint = Pubkey::new_unique();
        record
            .mark_submitted(mint, Pubkey::new_unique(), "sig1".into())
            .unwrap();
        record
            .mark_submitted(mint, Pubkey::new_unique(), "sig2".into())
            .unwrap();
        record.mark_confirmed().unwrap();
        record.mark_published("https://arweave.net/x".into()).unwrap();
        record.mark_finalized(Some("sig3".into())).unwrap();

        assert_eq!(record.state, MintState::Finalized);
        assert_eq!(record.last_signature.as_deref(), Some("sig3"));
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_illegal_transitions() {
        let mut record = MintRecord::pending(Pubkey::new_unique(), 0, 0, 0);
        assert!(matches!(
            record.mark_confirmed(),
            Err(RecordError::IllegalTransition {
                from: MintState::Pending,
                to: MintState::Confirmed
            })
        ));

        record.mark_failed("boom").unwrap();
        assert!(record.mark_failed("again").is_err());
        assert!(record.transition(MintState::Submitted).is_err());
        assert_eq!(record.failure.as_deref(), Some("boom"));
    }

    #[test]
    fn test_finalized_is_terminal() {
        assert!(!MintState::Finalized.can_transition_to(MintState::Failed));
        assert!(MintState::ContentPublished.can_transition_to(MintState::Failed));
        assert!(!MintState::Confirmed.can_transition_to(MintState::Submitted));
    }

    #[test]
    fn test_json_uses_base58_keys() {
        let mut record = MintRecord::pending(Pubkey::new_unique(), 1, 2, 3);
        record.mint_address = Some(Pubkey::new_unique());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["recipient"], record.recipient.to_string());
        assert!(json["metadata_address"].is_null());
        assert_eq!(json["state"], "Pending");

        let back: MintRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
