//! rpc-backed ledger client.

use std::sync::Arc;

use async_trait::async_trait;
use crank_traits::{LedgerClient, LedgerError, SignatureStatus, SimulationOutcome};
use futures::StreamExt;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcSendTransactionConfig, RpcSignatureSubscribeConfig, RpcSimulateTransactionConfig,
};
use solana_client::rpc_response::{ProcessedSignatureResult, RpcSignatureResult};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::config::Config;

fn rpc_error(e: ClientError) -> LedgerError {
    LedgerError::Rpc(e.to_string())
}

/// ledger client over json-rpc + websocket signature notifications.
pub struct RpcLedger {
    rpc_client: Arc<RpcClient>,
    ws_url: String,
    commitment: CommitmentConfig,
}

impl RpcLedger {
    pub fn new(config: &Config) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc_client: Arc::new(RpcClient::new_with_commitment(
                config.rpc_url.clone(),
                commitment,
            )),
            ws_url: config.ws_url.clone(),
            commitment,
        }
    }

    /// underlying rpc client.
    #[inline]
    pub fn rpc_client(&self) -> Arc<RpcClient> {
        Arc::clone(&self.rpc_client)
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn get_account_data(&self, key: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .rpc_client
            .get_account_with_commitment(key, self.commitment)
            .await
            .map_err(rpc_error)?;
        Ok(response.value.map(|account| account.data))
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.rpc_client
            .get_latest_blockhash()
            .await
            .map_err(rpc_error)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, LedgerError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..Default::default()
        };
        self.rpc_client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(rpc_error)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, LedgerError> {
        let response = self
            .rpc_client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(rpc_error)?;

        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(SignatureStatus::Pending),
        };

        if let Some(err) = status.err {
            return Ok(SignatureStatus::Failed(err.to_string()));
        }
        if status.satisfies_commitment(self.commitment) {
            Ok(SignatureStatus::Confirmed)
        } else {
            Ok(SignatureStatus::Pending)
        }
    }

    async fn wait_signature_event(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, LedgerError> {
        let client = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| LedgerError::Subscription(e.to_string()))?;

        let config = RpcSignatureSubscribeConfig {
            commitment: Some(self.commitment),
            enable_received_notification: Some(false),
        };
        let (mut stream, unsubscribe) = client
            .signature_subscribe(signature, Some(config))
            .await
            .map_err(|e| LedgerError::Subscription(e.to_string()))?;

        let mut result = Err(LedgerError::Subscription(
            "notification stream closed".to_string(),
        ));
        while let Some(response) = stream.next().await {
            match response.value {
                RpcSignatureResult::ProcessedSignature(ProcessedSignatureResult { err }) => {
                    result = Ok(match err {
                        Some(err) => SignatureStatus::Failed(err.to_string()),
                        None => SignatureStatus::Confirmed,
                    });
                    break;
                }
                RpcSignatureResult::ReceivedSignature(_) => continue,
            }
        }

        drop(stream);
        unsubscribe().await;
        result
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, LedgerError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .rpc_client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(rpc_error)?;

        Ok(SimulationOutcome {
            err: response.value.err.map(|e| e.to_string()),
            logs: response.value.logs.unwrap_or_default(),
        })
    }

    async fn minimum_balance_for_rent_exemption(&self, len: usize) -> Result<u64, LedgerError> {
        self.rpc_client
            .get_minimum_balance_for_rent_exemption(len)
            .await
            .map_err(rpc_error)
    }

    async fn balance(&self, key: &Pubkey) -> Result<u64, LedgerError> {
        self.rpc_client.get_balance(key).await.map_err(rpc_error)
    }
}
