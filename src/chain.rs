//! Ledger binding over JSON-RPC
//!
//! Commitments are signed with the caller's ed25519 credential and submitted
//! through `storage_submitCommitment`. The binding then polls
//! `eth_getTransactionReceipt` until the ledger confirms (or reverts) the
//! transaction; the surrounding transfer context bounds how long that takes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ChainConfig;
use crate::context::TransferContext;
use crate::error::ServiceError;
use crate::rpc::{parse_quantity, RpcClient};
use crate::traits::{ChainBinding, ChainConnector};
use crate::types::{Commitment, ContentRoot, SigningCredential, TxRef};

/// Receipt status of a successful transaction
const STATUS_OK: &str = "0x1";

/// Signed commitment as submitted to the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentSubmission {
    pub root: ContentRoot,
    pub size: u64,
    pub chunk_count: u64,
    /// Hex ed25519 verifying key
    pub signer: String,
    /// Hex ed25519 signature over [`commitment_message`]
    pub signature: String,
    /// Hex quantity
    pub chain_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: String,
}

/// Bytes covered by the commitment signature:
/// `chain_id || root || size || chunk_count`, integers big-endian.
pub fn commitment_message(chain_id: u64, commitment: &Commitment) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + 32 + 8 + 8);
    msg.extend_from_slice(&chain_id.to_be_bytes());
    msg.extend_from_slice(commitment.root.as_bytes());
    msg.extend_from_slice(&commitment.size.to_be_bytes());
    msg.extend_from_slice(&commitment.chunk_count.to_be_bytes());
    msg
}

/// Connects [`RpcChain`] bindings
pub struct RpcChainConnector {
    request_timeout: Duration,
    confirm_poll: Duration,
}

impl RpcChainConnector {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            confirm_poll: Duration::from_millis(config.confirm_poll_ms),
        }
    }
}

#[async_trait]
impl ChainConnector for RpcChainConnector {
    async fn connect(
        &self,
        endpoint: &str,
        credential: &SigningCredential,
    ) -> Result<Arc<dyn ChainBinding>, ServiceError> {
        let rpc = RpcClient::new(endpoint, self.request_timeout)?;

        let chain_id: String = rpc.call("eth_chainId", Vec::<()>::new()).await?;
        let chain_id = parse_quantity(&chain_id)?;

        let signer = SigningKey::from_bytes(credential.secret());

        info!(
            endpoint = %endpoint,
            chain_id,
            signer = %hex::encode(signer.verifying_key().to_bytes()),
            "Connected to ledger"
        );

        Ok(Arc::new(RpcChain {
            rpc,
            signer,
            chain_id,
            confirm_poll: self.confirm_poll,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Authenticated ledger connection
pub struct RpcChain {
    rpc: RpcClient,
    signer: SigningKey,
    chain_id: u64,
    confirm_poll: Duration,
    closed: AtomicBool,
}

impl RpcChain {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sign(&self, commitment: &Commitment) -> CommitmentSubmission {
        let signature = self
            .signer
            .sign(&commitment_message(self.chain_id, commitment));

        CommitmentSubmission {
            root: commitment.root,
            size: commitment.size,
            chunk_count: commitment.chunk_count,
            signer: hex::encode(self.signer.verifying_key().to_bytes()),
            signature: hex::encode(signature.to_bytes()),
            chain_id: format!("{:#x}", self.chain_id),
        }
    }

    async fn wait_for_receipt(
        &self,
        ctx: &TransferContext,
        tx: &TxRef,
    ) -> Result<(), ServiceError> {
        loop {
            if ctx.is_cancelled() {
                return Err(ServiceError::Network(
                    "confirmation abandoned: transfer cancelled".into(),
                ));
            }

            let receipt: Option<TransactionReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", [tx.as_str()])
                .await?;

            match receipt {
                Some(r) if r.status == STATUS_OK => return Ok(()),
                Some(r) => {
                    return Err(ServiceError::Rejected(format!(
                        "transaction {} reverted (status {})",
                        tx, r.status
                    )))
                }
                None => {
                    debug!(tx = %tx, "Commitment not yet confirmed");
                    tokio::time::sleep(self.confirm_poll).await;
                }
            }
        }
    }
}

#[async_trait]
impl ChainBinding for RpcChain {
    async fn submit_commitment(
        &self,
        ctx: &TransferContext,
        commitment: &Commitment,
    ) -> Result<TxRef, ServiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Network("ledger connection closed".into()));
        }

        let submission = self.sign(commitment);
        let tx_hash: String = self
            .rpc
            .call("storage_submitCommitment", [&submission])
            .await?;

        if tx_hash.is_empty() {
            return Err(ServiceError::Protocol(
                "ledger returned an empty transaction hash".into(),
            ));
        }
        let tx = TxRef::new(tx_hash);

        info!(root = %commitment.root, tx = %tx, "Commitment submitted, awaiting confirmation");
        self.wait_for_receipt(ctx, &tx).await?;
        info!(root = %commitment.root, tx = %tx, "Commitment confirmed");

        Ok(tx)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(endpoint = %self.rpc.url(), "Ledger connection closed");
        }
    }
}
