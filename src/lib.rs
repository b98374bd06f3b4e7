//! replica-transfer: replicated upload/download orchestrator
//!
//! Uploads split a file into segments, store every segment on several storage
//! nodes chosen by an indexer and record the resulting content root on a
//! ledger. Downloads fetch a content root back from those nodes and verify
//! every segment against it before the file appears at its destination.
//!
//! ```no_run
//! # async fn demo() -> replica_transfer::Result<()> {
//! use replica_transfer::{Config, IndexerTier, Orchestrator, SigningCredential};
//!
//! let config = Config::default();
//! let key = SigningCredential::from_hex(&std::env::var("REPLICA_TRANSFER_KEY").unwrap_or_default())?;
//! let orchestrator = Orchestrator::connect(&config, &key, IndexerTier::Standard).await?;
//!
//! let record = orchestrator.upload_default("report.pdf".as_ref()).await?;
//! orchestrator
//!     .download_default(&record.content_root, "copies/report.pdf".as_ref())
//!     .await?;
//! orchestrator.close().await;
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod merkle;
pub mod orchestrator;
pub mod rpc;
pub mod selection;
pub mod traits;
pub mod types;

pub use config::{Config, IndexerTier};
pub use context::{CancelToken, TransferContext};
pub use error::{OrchestratorError, Result, ServiceError, Step};
pub use orchestrator::Orchestrator;
pub use types::{
    CommitmentRecord, ContentRoot, EndpointSet, NodeFilter, NodeInfo, ReplicationPolicy,
    SigningCredential, TxRef,
};
