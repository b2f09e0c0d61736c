mod execute;
mod service;
mod store;
mod tx;

pub use execute::ExecutionTrigger;
pub use service::{
    Confirmation, MultisigTransaction, ProposeRequest, SafeService, TransactionServiceClient,
};
pub use store::{PayloadArtifact, PayloadStore};
pub use tx::{new_safe_tx, safe_tx_hash, ProposalBuilder, ProposalOutcome, OPERATION_CALL};
