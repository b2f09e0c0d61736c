pub mod approval;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod oracle;
pub mod orchestrator;
pub mod order;
pub mod safe;
pub mod signing;

pub use approval::{ApprovalGate, ApprovalOutcome};
pub use chain::{EvmClient, RpcClient, SafeTx};
pub use config::AppConfig;
pub use domain::{
    Direction, FundingMode, MarketDescriptor, MarketRegistry, OrderKind, OrderParameters,
    TradeIntent,
};
pub use error::{BracketError, Result};
pub use oracle::{PriceFeed, SignedPriceClient, TokenPrice};
pub use orchestrator::{
    PositionOrchestrator, RunStatus, SequentialRunResult, StepOutcome, StepStatus,
};
pub use order::{
    build_order_parameters, encode_order_multicall, BuildContext, EncodeContext, EncodedOrder,
};
pub use safe::{
    ExecutionTrigger, PayloadStore, ProposalBuilder, ProposalOutcome, SafeService,
    TransactionServiceClient,
};
pub use signing::Wallet;
