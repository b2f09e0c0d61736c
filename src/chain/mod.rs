pub mod contracts;
mod rpc;

pub use contracts::SafeTx;
pub use rpc::{EvmClient, RpcClient};
