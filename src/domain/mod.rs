mod intent;
mod market;
mod order;

use alloy::primitives::Address;

pub use intent::{Direction, TradeIntent};
pub use market::{MarketDescriptor, MarketRegistry};
pub use order::{to_fixed, DecreaseSwapType, OrderKind, OrderParameters, USD_DECIMALS};

/// How orders are funded and submitted, resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingMode {
    /// Funds live in a Safe; every transaction goes through the proposal
    /// pipeline and is executed by the Safe, never by the signer EOA.
    Multisig { safe: Address },
    /// The local key signs and submits directly.
    DirectKey,
}

impl FundingMode {
    pub fn is_multisig(&self) -> bool {
        matches!(self, FundingMode::Multisig { .. })
    }

    pub fn safe(&self) -> Option<Address> {
        match self {
            FundingMode::Multisig { safe } => Some(*safe),
            FundingMode::DirectKey => None,
        }
    }
}
