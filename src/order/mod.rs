mod encode;
mod params;

pub use encode::{encode_order_multicall, EncodeContext, EncodedOrder};
pub use params::{build_order_parameters, BuildContext};
