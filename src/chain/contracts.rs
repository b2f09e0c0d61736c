//! Contract bindings for the exchange router, ERC-20 tokens and the Safe.
//!
//! The order tuple layout and the SafeTx EIP-712 struct are fixed external
//! contracts; both must reproduce the on-chain ABI byte for byte.

use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IGnosisSafe {
        function nonce() external view returns (uint256);
        function getThreshold() external view returns (uint256);
        function getOwners() external view returns (address[] memory);
        function execTransaction(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes memory signatures
        ) external payable returns (bool success);
    }

    /// Address block of a createOrder call
    struct CreateOrderAddresses {
        address receiver;
        address cancellationReceiver;
        address callbackContract;
        address uiFeeReceiver;
        address market;
        address initialCollateralToken;
        address[] swapPath;
    }

    /// Numeric block of a createOrder call
    struct CreateOrderNumbers {
        uint256 sizeDeltaUsd;
        uint256 initialCollateralDeltaAmount;
        uint256 triggerPrice;
        uint256 acceptablePrice;
        uint256 executionFee;
        uint256 callbackGasLimit;
        uint256 minOutputAmount;
        uint256 validFromTime;
    }

    /// Full createOrder parameter tuple
    struct CreateOrderParams {
        CreateOrderAddresses addresses;
        CreateOrderNumbers numbers;
        uint8 orderType;
        uint8 decreasePositionSwapType;
        bool isLong;
        bool shouldUnwrapNativeToken;
        bool autoCancel;
        bytes32 referralCode;
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IExchangeRouter {
        function multicall(bytes[] calldata data) external payable returns (bytes[] memory results);
        function sendWnt(address receiver, uint256 amount) external payable;
        function sendTokens(address token, address receiver, uint256 amount) external payable;
        function createOrder(CreateOrderParams calldata params) external payable returns (bytes32);
    }

    /// Safe multisig transaction, hashed under the Safe's EIP-712 domain.
    /// The struct name is part of the typehash and must stay `SafeTx`.
    #[derive(Debug)]
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }
}
