//! ABI bindings of the base chain contracts the ledger reads from.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IAddressManager {
        function getAddress(string _name) external view returns (address);
    }

    #[sol(rpc)]
    interface IStateCommitmentChain {
        event StateBatchAppended(
            uint256 indexed _batchIndex,
            bytes32 _batchRoot,
            uint256 _batchSize,
            uint256 _prevTotalElements,
            bytes _extraData
        );
        event StateBatchDeleted(uint256 indexed _batchIndex, bytes32 _batchRoot);

        function appendStateBatch(bytes32[] _batch, uint256 _shouldStartAtElement) external;
    }

    #[sol(rpc)]
    interface ICanonicalTransactionChain {
        event TransactionBatchAppended(
            uint256 indexed _batchIndex,
            bytes32 _batchRoot,
            uint256 _batchSize,
            uint256 _prevTotalElements,
            bytes _extraData
        );
        event SequencerBatchAppended(
            uint256 _startingQueueIndex,
            uint256 _numQueueElements,
            uint256 _totalElements
        );
    }

    #[sol(rpc)]
    interface IExecutionManager {
        function getMaxTransactionGasLimit() external view returns (uint256 _maxTransactionGasLimit);
    }

    /// Commit events of an `OVM_StateTransitioner`.
    interface IStateTransitionerEvents {
        event AccountCommitted(address _address);
        event ContractStorageCommitted(address _address, bytes32 _key);
    }
}

/// Address manager names of the contracts the prover talks to.
pub mod names {
    pub const STATE_COMMITMENT_CHAIN: &str = "OVM_StateCommitmentChain";
    pub const CANONICAL_TRANSACTION_CHAIN: &str = "OVM_CanonicalTransactionChain";
    pub const FRAUD_VERIFIER: &str = "OVM_FraudVerifier";
    pub const EXECUTION_MANAGER: &str = "OVM_ExecutionManager";
}
