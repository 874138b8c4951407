pub mod chain;
pub mod collection;
pub mod error;
pub mod jsonrpc;
pub mod peer;
pub mod proposal;
pub mod response;
pub mod rwset;


pub use chain::{ChaincodeCall, InvocationChain};
pub use collection::CollectionConfig;
pub use error::{EndorseError, Result};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use peer::{Liveness, OrgId, PeerInfo};
pub use proposal::{ChaincodeId, Proposal, TxId};
pub use response::{ProposalResponse, STATUS_OK};
pub use rwset::{CollectionRwSet, KvRead, KvWrite, NamespaceRwSet, ReadWriteSet};
