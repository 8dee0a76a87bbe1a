pub mod rpc_client;
pub mod signing;
pub mod submitter;
pub mod sweeper;

pub use rpc_client::RpcClient;
pub use signing::{decode_wif, dual_sign, sign, Witness};
pub use submitter::{BatchSubmitter, ChainRpc};
pub use sweeper::{AssetRpc, AssetSweeper};
