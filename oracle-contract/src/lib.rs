pub mod contract;
pub mod events;

pub use contract::{OracleContract, PreconditionFailure, Signer, WitnessScope};
pub use events::ContractEvent;
