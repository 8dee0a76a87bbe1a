use serde::Serialize;

/// Event surface (spec §4.10). Mirrors the teacher's `near-contracts`
/// event-struct-per-variant style (`LockEvent`, `UnlockEvent`, ...), logged
/// rather than emitted over a VM log stream since this is an in-process
/// model of the on-chain protocol.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event")]
pub enum ContractEvent {
    Initialized {
        owner: String,
    },
    PriceUpdated {
        symbol: String,
        price: i128,
        timestamp: i64,
        confidence: u8,
    },
    OracleAdded {
        addr: String,
    },
    OracleRemoved {
        addr: String,
    },
    TeeAccountAdded {
        addr: String,
    },
    TeeAccountRemoved {
        addr: String,
    },
    OwnerChanged {
        old: String,
        new: String,
    },
    ContractPaused {
        paused: bool,
    },
    CircuitBreakerTriggered {
        triggered: bool,
    },
    MinOraclesUpdated {
        n: u32,
    },
    ContractUpgraded {
        hash: String,
    },
}
