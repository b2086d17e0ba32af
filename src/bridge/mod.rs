pub mod tracker;

pub use tracker::{BridgeProgress, BridgeStep, EventPhase, TransferEvent, TransferMethod};
