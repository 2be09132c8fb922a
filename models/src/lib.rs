//! Shared types and cluster plumbing for the NUMA resources controller.
pub mod client;
pub mod constants;
pub mod events;
pub mod kubelet;
pub mod machineconfig;
pub mod operator;
pub mod quantity;
pub mod rteconfig;
pub mod selector;
pub mod telemetry;
pub mod version;
