pub mod cooldown;
pub mod payload;
pub mod registry;
pub mod reply;

pub use cooldown::CooldownGate;
pub use cooldown::GateDecision;
pub use registry::AttachReport;
pub use registry::Registry;
