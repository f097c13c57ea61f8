mod command_gate;
mod host;
mod risk_policy;

pub use command_gate::{check_shell_command, is_destructive_command, CommandBlocked};
pub use host::{ApprovalHost, DeployHost};
pub use risk_policy::{Mode, PolicyDecision, RiskPolicy};
