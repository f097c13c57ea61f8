use opsai_core::RiskLevel;

/// The mode an orchestrator run is operating in, each carrying its own risk
/// ceiling per the safety config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cli,
    Tui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Execute without prompting.
    Allowed,
    /// Execute, but only after the host's approval callback returns true.
    RequiresApproval,
    /// Never execute; the instruction's risk exceeds the mode maximum.
    Rejected,
}

/// Gates an instruction's risk level against the configured maximum for the
/// current mode, and against the `auto_approve_safe` shortcut.
#[derive(Debug, Clone, Copy)]
pub struct RiskPolicy {
    pub cli_max_risk: RiskLevel,
    pub tui_max_risk: RiskLevel,
    pub auto_approve_safe: bool,
}

impl RiskPolicy {
    pub fn max_for(&self, mode: Mode) -> RiskLevel {
        match mode {
            Mode::Cli => self.cli_max_risk,
            Mode::Tui => self.tui_max_risk,
        }
    }

    pub fn evaluate(&self, risk: RiskLevel, mode: Mode) -> PolicyDecision {
        if risk > self.max_for(mode) {
            return PolicyDecision::Rejected;
        }
        if risk == RiskLevel::Safe && self.auto_approve_safe {
            return PolicyDecision::Allowed;
        }
        if risk == RiskLevel::Safe {
            return PolicyDecision::Allowed;
        }
        PolicyDecision::RequiresApproval
    }
}
