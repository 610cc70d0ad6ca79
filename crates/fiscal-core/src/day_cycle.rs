use crate::activity_log::Severity;
use crate::contracts::{CommandAck, DayCommand, FiscalDayPhase};
use crate::remote::RemoteFailure;

/// Where the current phase value came from. Server reports always replace
/// whatever is held; optimistic values only come from acknowledged commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseSource {
    Initial,
    Server,
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Acknowledged { message: Option<String> },
    Rejected { message: Option<String> },
    Failed,
}

impl CommandOutcome {
    pub fn from_result(result: Result<CommandAck, RemoteFailure>) -> Self {
        match result {
            Ok(ack) => {
                let message = ack.server_message().map(str::to_string);
                if ack.success {
                    CommandOutcome::Acknowledged { message }
                } else {
                    CommandOutcome::Rejected { message }
                }
            }
            Err(_) => CommandOutcome::Failed,
        }
    }
}

/// Activity entry the console records for a command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVerdict {
    pub severity: Severity,
    pub message: String,
    pub phase_change: Option<(FiscalDayPhase, FiscalDayPhase)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandHint {
    Expected,
    Unexpected(&'static str),
}

impl CommandHint {
    pub fn is_expected(&self) -> bool {
        matches!(self, CommandHint::Expected)
    }
}

struct CommandMessages {
    acknowledged: &'static str,
    rejected: &'static str,
    failed: &'static str,
}

fn command_messages(command: DayCommand) -> CommandMessages {
    match command {
        DayCommand::OpenDay => CommandMessages {
            acknowledged: "Fiscal day opened",
            rejected: "Failed to open fiscal day",
            failed: "Backend error: failed to open day",
        },
        DayCommand::CloseDay => CommandMessages {
            acknowledged: "Fiscal day close initiated",
            rejected: "Failed to close fiscal day",
            failed: "Backend error: failed to close day",
        },
        DayCommand::Sync => CommandMessages {
            acknowledged: "Receipts synced successfully",
            rejected: "Sync failed",
            failed: "Backend error during sync",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayLifecycle {
    phase: FiscalDayPhase,
    source: PhaseSource,
}

impl Default for DayLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl DayLifecycle {
    pub fn new() -> Self {
        Self {
            phase: FiscalDayPhase::Unknown,
            source: PhaseSource::Initial,
        }
    }

    pub fn phase(&self) -> FiscalDayPhase {
        self.phase
    }

    pub fn source(&self) -> PhaseSource {
        self.source
    }

    /// True until a server report confirms an optimistic value.
    pub fn awaiting_confirmation(&self) -> bool {
        self.source == PhaseSource::Optimistic
    }

    /// Applies a phase from a successful status poll. Returns the previous phase
    /// when the value changed.
    pub fn apply_server_phase(&mut self, reported: FiscalDayPhase) -> Option<FiscalDayPhase> {
        let previous = self.phase;
        self.phase = reported;
        self.source = PhaseSource::Server;
        (previous != reported).then_some(previous)
    }

    pub fn apply_command(&mut self, command: DayCommand, outcome: &CommandOutcome) -> CommandVerdict {
        let messages = command_messages(command);
        match outcome {
            CommandOutcome::Acknowledged { message } => {
                let phase_change = command.optimistic_phase().map(|next| {
                    let previous = self.phase;
                    self.phase = next;
                    self.source = PhaseSource::Optimistic;
                    (previous, next)
                });
                // open/close report their own wording; sync relays the bridge summary.
                let message = match command {
                    DayCommand::Sync => message
                        .clone()
                        .unwrap_or_else(|| messages.acknowledged.to_string()),
                    _ => messages.acknowledged.to_string(),
                };
                CommandVerdict {
                    severity: Severity::Success,
                    message,
                    phase_change,
                }
            }
            CommandOutcome::Rejected { message } => CommandVerdict {
                severity: Severity::Error,
                message: message
                    .clone()
                    .unwrap_or_else(|| messages.rejected.to_string()),
                phase_change: None,
            },
            CommandOutcome::Failed => CommandVerdict {
                severity: Severity::Error,
                message: messages.failed.to_string(),
                phase_change: None,
            },
        }
    }

    /// Advisory only: the bridge decides whether a command is valid.
    pub fn hint(&self, command: DayCommand) -> CommandHint {
        match (command, self.phase) {
            (DayCommand::OpenDay, FiscalDayPhase::Open) => {
                CommandHint::Unexpected("fiscal day already open")
            }
            (DayCommand::CloseDay, FiscalDayPhase::Closed) => {
                CommandHint::Unexpected("fiscal day already closed")
            }
            (DayCommand::CloseDay, FiscalDayPhase::CloseInitiated) => {
                CommandHint::Unexpected("close already in progress")
            }
            (DayCommand::CloseDay, FiscalDayPhase::Unknown) => {
                CommandHint::Unexpected("fiscal day state not known yet")
            }
            _ => CommandHint::Expected,
        }
    }
}
