pub mod activity_log;
pub mod contracts;
pub mod day_cycle;
pub mod name_store;
pub mod reconciler;
pub mod remote;
pub mod scheduler;
pub mod settings;

pub use activity_log::{ActivityLog, LogEntry, Severity, ACTIVITY_LOG_CAPACITY};
pub use contracts::{
    CommandAck, ConfigSnapshot, Connectivity, DayCommand, Disposition, FiscalDayPhase, QueueItem,
    StatusReport, DEFAULT_CLIENT_NAME,
};
pub use day_cycle::{CommandHint, DayLifecycle, PhaseSource};
pub use name_store::{DisplayNameStore, StoreError};
pub use reconciler::{ConsoleSnapshot, QueueCounts, SyncCore};
pub use remote::{BridgeApi, HttpBridge, RemoteError, RemoteFailure, RemoteOperation};
pub use scheduler::{PollHandle, PollScheduler};
pub use settings::{ConsoleSettings, SettingsError, SettingsLayer};
