use crate::activity_log::{ActivityLog, LogEntry, Severity};
use crate::contracts::{
    CommandAck, ConfigSnapshot, Connectivity, DayCommand, Disposition, FiscalDayPhase, QueueItem,
    StatusReport, DEFAULT_CLIENT_NAME,
};
use crate::day_cycle::{CommandHint, CommandOutcome, DayLifecycle, PhaseSource};
use crate::name_store::DisplayNameStore;
use crate::remote::{BridgeApi, RemoteFailure};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const STATUS_POLL_FAILED: &str = "Failed to fetch status; possibly offline";
const QUEUE_POLL_FAILED: &str = "Failed to fetch receipt queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusOrigin {
    Poll,
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigOrigin {
    Startup,
    Operator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub signed: usize,
    pub sent: usize,
    pub excluded: usize,
}

impl QueueCounts {
    pub fn tally(queue: &[QueueItem]) -> Self {
        queue.iter().fold(Self::default(), |mut counts, item| {
            match item.disposition {
                Disposition::Signed => counts.signed += 1,
                Disposition::Sent => counts.sent += 1,
                Disposition::Excluded => counts.excluded += 1,
            }
            counts
        })
    }

    pub fn get(&self, disposition: Disposition) -> usize {
        match disposition {
            Disposition::Signed => self.signed,
            Disposition::Sent => self.sent,
            Disposition::Excluded => self.excluded,
        }
    }
}

/// Read-only view handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleSnapshot {
    pub connectivity: Connectivity,
    pub upstream_online: Option<bool>,
    pub phase: FiscalDayPhase,
    pub phase_source: PhaseSource,
    pub watcher_running: bool,
    pub queue: Vec<QueueItem>,
    pub queue_counts: QueueCounts,
    pub config: ConfigSnapshot,
    pub config_loaded: bool,
    pub display_name: String,
    pub log: Vec<LogEntry>,
    pub last_status_at: Option<DateTime<Utc>>,
    pub last_queue_at: Option<DateTime<Utc>>,
}

impl ConsoleSnapshot {
    pub fn queue_for(&self, disposition: Disposition) -> impl Iterator<Item = &QueueItem> {
        self.queue
            .iter()
            .filter(move |item| item.disposition == disposition)
    }

    pub fn queue_count(&self, disposition: Disposition) -> usize {
        self.queue_counts.get(disposition)
    }
}

#[derive(Debug)]
struct ConsoleState {
    connectivity: Connectivity,
    upstream_online: Option<bool>,
    day: DayLifecycle,
    watcher_running: bool,
    queue: Vec<QueueItem>,
    config: ConfigSnapshot,
    config_loaded: bool,
    display_name: String,
    log: ActivityLog,
    last_status_at: Option<DateTime<Utc>>,
    last_queue_at: Option<DateTime<Utc>>,
}

impl ConsoleState {
    fn new(display_name: String) -> Self {
        Self {
            connectivity: Connectivity::Offline,
            upstream_online: None,
            day: DayLifecycle::new(),
            watcher_running: false,
            queue: Vec::new(),
            config: ConfigSnapshot::default(),
            config_loaded: false,
            display_name,
            log: ActivityLog::default(),
            last_status_at: None,
            last_queue_at: None,
        }
    }

    fn snapshot(&self) -> ConsoleSnapshot {
        ConsoleSnapshot {
            connectivity: self.connectivity,
            upstream_online: self.upstream_online,
            phase: self.day.phase(),
            phase_source: self.day.source(),
            watcher_running: self.watcher_running,
            queue: self.queue.clone(),
            queue_counts: QueueCounts::tally(&self.queue),
            config: self.config.clone(),
            config_loaded: self.config_loaded,
            display_name: self.display_name.clone(),
            log: self.log.to_vec(),
            last_status_at: self.last_status_at,
            last_queue_at: self.last_queue_at,
        }
    }
}

/// Owns every piece of console state and merges bridge results into it.
///
/// Remote calls are the only suspension points. All mutation happens in short
/// synchronous sections under `state`, which is never held across an await, so
/// overlapping passes interleave without tearing a single update.
pub struct SyncCore<B> {
    bridge: B,
    store: DisplayNameStore,
    state: Mutex<ConsoleState>,
    passes: AtomicU64,
}

impl<B: BridgeApi> SyncCore<B> {
    pub fn new(bridge: B, store: DisplayNameStore) -> Self {
        let cached = match store.load() {
            Ok(name) => name,
            Err(err) => {
                warn!(event = "display_name_load_failed", error = %err);
                None
            }
        };
        let display_name = cached.unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string());
        Self {
            bridge,
            store,
            state: Mutex::new(ConsoleState::new(display_name)),
            passes: AtomicU64::new(0),
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn snapshot(&self) -> ConsoleSnapshot {
        self.lock_state().snapshot()
    }

    pub fn passes_started(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Appends to the activity log. Never suspends.
    fn record(&self, severity: Severity, message: impl Into<String>) {
        self.lock_state().log.append(severity, message);
    }

    pub fn command_hint(&self, command: DayCommand) -> CommandHint {
        self.lock_state().day.hint(command)
    }

    /// One reconciliation pass: status, then queue. A failure in one half never
    /// skips or rolls back the other.
    pub async fn reconcile_pass(&self) {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        let status = self.bridge.fetch_status().await;
        self.apply_status(status, StatusOrigin::Poll);
        let queue = self.bridge.fetch_queue().await;
        self.apply_queue(queue);
        debug!(event = "reconcile_pass_done", pass);
    }

    pub async fn load_startup_config(&self) {
        let result = self.bridge.fetch_config().await;
        self.apply_config(result, ConfigOrigin::Startup);
    }

    pub async fn request_config(&self) {
        self.record(Severity::Info, "Getting system config...");
        let result = self.bridge.fetch_config().await;
        self.apply_config(result, ConfigOrigin::Operator);
    }

    pub async fn request_status(&self) {
        self.record(Severity::Info, "Getting system status...");
        let result = self.bridge.fetch_status().await;
        self.apply_status(result, StatusOrigin::Operator);
    }

    pub async fn submit_command(&self, command: DayCommand) {
        if let CommandHint::Unexpected(reason) = self.command_hint(command) {
            info!(event = "command_unexpected_for_phase", command = %command, reason);
        }
        if command == DayCommand::Sync {
            self.record(Severity::Info, "Force sync initiated...");
        }
        let result = self.bridge.submit_command(command).await;
        self.apply_command(command, result);
    }

    fn lock_state(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_status(&self, result: Result<StatusReport, RemoteFailure>, origin: StatusOrigin) {
        let mut state = self.lock_state();
        match result {
            Ok(report) => {
                state.connectivity = Connectivity::Online;
                state.upstream_online = report.upstream_online;
                state.watcher_running = report.watcher_running;
                state.last_status_at = Some(Utc::now());
                if let Some(previous) = state.day.apply_server_phase(report.phase) {
                    info!(
                        event = "fiscal_day_phase_changed",
                        from = %previous,
                        to = %report.phase
                    );
                }
                if origin == StatusOrigin::Operator {
                    state
                        .log
                        .append(Severity::Success, format!("Fiscal Day Status: {}", report.phase));
                }
            }
            Err(failure) => {
                if state.connectivity.is_online() {
                    warn!(event = "bridge_offline", error = %failure);
                }
                state.connectivity = Connectivity::Offline;
                let message = match origin {
                    StatusOrigin::Poll => STATUS_POLL_FAILED,
                    StatusOrigin::Operator => "Failed to get system status",
                };
                state.log.append(Severity::Error, message);
            }
        }
    }

    fn apply_queue(&self, result: Result<Vec<QueueItem>, RemoteFailure>) {
        let mut state = self.lock_state();
        match result {
            Ok(items) => {
                state.queue = items;
                state.last_queue_at = Some(Utc::now());
            }
            Err(_) => {
                state.log.append(Severity::Error, QUEUE_POLL_FAILED);
            }
        }
    }

    fn apply_config(&self, result: Result<ConfigSnapshot, RemoteFailure>, origin: ConfigOrigin) {
        let fetched_name = {
            let mut state = self.lock_state();
            match result {
                Ok(config) => {
                    let name = config.trade_name().map(str::to_string);
                    if let Some(name) = name.as_ref() {
                        state.display_name = name.clone();
                    }
                    state.config = config;
                    state.config_loaded = true;
                    let message = match origin {
                        ConfigOrigin::Startup => "System config loaded",
                        ConfigOrigin::Operator => "Configuration retrieved successfully",
                    };
                    state.log.append(Severity::Success, message);
                    name
                }
                Err(_) => {
                    let message = match origin {
                        ConfigOrigin::Startup => "Failed to load config",
                        ConfigOrigin::Operator => "Failed to retrieve configuration",
                    };
                    state.log.append(Severity::Error, message);
                    None
                }
            }
        };
        if let Some(name) = fetched_name {
            if let Err(err) = self.store.save(&name) {
                warn!(event = "display_name_save_failed", error = %err);
            }
        }
    }

    fn apply_command(&self, command: DayCommand, result: Result<CommandAck, RemoteFailure>) {
        let outcome = CommandOutcome::from_result(result);
        let mut state = self.lock_state();
        let verdict = state.day.apply_command(command, &outcome);
        if let Some((from, to)) = verdict.phase_change {
            info!(event = "fiscal_day_optimistic", command = %command, from = %from, to = %to);
        }
        state.log.append(verdict.severity, verdict.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBridge;
    use chrono::TimeZone;
    use serde_json::json;

    fn core() -> SyncCore<ScriptedBridge> {
        SyncCore::new(ScriptedBridge::default(), DisplayNameStore::ephemeral())
    }

    fn report(phase: FiscalDayPhase, watcher_running: bool) -> StatusReport {
        StatusReport {
            upstream_online: Some(true),
            phase,
            watcher_running,
        }
    }

    fn item(index: usize, invoice: &str) -> QueueItem {
        QueueItem {
            sequence_index: index,
            invoice_number: invoice.to_string(),
            amount: 10.0 + index as f64,
            occurred_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
            disposition: Disposition::Signed,
            pdf_path: None,
        }
    }

    fn messages(snapshot: &ConsoleSnapshot) -> Vec<String> {
        snapshot
            .log
            .iter()
            .map(|entry| entry.message().to_string())
            .collect()
    }

    #[tokio::test]
    async fn status_failure_goes_offline_and_keeps_last_known_values() {
        let core = core();
        core.bridge()
            .set_status(Some(report(FiscalDayPhase::Open, true)));
        core.reconcile_pass().await;
        let before = core.snapshot();
        assert_eq!(before.connectivity, Connectivity::Online);
        assert_eq!(before.phase, FiscalDayPhase::Open);
        assert!(before.watcher_running);

        core.bridge().set_status(None);
        core.reconcile_pass().await;

        let after = core.snapshot();
        assert_eq!(after.connectivity, Connectivity::Offline);
        assert_eq!(after.phase, FiscalDayPhase::Open);
        assert!(after.watcher_running);
        assert_eq!(after.log[0].severity(), Severity::Error);
        assert!(messages(&after).contains(&STATUS_POLL_FAILED.to_string()));
    }

    #[tokio::test]
    async fn queue_failure_preserves_previous_queue_exactly() {
        let core = core();
        core.bridge().set_status(Some(report(FiscalDayPhase::Open, true)));
        core.bridge()
            .set_queue(Some(vec![item(0, "INV-100"), item(1, "INV-101")]));
        core.reconcile_pass().await;
        let before = core.snapshot().queue;

        core.bridge().set_queue(None);
        core.reconcile_pass().await;

        let after = core.snapshot();
        assert_eq!(after.queue, before);
        assert_eq!(after.connectivity, Connectivity::Online);
        assert_eq!(messages(&after)[0], QUEUE_POLL_FAILED);
    }

    #[tokio::test]
    async fn successful_queue_poll_replaces_wholesale() {
        let core = core();
        core.bridge()
            .set_queue(Some(vec![item(0, "INV-1"), item(1, "INV-2"), item(2, "INV-3")]));
        core.reconcile_pass().await;
        core.bridge().set_queue(Some(vec![item(0, "INV-3")]));
        core.reconcile_pass().await;

        let snapshot = core.snapshot();
        assert_eq!(snapshot.queue, vec![item(0, "INV-3")]);
        assert!(snapshot.last_queue_at.is_some());
        assert_eq!(snapshot.queue_count(Disposition::Signed), 1);
        assert_eq!(snapshot.queue_count(Disposition::Sent), 0);
    }

    #[tokio::test]
    async fn status_failure_does_not_block_queue_update_in_same_pass() {
        let core = core();
        core.bridge().set_status(None);
        core.bridge().set_queue(Some(vec![item(0, "INV-7")]));
        core.reconcile_pass().await;

        let snapshot = core.snapshot();
        assert_eq!(snapshot.connectivity, Connectivity::Offline);
        assert_eq!(snapshot.phase, FiscalDayPhase::Unknown);
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(core.bridge().calls().queue, 1);
    }

    #[tokio::test]
    async fn pass_logs_status_before_queue() {
        let core = core();
        core.bridge().set_status(None);
        core.bridge().set_queue(None);
        core.reconcile_pass().await;

        // newest first: queue failure on top of status failure
        assert_eq!(
            messages(&core.snapshot()),
            vec![QUEUE_POLL_FAILED.to_string(), STATUS_POLL_FAILED.to_string()]
        );
    }

    #[tokio::test]
    async fn open_day_is_optimistic_then_server_wins() {
        let core = core();
        core.bridge()
            .set_command_ack(DayCommand::OpenDay, Some(CommandAck::accepted(None)));
        core.submit_command(DayCommand::OpenDay).await;

        let snapshot = core.snapshot();
        assert_eq!(snapshot.phase, FiscalDayPhase::Open);
        assert_eq!(snapshot.phase_source, PhaseSource::Optimistic);
        assert_eq!(messages(&snapshot)[0], "Fiscal day opened");
        assert_eq!(core.passes_started(), 0);

        core.bridge().set_status(Some(report(FiscalDayPhase::Closed, false)));
        core.reconcile_pass().await;
        let snapshot = core.snapshot();
        assert_eq!(snapshot.phase, FiscalDayPhase::Closed);
        assert_eq!(snapshot.phase_source, PhaseSource::Server);
    }

    #[tokio::test]
    async fn rejected_and_failed_commands_leave_phase_alone() {
        let core = core();
        core.bridge().set_status(Some(report(FiscalDayPhase::Closed, true)));
        core.reconcile_pass().await;

        core.bridge().set_command_ack(
            DayCommand::OpenDay,
            Some(CommandAck::rejected(Some("Device offline"))),
        );
        core.submit_command(DayCommand::OpenDay).await;
        core.bridge().set_command_ack(DayCommand::CloseDay, None);
        core.submit_command(DayCommand::CloseDay).await;

        let snapshot = core.snapshot();
        assert_eq!(snapshot.phase, FiscalDayPhase::Closed);
        assert_eq!(
            messages(&snapshot)[..2],
            [
                "Backend error: failed to close day".to_string(),
                "Device offline".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn sync_logs_initiation_then_server_summary() {
        let core = core();
        core.bridge().set_command_ack(
            DayCommand::Sync,
            Some(CommandAck::accepted(Some("4 receipts submitted"))),
        );
        core.submit_command(DayCommand::Sync).await;

        let snapshot = core.snapshot();
        assert_eq!(
            messages(&snapshot),
            vec!["4 receipts submitted".to_string(), "Force sync initiated...".to_string()]
        );
        assert_eq!(snapshot.log[1].severity(), Severity::Info);
        assert_eq!(snapshot.phase, FiscalDayPhase::Unknown);
    }

    #[tokio::test]
    async fn cached_name_survives_empty_trade_name() {
        let dir = tempfile::tempdir().unwrap();
        DisplayNameStore::new(dir.path()).save("Acme").unwrap();
        let core = SyncCore::new(ScriptedBridge::default(), DisplayNameStore::new(dir.path()));
        assert_eq!(core.snapshot().display_name, "Acme");

        core.bridge().set_config(Some(json!({"trade_name": "", "tin": "123"})));
        core.load_startup_config().await;
        let snapshot = core.snapshot();
        assert_eq!(snapshot.display_name, "Acme");
        assert!(snapshot.config_loaded);
        assert_eq!(messages(&snapshot)[0], "System config loaded");

        core.bridge().set_config(None);
        core.request_config().await;
        assert_eq!(core.snapshot().display_name, "Acme");

        core.bridge()
            .set_config(Some(json!({"trade_name": "Acme Retail"})));
        core.request_config().await;
        let snapshot = core.snapshot();
        assert_eq!(snapshot.display_name, "Acme Retail");
        assert_eq!(
            DisplayNameStore::new(dir.path()).load().unwrap().as_deref(),
            Some("Acme Retail")
        );
        assert_eq!(
            messages(&snapshot)[..4],
            [
                "Configuration retrieved successfully".to_string(),
                "Getting system config...".to_string(),
                "Failed to retrieve configuration".to_string(),
                "Getting system config...".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn config_failure_keeps_placeholder_and_previous_config() {
        let core = core();
        assert_eq!(core.snapshot().display_name, DEFAULT_CLIENT_NAME);
        core.bridge().set_config(Some(json!({"environment": "test"})));
        core.load_startup_config().await;
        core.bridge().set_config(None);
        core.load_startup_config().await;

        let snapshot = core.snapshot();
        assert_eq!(snapshot.display_name, DEFAULT_CLIENT_NAME);
        assert_eq!(snapshot.config.len(), 1);
        assert_eq!(messages(&snapshot)[0], "Failed to load config");
    }

    #[tokio::test]
    async fn operator_status_request_reports_phase() {
        let core = core();
        core.bridge()
            .set_status(Some(report(FiscalDayPhase::CloseInitiated, true)));
        core.request_status().await;
        core.bridge().set_status(None);
        core.request_status().await;

        let snapshot = core.snapshot();
        assert_eq!(snapshot.phase, FiscalDayPhase::CloseInitiated);
        assert_eq!(snapshot.connectivity, Connectivity::Offline);
        assert_eq!(
            messages(&snapshot),
            vec![
                "Failed to get system status".to_string(),
                "Getting system status...".to_string(),
                "Fiscal Day Status: CLOSE_INITIATED".to_string(),
                "Getting system status...".to_string(),
            ]
        );
    }

    #[test]
    fn record_appends_without_touching_state() {
        let core = core();
        core.record(Severity::Info, "Operator note");
        let snapshot = core.snapshot();
        assert_eq!(messages(&snapshot), vec!["Operator note".to_string()]);
        assert_eq!(snapshot.connectivity, Connectivity::Offline);
        assert_eq!(snapshot.queue_counts, QueueCounts::default());
    }

    #[tokio::test]
    async fn log_stays_bounded_under_repeated_failures() {
        let core = core();
        core.bridge().set_status(None);
        core.bridge().set_queue(None);
        for _ in 0..40 {
            core.reconcile_pass().await;
        }
        let snapshot = core.snapshot();
        assert_eq!(snapshot.log.len(), crate::activity_log::ACTIVITY_LOG_CAPACITY);
        assert_eq!(core.passes_started(), 40);
        assert!(snapshot
            .log
            .windows(2)
            .all(|pair| pair[0].id() > pair[1].id()));
    }
}
