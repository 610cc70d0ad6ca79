use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use fiscal_core::{CommandHint, ConsoleSnapshot, DayCommand, Disposition};

/// Work the input handler hands to the async side. None of these block the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Command(DayCommand),
    RequestStatus,
    RequestConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Continue,
    Dispatch(Action),
    Quit,
}

pub struct App {
    pub snapshot: ConsoleSnapshot,
    pub receipt_tab: Disposition,
    pub log_scroll: u16,
    pub help_open: bool,
    pub bridge_url: String,
    pub note: Option<String>,
}

impl App {
    pub fn new(snapshot: ConsoleSnapshot, bridge_url: String) -> Self {
        Self {
            snapshot,
            receipt_tab: Disposition::Signed,
            log_scroll: 0,
            help_open: false,
            bridge_url,
            note: None,
        }
    }

    pub fn set_snapshot(&mut self, snapshot: ConsoleSnapshot) {
        let max_scroll = snapshot.log.len().saturating_sub(1) as u16;
        self.log_scroll = self.log_scroll.min(max_scroll);
        self.snapshot = snapshot;
    }

    /// Shown beside the command bar when the current phase makes a command
    /// unusual. The bridge still gets the request.
    pub fn note_hint(&mut self, command: DayCommand, hint: CommandHint) {
        self.note = match hint {
            CommandHint::Expected => None,
            CommandHint::Unexpected(reason) => Some(format!("{command}: {reason}")),
        };
    }
}

pub fn handle_input(event: Event, app: &mut App) -> InputOutcome {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, app),
        _ => InputOutcome::Continue,
    }
}

pub fn handle_key(key: KeyEvent, app: &mut App) -> InputOutcome {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => InputOutcome::Quit,
            _ => InputOutcome::Continue,
        };
    }
    // Shift is allowed so `?` still works on layouts that report it.
    if !key.modifiers.difference(KeyModifiers::SHIFT).is_empty() {
        return InputOutcome::Continue;
    }
    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        app.help_open = !app.help_open;
        return InputOutcome::Continue;
    }
    if key.code == KeyCode::Esc && app.help_open {
        app.help_open = false;
        return InputOutcome::Continue;
    }
    if app.help_open {
        return InputOutcome::Continue;
    }

    match key.code {
        KeyCode::Char('q') => InputOutcome::Quit,
        KeyCode::Char('o') => InputOutcome::Dispatch(Action::Command(DayCommand::OpenDay)),
        KeyCode::Char('c') => InputOutcome::Dispatch(Action::Command(DayCommand::CloseDay)),
        KeyCode::Char('s') => InputOutcome::Dispatch(Action::Command(DayCommand::Sync)),
        KeyCode::Char('g') => InputOutcome::Dispatch(Action::RequestStatus),
        KeyCode::Char('f') => InputOutcome::Dispatch(Action::RequestConfig),
        KeyCode::Char('1') => select_tab(app, Disposition::Signed),
        KeyCode::Char('2') => select_tab(app, Disposition::Sent),
        KeyCode::Char('3') => select_tab(app, Disposition::Excluded),
        KeyCode::Tab => {
            let next = app.receipt_tab.next();
            select_tab(app, next)
        }
        KeyCode::Down | KeyCode::Char('j') => {
            let max_scroll = app.snapshot.log.len().saturating_sub(1) as u16;
            app.log_scroll = app.log_scroll.saturating_add(1).min(max_scroll);
            InputOutcome::Continue
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.log_scroll = app.log_scroll.saturating_sub(1);
            InputOutcome::Continue
        }
        _ => InputOutcome::Continue,
    }
}

fn select_tab(app: &mut App, tab: Disposition) -> InputOutcome {
    app.receipt_tab = tab;
    InputOutcome::Continue
}
