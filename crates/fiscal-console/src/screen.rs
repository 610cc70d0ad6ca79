use crossterm::{
    cursor::Show,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::io;

/// Runs its restore hook exactly once when dropped, so early `?` returns
/// and panics unwind through it too.
pub struct RestoreGuard<F: FnOnce()> {
    restore: Option<F>,
}

impl<F: FnOnce()> RestoreGuard<F> {
    pub fn new(restore: F) -> Self {
        Self {
            restore: Some(restore),
        }
    }
}

impl<F: FnOnce()> Drop for RestoreGuard<F> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

/// Raw mode plus alternate screen. The returned guard puts the terminal back.
pub fn enter() -> io::Result<RestoreGuard<fn()>> {
    enable_raw_mode()?;
    let guard = RestoreGuard::new(restore as fn());
    execute!(io::stdout(), EnterAlternateScreen)?;
    Ok(guard)
}

fn restore() {
    // Best effort: the terminal may already be gone.
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn draw_frame(restored: &Cell<u32>, draw: Result<(), &'static str>) -> Result<(), &'static str> {
        let _guard = RestoreGuard::new(|| restored.set(restored.get() + 1));
        draw?;
        Ok(())
    }

    #[test]
    fn restore_runs_when_an_error_returns_early() {
        let restored = Cell::new(0);
        assert!(draw_frame(&restored, Err("draw failed")).is_err());
        assert_eq!(restored.get(), 1);
    }

    #[test]
    fn restore_runs_once_on_normal_exit() {
        let restored = Cell::new(0);
        assert!(draw_frame(&restored, Ok(())).is_ok());
        assert_eq!(restored.get(), 1);
    }
}
