//! Restart and factory-reset controller
//!
//! Two triggers feed one `needs_restart` flag: a saved configuration and a
//! second long press of the button. Once set, the flag is only cleared by the
//! restart itself, which re-creates this state from scratch.

/// Pause before restarting so pending log output reaches the host.
pub const RESTART_DELAY_MS: u64 = 1000;

/// Pause after writing the default configuration so the storage write
/// settles before the restart is observed.
pub const FACTORY_RESET_SETTLE_MS: u64 = 2000;

/// What a long-press release asks the node to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongPressOutcome {
    /// First press: warn the operator, change nothing.
    ConfirmationRequested,
    /// Second or later press: restore defaults and restart.
    FactoryReset,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoopState {
    needs_restart: bool,
    long_press_count: u32,
}

impl LoopState {
    pub const fn new() -> Self {
        Self {
            needs_restart: false,
            long_press_count: 0,
        }
    }

    pub const fn needs_restart(&self) -> bool {
        self.needs_restart
    }

    pub const fn long_press_count(&self) -> u32 {
        self.long_press_count
    }

    /// A new configuration was persisted. Some settings are latched at boot,
    /// so every save requires a restart.
    pub fn on_config_saved(&mut self) {
        self.needs_restart = true;
    }

    pub fn request_restart(&mut self) {
        self.needs_restart = true;
    }

    /// Count one long-press release and decide what it means.
    ///
    /// The counter does not decay while running: two presses an hour apart
    /// still confirm the reset.
    pub fn register_long_press(&mut self) -> LongPressOutcome {
        self.long_press_count = self.long_press_count.saturating_add(1);

        if self.long_press_count >= 2 {
            LongPressOutcome::FactoryReset
        } else {
            LongPressOutcome::ConfirmationRequested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_state() {
        let state = LoopState::new();
        assert!(!state.needs_restart());
        assert_eq!(state.long_press_count(), 0);
        assert_eq!(state, LoopState::default());
    }

    #[test]
    fn test_config_saved_is_idempotent() {
        let mut state = LoopState::new();
        state.on_config_saved();
        assert!(state.needs_restart());
        state.on_config_saved();
        assert!(state.needs_restart());
    }

    #[test]
    fn test_first_long_press_only_warns() {
        let mut state = LoopState::new();
        assert_eq!(
            state.register_long_press(),
            LongPressOutcome::ConfirmationRequested
        );
        assert!(!state.needs_restart());
        assert_eq!(state.long_press_count(), 1);
    }

    #[test]
    fn test_second_and_later_long_presses_reset() {
        let mut state = LoopState::new();
        state.register_long_press();
        assert_eq!(state.register_long_press(), LongPressOutcome::FactoryReset);
        assert_eq!(state.register_long_press(), LongPressOutcome::FactoryReset);
        assert_eq!(state.long_press_count(), 3);
        // The controller only decides; the node performs the reset.
        assert!(!state.needs_restart());
    }
}
