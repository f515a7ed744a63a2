//! Physical button input
//!
//! [`DebouncedButton`] samples a GPIO once per loop iteration and turns the
//! raw level into click / long-press events. Boards without a button use
//! [`NoButton`].

use embedded_hal::digital::InputPin;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// Press released before the long-press threshold.
    Click,
    /// Held past the long-press threshold; fired once per press.
    LongPressStart,
    /// Released after a long press.
    LongPressReleased,
}

pub trait ButtonInput {
    /// Sample the input. Returns at most one event per call.
    fn poll(&mut self, now_ms: u64) -> Option<ButtonEvent>;
}

/// Boards with no physical input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoButton;

impl ButtonInput for NoButton {
    fn poll(&mut self, _now_ms: u64) -> Option<ButtonEvent> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonConfig {
    /// Pressed reads as low (pull-up with button to ground).
    pub active_low: bool,
    pub debounce_ms: u64,
    pub long_press_ms: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            active_low: true,
            debounce_ms: 50,
            long_press_ms: 800,
        }
    }
}

pub struct DebouncedButton<P> {
    pin: P,
    config: ButtonConfig,
    raw_pressed: bool,
    raw_changed_at: u64,
    pressed: bool,
    pressed_at: u64,
    long_fired: bool,
}

impl<P: InputPin> DebouncedButton<P> {
    pub fn new(pin: P, config: ButtonConfig) -> Self {
        Self {
            pin,
            config,
            raw_pressed: false,
            raw_changed_at: 0,
            pressed: false,
            pressed_at: 0,
            long_fired: false,
        }
    }

    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }

    pub const fn is_pressed(&self) -> bool {
        self.pressed
    }

    fn read_pressed(&mut self) -> Option<bool> {
        let level = if self.config.active_low {
            self.pin.is_low()
        } else {
            self.pin.is_high()
        };

        match level {
            Ok(pressed) => Some(pressed),
            Err(e) => {
                debug!("button: pin read failed: {:?}", e);
                None
            }
        }
    }
}

impl<P: InputPin> ButtonInput for DebouncedButton<P> {
    fn poll(&mut self, now_ms: u64) -> Option<ButtonEvent> {
        let raw = self.read_pressed()?;

        if raw != self.raw_pressed {
            self.raw_pressed = raw;
            self.raw_changed_at = now_ms;
            return None;
        }

        if now_ms.saturating_sub(self.raw_changed_at) < self.config.debounce_ms {
            return None;
        }

        if raw != self.pressed {
            self.pressed = raw;
            if raw {
                self.pressed_at = now_ms;
                self.long_fired = false;
                return None;
            }

            return Some(if self.long_fired {
                ButtonEvent::LongPressReleased
            } else {
                ButtonEvent::Click
            });
        }

        if self.pressed
            && !self.long_fired
            && now_ms.saturating_sub(self.pressed_at) >= self.config.long_press_ms
        {
            self.long_fired = true;
            return Some(ButtonEvent::LongPressStart);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    /// Pull-up pin: high when idle.
    struct FakePin {
        low: bool,
    }

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(!self.low)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(self.low)
        }
    }

    fn button() -> DebouncedButton<FakePin> {
        DebouncedButton::new(FakePin { low: false }, ButtonConfig::default())
    }

    /// Poll every 10 ms in `from..to` and collect events.
    fn run(
        button: &mut DebouncedButton<FakePin>,
        from: u64,
        to: u64,
    ) -> heapless::Vec<ButtonEvent, 8> {
        let mut events = heapless::Vec::new();
        let mut now = from;
        while now < to {
            if let Some(event) = button.poll(now) {
                events.push(event).unwrap();
            }
            now += 10;
        }
        events
    }

    #[test]
    fn test_short_press_is_click() {
        let mut b = button();
        assert!(run(&mut b, 0, 100).is_empty());

        b.pin_mut().low = true;
        assert!(run(&mut b, 100, 300).is_empty());
        assert!(b.is_pressed());

        b.pin_mut().low = false;
        assert_eq!(run(&mut b, 300, 500).as_slice(), &[ButtonEvent::Click]);
    }

    #[test]
    fn test_long_press_sequence() {
        let mut b = button();
        b.pin_mut().low = true;
        assert_eq!(
            run(&mut b, 0, 1_500).as_slice(),
            &[ButtonEvent::LongPressStart]
        );

        b.pin_mut().low = false;
        assert_eq!(
            run(&mut b, 1_500, 1_700).as_slice(),
            &[ButtonEvent::LongPressReleased]
        );
    }

    #[test]
    fn test_bounce_is_ignored() {
        let mut b = button();
        // Contact chatter shorter than the debounce window.
        for (i, now) in (0..200).step_by(10).enumerate() {
            b.pin_mut().low = i % 2 == 0;
            assert_eq!(b.poll(now), None);
        }
        assert!(!b.is_pressed());
    }

    #[test]
    fn test_active_high_config() {
        let config = ButtonConfig {
            active_low: false,
            ..ButtonConfig::default()
        };
        let mut b = DebouncedButton::new(FakePin { low: true }, config);
        assert!(run(&mut b, 0, 200).is_empty());

        b.pin_mut().low = false;
        run(&mut b, 200, 300);
        assert!(b.is_pressed());
    }

    #[test]
    fn test_no_button_never_fires() {
        assert_eq!(NoButton.poll(0), None);
        assert_eq!(NoButton.poll(u64::MAX), None);
    }
}
