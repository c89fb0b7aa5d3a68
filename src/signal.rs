//! Interrupt-to-task signal word.
//!
//! Interrupt handlers never touch the session, the state machines or the
//! indication queue. They only OR a bit into a shared word; the task context
//! takes the bits back out one at a time.
//!
//! Semantics are at-least-once per signal type: raising the same signal twice
//! before the task consumes it yields a single delivery.

use core::cell::Cell;

use critical_section::Mutex;

/// Hardware signals the task context consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Signal {
    /// The periodic timer wrapped (start of a measurement period).
    PeriodElapsed,
    /// A one-shot delay requested through the timer expired.
    DelayElapsed,
    /// The sensor I²C transfer finished.
    TransferComplete,
    /// Edge on button 0.
    Button0Edge,
    /// Edge on button 1.
    Button1Edge,
}

impl Signal {
    /// Delivery order when several signals are pending.
    pub const ALL: [Signal; 5] = [
        Signal::PeriodElapsed,
        Signal::DelayElapsed,
        Signal::TransferComplete,
        Signal::Button0Edge,
        Signal::Button1Edge,
    ];

    pub const fn bit(self) -> u32 {
        match self {
            Signal::PeriodElapsed => 1 << 0,
            Signal::DelayElapsed => 1 << 1,
            Signal::TransferComplete => 1 << 2,
            Signal::Button0Edge => 1 << 3,
            Signal::Button1Edge => 1 << 4,
        }
    }
}

/// Pending-signal bit set shared between interrupt and task context.
pub struct SignalFlags {
    word: Mutex<Cell<u32>>,
}

impl SignalFlags {
    pub const fn new() -> Self {
        Self {
            word: Mutex::new(Cell::new(0)),
        }
    }

    /// Mark `signal` pending. Safe to call from interrupt context.
    pub fn raise(&self, signal: Signal) {
        critical_section::with(|cs| {
            let word = self.word.borrow(cs);
            word.set(word.get() | signal.bit());
        });
    }

    /// Take the highest-priority pending signal, leaving the others pending.
    pub fn take(&self) -> Option<Signal> {
        critical_section::with(|cs| {
            let word = self.word.borrow(cs);
            let pending = word.get();
            let signal = Signal::ALL.into_iter().find(|s| pending & s.bit() != 0)?;
            word.set(pending & !signal.bit());
            Some(signal)
        })
    }

    /// Whether any signal is waiting.
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.word.borrow(cs).get() != 0)
    }

    /// Drop every pending signal.
    pub fn clear(&self) {
        critical_section::with(|cs| self.word.borrow(cs).set(0));
    }
}

impl Default for SignalFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal word for the firmware's single task context.
pub static SIGNALS: SignalFlags = SignalFlags::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_word_yields_nothing() {
        let flags = SignalFlags::new();
        assert!(!flags.is_pending());
        assert_eq!(flags.take(), None);
    }

    #[test]
    fn raised_signal_is_taken_once() {
        let flags = SignalFlags::new();
        flags.raise(Signal::DelayElapsed);
        assert!(flags.is_pending());
        assert_eq!(flags.take(), Some(Signal::DelayElapsed));
        assert_eq!(flags.take(), None);
    }

    #[test]
    fn repeated_signal_coalesces() {
        // Two transfer-complete interrupts before the task runs are one delivery.
        let flags = SignalFlags::new();
        flags.raise(Signal::TransferComplete);
        flags.raise(Signal::TransferComplete);
        assert_eq!(flags.take(), Some(Signal::TransferComplete));
        assert_eq!(flags.take(), None);
    }

    #[test]
    fn distinct_signals_are_all_delivered_in_priority_order() {
        let flags = SignalFlags::new();
        flags.raise(Signal::Button1Edge);
        flags.raise(Signal::TransferComplete);
        flags.raise(Signal::PeriodElapsed);

        assert_eq!(flags.take(), Some(Signal::PeriodElapsed));
        assert_eq!(flags.take(), Some(Signal::TransferComplete));
        assert_eq!(flags.take(), Some(Signal::Button1Edge));
        assert_eq!(flags.take(), None);
    }

    #[test]
    fn signal_raised_after_take_is_kept() {
        let flags = SignalFlags::new();
        flags.raise(Signal::DelayElapsed);
        flags.raise(Signal::TransferComplete);
        assert_eq!(flags.take(), Some(Signal::DelayElapsed));
        flags.raise(Signal::DelayElapsed);
        assert_eq!(flags.take(), Some(Signal::DelayElapsed));
        assert_eq!(flags.take(), Some(Signal::TransferComplete));
    }

    #[test]
    fn clear_drops_everything() {
        let flags = SignalFlags::new();
        for s in Signal::ALL {
            flags.raise(s);
        }
        flags.clear();
        assert!(!flags.is_pending());
    }

    #[test]
    fn bits_are_distinct() {
        let mut seen = 0u32;
        for s in Signal::ALL {
            assert_eq!(seen & s.bit(), 0);
            seen |= s.bit();
        }
        assert_eq!(seen, 0b1_1111);
    }
}
