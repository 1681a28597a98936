//! Relay and indicator outputs driven by the process controller.

use embedded_hal::digital::OutputPin;

use crate::error::{Error, Result};

/// Relay position. Charge and discharge can never be closed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Off,
    Charge,
    Discharge,
}

impl RelayState {
    /// (charge, discharge) relay levels, true meaning closed
    pub fn outputs(self) -> (bool, bool) {
        match self {
            RelayState::Off => (false, false),
            RelayState::Charge => (true, false),
            RelayState::Discharge => (false, true),
        }
    }
}

/// What the rig's status LEDs should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indication {
    Off,
    Charge,
    Discharge,
    Waiting,
    ChargeDone,
}

/// Hardware written by the controller.
pub trait ProcessOutputs {
    fn set_relays(&mut self, state: RelayState) -> Result<()>;

    fn indicate(&mut self, _indication: Indication) {}
}

impl<T: ProcessOutputs + ?Sized> ProcessOutputs for &mut T {
    fn set_relays(&mut self, state: RelayState) -> Result<()> {
        (**self).set_relays(state)
    }

    fn indicate(&mut self, indication: Indication) {
        (**self).indicate(indication)
    }
}

/// Two relays on GPIO pins.
pub struct PinRelays<C, D> {
    charge: C,
    discharge: D,
    active_low: bool,
}

impl<C: OutputPin, D: OutputPin> PinRelays<C, D> {
    /// Relays that close on a high level
    pub fn new(charge: C, discharge: D) -> Self {
        PinRelays {
            charge,
            discharge,
            active_low: false,
        }
    }

    /// Relays that close on a low level
    pub fn active_low(charge: C, discharge: D) -> Self {
        PinRelays {
            charge,
            discharge,
            active_low: true,
        }
    }

    pub fn release(self) -> (C, D) {
        (self.charge, self.discharge)
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<()> {
    let result = if high { pin.set_high() } else { pin.set_low() };
    result.map_err(|e| Error::Relay(format!("{:?}", e)))
}

impl<C: OutputPin, D: OutputPin> ProcessOutputs for PinRelays<C, D> {
    fn set_relays(&mut self, state: RelayState) -> Result<()> {
        let (charge, discharge) = state.outputs();
        assert!(!(charge && discharge), "charge and discharge relays both on");
        // Open before close, so a switch never passes through both on.
        if !charge {
            drive(&mut self.charge, charge != self.active_low)?;
        }
        if !discharge {
            drive(&mut self.discharge, discharge != self.active_low)?;
        }
        if charge {
            drive(&mut self.charge, charge != self.active_low)?;
        }
        if discharge {
            drive(&mut self.discharge, discharge != self.active_low)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::{ErrorKind, ErrorType};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FakePin {
        name: &'static str,
        log: Rc<RefCell<Vec<(&'static str, bool)>>>,
    }

    impl ErrorType for FakePin {
        type Error = ErrorKind;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
            self.log.borrow_mut().push((self.name, false));
            Ok(())
        }

        fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
            self.log.borrow_mut().push((self.name, true));
            Ok(())
        }
    }

    fn pins() -> (FakePin, FakePin, Rc<RefCell<Vec<(&'static str, bool)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let charge = FakePin {
            name: "charge",
            log: log.clone(),
        };
        let discharge = FakePin {
            name: "discharge",
            log: log.clone(),
        };
        (charge, discharge, log)
    }

    #[test]
    fn relay_states_never_close_both() {
        for state in [RelayState::Off, RelayState::Charge, RelayState::Discharge] {
            let (charge, discharge) = state.outputs();
            assert!(!(charge && discharge));
        }
    }

    #[test]
    fn opens_before_closing() {
        let (charge, discharge, log) = pins();
        let mut relays = PinRelays::new(charge, discharge);
        relays.set_relays(RelayState::Discharge).unwrap();
        assert_eq!(*log.borrow(), vec![("charge", false), ("discharge", true)]);

        log.borrow_mut().clear();
        relays.set_relays(RelayState::Charge).unwrap();
        assert_eq!(*log.borrow(), vec![("discharge", false), ("charge", true)]);
    }

    #[test]
    fn active_low_inverts_levels() {
        let (charge, discharge, log) = pins();
        let mut relays = PinRelays::active_low(charge, discharge);
        relays.set_relays(RelayState::Off).unwrap();
        assert_eq!(*log.borrow(), vec![("charge", true), ("discharge", true)]);

        log.borrow_mut().clear();
        relays.set_relays(RelayState::Charge).unwrap();
        assert_eq!(*log.borrow(), vec![("discharge", true), ("charge", false)]);
    }
}
