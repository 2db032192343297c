//! Transport to the CPLD.

use crate::command::Frame;

/// Host interrupt and reset lines as sampled from the CPLD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlLines {
    /// Maskable interrupt request, level triggered.
    pub int: bool,
    /// Non-maskable interrupt, latched until sampled.
    pub nmi: bool,
    /// Host reset button, latched until sampled.
    pub reset: bool,
}

/// Physical link to the CPLD: a serial or parallel port on real hardware,
/// [`SimLink`](crate::SimLink) in tests.
pub trait Link: Send {
    /// Clock one frame into the CPLD.
    fn send(&mut self, frame: Frame);

    /// Ready line: the last transaction has finished on the host bus.
    fn is_ready(&mut self) -> bool;

    /// Response byte of the last transaction. Only meaningful once ready.
    fn read_data(&mut self) -> u8;

    /// Sample the interrupt and reset lines.
    fn lines(&mut self) -> ControlLines {
        ControlLines::default()
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send(&mut self, frame: Frame) {
        (**self).send(frame);
    }

    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }

    fn read_data(&mut self) -> u8 {
        (**self).read_data()
    }

    fn lines(&mut self) -> ControlLines {
        (**self).lines()
    }
}
