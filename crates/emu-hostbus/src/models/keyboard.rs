//! Ctrl + function key detection by watching the guest scan the keyboard.
//!
//! The guest drives a row strobe and reads the column bits back; a clear
//! bit is a pressed key. Ctrl is latched when its row is scanned, and a
//! function key seen while Ctrl is latched raises a hotkey once.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hotkey {
    /// Return to the machine's original firmware.
    Original,
    /// 40-column ROM filing system.
    Rfs40,
    Tzfs,
    Linux,
}

#[derive(Debug, Default)]
pub struct HotkeyMonitor {
    strobe: u8,
    ctrl: bool,
    last: Option<Hotkey>,
}

impl HotkeyMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strobe(&mut self, value: u8) {
        self.strobe = value;
    }

    /// MZ-700/1500 column read at E001.
    pub fn mz700_scan(&mut self, data: u8) -> Option<Hotkey> {
        match self.strobe & 0x0F {
            8 => {
                self.ctrl = data & 0x40 == 0;
                None
            }
            5 => {
                let key = (self.ctrl && data & 0xF0 != 0xF0).then(|| {
                    if data & 0x80 == 0 {
                        Hotkey::Original
                    } else if data & 0x40 == 0 {
                        Hotkey::Rfs40
                    } else if data & 0x20 == 0 {
                        Hotkey::Tzfs
                    } else {
                        Hotkey::Linux
                    }
                });
                self.edge(key)
            }
            _ => None,
        }
    }

    /// MZ-2000 column read on port EA, strobe from port E8.
    pub fn mz2000_scan(&mut self, data: u8) -> Option<Hotkey> {
        match self.strobe & 0x1F {
            0x1B => {
                self.ctrl = data & 0x08 == 0;
                None
            }
            0x10 => {
                let key = if !self.ctrl || data & 0x0F == 0x0F {
                    None
                } else if data & 0x01 == 0 {
                    Some(Hotkey::Original)
                } else if data & 0x08 == 0 {
                    Some(Hotkey::Linux)
                } else {
                    None
                };
                self.edge(key)
            }
            _ => None,
        }
    }

    /// Fire only when a key appears on the function-key row after a scan
    /// of that row without one.
    fn edge(&mut self, key: Option<Hotkey>) -> Option<Hotkey> {
        let fired = match key {
            Some(k) if self.last.is_none() => {
                self.ctrl = false;
                Some(k)
            }
            _ => None,
        };
        self.last = key;
        fired
    }
}
