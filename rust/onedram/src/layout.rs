//! OneDRAM register map and mailbox vocabulary.
//!
//! The shared window is 16 MiB. The top 2 KiB hold the control registers
//! (hardware semaphore and the two mailboxes) and are never visible through
//! the firmware or ramdump paths. The FIFOs sit just below the error
//! message area near the top of the window.

use std::fmt;

use smr_primitives::FifoGeometry;

use crate::pipe::PipeId;

// ── mailbox ─────────────────────────────────────────────────────────────

/// The message is a protocol message rather than a boot marker.
pub const MB_VALID: u32 = 0x0080;
/// The low nibble carries a command.
pub const MB_COMMAND: u32 = 0x0040;
pub const MB_COMMAND_MASK: u32 = 0x000f;

pub const MBC_INIT_START: u32 = 0x1;
pub const MBC_INIT_END: u32 = 0x2;
pub const MBC_REQ_ACTIVE: u32 = 0x3;
pub const MBC_RES_ACTIVE: u32 = 0x4;
pub const MBC_TIME_SYNC: u32 = 0x5;
pub const MBC_POWER_OFF: u32 = 0x6;
pub const MBC_RESET: u32 = 0x7;
pub const MBC_PHONE_START: u32 = 0x8;
pub const MBC_ERR_DISPLAY: u32 = 0x9;
pub const MBC_SUSPEND: u32 = 0xa;
pub const MBC_RESUME: u32 = 0xb;
pub const MBC_EMER_DOWN: u32 = 0xc;
pub const MBC_REQ_SEM: u32 = 0xd;
pub const MBC_RES_SEM: u32 = 0xe;

/// Init-end payload: the modem boots into airplane mode.
pub const CP_BOOT_AIRPLANE: u32 = 0x1000;
/// Init-end payload: the AP runs Android.
pub const AP_OS_ANDROID: u32 = 0x0100;

/// Data bits: the AP queued something in a FIFO.
pub const MBD_SEND_RAW: u32 = 0x0001;
pub const MBD_SEND_FMT: u32 = 0x0002;
pub const MBD_SEND_RFS: u32 = 0x0100;

// Boot markers exchanged before the modem runs.
pub const MODEM_MSG_SBL_DONE: u32 = 0x1234_1234;
pub const MODEM_CMD_BINARY_LOAD: u32 = 0x4567_4567;
pub const MODEM_MSG_BINARY_DONE: u32 = 0xabcd_abcd;
pub const MODEM_CMD_RAMDUMP_START: u32 = 0xdead_dead;
pub const MODEM_MSG_RAMDUMP_LARGE: u32 = 0x0add_0add;
pub const MODEM_CMD_RAMDUMP_MORE: u32 = 0xeded_0eed;
pub const MODEM_MSG_RAMDUMP_SMALL: u32 = 0xfade_fade;
pub const MODEM_MSG_LOGDUMP_DONE: u32 = 0x0a0a_0a0a;

/// Build an AP→BP command message.
pub const fn command(cmd: u32) -> u32 {
    MB_VALID | MB_COMMAND | cmd
}

// ── default map ─────────────────────────────────────────────────────────

pub const SMR_SIZE: usize = 16 * 1024 * 1024;
pub const CONTROL_AREA_SIZE: usize = 0x800;
pub const OFF_SEM: usize = 0xff_f800;
pub const OFF_MBOX_BP: usize = 0xff_f820;
pub const OFF_MBOX_AP: usize = 0xff_f840;
pub const OFF_ERROR_MSG: usize = 0xff_f000;
pub const SIZ_ERROR_MSG: usize = 160;
pub const OFF_FIFO_INDEX: usize = 0xf0_0000;
pub const RAMDUMP_SMALL_SIZE: usize = 256 * 1024;

/// Tx and rx FIFOs of one pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeLayout {
    pub tx: FifoGeometry,
    pub rx: FifoGeometry,
}

/// Where everything lives inside the shared window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmrLayout {
    pub size: usize,
    /// Bytes at the top of the window hidden from firmware and dumps.
    pub control_size: usize,
    pub sem_offset: usize,
    pub mbox_bp_offset: usize,
    pub mbox_ap_offset: usize,
    pub error_msg_offset: usize,
    pub error_msg_len: usize,
    /// Indexed by [`PipeId`].
    pub pipes: [PipeLayout; PipeId::COUNT],
    pub ramdump_small: usize,
}

const fn index_slot(n: usize) -> usize {
    OFF_FIFO_INDEX + n * 8
}

impl Default for SmrLayout {
    fn default() -> Self {
        Self {
            size: SMR_SIZE,
            control_size: CONTROL_AREA_SIZE,
            sem_offset: OFF_SEM,
            mbox_bp_offset: OFF_MBOX_BP,
            mbox_ap_offset: OFF_MBOX_AP,
            error_msg_offset: OFF_ERROR_MSG,
            error_msg_len: SIZ_ERROR_MSG,
            // Index block order: FMT tx/rx, RAW tx/rx, RFS tx/rx.
            pipes: [
                PipeLayout {
                    tx: FifoGeometry::new(index_slot(0), 0xf0_1000, 0x1000),
                    rx: FifoGeometry::new(index_slot(1), 0xf0_2000, 0x1000),
                },
                PipeLayout {
                    tx: FifoGeometry::new(index_slot(2), 0xf1_0000, 0x2_0000),
                    rx: FifoGeometry::new(index_slot(3), 0xf3_0000, 0x2_0000),
                },
                PipeLayout {
                    tx: FifoGeometry::new(index_slot(4), 0xf5_0000, 0x2_0000),
                    rx: FifoGeometry::new(index_slot(5), 0xf7_0000, 0x4_0000),
                },
            ],
            ramdump_small: RAMDUMP_SMALL_SIZE,
        }
    }
}

impl SmrLayout {
    /// Bytes reachable by firmware writes and ramdump reads.
    pub fn visible_len(&self) -> usize {
        self.size.saturating_sub(self.control_size)
    }

    /// Size announced by `MODEM_MSG_RAMDUMP_LARGE`.
    pub fn ramdump_large(&self) -> usize {
        self.visible_len()
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.control_size == 0 || self.control_size >= self.size {
            return Err(LayoutError::ControlArea {
                size: self.control_size,
            });
        }
        let control = self.visible_len()..self.size;

        for (name, off) in [
            ("semaphore", self.sem_offset),
            ("bp mailbox", self.mbox_bp_offset),
            ("ap mailbox", self.mbox_ap_offset),
        ] {
            if !off.is_multiple_of(4) || !control.contains(&off) || off + 4 > self.size {
                return Err(LayoutError::Register { name, offset: off });
            }
        }

        let err_end = self.error_msg_offset.checked_add(self.error_msg_len);
        if err_end.is_none_or(|end| end > self.size) {
            return Err(LayoutError::OutOfBounds {
                name: "error message",
                offset: self.error_msg_offset,
            });
        }

        for id in PipeId::ALL {
            let pipe = &self.pipes[id as usize];
            for (dir, fifo) in [("tx", pipe.tx), ("rx", pipe.rx)] {
                if !fifo.size.is_power_of_two() || fifo.size < 2 {
                    return Err(LayoutError::FifoSize {
                        pipe: id,
                        dir,
                        size: fifo.size,
                    });
                }
                if !fifo.fits(self.size) {
                    return Err(LayoutError::OutOfBounds {
                        name: dir,
                        offset: fifo.data_offset,
                    });
                }
            }
        }

        if self.ramdump_small == 0 || self.ramdump_small > self.visible_len() {
            return Err(LayoutError::OutOfBounds {
                name: "small ramdump",
                offset: self.ramdump_small,
            });
        }
        Ok(())
    }
}

/// A layout that cannot describe a usable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    ControlArea { size: usize },
    Register { name: &'static str, offset: usize },
    FifoSize {
        pipe: PipeId,
        dir: &'static str,
        size: u32,
    },
    OutOfBounds { name: &'static str, offset: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::ControlArea { size } => {
                write!(f, "control area of {size:#x} bytes does not fit the window")
            }
            LayoutError::Register { name, offset } => {
                write!(f, "{name} register at {offset:#x} is outside the control area")
            }
            LayoutError::FifoSize { pipe, dir, size } => {
                write!(f, "{pipe:?} {dir} fifo size {size:#x} is not a power of two")
            }
            LayoutError::OutOfBounds { name, offset } => {
                write!(f, "{name} at {offset:#x} does not fit the window")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        let layout = SmrLayout::default();
        assert_eq!(layout.validate(), Ok(()));
        assert_eq!(layout.visible_len(), 0xff_f800);
        assert_eq!(layout.ramdump_large(), layout.visible_len());
    }

    #[test]
    fn odd_fifo_size_is_rejected() {
        let mut layout = SmrLayout::default();
        layout.pipes[PipeId::Raw as usize].rx.size = 0x1_8000;
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::FifoSize {
                pipe: PipeId::Raw,
                dir: "rx",
                ..
            })
        ));
    }

    #[test]
    fn registers_must_live_in_the_control_area() {
        let layout = SmrLayout {
            sem_offset: 0x100,
            ..SmrLayout::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::Register {
                name: "semaphore",
                ..
            })
        ));
    }

    #[test]
    fn command_sets_valid_and_command_bits() {
        assert_eq!(command(MBC_REQ_SEM), 0xcd);
        assert_eq!(command(MBC_RES_SEM), 0xce);
    }
}
