/*
    video/graphics.rs
    Accessors over the sequencer (3C4/3C5) and graphics controller
    (3CE/3CF) register files. The raw 256-byte files are authoritative;
    packed registers are decoded on demand.

    Graphics controller indices used by the memory pipeline:
      00  set/reset value          04  read map select
      01  set/reset enable         05  mode (write mode / read mode)
      02  color compare            07  color don't care
      03  data rotate / logic op   08  bit mask
*/

use modular_bitfield::prelude::*;

use crate::video::VideoCard;

pub const SEQ_MAP_MASK: usize = 0x02;

pub const GC_SET_RESET: usize = 0x00;
pub const GC_ENABLE_SET_RESET: usize = 0x01;
pub const GC_COLOR_COMPARE: usize = 0x02;
pub const GC_DATA_ROTATE: usize = 0x03;
pub const GC_READ_MAP_SELECT: usize = 0x04;
pub const GC_MODE: usize = 0x05;
pub const GC_COLOR_DONT_CARE: usize = 0x07;
pub const GC_BIT_MASK: usize = 0x08;

#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum WriteMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum ReadMode {
    ReadSelectedPlane,
    ReadComparedPlanes,
}

#[derive(Copy, Clone, Debug, PartialEq, BitfieldSpecifier)]
pub enum LogicOp {
    Unmodified,
    And,
    Or,
    Xor,
}

#[bitfield]
pub struct GcModeRegister {
    #[bits = 2]
    pub write_mode: WriteMode,
    pub test_condition: bool,
    #[bits = 1]
    pub read_mode: ReadMode,
    pub odd_even: bool,
    pub shift_mode: B2,
    #[skip]
    unused: B1,
}

#[bitfield]
pub struct GcDataRotateRegister {
    pub count: B3,
    #[bits = 2]
    pub function: LogicOp,
    #[skip]
    unused: B3,
}

impl VideoCard {
    /// Sequencer map mask: one write-enable bit per memory plane.
    pub(super) fn plane_write_enable(&self) -> u8 {
        self.sequencer[SEQ_MAP_MASK] & 0x0F
    }

    pub(super) fn sr_value(&self) -> u8 {
        self.graphics[GC_SET_RESET] & 0x0F
    }

    pub(super) fn sr_enable(&self) -> u8 {
        self.graphics[GC_ENABLE_SET_RESET] & 0x0F
    }

    pub(super) fn color_compare(&self) -> u8 {
        self.graphics[GC_COLOR_COMPARE] & 0x0F
    }

    pub(super) fn color_dont_care(&self) -> u8 {
        self.graphics[GC_COLOR_DONT_CARE] & 0x0F
    }

    pub(super) fn rotate_count(&self) -> u8 {
        GcDataRotateRegister::from_bytes([self.graphics[GC_DATA_ROTATE]]).count()
    }

    pub(super) fn logic_op(&self) -> LogicOp {
        GcDataRotateRegister::from_bytes([self.graphics[GC_DATA_ROTATE]]).function()
    }

    pub(super) fn read_map_select(&self) -> u8 {
        self.graphics[GC_READ_MAP_SELECT] & 0x03
    }

    pub(super) fn write_mode(&self) -> WriteMode {
        GcModeRegister::from_bytes([self.graphics[GC_MODE]]).write_mode()
    }

    pub(super) fn read_mode(&self) -> ReadMode {
        GcModeRegister::from_bytes([self.graphics[GC_MODE]]).read_mode()
    }

    pub(super) fn bit_mask(&self) -> u8 {
        self.graphics[GC_BIT_MASK]
    }
}
