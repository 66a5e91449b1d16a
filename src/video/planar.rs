/*
    video/planar.rs
    The four-plane VGA memory controller behind the 0xA0000 aperture.

    Every aperture read fills a hidden 32-bit latch with the addressed byte
    of all four planes; writes run a per-plane pipeline of rotate, set/reset
    substitution, latch ALU and bit-mask muxing before the sequencer map
    mask gates the final store. All four lanes are processed at once in a
    packed 32-bit word, LSB lane = plane 0.

    Reference: https://www.phatcode.net/res/224/files/html/ch27/27-01.html
*/

use crate::video::graphics::{LogicOp, ReadMode, WriteMode};
use crate::video::{VideoCard, VGA_PLANE_SIZE};

/// Expand each of the 4 low bits of `bits` into a full 0xFF lane.
fn expand4(bits: u8) -> u32 {
    let mut out = 0u32;
    if bits & 0x01 != 0 { out |= 0x0000_00FF; }
    if bits & 0x02 != 0 { out |= 0x0000_FF00; }
    if bits & 0x04 != 0 { out |= 0x00FF_0000; }
    if bits & 0x08 != 0 { out |= 0xFF00_0000; }
    out
}

/// Broadcast a byte into all four lanes.
fn broadcast8(byte: u8) -> u32 {
    byte as u32 * 0x0101_0101
}

fn ror8(byte: u8, count: u8) -> u8 {
    byte.rotate_right((count & 0x07) as u32)
}

impl VideoCard {
    /// A CPU read from the aperture: fill the latch, then return a byte per
    /// the graphics controller read mode.
    pub fn mem_read_u8(&mut self, offset: u32) -> u8 {
        let a = offset as usize & (VGA_PLANE_SIZE - 1);

        self.latch = (self.planes[0][a] as u32)
            | (self.planes[1][a] as u32) << 8
            | (self.planes[2][a] as u32) << 16
            | (self.planes[3][a] as u32) << 24;

        match self.read_mode() {
            ReadMode::ReadSelectedPlane => {
                (self.latch >> (self.read_map_select() * 8)) as u8
            }
            ReadMode::ReadComparedPlanes => self.color_compare_read(),
        }
    }

    /// Read mode 1: per-bit comparison of each latched plane byte against
    /// the color compare register, restricted to the planes selected by
    /// color don't care. A result bit is set when every participating plane
    /// matches its compare bit at that pixel position.
    fn color_compare_read(&self) -> u8 {
        let compare = self.color_compare();
        let dont_care = self.color_dont_care();

        let mut result = 0xFF;
        for plane in 0..4 {
            if dont_care & (1 << plane) == 0 {
                continue;
            }
            let byte = (self.latch >> (plane * 8)) as u8;
            result &= if compare & (1 << plane) != 0 { byte } else { !byte };
        }
        result
    }

    /// A CPU write to the aperture, dispatched on the write mode.
    pub fn mem_write_u8(&mut self, offset: u32, byte: u8) {
        let a = offset as usize & (VGA_PLANE_SIZE - 1);

        let lanes = match self.write_mode() {
            WriteMode::Mode0 => {
                // Rotate, then mux each lane between the broadcast byte and
                // the set/reset expansion, then ALU and bit mask.
                let rotated = broadcast8(ror8(byte, self.rotate_count()));
                let lane_select = expand4(!self.sr_enable() & 0x0F);
                let set_reset = expand4(self.sr_value());
                let source = (rotated & lane_select) | (set_reset & !lane_select);
                self.bit_mask_mux(self.latch_alu(source))
            }
            WriteMode::Mode1 => {
                // Straight latch copy; no ALU, no bit mask
                self.latch
            }
            WriteMode::Mode2 => {
                // The low nibble is a color: one bit per lane
                self.bit_mask_mux(self.latch_alu(expand4(byte & 0x0F)))
            }
            WriteMode::Mode3 => {
                // The rotated byte ANDed with the bit mask register selects,
                // per bit, between set/reset expansion and the latch
                let mask = self.bit_mask() & ror8(byte, self.rotate_count());
                let select = expand4(mask);
                (expand4(self.sr_value()) & select) | (self.latch & !select)
            }
        };

        self.write_planes(a, lanes);
    }

    fn latch_alu(&self, input: u32) -> u32 {
        match self.logic_op() {
            LogicOp::Unmodified => input,
            LogicOp::And => input & self.latch,
            LogicOp::Or => input | self.latch,
            LogicOp::Xor => input ^ self.latch,
        }
    }

    /// Bit positions set in the bit mask register take the pipeline result;
    /// clear positions pass the latch through unchanged.
    fn bit_mask_mux(&self, input: u32) -> u32 {
        let mask = broadcast8(self.bit_mask());
        (input & mask) | (self.latch & !mask)
    }

    fn write_planes(&mut self, a: usize, lanes: u32) {
        let enable = self.plane_write_enable();
        for plane in 0..4 {
            if enable & (1 << plane) != 0 {
                self.planes[plane][a] = (lanes >> (plane * 8)) as u8;
            }
        }
    }
}
