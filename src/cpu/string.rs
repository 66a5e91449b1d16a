/*
    cpu/string.rs
    String primitives (MOVS/CMPS/SCAS/LODS/STOS) and REP iteration.

    The source side honors a segment override; the DI side always uses ES.
    A REP-prefixed instruction runs its whole CX loop within one step, so
    no interrupt can observe a partial iteration.
*/

use crate::cpu::{Cpu, Flag, Register8, Register16, RepType};
use crate::bus::BusInterface;

impl Cpu {
    fn advance_si(&mut self, stride: u16) {
        if self.get_flag(Flag::Direction) {
            self.si = self.si.wrapping_sub(stride);
        }
        else {
            self.si = self.si.wrapping_add(stride);
        }
    }

    fn advance_di(&mut self, stride: u16) {
        if self.get_flag(Flag::Direction) {
            self.di = self.di.wrapping_sub(stride);
        }
        else {
            self.di = self.di.wrapping_add(stride);
        }
    }

    /// One iteration of a string opcode (A4-A7, AA-AF).
    fn string_op(&mut self, bus: &mut BusInterface, opcode: u8) {
        match opcode {
            0xA4 => { // MOVSB
                let byte = bus.read_u8(Cpu::calc_linear_address(self.data_segment(), self.si));
                bus.write_u8(Cpu::calc_linear_address(self.es, self.di), byte);
                self.advance_si(1);
                self.advance_di(1);
            }
            0xA5 => { // MOVSW
                let word = bus.read_u16(Cpu::calc_linear_address(self.data_segment(), self.si));
                bus.write_u16(Cpu::calc_linear_address(self.es, self.di), word);
                self.advance_si(2);
                self.advance_di(2);
            }
            0xA6 => { // CMPSB
                let src = bus.read_u8(Cpu::calc_linear_address(self.data_segment(), self.si));
                let dst = bus.read_u8(Cpu::calc_linear_address(self.es, self.di));
                self.alu_sub_u8(src, dst, false);
                self.advance_si(1);
                self.advance_di(1);
            }
            0xA7 => { // CMPSW
                let src = bus.read_u16(Cpu::calc_linear_address(self.data_segment(), self.si));
                let dst = bus.read_u16(Cpu::calc_linear_address(self.es, self.di));
                self.alu_sub_u16(src, dst, false);
                self.advance_si(2);
                self.advance_di(2);
            }
            0xAA => { // STOSB
                let al = self.get_register8(Register8::AL);
                bus.write_u8(Cpu::calc_linear_address(self.es, self.di), al);
                self.advance_di(1);
            }
            0xAB => { // STOSW
                bus.write_u16(Cpu::calc_linear_address(self.es, self.di), self.ax);
                self.advance_di(2);
            }
            0xAC => { // LODSB
                let byte = bus.read_u8(Cpu::calc_linear_address(self.data_segment(), self.si));
                self.set_register8(Register8::AL, byte);
                self.advance_si(1);
            }
            0xAD => { // LODSW
                let word = bus.read_u16(Cpu::calc_linear_address(self.data_segment(), self.si));
                self.set_register16(Register16::AX, word);
                self.advance_si(2);
            }
            0xAE => { // SCASB
                let al = self.get_register8(Register8::AL);
                let dst = bus.read_u8(Cpu::calc_linear_address(self.es, self.di));
                self.alu_sub_u8(al, dst, false);
                self.advance_di(1);
            }
            0xAF => { // SCASW
                let dst = bus.read_u16(Cpu::calc_linear_address(self.es, self.di));
                self.alu_sub_u16(self.ax, dst, false);
                self.advance_di(2);
            }
            _ => unreachable!("string_op: non-string opcode {:02X}", opcode),
        }
    }

    /// Execute a string opcode honoring any latched REP prefix. Compare and
    /// scan forms terminate early when ZF disagrees with the prefix.
    pub(crate) fn rep_string_op(&mut self, bus: &mut BusInterface, opcode: u8) {
        let rep = match self.rep_prefix {
            Some(rep) => rep,
            None => {
                self.string_op(bus, opcode);
                return;
            }
        };

        let compares = matches!(opcode, 0xA6 | 0xA7 | 0xAE | 0xAF);
        while self.cx != 0 {
            self.cx = self.cx.wrapping_sub(1);
            self.string_op(bus, opcode);
            if compares {
                match rep {
                    RepType::Rep => {
                        if !self.get_flag(Flag::Zero) {
                            break;
                        }
                    }
                    RepType::Repne => {
                        if self.get_flag(Flag::Zero) {
                            break;
                        }
                    }
                }
            }
        }
    }
}
