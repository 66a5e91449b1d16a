/*
    cpu/opcodes.rs
    The 256-entry opcode dispatch.

    Group opcodes (80-83, C0/C1, D0-D3, F6/F7, FE/FF) use the reg field of
    the ModR/M byte as a sub-opcode. The 8086 aliases are honored: 0F is
    POP CS, 60-6F mirror the conditional jumps, 82 mirrors 80, D6 is SALC.
*/

use crate::cpu::{
    Cpu, CpuError, Flag, Register8, Register16, REGISTER8_LUT, REGISTER16_LUT,
};
use crate::bus::BusInterface;

impl Cpu {
    /// Two-operand ALU dispatch on bits 3-5 of the opcode (or the reg field
    /// of an immediate group): ADD, OR, ADC, SBB, AND, SUB, XOR, CMP.
    fn alu_op_u8(&mut self, op: u8, a: u8, b: u8) -> u8 {
        match op & 0x07 {
            0 => self.alu_add_u8(a, b, false),
            1 => { let r = a | b; self.alu_logic_flags_u8(r); r }
            2 => self.alu_add_u8(a, b, self.get_flag(Flag::Carry)),
            3 => self.alu_sub_u8(a, b, self.get_flag(Flag::Carry)),
            4 => { let r = a & b; self.alu_logic_flags_u8(r); r }
            5 | 7 => self.alu_sub_u8(a, b, false),
            _ => { let r = a ^ b; self.alu_logic_flags_u8(r); r }
        }
    }

    fn alu_op_u16(&mut self, op: u8, a: u16, b: u16) -> u16 {
        match op & 0x07 {
            0 => self.alu_add_u16(a, b, false),
            1 => { let r = a | b; self.alu_logic_flags_u16(r); r }
            2 => self.alu_add_u16(a, b, self.get_flag(Flag::Carry)),
            3 => self.alu_sub_u16(a, b, self.get_flag(Flag::Carry)),
            4 => { let r = a & b; self.alu_logic_flags_u16(r); r }
            5 | 7 => self.alu_sub_u16(a, b, false),
            _ => { let r = a ^ b; self.alu_logic_flags_u16(r); r }
        }
    }

    // CMP only sets flags
    fn alu_writes_back(op: u8) -> bool {
        op & 0x07 != 7
    }

    /// Condition code evaluation for the Jcc family (low nibble of 70-7F).
    fn condition(&self, cc: u8) -> bool {
        match cc & 0x0F {
            0x0 => self.get_flag(Flag::Overflow),
            0x1 => !self.get_flag(Flag::Overflow),
            0x2 => self.get_flag(Flag::Carry),
            0x3 => !self.get_flag(Flag::Carry),
            0x4 => self.get_flag(Flag::Zero),
            0x5 => !self.get_flag(Flag::Zero),
            0x6 => self.get_flag(Flag::Carry) || self.get_flag(Flag::Zero),
            0x7 => !self.get_flag(Flag::Carry) && !self.get_flag(Flag::Zero),
            0x8 => self.get_flag(Flag::Sign),
            0x9 => !self.get_flag(Flag::Sign),
            0xA => self.get_flag(Flag::Parity),
            0xB => !self.get_flag(Flag::Parity),
            0xC => self.get_flag(Flag::Sign) != self.get_flag(Flag::Overflow),
            0xD => self.get_flag(Flag::Sign) == self.get_flag(Flag::Overflow),
            0xE => self.get_flag(Flag::Zero)
                || (self.get_flag(Flag::Sign) != self.get_flag(Flag::Overflow)),
            _ => !self.get_flag(Flag::Zero)
                && (self.get_flag(Flag::Sign) == self.get_flag(Flag::Overflow)),
        }
    }

    fn jump_rel8(&mut self, rel: u8, taken: bool) {
        if taken {
            self.ip = self.ip.wrapping_add(rel as i8 as u16);
        }
    }

    // INC/DEC leave CF untouched
    fn inc_u8(&mut self, value: u8) -> u8 {
        let carry = self.get_flag(Flag::Carry);
        let result = self.alu_add_u8(value, 1, false);
        self.set_flag_state(Flag::Carry, carry);
        result
    }

    fn dec_u8(&mut self, value: u8) -> u8 {
        let carry = self.get_flag(Flag::Carry);
        let result = self.alu_sub_u8(value, 1, false);
        self.set_flag_state(Flag::Carry, carry);
        result
    }

    fn inc_u16(&mut self, value: u16) -> u16 {
        let carry = self.get_flag(Flag::Carry);
        let result = self.alu_add_u16(value, 1, false);
        self.set_flag_state(Flag::Carry, carry);
        result
    }

    fn dec_u16(&mut self, value: u16) -> u16 {
        let carry = self.get_flag(Flag::Carry);
        let result = self.alu_sub_u16(value, 1, false);
        self.set_flag_state(Flag::Carry, carry);
        result
    }

    pub(crate) fn execute_opcode(
        &mut self,
        opcode: u8,
        bus: &mut BusInterface,
    ) -> Result<(), CpuError> {
        match opcode {
            // ALU rm8, r8
            0x00 | 0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
                let op = opcode >> 3;
                let m = self.fetch_mod_rm(bus);
                let a = self.read_rm_u8(bus, &m);
                let b = self.get_register8(REGISTER8_LUT[m.reg as usize]);
                let r = self.alu_op_u8(op, a, b);
                if Cpu::alu_writes_back(op) {
                    self.write_rm_u8(bus, &m, r);
                }
            }
            // ALU rm16, r16
            0x01 | 0x09 | 0x11 | 0x19 | 0x21 | 0x29 | 0x31 | 0x39 => {
                let op = opcode >> 3;
                let m = self.fetch_mod_rm(bus);
                let a = self.read_rm_u16(bus, &m);
                let b = self.get_register16(REGISTER16_LUT[m.reg as usize]);
                let r = self.alu_op_u16(op, a, b);
                if Cpu::alu_writes_back(op) {
                    self.write_rm_u16(bus, &m, r);
                }
            }
            // ALU r8, rm8
            0x02 | 0x0A | 0x12 | 0x1A | 0x22 | 0x2A | 0x32 | 0x3A => {
                let op = opcode >> 3;
                let m = self.fetch_mod_rm(bus);
                let a = self.get_register8(REGISTER8_LUT[m.reg as usize]);
                let b = self.read_rm_u8(bus, &m);
                let r = self.alu_op_u8(op, a, b);
                if Cpu::alu_writes_back(op) {
                    self.set_register8(REGISTER8_LUT[m.reg as usize], r);
                }
            }
            // ALU r16, rm16
            0x03 | 0x0B | 0x13 | 0x1B | 0x23 | 0x2B | 0x33 | 0x3B => {
                let op = opcode >> 3;
                let m = self.fetch_mod_rm(bus);
                let a = self.get_register16(REGISTER16_LUT[m.reg as usize]);
                let b = self.read_rm_u16(bus, &m);
                let r = self.alu_op_u16(op, a, b);
                if Cpu::alu_writes_back(op) {
                    self.set_register16(REGISTER16_LUT[m.reg as usize], r);
                }
            }
            // ALU AL, imm8
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let op = opcode >> 3;
                let imm = self.fetch_u8(bus);
                let a = self.get_register8(Register8::AL);
                let r = self.alu_op_u8(op, a, imm);
                if Cpu::alu_writes_back(op) {
                    self.set_register8(Register8::AL, r);
                }
            }
            // ALU AX, imm16
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let op = opcode >> 3;
                let imm = self.fetch_u16(bus);
                let r = self.alu_op_u16(op, self.ax, imm);
                if Cpu::alu_writes_back(op) {
                    self.ax = r;
                }
            }

            0x06 => self.push_register16(bus, Register16::ES),
            0x07 => self.pop_register16(bus, Register16::ES),
            0x0E => self.push_register16(bus, Register16::CS),
            0x0F => self.pop_register16(bus, Register16::CS), // 8086 quirk
            0x16 => self.push_register16(bus, Register16::SS),
            0x17 => self.pop_register16(bus, Register16::SS),
            0x1E => self.push_register16(bus, Register16::DS),
            0x1F => self.pop_register16(bus, Register16::DS),

            0x27 => { // DAA
                let mut al = self.get_register8(Register8::AL);
                let old_al = al;
                let old_cf = self.get_flag(Flag::Carry);
                if (al & 0x0F) > 9 || self.get_flag(Flag::AuxCarry) {
                    al = al.wrapping_add(0x06);
                    self.set_flag(Flag::AuxCarry);
                }
                else {
                    self.clear_flag(Flag::AuxCarry);
                }
                if old_al > 0x99 || old_cf {
                    al = al.wrapping_add(0x60);
                    self.set_flag(Flag::Carry);
                }
                else {
                    self.clear_flag(Flag::Carry);
                }
                self.set_register8(Register8::AL, al);
                self.set_szp_flags_u8(al);
            }
            0x2F => { // DAS
                let mut al = self.get_register8(Register8::AL);
                let old_al = al;
                let old_cf = self.get_flag(Flag::Carry);
                if (al & 0x0F) > 9 || self.get_flag(Flag::AuxCarry) {
                    al = al.wrapping_sub(0x06);
                    self.set_flag(Flag::AuxCarry);
                }
                else {
                    self.clear_flag(Flag::AuxCarry);
                }
                if old_al > 0x99 || old_cf {
                    al = al.wrapping_sub(0x60);
                    self.set_flag(Flag::Carry);
                }
                else {
                    self.clear_flag(Flag::Carry);
                }
                self.set_register8(Register8::AL, al);
                self.set_szp_flags_u8(al);
            }
            0x37 => { // AAA
                let al = self.get_register8(Register8::AL);
                if (al & 0x0F) > 9 || self.get_flag(Flag::AuxCarry) {
                    self.ax = self.ax.wrapping_add(0x0106);
                    self.set_flag(Flag::AuxCarry);
                    self.set_flag(Flag::Carry);
                }
                else {
                    self.clear_flag(Flag::AuxCarry);
                    self.clear_flag(Flag::Carry);
                }
                self.ax &= 0xFF0F;
            }
            0x3F => { // AAS
                let al = self.get_register8(Register8::AL);
                if (al & 0x0F) > 9 || self.get_flag(Flag::AuxCarry) {
                    self.ax = self.ax.wrapping_sub(0x0106);
                    self.set_flag(Flag::AuxCarry);
                    self.set_flag(Flag::Carry);
                }
                else {
                    self.clear_flag(Flag::AuxCarry);
                    self.clear_flag(Flag::Carry);
                }
                self.ax &= 0xFF0F;
            }

            // INC r16
            0x40..=0x47 => {
                let reg = REGISTER16_LUT[(opcode & 0x07) as usize];
                let r = self.inc_u16(self.get_register16(reg));
                self.set_register16(reg, r);
            }
            // DEC r16
            0x48..=0x4F => {
                let reg = REGISTER16_LUT[(opcode & 0x07) as usize];
                let r = self.dec_u16(self.get_register16(reg));
                self.set_register16(reg, r);
            }
            // PUSH r16 (PUSH SP stores the decremented value on the 8086)
            0x50..=0x57 => {
                let reg = REGISTER16_LUT[(opcode & 0x07) as usize];
                if let Register16::SP = reg {
                    self.sp = self.sp.wrapping_sub(2);
                    bus.write_u16(Cpu::calc_linear_address(self.ss, self.sp), self.sp);
                }
                else {
                    self.push_register16(bus, reg);
                }
            }
            // POP r16
            0x58..=0x5F => {
                let reg = REGISTER16_LUT[(opcode & 0x07) as usize];
                self.pop_register16(bus, reg);
            }

            // Jcc rel8. 60-6F are aliases of 70-7F on the 8086.
            0x60..=0x7F => {
                let rel = self.fetch_u8(bus);
                let taken = self.condition(opcode);
                self.jump_rel8(rel, taken);
            }

            // Immediate ALU group. 82 is an alias of 80.
            0x80 | 0x82 => {
                let m = self.fetch_mod_rm(bus);
                let a = self.read_rm_u8(bus, &m);
                let imm = self.fetch_u8(bus);
                let r = self.alu_op_u8(m.reg, a, imm);
                if Cpu::alu_writes_back(m.reg) {
                    self.write_rm_u8(bus, &m, r);
                }
            }
            0x81 => {
                let m = self.fetch_mod_rm(bus);
                let a = self.read_rm_u16(bus, &m);
                let imm = self.fetch_u16(bus);
                let r = self.alu_op_u16(m.reg, a, imm);
                if Cpu::alu_writes_back(m.reg) {
                    self.write_rm_u16(bus, &m, r);
                }
            }
            0x83 => {
                let m = self.fetch_mod_rm(bus);
                let a = self.read_rm_u16(bus, &m);
                let imm = self.fetch_u8(bus) as i8 as u16;
                let r = self.alu_op_u16(m.reg, a, imm);
                if Cpu::alu_writes_back(m.reg) {
                    self.write_rm_u16(bus, &m, r);
                }
            }

            0x84 => { // TEST rm8, r8
                let m = self.fetch_mod_rm(bus);
                let a = self.read_rm_u8(bus, &m);
                let b = self.get_register8(REGISTER8_LUT[m.reg as usize]);
                self.alu_logic_flags_u8(a & b);
            }
            0x85 => { // TEST rm16, r16
                let m = self.fetch_mod_rm(bus);
                let a = self.read_rm_u16(bus, &m);
                let b = self.get_register16(REGISTER16_LUT[m.reg as usize]);
                self.alu_logic_flags_u16(a & b);
            }
            0x86 => { // XCHG r8, rm8
                let m = self.fetch_mod_rm(bus);
                let reg = REGISTER8_LUT[m.reg as usize];
                let a = self.get_register8(reg);
                let b = self.read_rm_u8(bus, &m);
                self.set_register8(reg, b);
                self.write_rm_u8(bus, &m, a);
            }
            0x87 => { // XCHG r16, rm16
                let m = self.fetch_mod_rm(bus);
                let reg = REGISTER16_LUT[m.reg as usize];
                let a = self.get_register16(reg);
                let b = self.read_rm_u16(bus, &m);
                self.set_register16(reg, b);
                self.write_rm_u16(bus, &m, a);
            }

            0x88 => { // MOV rm8, r8
                let m = self.fetch_mod_rm(bus);
                let v = self.get_register8(REGISTER8_LUT[m.reg as usize]);
                self.write_rm_u8(bus, &m, v);
            }
            0x89 => { // MOV rm16, r16
                let m = self.fetch_mod_rm(bus);
                let v = self.get_register16(REGISTER16_LUT[m.reg as usize]);
                self.write_rm_u16(bus, &m, v);
            }
            0x8A => { // MOV r8, rm8
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u8(bus, &m);
                self.set_register8(REGISTER8_LUT[m.reg as usize], v);
            }
            0x8B => { // MOV r16, rm16
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u16(bus, &m);
                self.set_register16(REGISTER16_LUT[m.reg as usize], v);
            }
            0x8C => { // MOV rm16, sreg
                let m = self.fetch_mod_rm(bus);
                let v = self.get_register16(Cpu::segment_register_from_reg(m.reg));
                self.write_rm_u16(bus, &m, v);
            }
            0x8D => { // LEA r16, m
                let m = self.fetch_mod_rm(bus);
                self.set_register16(REGISTER16_LUT[m.reg as usize], m.offset);
            }
            0x8E => { // MOV sreg, rm16
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u16(bus, &m);
                self.set_register16(Cpu::segment_register_from_reg(m.reg), v);
            }
            0x8F => { // POP rm16
                let m = self.fetch_mod_rm(bus);
                let v = self.pop_u16(bus);
                self.write_rm_u16(bus, &m, v);
            }

            0x90 => {} // NOP (XCHG AX, AX)
            0x91..=0x97 => { // XCHG AX, r16
                let reg = REGISTER16_LUT[(opcode & 0x07) as usize];
                let v = self.get_register16(reg);
                self.set_register16(reg, self.ax);
                self.ax = v;
            }

            0x98 => { // CBW
                self.ax = self.ax as u8 as i8 as i16 as u16;
            }
            0x99 => { // CWD
                self.dx = if self.ax & 0x8000 != 0 { 0xFFFF } else { 0x0000 };
            }
            0x9A => { // CALL far ptr16:16
                let offset = self.fetch_u16(bus);
                let segment = self.fetch_u16(bus);
                self.push_u16(bus, self.cs);
                self.push_u16(bus, self.ip);
                self.cs = segment;
                self.ip = offset;
            }
            0x9B => {} // WAIT: no coprocessor
            0x9C => self.push_u16(bus, self.flags),
            0x9D => { // POPF
                let flags = self.pop_u16(bus);
                self.store_flags(flags);
            }
            0x9E => { // SAHF
                let ah = self.get_register8(Register8::AH) as u16;
                self.flags = (self.flags & 0xFF00) | (ah & 0x00D5) | 0x0002;
            }
            0x9F => { // LAHF
                let flags = self.flags as u8;
                self.set_register8(Register8::AH, flags);
            }

            0xA0 => { // MOV AL, moffs16
                let offset = self.fetch_u16(bus);
                let v = bus.read_u8(Cpu::calc_linear_address(self.data_segment(), offset));
                self.set_register8(Register8::AL, v);
            }
            0xA1 => { // MOV AX, moffs16
                let offset = self.fetch_u16(bus);
                self.ax = bus.read_u16(Cpu::calc_linear_address(self.data_segment(), offset));
            }
            0xA2 => { // MOV moffs16, AL
                let offset = self.fetch_u16(bus);
                let v = self.get_register8(Register8::AL);
                bus.write_u8(Cpu::calc_linear_address(self.data_segment(), offset), v);
            }
            0xA3 => { // MOV moffs16, AX
                let offset = self.fetch_u16(bus);
                bus.write_u16(Cpu::calc_linear_address(self.data_segment(), offset), self.ax);
            }

            // String ops, REP handled inside
            0xA4..=0xA7 | 0xAA..=0xAF => {
                self.rep_string_op(bus, opcode);
            }

            0xA8 => { // TEST AL, imm8
                let imm = self.fetch_u8(bus);
                let al = self.get_register8(Register8::AL);
                self.alu_logic_flags_u8(al & imm);
            }
            0xA9 => { // TEST AX, imm16
                let imm = self.fetch_u16(bus);
                let r = self.ax & imm;
                self.alu_logic_flags_u16(r);
            }

            // MOV r8, imm8
            0xB0..=0xB7 => {
                let imm = self.fetch_u8(bus);
                self.set_register8(REGISTER8_LUT[(opcode & 0x07) as usize], imm);
            }
            // MOV r16, imm16
            0xB8..=0xBF => {
                let imm = self.fetch_u16(bus);
                self.set_register16(REGISTER16_LUT[(opcode & 0x07) as usize], imm);
            }

            // Shift group, imm8 count
            0xC0 => {
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u8(bus, &m);
                let count = self.fetch_u8(bus);
                let r = self.shift_op_u8(m.reg, v, count);
                self.write_rm_u8(bus, &m, r);
            }
            0xC1 => {
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u16(bus, &m);
                let count = self.fetch_u8(bus);
                let r = self.shift_op_u16(m.reg, v, count);
                self.write_rm_u16(bus, &m, r);
            }

            0xC2 => { // RET imm16
                let adjust = self.fetch_u16(bus);
                self.ip = self.pop_u16(bus);
                self.sp = self.sp.wrapping_add(adjust);
            }
            0xC3 => { // RET
                self.ip = self.pop_u16(bus);
            }
            0xC4 => { // LES r16, m16:16
                let m = self.fetch_mod_rm(bus);
                let offset = bus.read_u16(m.ea);
                let segment = bus.read_u16(m.ea.wrapping_add(2) & 0xFFFFF);
                self.set_register16(REGISTER16_LUT[m.reg as usize], offset);
                self.es = segment;
            }
            0xC5 => { // LDS r16, m16:16
                let m = self.fetch_mod_rm(bus);
                let offset = bus.read_u16(m.ea);
                let segment = bus.read_u16(m.ea.wrapping_add(2) & 0xFFFFF);
                self.set_register16(REGISTER16_LUT[m.reg as usize], offset);
                self.ds = segment;
            }
            0xC6 => { // MOV rm8, imm8
                let m = self.fetch_mod_rm(bus);
                let imm = self.fetch_u8(bus);
                self.write_rm_u8(bus, &m, imm);
            }
            0xC7 => { // MOV rm16, imm16
                let m = self.fetch_mod_rm(bus);
                let imm = self.fetch_u16(bus);
                self.write_rm_u16(bus, &m, imm);
            }

            0xCA => { // RETF imm16
                let adjust = self.fetch_u16(bus);
                self.ip = self.pop_u16(bus);
                self.cs = self.pop_u16(bus);
                self.sp = self.sp.wrapping_add(adjust);
            }
            0xCB => { // RETF
                self.ip = self.pop_u16(bus);
                self.cs = self.pop_u16(bus);
            }
            0xCC => { // INT3
                self.do_interrupt(bus, 3);
            }
            0xCD => { // INT imm8
                let number = self.fetch_u8(bus);
                self.software_interrupt(bus, number);
            }
            0xCE => { // INTO
                if self.get_flag(Flag::Overflow) {
                    self.do_interrupt(bus, 4);
                }
            }
            0xCF => { // IRET
                self.ip = self.pop_u16(bus);
                self.cs = self.pop_u16(bus);
                let flags = self.pop_u16(bus);
                self.store_flags(flags);
            }

            // Shift group: D0/D1 by 1, D2/D3 by CL
            0xD0 => {
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u8(bus, &m);
                let r = self.shift_op_u8(m.reg, v, 1);
                self.write_rm_u8(bus, &m, r);
            }
            0xD1 => {
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u16(bus, &m);
                let r = self.shift_op_u16(m.reg, v, 1);
                self.write_rm_u16(bus, &m, r);
            }
            0xD2 => {
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u8(bus, &m);
                let count = self.get_register8(Register8::CL);
                let r = self.shift_op_u8(m.reg, v, count);
                self.write_rm_u8(bus, &m, r);
            }
            0xD3 => {
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u16(bus, &m);
                let count = self.get_register8(Register8::CL);
                let r = self.shift_op_u16(m.reg, v, count);
                self.write_rm_u16(bus, &m, r);
            }

            0xD4 => { // AAM
                let base = self.fetch_u8(bus);
                if base == 0 {
                    self.do_interrupt(bus, 0);
                }
                else {
                    let al = self.get_register8(Register8::AL);
                    self.set_register8(Register8::AH, al / base);
                    self.set_register8(Register8::AL, al % base);
                    self.set_szp_flags_u8(al % base);
                }
            }
            0xD5 => { // AAD
                let base = self.fetch_u8(bus);
                let al = self.get_register8(Register8::AL);
                let ah = self.get_register8(Register8::AH);
                let r = ah.wrapping_mul(base).wrapping_add(al);
                self.ax = r as u16;
                self.set_szp_flags_u8(r);
            }
            0xD6 => { // SALC (undocumented)
                let v = if self.get_flag(Flag::Carry) { 0xFF } else { 0x00 };
                self.set_register8(Register8::AL, v);
            }
            0xD7 => { // XLAT
                let addr = Cpu::calc_linear_address(
                    self.data_segment(),
                    self.bx.wrapping_add(self.get_register8(Register8::AL) as u16),
                );
                let v = bus.read_u8(addr);
                self.set_register8(Register8::AL, v);
            }

            // ESC: coprocessor opcodes consume their ModR/M and do nothing
            0xD8..=0xDF => {
                let _ = self.fetch_mod_rm(bus);
            }

            0xE0 => { // LOOPNZ rel8
                let rel = self.fetch_u8(bus);
                self.cx = self.cx.wrapping_sub(1);
                let taken = self.cx != 0 && !self.get_flag(Flag::Zero);
                self.jump_rel8(rel, taken);
            }
            0xE1 => { // LOOPZ rel8
                let rel = self.fetch_u8(bus);
                self.cx = self.cx.wrapping_sub(1);
                let taken = self.cx != 0 && self.get_flag(Flag::Zero);
                self.jump_rel8(rel, taken);
            }
            0xE2 => { // LOOP rel8
                let rel = self.fetch_u8(bus);
                self.cx = self.cx.wrapping_sub(1);
                let taken = self.cx != 0;
                self.jump_rel8(rel, taken);
            }
            0xE3 => { // JCXZ rel8
                let rel = self.fetch_u8(bus);
                let taken = self.cx == 0;
                self.jump_rel8(rel, taken);
            }

            0xE4 => { // IN AL, imm8
                let port = self.fetch_u8(bus) as u16;
                let v = bus.io_read_u8(port);
                self.set_register8(Register8::AL, v);
            }
            0xE5 => { // IN AX, imm8
                let port = self.fetch_u8(bus) as u16;
                let lo = bus.io_read_u8(port);
                let hi = bus.io_read_u8(port.wrapping_add(1));
                self.ax = (hi as u16) << 8 | lo as u16;
            }
            0xE6 => { // OUT imm8, AL
                let port = self.fetch_u8(bus) as u16;
                let v = self.get_register8(Register8::AL);
                bus.io_write_u8(port, v);
            }
            0xE7 => { // OUT imm8, AX
                let port = self.fetch_u8(bus) as u16;
                bus.io_write_u8(port, self.ax as u8);
                bus.io_write_u8(port.wrapping_add(1), (self.ax >> 8) as u8);
            }

            0xE8 => { // CALL rel16
                let rel = self.fetch_u16(bus);
                self.push_u16(bus, self.ip);
                self.ip = self.ip.wrapping_add(rel);
            }
            0xE9 => { // JMP rel16
                let rel = self.fetch_u16(bus);
                self.ip = self.ip.wrapping_add(rel);
            }
            0xEA => { // JMP ptr16:16
                let offset = self.fetch_u16(bus);
                let segment = self.fetch_u16(bus);
                self.cs = segment;
                self.ip = offset;
            }
            0xEB => { // JMP rel8
                let rel = self.fetch_u8(bus);
                self.jump_rel8(rel, true);
            }

            0xEC => { // IN AL, DX
                let v = bus.io_read_u8(self.dx);
                self.set_register8(Register8::AL, v);
            }
            0xED => { // IN AX, DX
                let lo = bus.io_read_u8(self.dx);
                let hi = bus.io_read_u8(self.dx.wrapping_add(1));
                self.ax = (hi as u16) << 8 | lo as u16;
            }
            0xEE => { // OUT DX, AL
                let v = self.get_register8(Register8::AL);
                bus.io_write_u8(self.dx, v);
            }
            0xEF => { // OUT DX, AX
                bus.io_write_u8(self.dx, self.ax as u8);
                bus.io_write_u8(self.dx.wrapping_add(1), (self.ax >> 8) as u8);
            }

            0xF4 => { // HLT
                self.halted = true;
            }
            0xF5 => { // CMC
                let carry = self.get_flag(Flag::Carry);
                self.set_flag_state(Flag::Carry, !carry);
            }

            // Unary group
            0xF6 => {
                let m = self.fetch_mod_rm(bus);
                match m.reg {
                    0 | 1 => { // TEST rm8, imm8
                        let v = self.read_rm_u8(bus, &m);
                        let imm = self.fetch_u8(bus);
                        self.alu_logic_flags_u8(v & imm);
                    }
                    2 => { // NOT
                        let v = self.read_rm_u8(bus, &m);
                        self.write_rm_u8(bus, &m, !v);
                    }
                    3 => { // NEG
                        let v = self.read_rm_u8(bus, &m);
                        let r = self.alu_sub_u8(0, v, false);
                        self.write_rm_u8(bus, &m, r);
                    }
                    4 => { // MUL
                        let v = self.read_rm_u8(bus, &m);
                        let product = self.get_register8(Register8::AL) as u16 * v as u16;
                        self.ax = product;
                        let overflow = product & 0xFF00 != 0;
                        self.set_flag_state(Flag::Carry, overflow);
                        self.set_flag_state(Flag::Overflow, overflow);
                    }
                    5 => { // IMUL
                        let v = self.read_rm_u8(bus, &m);
                        let product =
                            (self.get_register8(Register8::AL) as i8 as i16) * (v as i8 as i16);
                        self.ax = product as u16;
                        let overflow = product != product as i8 as i16;
                        self.set_flag_state(Flag::Carry, overflow);
                        self.set_flag_state(Flag::Overflow, overflow);
                    }
                    6 => { // DIV
                        let v = self.read_rm_u8(bus, &m);
                        if v == 0 {
                            self.do_interrupt(bus, 0);
                        }
                        else {
                            let quotient = self.ax / v as u16;
                            if quotient > 0xFF {
                                self.do_interrupt(bus, 0);
                            }
                            else {
                                let remainder = self.ax % v as u16;
                                self.ax = (remainder << 8) | quotient;
                            }
                        }
                    }
                    _ => { // IDIV
                        let v = self.read_rm_u8(bus, &m);
                        if v == 0 {
                            self.do_interrupt(bus, 0);
                        }
                        else {
                            let dividend = self.ax as i16;
                            let divisor = v as i8 as i16;
                            let quotient = dividend.wrapping_div(divisor);
                            if !(-128..=127).contains(&quotient) {
                                self.do_interrupt(bus, 0);
                            }
                            else {
                                let remainder = dividend.wrapping_rem(divisor);
                                self.ax = ((remainder as u16) << 8) | (quotient as u16 & 0xFF);
                            }
                        }
                    }
                }
            }
            0xF7 => {
                let m = self.fetch_mod_rm(bus);
                match m.reg {
                    0 | 1 => { // TEST rm16, imm16
                        let v = self.read_rm_u16(bus, &m);
                        let imm = self.fetch_u16(bus);
                        self.alu_logic_flags_u16(v & imm);
                    }
                    2 => { // NOT
                        let v = self.read_rm_u16(bus, &m);
                        self.write_rm_u16(bus, &m, !v);
                    }
                    3 => { // NEG
                        let v = self.read_rm_u16(bus, &m);
                        let r = self.alu_sub_u16(0, v, false);
                        self.write_rm_u16(bus, &m, r);
                    }
                    4 => { // MUL
                        let v = self.read_rm_u16(bus, &m);
                        let product = self.ax as u32 * v as u32;
                        self.ax = product as u16;
                        self.dx = (product >> 16) as u16;
                        let overflow = self.dx != 0;
                        self.set_flag_state(Flag::Carry, overflow);
                        self.set_flag_state(Flag::Overflow, overflow);
                    }
                    5 => { // IMUL
                        let v = self.read_rm_u16(bus, &m);
                        let product = (self.ax as i16 as i32) * (v as i16 as i32);
                        self.ax = product as u16;
                        self.dx = (product >> 16) as u16;
                        let overflow = product != product as i16 as i32;
                        self.set_flag_state(Flag::Carry, overflow);
                        self.set_flag_state(Flag::Overflow, overflow);
                    }
                    6 => { // DIV
                        let v = self.read_rm_u16(bus, &m);
                        if v == 0 {
                            self.do_interrupt(bus, 0);
                        }
                        else {
                            let dividend = (self.dx as u32) << 16 | self.ax as u32;
                            let quotient = dividend / v as u32;
                            if quotient > 0xFFFF {
                                self.do_interrupt(bus, 0);
                            }
                            else {
                                self.ax = quotient as u16;
                                self.dx = (dividend % v as u32) as u16;
                            }
                        }
                    }
                    _ => { // IDIV
                        let v = self.read_rm_u16(bus, &m);
                        if v == 0 {
                            self.do_interrupt(bus, 0);
                        }
                        else {
                            let dividend = ((self.dx as u32) << 16 | self.ax as u32) as i32;
                            let divisor = v as i16 as i32;
                            let quotient = dividend.wrapping_div(divisor);
                            if !(-32768..=32767).contains(&quotient) {
                                self.do_interrupt(bus, 0);
                            }
                            else {
                                self.ax = quotient as u16;
                                self.dx = dividend.wrapping_rem(divisor) as u16;
                            }
                        }
                    }
                }
            }

            0xF8 => self.clear_flag(Flag::Carry),
            0xF9 => self.set_flag(Flag::Carry),
            0xFA => self.clear_flag(Flag::Interrupt),
            0xFB => self.set_flag(Flag::Interrupt),
            0xFC => self.clear_flag(Flag::Direction),
            0xFD => self.set_flag(Flag::Direction),

            0xFE => { // INC/DEC rm8
                let m = self.fetch_mod_rm(bus);
                let v = self.read_rm_u8(bus, &m);
                match m.reg {
                    0 => {
                        let r = self.inc_u8(v);
                        self.write_rm_u8(bus, &m, r);
                    }
                    1 => {
                        let r = self.dec_u8(v);
                        self.write_rm_u8(bus, &m, r);
                    }
                    _ => {
                        return Err(CpuError::InvalidOpcode(opcode, self.get_flat_address()));
                    }
                }
            }
            0xFF => {
                let m = self.fetch_mod_rm(bus);
                match m.reg {
                    0 => { // INC rm16
                        let v = self.read_rm_u16(bus, &m);
                        let r = self.inc_u16(v);
                        self.write_rm_u16(bus, &m, r);
                    }
                    1 => { // DEC rm16
                        let v = self.read_rm_u16(bus, &m);
                        let r = self.dec_u16(v);
                        self.write_rm_u16(bus, &m, r);
                    }
                    2 => { // CALL rm16
                        let target = self.read_rm_u16(bus, &m);
                        self.push_u16(bus, self.ip);
                        self.ip = target;
                    }
                    3 => { // CALL m16:16
                        let offset = bus.read_u16(m.ea);
                        let segment = bus.read_u16(m.ea.wrapping_add(2) & 0xFFFFF);
                        self.push_u16(bus, self.cs);
                        self.push_u16(bus, self.ip);
                        self.cs = segment;
                        self.ip = offset;
                    }
                    4 => { // JMP rm16
                        self.ip = self.read_rm_u16(bus, &m);
                    }
                    5 => { // JMP m16:16
                        let offset = bus.read_u16(m.ea);
                        let segment = bus.read_u16(m.ea.wrapping_add(2) & 0xFFFFF);
                        self.cs = segment;
                        self.ip = offset;
                    }
                    _ => { // PUSH rm16 (/7 decodes as /6 on the 8086)
                        let v = self.read_rm_u16(bus, &m);
                        self.push_u16(bus, v);
                    }
                }
            }

            _ => {
                return Err(CpuError::InvalidOpcode(opcode, self.get_flat_address()));
            }
        }

        Ok(())
    }
}
