/*
    cpu/stack.rs
    Stack primitives. The stack grows down from SS:SP; SP wraps at 64K.
*/

use crate::cpu::{Cpu, Register16};
use crate::bus::BusInterface;

impl Cpu {
    pub fn push_u16(&mut self, bus: &mut BusInterface, value: u16) {
        self.sp = self.sp.wrapping_sub(2);
        bus.write_u16(Cpu::calc_linear_address(self.ss, self.sp), value);
    }

    pub fn pop_u16(&mut self, bus: &mut BusInterface) -> u16 {
        let value = bus.read_u16(Cpu::calc_linear_address(self.ss, self.sp));
        self.sp = self.sp.wrapping_add(2);
        value
    }

    pub fn push_register16(&mut self, bus: &mut BusInterface, reg: Register16) {
        let value = self.get_register16(reg);
        self.push_u16(bus, value);
    }

    pub fn pop_register16(&mut self, bus: &mut BusInterface, reg: Register16) {
        let value = self.pop_u16(bus);
        self.set_register16(reg, value);
    }
}
