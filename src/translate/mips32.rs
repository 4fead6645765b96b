//! 32-bit frame dialect (MIPS O32 style): four register arguments, and the
//! caller always reserves a 16-byte argument save area, so stack-passed
//! formals begin at `fp + 16` regardless of how many fit in registers.

use std::{cell::RefCell, rc::Rc};

use super::{
    frame::{Access, Frame, FrameDialect, FrameRef},
    temp::{Label, Temp, TempFactory},
};

const WORD_SIZE: i64 = 4;
const MAX_REG_ARGS: usize = 4;
/// Space for the four register arguments, reserved even when unused
const ARG_SAVE_AREA: i64 = 16;

#[derive(Debug)]
pub struct Mips32Frame {
    name: Label,
    formals: Vec<Access>,
    local_offset: i64,
    fp: Temp,
    rv: Temp,
}

impl Mips32Frame {
    fn new(name: Label, formals: &[bool], temps: &mut TempFactory) -> Self {
        let mut frame = Self {
            name,
            formals: Vec::with_capacity(formals.len()),
            local_offset: 0,
            fp: temps.new_temp(),
            rv: temps.new_temp(),
        };

        for (i, &escape) in formals.iter().enumerate() {
            let access = if i >= MAX_REG_ARGS {
                Access::InFrame(ARG_SAVE_AREA + (i - MAX_REG_ARGS) as i64 * WORD_SIZE)
            } else if escape {
                frame.local_offset -= WORD_SIZE;
                Access::InFrame(frame.local_offset)
            } else {
                Access::InReg(temps.new_temp())
            };

            frame.formals.push(access);
        }

        frame
    }
}

impl Frame for Mips32Frame {
    fn name(&self) -> &Label {
        &self.name
    }

    fn formals(&self) -> &[Access] {
        &self.formals
    }

    fn alloc_local(&mut self, escape: bool, temps: &mut TempFactory) -> Access {
        if escape {
            self.local_offset -= WORD_SIZE;
            Access::InFrame(self.local_offset)
        } else {
            Access::InReg(temps.new_temp())
        }
    }

    fn frame_pointer(&self) -> Temp {
        self.fp
    }

    fn return_value(&self) -> Temp {
        self.rv
    }

    fn word_size(&self) -> i64 {
        WORD_SIZE
    }
}

#[derive(Debug, Default)]
pub struct Mips32Dialect;

impl FrameDialect for Mips32Dialect {
    fn new_frame(&self, name: Label, formals: &[bool], temps: &mut TempFactory) -> FrameRef {
        Rc::new(RefCell::new(Mips32Frame::new(name, formals, temps)))
    }
}
