//! 64-bit frame dialect (System V style): the first six integer formals
//! arrive in registers, the rest on the stack at positive offsets from the
//! frame pointer. Locals grow downward from the frame pointer.
//!
//! Frame layout (higher addresses first):
//!
//! ```text
//!   argument 8        fp + 24
//!   argument 7        fp + 16
//!   return address
//!   saved fp          <- fp
//!   local 1           fp - 8
//!   local 2           fp - 16
//! ```

use std::{cell::RefCell, rc::Rc};

use super::{
    frame::{Access, Frame, FrameDialect, FrameRef},
    temp::{Label, Temp, TempFactory},
};

const WORD_SIZE: i64 = 8;
const MAX_REG_ARGS: usize = 6;

#[derive(Debug)]
pub struct X64Frame {
    name: Label,
    formals: Vec<Access>,
    /// Next free local offset, always negative
    local_offset: i64,
    fp: Temp,
    rv: Temp,
}

impl X64Frame {
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
                // Stack-passed formal, already in the caller's frame
                Access::InFrame(16 + (i - MAX_REG_ARGS) as i64 * WORD_SIZE)
            } else if escape {
                // Register-passed formal that must be addressable: copy it
                // into a fresh slot
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

impl Frame for X64Frame {
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
pub struct X64Dialect;

impl FrameDialect for X64Dialect {
    fn new_frame(&self, name: Label, formals: &[bool], temps: &mut TempFactory) -> FrameRef {
        Rc::new(RefCell::new(X64Frame::new(name, formals, temps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_formals_get_frame_slots() {
        let mut temps = TempFactory::new();
        let dialect = X64Dialect;

        // Static link plus two source formals, one escaping
        let frame = dialect.new_frame(
            temps.named_label("f"),
            &[true, true, false],
            &mut temps,
        );
        let frame = frame.borrow();

        assert_eq!(frame.formals()[0], Access::InFrame(-8));
        assert_eq!(frame.formals()[1], Access::InFrame(-16));
        assert!(matches!(frame.formals()[2], Access::InReg(_)));
    }

    #[test]
    fn stack_formals_start_at_sixteen_past_fp() {
        let mut temps = TempFactory::new();
        let dialect = X64Dialect;

        let frame = dialect.new_frame(
            temps.named_label("f"),
            &[true, false, false, false, false, false, false, false],
            &mut temps,
        );
        let frame = frame.borrow();

        // Formals 6 and 7 overflow the six argument registers
        assert_eq!(frame.formals()[6], Access::InFrame(16));
        assert_eq!(frame.formals()[7], Access::InFrame(24));
    }

    #[test]
    fn locals_grow_downward() {
        let mut temps = TempFactory::new();
        let dialect = X64Dialect;

        let frame = dialect.new_frame(temps.named_label("f"), &[], &mut temps);
        let mut frame = frame.borrow_mut();

        assert_eq!(frame.alloc_local(true, &mut temps), Access::InFrame(-8));
        assert_eq!(frame.alloc_local(true, &mut temps), Access::InFrame(-16));
        assert!(matches!(
            frame.alloc_local(false, &mut temps),
            Access::InReg(_)
        ));
    }
}
