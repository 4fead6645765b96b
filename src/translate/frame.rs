//! The machine-independent view of activation records. A frame dialect
//! supplies the word size, the register-argument count, and the stack
//! layout; everything above this module works against the `Frame` trait only.

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use super::temp::{Label, Temp, TempFactory};

/// Where a formal or local lives relative to its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// A stack slot at a fixed offset from the frame pointer
    InFrame(i64),
    /// An abstract register
    InReg(Temp),
}

/// One activation record: entry label, formal accesses (the first formal is
/// always the static link), and a running local-slot counter.
pub trait Frame: Debug {
    fn name(&self) -> &Label;

    fn formals(&self) -> &[Access];

    /// Allocates a slot for a local. Escaping locals get a fresh stack slot;
    /// the rest live in a fresh temp.
    fn alloc_local(&mut self, escape: bool, temps: &mut TempFactory) -> Access;

    fn frame_pointer(&self) -> Temp;

    fn return_value(&self) -> Temp;

    fn word_size(&self) -> i64;
}

pub type FrameRef = Rc<RefCell<dyn Frame>>;

/// Constructs frames for one calling convention.
pub trait FrameDialect: Debug {
    /// `formals[i]` is the escape bit of the i-th formal (the caller places
    /// the static link at index 0).
    fn new_frame(&self, name: Label, formals: &[bool], temps: &mut TempFactory) -> FrameRef;
}
