//! The machine-independent tree IR and its generator. The translator's
//! output is an ordered list of fragments: one procedure per function
//! declaration, string-literal data, and the program body last.

use crate::translate::{frame::FrameRef, temp::Label};

use self::tree::Stm;

pub mod generator;
pub mod print;
pub mod translate_exp;
pub mod tree;

#[derive(Debug)]
pub enum Fragment {
    Proc { body: Stm, frame: FrameRef },
    String { label: Label, value: String },
}
