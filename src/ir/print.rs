//! A pretty-printer for IR trees, used by the CLI's IR emission mode and
//! handy when debugging the translator. The exact format is advisory.

use std::fmt::Write;

use itertools::Itertools;

use super::{
    tree::{Exp, Stm},
    Fragment,
};

pub struct TreePrinter;

const INDENT: &str = "  ";

impl TreePrinter {
    pub fn render_fragments(fragments: &[Fragment]) -> String {
        let mut out = String::new();

        for fragment in fragments {
            match fragment {
                Fragment::Proc { body, frame } => {
                    let frame = frame.borrow();
                    writeln!(out, "proc {}:", frame.name()).unwrap();
                    out.push_str(&Self::render_stm_indented(body, 1));
                    out.push('\n');
                }
                Fragment::String { label, value } => {
                    writeln!(out, "string {label} = {value:?}").unwrap();
                }
            }
        }

        out
    }

    pub fn render_stm(stm: &Stm) -> String {
        Self::render_stm_indented(stm, 0)
    }

    fn render_stm_indented(stm: &Stm, depth: usize) -> String {
        let pad = INDENT.repeat(depth);

        match stm {
            Stm::Move(dst, src) => format!(
                "{pad}MOVE(\n{},\n{})",
                Self::render_exp_indented(dst, depth + 1),
                Self::render_exp_indented(src, depth + 1)
            ),
            Stm::Exp(exp) => {
                format!("{pad}EXP(\n{})", Self::render_exp_indented(exp, depth + 1))
            }
            Stm::Jump(target, labels) => format!(
                "{pad}JUMP(\n{}, [{}])",
                Self::render_exp_indented(target, depth + 1),
                labels.iter().join(", ")
            ),
            Stm::CJump(op, left, right, t, f) => format!(
                "{pad}CJUMP({op},\n{},\n{}, {t}, {f})",
                Self::render_exp_indented(left, depth + 1),
                Self::render_exp_indented(right, depth + 1)
            ),
            Stm::Seq(first, second) => format!(
                "{pad}SEQ(\n{},\n{})",
                Self::render_stm_indented(first, depth + 1),
                Self::render_stm_indented(second, depth + 1)
            ),
            Stm::Label(label) => format!("{pad}LABEL {label}"),
        }
    }

    fn render_exp_indented(exp: &Exp, depth: usize) -> String {
        let pad = INDENT.repeat(depth);

        match exp {
            Exp::Const(value) => format!("{pad}CONST {value}"),
            Exp::Name(label) => format!("{pad}NAME {label}"),
            Exp::Temp(temp) => format!("{pad}TEMP {temp}"),
            Exp::BinOp(op, left, right) => format!(
                "{pad}BINOP({op},\n{},\n{})",
                Self::render_exp_indented(left, depth + 1),
                Self::render_exp_indented(right, depth + 1)
            ),
            Exp::Mem(address) => format!(
                "{pad}MEM(\n{})",
                Self::render_exp_indented(address, depth + 1)
            ),
            Exp::Call(func, args) => {
                let mut out = format!(
                    "{pad}CALL(\n{}",
                    Self::render_exp_indented(func, depth + 1)
                );
                for arg in args {
                    out.push_str(",\n");
                    out.push_str(&Self::render_exp_indented(arg, depth + 1));
                }
                out.push(')');
                out
            }
            Exp::ESeq(stm, exp) => format!(
                "{pad}ESEQ(\n{},\n{})",
                Self::render_stm_indented(stm, depth + 1),
                Self::render_exp_indented(exp, depth + 1)
            ),
        }
    }
}
