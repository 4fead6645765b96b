//! The tree IR. Expressions compute a value; statements have effect. There
//! is no boolean type: conditionals are `CJump`s and the translator builds
//! short-circuit forms out of labels and jumps.

use strum::Display;

use crate::translate::temp::{Label, Temp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum BinOp {
    Plus,
    Minus,
    Mul,
    Div,
    And,
    Or,
    Xor,
    LShift,
    RShift,
    ARShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl RelOp {
    /// The operator that holds exactly when `self` does not.
    pub fn negate(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Ge => RelOp::Lt,
            RelOp::Gt => RelOp::Le,
            RelOp::Le => RelOp::Gt,
            RelOp::Ult => RelOp::Uge,
            RelOp::Uge => RelOp::Ult,
            RelOp::Ugt => RelOp::Ule,
            RelOp::Ule => RelOp::Ugt,
        }
    }

    /// The operator with its operands swapped.
    pub fn commute(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Eq,
            RelOp::Ne => RelOp::Ne,
            RelOp::Lt => RelOp::Gt,
            RelOp::Gt => RelOp::Lt,
            RelOp::Le => RelOp::Ge,
            RelOp::Ge => RelOp::Le,
            RelOp::Ult => RelOp::Ugt,
            RelOp::Ugt => RelOp::Ult,
            RelOp::Ule => RelOp::Uge,
            RelOp::Uge => RelOp::Ule,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Const(i64),
    Name(Label),
    Temp(Temp),
    BinOp(BinOp, Box<Exp>, Box<Exp>),
    /// The word of memory starting at the address
    Mem(Box<Exp>),
    Call(Box<Exp>, Vec<Exp>),
    /// Evaluate the statement for effect, then the expression for its value
    ESeq(Box<Stm>, Box<Exp>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stm {
    /// Destination is `Temp(_)` or `Mem(_)`
    Move(Box<Exp>, Box<Exp>),
    /// Evaluate and discard
    Exp(Box<Exp>),
    /// `targets` enumerates every label the expression can evaluate to
    Jump(Box<Exp>, Vec<Label>),
    CJump(RelOp, Box<Exp>, Box<Exp>, Label, Label),
    Seq(Box<Stm>, Box<Stm>),
    Label(Label),
}

pub fn binop(op: BinOp, left: Exp, right: Exp) -> Exp {
    Exp::BinOp(op, Box::new(left), Box::new(right))
}

pub fn mem(addr: Exp) -> Exp {
    Exp::Mem(Box::new(addr))
}

pub fn eseq(stm: Stm, exp: Exp) -> Exp {
    Exp::ESeq(Box::new(stm), Box::new(exp))
}

pub fn move_to(dst: Exp, src: Exp) -> Stm {
    Stm::Move(Box::new(dst), Box::new(src))
}

pub fn cjump(op: RelOp, left: Exp, right: Exp, t: Label, f: Label) -> Stm {
    Stm::CJump(op, Box::new(left), Box::new(right), t, f)
}

/// A direct jump to a single known label.
pub fn jump_to(label: Label) -> Stm {
    Stm::Jump(Box::new(Exp::Name(label.clone())), vec![label])
}

/// Chains two optional statements; either side may be absent.
pub fn seq_opt(first: Option<Stm>, second: Option<Stm>) -> Option<Stm> {
    match (first, second) {
        (Some(a), Some(b)) => Some(Stm::Seq(Box::new(a), Box::new(b))),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Folds a non-empty list of statements into a left-nested `Seq`.
pub fn seq_list(stms: impl IntoIterator<Item = Stm>) -> Stm {
    stms.into_iter()
        .reduce(|a, b| Stm::Seq(Box::new(a), Box::new(b)))
        .expect("seq_list requires at least one statement")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negate_is_an_involution() {
        for op in [
            RelOp::Eq,
            RelOp::Ne,
            RelOp::Lt,
            RelOp::Gt,
            RelOp::Le,
            RelOp::Ge,
            RelOp::Ult,
            RelOp::Ule,
            RelOp::Ugt,
            RelOp::Uge,
        ] {
            assert_eq!(op.negate().negate(), op);
            assert_eq!(op.commute().commute(), op);
        }
    }

    #[test]
    fn seq_opt_keeps_the_present_side() {
        let a = Stm::Label(Label::Numbered(0));
        assert_eq!(seq_opt(Some(a.clone()), None), Some(a.clone()));
        assert_eq!(seq_opt(None, Some(a.clone())), Some(a));
        assert_eq!(seq_opt(None, None), None);
    }
}
