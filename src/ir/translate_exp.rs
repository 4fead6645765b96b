//! The polymorphic wrapper around a translated expression. Relational and
//! logical expressions are naturally "jump to one of two labels" rather than
//! a value; the `Cx` variant defers committing to either view until the
//! context is known.

use super::tree::{cjump, eseq, jump_to, move_to, seq_list, Exp, RelOp, Stm};
use crate::translate::temp::{Label, TempFactory};

/// A conditional: given the true and false destinations, produce the
/// branching statement.
pub type CondFn = Box<dyn FnOnce(Label, Label, &mut TempFactory) -> Stm>;

pub enum TransExp {
    /// An expression with a value
    Ex(Exp),
    /// A statement with no value
    Nx(Stm),
    /// A conditional awaiting its destinations
    Cx(CondFn),
}

impl TransExp {
    /// Forces the value view. A conditional materializes its result in a
    /// fresh temp: 1 on the true path, 0 on the false path.
    pub fn un_ex(self, temps: &mut TempFactory) -> Exp {
        match self {
            TransExp::Ex(exp) => exp,
            TransExp::Nx(stm) => eseq(stm, Exp::Const(0)),
            TransExp::Cx(cond) => {
                let r = temps.new_temp();
                let t = temps.new_label();
                let f = temps.new_label();
                let join = temps.new_label();

                let branch = cond(t.clone(), f.clone(), temps);

                eseq(
                    seq_list([
                        move_to(Exp::Temp(r), Exp::Const(1)),
                        branch,
                        Stm::Label(f),
                        move_to(Exp::Temp(r), Exp::Const(0)),
                        jump_to(join.clone()),
                        Stm::Label(t),
                        jump_to(join.clone()),
                        Stm::Label(join),
                    ]),
                    Exp::Temp(r),
                )
            }
        }
    }

    /// Forces the effect-only view, discarding any value.
    pub fn un_nx(self, temps: &mut TempFactory) -> Stm {
        match self {
            TransExp::Ex(exp) => Stm::Exp(Box::new(exp)),
            TransExp::Nx(stm) => stm,
            TransExp::Cx(cond) => {
                let t = temps.new_label();
                let f = temps.new_label();

                let branch = cond(t.clone(), f.clone(), temps);

                seq_list([branch, Stm::Label(t), Stm::Label(f)])
            }
        }
    }

    /// Forces the conditional view. A value becomes a comparison against
    /// zero. A statement can never be a condition; the type checker rules
    /// that out before translation starts.
    pub fn un_cx(self, t: Label, f: Label, temps: &mut TempFactory) -> Stm {
        match self {
            TransExp::Ex(exp) => cjump(RelOp::Ne, exp, Exp::Const(0), t, f),
            TransExp::Nx(_) => {
                unreachable!("a no-value expression cannot be used as a condition")
            }
            TransExp::Cx(cond) => cond(t, f, temps),
        }
    }
}

impl std::fmt::Debug for TransExp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransExp::Ex(exp) => f.debug_tuple("Ex").field(exp).finish(),
            TransExp::Nx(stm) => f.debug_tuple("Nx").field(stm).finish(),
            TransExp::Cx(_) => f.write_str("Cx(..)"),
        }
    }
}
