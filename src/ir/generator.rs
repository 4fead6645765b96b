//! Translation from the type-checked AST (escape bits filled in) to tree-IR
//! fragments over an abstract frame dialect. Variables are reached through
//! their `Access` relative to the frame pointer of the level that declared
//! them; non-local references chase static links at the call site.

use std::rc::Rc;

use hashbrown::HashMap;

use super::{
    translate_exp::TransExp,
    tree::{
        binop, cjump, eseq, jump_to, mem, move_to, seq_list, seq_opt, BinOp, Exp, RelOp, Stm,
    },
    Fragment,
};
use crate::{
    frontend::ast::{
        Decl, DeclKind, Expr, ExprKind, FunctionDecl, NodeId, OperatorKind, Var, VarDecl,
    },
    semantic::{environment::BUILTIN_FUNCTIONS, Analysis},
    symbol_table::SymbolTable,
    translate::{
        frame::{Access, FrameDialect},
        temp::{Label, TempFactory},
        Level,
    },
};

#[derive(Debug, Clone)]
struct IrVarEntry {
    level: Rc<Level>,
    access: Access,
}

#[derive(Debug, Clone)]
struct IrFunEntry {
    level: Rc<Level>,
    label: Label,
}

pub struct IrGenerator<'a> {
    dialect: &'a dyn FrameDialect,
    /// Declared-order field indices recorded by the semantic analyzer,
    /// keyed by field-access expression id
    field_indices: &'a HashMap<NodeId, usize>,
    temps: TempFactory,
    current_level: Rc<Level>,
    var_env: SymbolTable<IrVarEntry>,
    fun_env: SymbolTable<IrFunEntry>,
    break_labels: Vec<Label>,
    fragments: Vec<Fragment>,
}

impl<'a> IrGenerator<'a> {
    /// Translates a whole program. The returned fragment list holds one proc
    /// per function declaration (in declaration order), string literals in
    /// first-encounter order, and the program body last.
    pub fn translate(
        program: &Expr,
        analysis: &'a Analysis,
        dialect: &'a dyn FrameDialect,
    ) -> Vec<Fragment> {
        let mut temps = TempFactory::new();
        let outermost = Level::outermost(dialect, &mut temps);

        let mut generator = IrGenerator {
            dialect,
            field_indices: &analysis.field_indices,
            temps,
            current_level: outermost,
            var_env: SymbolTable::new(),
            fun_env: SymbolTable::new(),
            break_labels: Vec::new(),
            fragments: Vec::new(),
        };

        generator.install_builtins();

        let program_exp = generator.trans_expr(program);
        let body = program_exp.un_nx(&mut generator.temps);
        let frame = generator.current_level.frame().clone();
        generator.fragments.push(Fragment::Proc { body, frame });

        generator.fragments
    }

    /// The runtime library lives at the outermost level under its external
    /// names; calls to it never pass a static link.
    fn install_builtins(&mut self) {
        for name in BUILTIN_FUNCTIONS {
            self.fun_env.enter(
                *name,
                IrFunEntry {
                    level: self.current_level.clone(),
                    label: self.temps.named_label(*name),
                },
            );
        }
    }

    fn begin_scope(&mut self) {
        self.var_env.begin_scope();
        self.fun_env.begin_scope();
    }

    fn end_scope(&mut self) {
        self.var_env.end_scope();
        self.fun_env.end_scope();
    }

    fn word_size(&self) -> i64 {
        self.current_level.frame().borrow().word_size()
    }

    /// The frame pointer of `target` as seen from the current level,
    /// following the static link (always the first formal) one enclosing
    /// frame at a time.
    fn static_link_chain(&self, target: &Rc<Level>) -> Exp {
        let mut fp = Exp::Temp(self.current_level.frame().borrow().frame_pointer());
        let mut level = self.current_level.clone();

        while !Level::same_level(&level, target) {
            let Some(link) = level.static_link() else {
                break;
            };
            fp = access_to_exp(link, fp);

            match level.parent() {
                Some(parent) => level = parent.clone(),
                None => break,
            }
        }

        fp
    }

    fn var_location(&mut self, entry: &IrVarEntry) -> Exp {
        let fp = self.static_link_chain(&entry.level);
        access_to_exp(entry.access, fp)
    }

    fn string_literal(&mut self, value: &str) -> Label {
        let label = self.temps.new_label();
        self.fragments.push(Fragment::String {
            label: label.clone(),
            value: value.to_owned(),
        });

        label
    }

    fn trans_expr(&mut self, expr: &Expr) -> TransExp {
        match &expr.kind {
            ExprKind::Nil => TransExp::Ex(Exp::Const(0)),
            ExprKind::Int(value) => TransExp::Ex(Exp::Const(*value)),
            ExprKind::String(value) => {
                let label = self.string_literal(value);
                TransExp::Ex(Exp::Name(label))
            }
            ExprKind::Var(var) => {
                let location = self.lvalue_location(expr, var);
                TransExp::Ex(location)
            }
            ExprKind::Call { func, args } => self.trans_call(func, args),
            ExprKind::Op { op, left, right } => self.trans_op(*op, left, right),
            ExprKind::Record { fields, .. } => self.trans_record(fields),
            ExprKind::Array { size, init, .. } => {
                let size = self.trans_expr(size);
                let size = size.un_ex(&mut self.temps);
                let init = self.trans_expr(init);
                let init = init.un_ex(&mut self.temps);

                TransExp::Ex(Exp::Call(
                    Box::new(Exp::Name(self.temps.named_label("initArray"))),
                    vec![size, init],
                ))
            }
            ExprKind::Assign { target, value } => {
                let value = self.trans_expr(value);
                let value = value.un_ex(&mut self.temps);

                let ExprKind::Var(var) = &target.kind else {
                    unreachable!("assignment target is always an l-value");
                };
                let destination = self.lvalue_location(target, var);

                TransExp::Nx(move_to(destination, value))
            }
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => self.trans_if(test, then_branch, else_branch.as_deref()),
            ExprKind::While { test, body } => self.trans_while(test, body),
            ExprKind::For {
                var,
                escape,
                lo,
                hi,
                body,
            } => self.trans_for(var, escape.get(), lo, hi, body),
            ExprKind::Break => match self.break_labels.last() {
                Some(done) => TransExp::Nx(jump_to(done.clone())),
                // The semantic analyzer rejects break outside a loop; a
                // no-op keeps the translator total
                None => TransExp::Nx(Stm::Exp(Box::new(Exp::Const(0)))),
            },
            ExprKind::Let { decls, body } => {
                self.begin_scope();
                let result = self.trans_let(decls, body);
                self.end_scope();

                result
            }
            ExprKind::Seq(exprs) => self.trans_seq(exprs),
        }
    }

    /// The location (register or memory word) an l-value names. Reads wrap
    /// it in `Ex`; assignments use it as a `Move` destination.
    fn lvalue_location(&mut self, expr: &Expr, var: &Var) -> Exp {
        match var {
            Var::Simple(name) => {
                let entry = self
                    .var_env
                    .lookup(name)
                    .cloned()
                    .unwrap_or_else(|| unreachable!("variable `{name}` was bound during analysis"));

                self.var_location(&entry)
            }
            Var::Field { base, .. } => {
                let base = self.trans_expr(base);
                let base = base.un_ex(&mut self.temps);

                let index = *self
                    .field_indices
                    .get(&expr.id)
                    .unwrap_or_else(|| unreachable!("field access has a recorded index"));

                mem(binop(
                    BinOp::Plus,
                    base,
                    Exp::Const(index as i64 * self.word_size()),
                ))
            }
            Var::Subscript { base, index } => {
                let base = self.trans_expr(base);
                let base = base.un_ex(&mut self.temps);
                let index = self.trans_expr(index);
                let index = index.un_ex(&mut self.temps);

                mem(binop(
                    BinOp::Plus,
                    base,
                    binop(BinOp::Mul, index, Exp::Const(self.word_size())),
                ))
            }
        }
    }

    fn trans_call(&mut self, func: &str, args: &[Expr]) -> TransExp {
        let entry = self
            .fun_env
            .lookup(func)
            .cloned()
            .unwrap_or_else(|| unreachable!("function `{func}` was bound during analysis"));

        let mut ir_args = Vec::with_capacity(args.len() + 1);

        // A nested function receives its defining level's frame pointer as a
        // hidden first argument
        if let Some(parent) = entry.level.parent() {
            ir_args.push(self.static_link_chain(&parent.clone()));
        }

        for arg in args {
            let arg = self.trans_expr(arg);
            ir_args.push(arg.un_ex(&mut self.temps));
        }

        TransExp::Ex(Exp::Call(Box::new(Exp::Name(entry.label)), ir_args))
    }

    fn trans_op(&mut self, op: OperatorKind, left: &Expr, right: &Expr) -> TransExp {
        match op {
            OperatorKind::And => {
                let left = self.trans_expr(left);
                let right = self.trans_expr(right);
                let next = self.temps.new_label();

                return TransExp::Cx(Box::new(move |t, f, temps| {
                    seq_list([
                        left.un_cx(next.clone(), f.clone(), temps),
                        Stm::Label(next),
                        right.un_cx(t, f, temps),
                    ])
                }));
            }
            OperatorKind::Or => {
                let left = self.trans_expr(left);
                let right = self.trans_expr(right);
                let next = self.temps.new_label();

                return TransExp::Cx(Box::new(move |t, f, temps| {
                    seq_list([
                        left.un_cx(t.clone(), next.clone(), temps),
                        Stm::Label(next),
                        right.un_cx(t, f, temps),
                    ])
                }));
            }
            _ => {}
        }

        let left = self.trans_expr(left);
        let left = left.un_ex(&mut self.temps);
        let right = self.trans_expr(right);
        let right = right.un_ex(&mut self.temps);

        match op {
            OperatorKind::Add => TransExp::Ex(binop(BinOp::Plus, left, right)),
            OperatorKind::Subtract => TransExp::Ex(binop(BinOp::Minus, left, right)),
            OperatorKind::Multiply => TransExp::Ex(binop(BinOp::Mul, left, right)),
            OperatorKind::Divide => TransExp::Ex(binop(BinOp::Div, left, right)),
            OperatorKind::Equals => relational(RelOp::Eq, left, right),
            OperatorKind::NotEquals => relational(RelOp::Ne, left, right),
            OperatorKind::LessThan => relational(RelOp::Lt, left, right),
            OperatorKind::LessThanOrEqualTo => relational(RelOp::Le, left, right),
            OperatorKind::GreaterThan => relational(RelOp::Gt, left, right),
            OperatorKind::GreaterThanOrEqualTo => relational(RelOp::Ge, left, right),
            OperatorKind::And | OperatorKind::Or => unreachable!("handled above"),
        }
    }

    /// `allocRecord` returns a zeroed block; every field is then initialized
    /// in declaration order.
    fn trans_record(&mut self, fields: &[(String, Expr)]) -> TransExp {
        let word = self.word_size();
        let record = self.temps.new_temp();

        let mut stms = vec![move_to(
            Exp::Temp(record),
            Exp::Call(
                Box::new(Exp::Name(self.temps.named_label("allocRecord"))),
                vec![Exp::Const(fields.len() as i64 * word)],
            ),
        )];

        for (index, (_, value)) in fields.iter().enumerate() {
            let value = self.trans_expr(value);
            let value = value.un_ex(&mut self.temps);

            stms.push(move_to(
                mem(binop(
                    BinOp::Plus,
                    Exp::Temp(record),
                    Exp::Const(index as i64 * word),
                )),
                value,
            ));
        }

        TransExp::Ex(eseq(seq_list(stms), Exp::Temp(record)))
    }

    fn trans_if(
        &mut self,
        test: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
    ) -> TransExp {
        let test = self.trans_expr(test);
        let then_exp = self.trans_expr(then_branch);

        let t = self.temps.new_label();
        let f = self.temps.new_label();

        match else_branch {
            Some(else_branch) => {
                let else_exp = self.trans_expr(else_branch);
                let join = self.temps.new_label();
                let result = self.temps.new_temp();

                let branch = test.un_cx(t.clone(), f.clone(), &mut self.temps);
                let then_value = then_exp.un_ex(&mut self.temps);
                let else_value = else_exp.un_ex(&mut self.temps);

                TransExp::Ex(eseq(
                    seq_list([
                        branch,
                        Stm::Label(t),
                        move_to(Exp::Temp(result), then_value),
                        jump_to(join.clone()),
                        Stm::Label(f),
                        move_to(Exp::Temp(result), else_value),
                        jump_to(join.clone()),
                        Stm::Label(join),
                    ]),
                    Exp::Temp(result),
                ))
            }
            None => {
                let branch = test.un_cx(t.clone(), f.clone(), &mut self.temps);
                let then_stm = then_exp.un_nx(&mut self.temps);

                TransExp::Nx(seq_list([branch, Stm::Label(t), then_stm, Stm::Label(f)]))
            }
        }
    }

    fn trans_while(&mut self, test: &Expr, body: &Expr) -> TransExp {
        let test_label = self.temps.new_label();
        let body_label = self.temps.new_label();
        let done = self.temps.new_label();

        self.break_labels.push(done.clone());
        let test = self.trans_expr(test);
        let body = self.trans_expr(body);
        self.break_labels.pop();

        let branch = test.un_cx(body_label.clone(), done.clone(), &mut self.temps);
        let body_stm = body.un_nx(&mut self.temps);

        TransExp::Nx(seq_list([
            Stm::Label(test_label.clone()),
            branch,
            Stm::Label(body_label),
            body_stm,
            jump_to(test_label),
            Stm::Label(done),
        ]))
    }

    /// The loop test is split into an entry `LE` and a bottom `LT` so the
    /// index is never incremented past the limit; a limit equal to the
    /// largest word value would otherwise overflow.
    fn trans_for(
        &mut self,
        var: &str,
        escape: bool,
        lo: &Expr,
        hi: &Expr,
        body: &Expr,
    ) -> TransExp {
        let body_label = self.temps.new_label();
        let increment = self.temps.new_label();
        let done = self.temps.new_label();

        let access = self
            .current_level
            .frame()
            .borrow_mut()
            .alloc_local(escape, &mut self.temps);
        let entry = IrVarEntry {
            level: self.current_level.clone(),
            access,
        };

        self.begin_scope();
        self.var_env.enter(var, entry.clone());

        let lo = self.trans_expr(lo);
        let lo = lo.un_ex(&mut self.temps);
        let hi = self.trans_expr(hi);
        let hi = hi.un_ex(&mut self.temps);

        let index = self.var_location(&entry);
        let limit = self.temps.new_temp();

        self.break_labels.push(done.clone());
        let body = self.trans_expr(body);
        let body_stm = body.un_nx(&mut self.temps);
        self.break_labels.pop();

        self.end_scope();

        TransExp::Nx(seq_list([
            move_to(index.clone(), lo),
            move_to(Exp::Temp(limit), hi),
            cjump(
                RelOp::Le,
                index.clone(),
                Exp::Temp(limit),
                body_label.clone(),
                done.clone(),
            ),
            Stm::Label(body_label.clone()),
            body_stm,
            cjump(
                RelOp::Lt,
                index.clone(),
                Exp::Temp(limit),
                increment.clone(),
                done.clone(),
            ),
            Stm::Label(increment),
            move_to(
                index.clone(),
                binop(BinOp::Plus, index, Exp::Const(1)),
            ),
            jump_to(body_label),
            Stm::Label(done),
        ]))
    }

    fn trans_let(&mut self, decls: &[Decl], body: &[Expr]) -> TransExp {
        let mut decl_stm: Option<Stm> = None;

        // Runs of consecutive function declarations are registered before
        // any of their bodies are translated, mirroring the analyzer's
        // batching, so mutually recursive calls resolve
        let mut i = 0;
        while i < decls.len() {
            match &decls[i].kind {
                DeclKind::Type(_) => i += 1,
                DeclKind::Var(var_decl) => {
                    let stm = self.trans_var_decl(var_decl);
                    decl_stm = seq_opt(decl_stm, Some(stm));
                    i += 1;
                }
                DeclKind::Function(_) => {
                    let start = i;
                    while i < decls.len() && matches!(decls[i].kind, DeclKind::Function(_)) {
                        i += 1;
                    }

                    let batch: Vec<&FunctionDecl> = decls[start..i]
                        .iter()
                        .map(|d| match &d.kind {
                            DeclKind::Function(f) => f,
                            _ => unreachable!("run contains only function declarations"),
                        })
                        .collect();

                    self.trans_function_batch(&batch);
                }
            }
        }

        let mut body_stm: Option<Stm> = None;
        let mut last: Option<TransExp> = None;

        for (index, expr) in body.iter().enumerate() {
            let translated = self.trans_expr(expr);

            if index + 1 < body.len() {
                let stm = translated.un_nx(&mut self.temps);
                body_stm = seq_opt(body_stm, Some(stm));
            } else {
                last = Some(translated);
            }
        }

        let setup = seq_opt(decl_stm, body_stm);

        match (setup, last) {
            (None, Some(last)) => last,
            (Some(setup), Some(last)) => {
                let value = last.un_ex(&mut self.temps);
                TransExp::Ex(eseq(setup, value))
            }
            (Some(setup), None) => TransExp::Nx(setup),
            (None, None) => TransExp::Nx(Stm::Exp(Box::new(Exp::Const(0)))),
        }
    }

    fn trans_var_decl(&mut self, decl: &VarDecl) -> Stm {
        let access = self
            .current_level
            .frame()
            .borrow_mut()
            .alloc_local(decl.escape.get(), &mut self.temps);
        let entry = IrVarEntry {
            level: self.current_level.clone(),
            access,
        };

        let init = self.trans_expr(&decl.init);
        let init = init.un_ex(&mut self.temps);

        self.var_env.enter(decl.name.clone(), entry.clone());

        let location = self.var_location(&entry);
        move_to(location, init)
    }

    fn trans_function_batch(&mut self, batch: &[&FunctionDecl]) {
        let mut levels = Vec::with_capacity(batch.len());

        for decl in batch {
            let label = self.temps.named_label(&decl.name);

            let formals: Vec<bool> = decl.params.iter().map(|p| p.escape.get()).collect();
            let level = Level::nested(
                self.current_level.clone(),
                label.clone(),
                &formals,
                self.dialect,
                &mut self.temps,
            );

            self.fun_env.enter(
                decl.name.clone(),
                IrFunEntry {
                    level: level.clone(),
                    label,
                },
            );
            levels.push(level);
        }

        for (decl, level) in batch.iter().zip(levels) {
            let saved_level = std::mem::replace(&mut self.current_level, level);
            let saved_breaks = std::mem::take(&mut self.break_labels);
            self.begin_scope();

            for (param, access) in decl
                .params
                .iter()
                .zip(self.current_level.source_formals())
            {
                self.var_env.enter(
                    param.name.clone(),
                    IrVarEntry {
                        level: self.current_level.clone(),
                        access,
                    },
                );
            }

            let body = self.trans_expr(&decl.body);

            let body_stm = if decl.result_type.is_some() {
                let return_value = self.current_level.frame().borrow().return_value();
                let value = body.un_ex(&mut self.temps);
                move_to(Exp::Temp(return_value), value)
            } else {
                body.un_nx(&mut self.temps)
            };

            self.end_scope();
            self.break_labels = saved_breaks;

            let frame = self.current_level.frame().clone();
            self.fragments.push(Fragment::Proc {
                body: body_stm,
                frame,
            });

            self.current_level = saved_level;
        }
    }

    fn trans_seq(&mut self, exprs: &[Expr]) -> TransExp {
        if exprs.is_empty() {
            return TransExp::Nx(Stm::Exp(Box::new(Exp::Const(0))));
        }

        let mut stm: Option<Stm> = None;

        for expr in &exprs[..exprs.len() - 1] {
            let translated = self.trans_expr(expr);
            let translated = translated.un_nx(&mut self.temps);
            stm = seq_opt(stm, Some(translated));
        }

        let last = self.trans_expr(&exprs[exprs.len() - 1]);

        match stm {
            Some(stm) => {
                let value = last.un_ex(&mut self.temps);
                TransExp::Ex(eseq(stm, value))
            }
            None => last,
        }
    }
}

fn access_to_exp(access: Access, fp: Exp) -> Exp {
    match access {
        Access::InFrame(offset) => mem(binop(BinOp::Plus, fp, Exp::Const(offset))),
        Access::InReg(temp) => Exp::Temp(temp),
    }
}

fn relational(op: RelOp, left: Exp, right: Exp) -> TransExp {
    TransExp::Cx(Box::new(move |t, f, _temps| cjump(op, left, right, t, f)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::{lexer::Lexer, parser::Parser, SourceFile},
        semantic::SemanticAnalyzer,
        translate::{escape::find_escapes, x64::X64Dialect},
    };

    fn translate(source: &str) -> Vec<Fragment> {
        let source = SourceFile::from_string(source);
        let tokens = Lexer::tokenize(&source).expect("tokenize");
        let program = Parser::parse_program(&source, &tokens).expect("parse");

        find_escapes(&program);
        let analysis = SemanticAnalyzer::analyze(&source, &program).expect("analyze");

        IrGenerator::translate(&program, &analysis, &X64Dialect)
    }

    fn proc_labels(fragments: &[Fragment]) -> Vec<String> {
        fragments
            .iter()
            .filter_map(|fragment| match fragment {
                Fragment::Proc { frame, .. } => Some(frame.borrow().name().to_string()),
                Fragment::String { .. } => None,
            })
            .collect()
    }

    /// Flattens the Seq spine into a statement list.
    fn linearize(stm: &Stm, out: &mut Vec<Stm>) {
        match stm {
            Stm::Seq(first, second) => {
                linearize(first, out);
                linearize(second, out);
            }
            other => out.push(other.clone()),
        }
    }

    #[test]
    fn a_constant_program_is_one_fragment() {
        let fragments = translate("42");

        assert_eq!(fragments.len(), 1);
        assert_eq!(proc_labels(&fragments), vec!["_main"]);

        let Fragment::Proc { body, .. } = &fragments[0] else {
            panic!("expected a proc fragment");
        };
        assert_eq!(*body, Stm::Exp(Box::new(Exp::Const(42))));
    }

    #[test]
    fn functions_emit_their_own_fragments_before_the_body() {
        let fragments = translate("let var x := 5 function f(): int = x in f() end");

        assert_eq!(proc_labels(&fragments), vec!["f", "_main"]);
    }

    #[test]
    fn string_literals_become_fragments_in_encounter_order() {
        let fragments = translate("(print(\"one\"); print(\"two\"))");

        let strings: Vec<&str> = fragments
            .iter()
            .filter_map(|fragment| match fragment {
                Fragment::String { value, .. } => Some(value.as_str()),
                Fragment::Proc { .. } => None,
            })
            .collect();

        assert_eq!(strings, vec!["one", "two"]);
    }

    #[test]
    fn captured_variable_is_reached_through_the_static_link() {
        let fragments = translate("let var x := 5 function f(): int = x in f() end");

        let Fragment::Proc { body, frame } = &fragments[0] else {
            panic!("expected f's fragment first");
        };
        assert_eq!(frame.borrow().name().to_string(), "f");

        // f returns a value: its body is Move(Temp rv, Mem(Mem(fp + k) + k'))
        // where the inner Mem load follows the static link
        let Stm::Move(destination, source) = body else {
            panic!("expected a move into the return value, got {body:?}");
        };
        assert!(matches!(**destination, Exp::Temp(_)));

        let Exp::Mem(address) = &**source else {
            panic!("expected a frame load, got {source:?}");
        };
        let Exp::BinOp(BinOp::Plus, base, _) = &**address else {
            panic!("expected fp + offset, got {address:?}");
        };
        assert!(
            matches!(**base, Exp::Mem(_)),
            "expected the base to be a static-link load, got {base:?}"
        );
    }

    #[test]
    fn static_link_is_passed_to_nested_calls() {
        let fragments = translate("let function f(): int = 1 in f() end");

        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body last");
        };

        // The call to f carries one argument: the static link
        let Stm::Exp(call) = body else {
            panic!("expected a bare call, got {body:?}");
        };
        let Exp::Call(func, args) = &**call else {
            panic!("expected a call, got {call:?}");
        };
        assert_eq!(**func, Exp::Name(Label::Named("f".to_owned())));
        assert_eq!(args.len(), 1);
        assert!(matches!(args[0], Exp::Temp(_)));
    }

    #[test]
    fn builtin_calls_take_no_static_link() {
        let fragments = translate("printi(7)");

        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body");
        };
        let Stm::Exp(call) = body else {
            panic!("expected a bare call");
        };
        let Exp::Call(_, args) = &**call else {
            panic!("expected a call");
        };
        assert_eq!(args.len(), 1);
        assert_eq!(args[0], Exp::Const(7));
    }

    #[test]
    fn for_loop_uses_the_le_then_lt_split() {
        let fragments = translate("for i := 1 to 10 do ()");

        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body");
        };

        let mut stms = Vec::new();
        linearize(body, &mut stms);

        let relops: Vec<RelOp> = stms
            .iter()
            .filter_map(|stm| match stm {
                Stm::CJump(op, ..) => Some(*op),
                _ => None,
            })
            .collect();

        assert_eq!(relops, vec![RelOp::Le, RelOp::Lt]);
    }

    #[test]
    fn break_jumps_to_the_loop_exit() {
        let fragments = translate("while 1 do break");

        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body");
        };

        let mut stms = Vec::new();
        linearize(body, &mut stms);

        // The loop's done label is the jump target of the break
        let Some(Stm::Label(done)) = stms.last() else {
            panic!("expected the done label last");
        };
        assert!(stms.iter().any(|stm| matches!(
            stm,
            Stm::Jump(_, targets) if targets.first() == Some(done)
        )));
    }

    #[test]
    fn record_creation_allocates_and_fills_fields_in_order() {
        let fragments = translate(
            "let type p = {x: int, y: int} var v := p{x=1, y=2} in v end",
        );

        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body");
        };

        let rendered = format!("{body:?}");
        assert!(rendered.contains("allocRecord"));
        // Field y is stored one word past the record base
        assert!(rendered.contains("Const(8)"));
    }

    /// Collects every `Move` anywhere in the tree, including inside `ESeq`s.
    fn collect_moves(stm: &Stm, out: &mut Vec<(Exp, Exp)>) {
        match stm {
            Stm::Move(dst, src) => {
                out.push(((**dst).clone(), (**src).clone()));
                collect_moves_exp(dst, out);
                collect_moves_exp(src, out);
            }
            Stm::Exp(exp) => collect_moves_exp(exp, out),
            Stm::Jump(exp, _) => collect_moves_exp(exp, out),
            Stm::CJump(_, left, right, _, _) => {
                collect_moves_exp(left, out);
                collect_moves_exp(right, out);
            }
            Stm::Seq(first, second) => {
                collect_moves(first, out);
                collect_moves(second, out);
            }
            Stm::Label(_) => {}
        }
    }

    fn collect_moves_exp(exp: &Exp, out: &mut Vec<(Exp, Exp)>) {
        match exp {
            Exp::Const(_) | Exp::Name(_) | Exp::Temp(_) => {}
            Exp::BinOp(_, left, right) => {
                collect_moves_exp(left, out);
                collect_moves_exp(right, out);
            }
            Exp::Mem(address) => collect_moves_exp(address, out),
            Exp::Call(func, args) => {
                collect_moves_exp(func, out);
                for arg in args {
                    collect_moves_exp(arg, out);
                }
            }
            Exp::ESeq(stm, exp) => {
                collect_moves(stm, out);
                collect_moves_exp(exp, out);
            }
        }
    }

    #[test]
    fn field_assignment_stores_through_the_field_offset() {
        let fragments = translate(
            "let type p = {x: int, y: int} var v := p{x=1, y=2} in v.y := 9 end",
        );

        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body");
        };

        let mut moves = Vec::new();
        collect_moves(body, &mut moves);

        // Find a store whose destination is Mem(base + 8): field y
        let has_field_store = moves.iter().any(|(destination, source)| {
            *source == Exp::Const(9)
                && matches!(
                    destination,
                    Exp::Mem(address) if matches!(
                        &**address,
                        Exp::BinOp(BinOp::Plus, _, offset) if **offset == Exp::Const(8)
                    )
                )
        });
        assert!(has_field_store, "no store to the field offset found");
    }

    #[test]
    fn escaping_local_gets_a_frame_slot() {
        let fragments = translate("let var x := 5 function f(): int = x in f() end");

        // x lives in _main's frame; its initialization stores through fp
        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body");
        };
        let rendered = format!("{body:?}");
        assert!(rendered.contains("Mem"));
    }

    #[test]
    fn non_escaping_local_stays_in_a_register() {
        let fragments = translate("let var x := 5 in x end");

        let Fragment::Proc { body, .. } = fragments.last().unwrap() else {
            panic!("expected the program body");
        };

        // Initialization moves into a temp, not through memory
        let mut stms = Vec::new();
        linearize(
            match body {
                Stm::Exp(exp) => match &**exp {
                    Exp::ESeq(stm, _) => stm,
                    _ => panic!("expected an ESeq body"),
                },
                _ => panic!("expected an expression statement"),
            },
            &mut stms,
        );

        assert!(matches!(
            &stms[0],
            Stm::Move(destination, _) if matches!(**destination, Exp::Temp(_))
        ));
    }

    #[test]
    fn mutually_recursive_functions_resolve_each_other() {
        let fragments = translate(
            "let \
               function even(n: int): int = if n = 0 then 1 else odd(n - 1) \
               function odd(n: int): int = if n = 0 then 0 else even(n - 1) \
             in even(4) end",
        );

        assert_eq!(proc_labels(&fragments), vec!["even", "odd", "_main"]);

        // even's body calls odd by name
        let Fragment::Proc { body, .. } = &fragments[0] else {
            panic!("expected even's fragment");
        };
        assert!(format!("{body:?}").contains("Named(\"odd\")"));
    }
}
