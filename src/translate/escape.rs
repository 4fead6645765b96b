//! Escape analysis. A declared name escapes when it is referenced from a
//! function nested strictly deeper than its declaration; such names must live
//! in the frame rather than a register so the static-link chain can reach
//! them. One mutating pass over the AST sets the `escape` cells; every later
//! stage only reads them.

use std::cell::Cell;

use hashbrown::HashMap;

use crate::frontend::ast::{Decl, DeclKind, Expr, ExprKind, Var};

#[derive(Debug, Clone, Copy)]
struct EscapeEntry<'ast> {
    depth: u32,
    escape: &'ast Cell<bool>,
}

#[derive(Debug, Default)]
pub struct EscapeAnalyzer<'ast> {
    scopes: Vec<HashMap<&'ast str, EscapeEntry<'ast>>>,
    depth: u32,
}

/// Fills in the escape cells of every variable declaration, parameter, and
/// loop index in the program.
pub fn find_escapes(program: &Expr) {
    let mut analyzer = EscapeAnalyzer::default();

    analyzer.begin_scope();
    analyzer.visit_expr(program);
    analyzer.end_scope();
}

impl<'ast> EscapeAnalyzer<'ast> {
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &'ast str, escape: &'ast Cell<bool>) {
        let entry = EscapeEntry {
            depth: self.depth,
            escape,
        };

        self.scopes
            .last_mut()
            .expect("escape analyzer always has an open scope")
            .insert(name, entry);
    }

    /// A use of `name`: if the innermost declaration is at a shallower
    /// function-nesting depth than the use, the name escapes.
    fn mark_use(&mut self, name: &str) {
        for scope in self.scopes.iter().rev() {
            if let Some(entry) = scope.get(name) {
                if self.depth > entry.depth {
                    entry.escape.set(true);
                }
                return;
            }
        }
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        match &expr.kind {
            ExprKind::Nil | ExprKind::Int(_) | ExprKind::String(_) | ExprKind::Break => {}
            ExprKind::Var(var) => self.visit_var(var),
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.visit_expr(arg);
                }
            }
            ExprKind::Op { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            ExprKind::Record { fields, .. } => {
                for (_, value) in fields {
                    self.visit_expr(value);
                }
            }
            ExprKind::Array { size, init, .. } => {
                self.visit_expr(size);
                self.visit_expr(init);
            }
            ExprKind::Assign { target, value } => {
                // A name that is only written still needs a frame slot when
                // the write happens in a nested function
                self.visit_expr(target);
                self.visit_expr(value);
            }
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => {
                self.visit_expr(test);
                self.visit_expr(then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit_expr(else_branch);
                }
            }
            ExprKind::While { test, body } => {
                self.visit_expr(test);
                self.visit_expr(body);
            }
            ExprKind::For {
                var,
                escape,
                lo,
                hi,
                body,
            } => {
                self.begin_scope();
                self.declare(var, escape);
                self.visit_expr(lo);
                self.visit_expr(hi);
                self.visit_expr(body);
                self.end_scope();
            }
            ExprKind::Let { decls, body } => {
                self.begin_scope();
                for decl in decls {
                    self.visit_decl(decl);
                }
                for expr in body {
                    self.visit_expr(expr);
                }
                self.end_scope();
            }
            ExprKind::Seq(exprs) => {
                for expr in exprs {
                    self.visit_expr(expr);
                }
            }
        }
    }

    fn visit_var(&mut self, var: &'ast Var) {
        match var {
            Var::Simple(name) => self.mark_use(name),
            // The base names the thing that escapes; selecting a field or
            // element does not itself capture anything
            Var::Field { base, .. } => self.visit_expr(base),
            Var::Subscript { base, index } => {
                self.visit_expr(base);
                self.visit_expr(index);
            }
        }
    }

    fn visit_decl(&mut self, decl: &'ast Decl) {
        match &decl.kind {
            DeclKind::Type(_) => {}
            DeclKind::Var(var_decl) => {
                self.visit_expr(&var_decl.init);
                self.declare(&var_decl.name, &var_decl.escape);
            }
            DeclKind::Function(function) => {
                self.depth += 1;
                self.begin_scope();

                for param in &function.params {
                    self.declare(&param.name, &param.escape);
                }
                self.visit_expr(&function.body);

                self.end_scope();
                self.depth -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{lexer::Lexer, parser::Parser, SourceFile};

    fn analyzed(source: &str) -> Expr {
        let source = SourceFile::from_string(source);
        let tokens = Lexer::tokenize(&source).expect("tokenize");
        let program = Parser::parse_program(&source, &tokens).expect("parse");

        find_escapes(&program);
        program
    }

    fn let_var_escape(program: &Expr, index: usize) -> bool {
        let ExprKind::Let { decls, .. } = &program.kind else {
            panic!("expected let at the top");
        };
        let DeclKind::Var(var_decl) = &decls[index].kind else {
            panic!("expected var declaration at index {index}");
        };

        var_decl.escape.get()
    }

    #[test]
    fn local_use_does_not_escape() {
        let program = analyzed("let var x := 5 in x + x end");
        assert!(!let_var_escape(&program, 0));
    }

    #[test]
    fn use_from_a_nested_function_escapes() {
        let program = analyzed("let var x := 5 function f(): int = x in f() end");
        assert!(let_var_escape(&program, 0));
    }

    #[test]
    fn use_from_a_doubly_nested_function_escapes() {
        let program = analyzed(
            "let var x := 5 \
                 function f(): int = \
                   let function g(): int = x in g() end \
             in f() end",
        );
        assert!(let_var_escape(&program, 0));
    }

    #[test]
    fn write_only_use_still_escapes() {
        let program = analyzed("let var x := 5 function f() = (x := 1) in f() end");
        assert!(let_var_escape(&program, 0));
    }

    #[test]
    fn parameter_escapes_when_captured() {
        let program = analyzed(
            "let function f(a: int): int = \
                 let function g(): int = a in g() end \
             in f(1) end",
        );

        let ExprKind::Let { decls, .. } = &program.kind else {
            panic!("expected let");
        };
        let DeclKind::Function(f) = &decls[0].kind else {
            panic!("expected function declaration");
        };
        assert!(f.params[0].escape.get());
    }

    #[test]
    fn parameter_used_locally_does_not_escape() {
        let program = analyzed("let function f(a: int): int = a + 1 in f(1) end");

        let ExprKind::Let { decls, .. } = &program.kind else {
            panic!("expected let");
        };
        let DeclKind::Function(f) = &decls[0].kind else {
            panic!("expected function declaration");
        };
        assert!(!f.params[0].escape.get());
    }

    #[test]
    fn loop_index_escapes_when_captured() {
        let program = analyzed(
            "for i := 1 to 10 do \
               let function f(): int = i in (f(); ()) end",
        );

        let ExprKind::For { escape, .. } = &program.kind else {
            panic!("expected for loop");
        };
        assert!(escape.get());
    }

    #[test]
    fn shadowing_binds_the_inner_declaration() {
        // The inner x is the one referenced inside f; the outer x never
        // escapes
        let program = analyzed(
            "let var x := 1 in \
               let var x := 2 function f(): int = x in f() end \
             end",
        );

        let ExprKind::Let { decls, body } = &program.kind else {
            panic!("expected outer let");
        };
        let DeclKind::Var(outer) = &decls[0].kind else {
            panic!("expected outer var");
        };
        assert!(!outer.escape.get());

        let ExprKind::Let { decls, .. } = &body[0].kind else {
            panic!("expected inner let");
        };
        let DeclKind::Var(inner) = &decls[0].kind else {
            panic!("expected inner var");
        };
        assert!(inner.escape.get());
    }
}
