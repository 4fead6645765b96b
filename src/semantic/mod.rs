//! Semantic analysis: name binding over the two namespaces, nominal type
//! checking, and declaration-batch processing for mutual recursion. The
//! analyzer also records the declared-order index of every record-field
//! access in a side table the IR translator consumes for address arithmetic.

use std::rc::Rc;

use hashbrown::HashMap;

use self::{
    environment::{Environment, ValueEntry},
    types::{equals, is_assignable, NameAlias, RecordField, Type, TypeContext},
};
use crate::{
    diagnostics::SemanticError,
    frontend::{
        ast::{
            Decl, DeclKind, Expr, ExprKind, FunctionDecl, NodeId, OperatorClass, TypeAst,
            TypeAstKind, TypeDecl, Var, VarDecl,
        },
        lexer::Span,
        SourceFile,
    },
};

pub mod environment;
pub mod types;

/// The result of a successful analysis: the type of the whole program plus
/// the field-index side table keyed by field-access expression id.
#[derive(Debug)]
pub struct Analysis {
    pub program_type: Type,
    pub field_indices: HashMap<NodeId, usize>,
}

#[derive(Debug)]
pub struct SemanticAnalyzer<'source> {
    source: &'source SourceFile,
    env: Environment,
    type_ctx: TypeContext,
    field_indices: HashMap<NodeId, usize>,
}

impl<'source> SemanticAnalyzer<'source> {
    pub fn analyze(source: &'source SourceFile, program: &Expr) -> Result<Analysis, SemanticError> {
        let mut analyzer = Self {
            source,
            env: Environment::new(),
            type_ctx: TypeContext::new(),
            field_indices: HashMap::new(),
        };

        let program_type = analyzer.check_expr(program)?;

        Ok(Analysis {
            program_type,
            field_indices: analyzer.field_indices,
        })
    }

    fn error(&self, span: Span, message: impl Into<String>) -> SemanticError {
        SemanticError::at(
            self.source.line_number_for_position(span.start),
            self.source.column_for_position(span.start),
            message,
        )
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<Type, SemanticError> {
        match &expr.kind {
            ExprKind::Nil => Ok(Type::Nil),
            ExprKind::Int(_) => Ok(Type::Int),
            ExprKind::String(_) => Ok(Type::String),
            ExprKind::Var(var) => self.check_var(expr, var),
            ExprKind::Call { func, args } => self.check_call(expr.span, func, args),
            ExprKind::Op { op, left, right } => {
                let left_ty = self.check_expr(left)?;
                let right_ty = self.check_expr(right)?;

                match op.class() {
                    OperatorClass::Arithmetic => {
                        if !left_ty.is_int() {
                            return Err(self.error(
                                left.span,
                                format!(
                                    "left operand of an arithmetic operator must be int, found {left_ty}"
                                ),
                            ));
                        }
                        if !right_ty.is_int() {
                            return Err(self.error(
                                right.span,
                                format!(
                                    "right operand of an arithmetic operator must be int, found {right_ty}"
                                ),
                            ));
                        }
                        Ok(Type::Int)
                    }
                    OperatorClass::Comparison => {
                        if !equals(&left_ty, &right_ty) {
                            return Err(self.error(
                                expr.span,
                                format!(
                                    "comparison operands must have the same type, found {left_ty} and {right_ty}"
                                ),
                            ));
                        }
                        Ok(Type::Int)
                    }
                    OperatorClass::Logical => {
                        if !left_ty.is_int() {
                            return Err(self.error(
                                left.span,
                                format!(
                                    "left operand of a logical operator must be int, found {left_ty}"
                                ),
                            ));
                        }
                        if !right_ty.is_int() {
                            return Err(self.error(
                                right.span,
                                format!(
                                    "right operand of a logical operator must be int, found {right_ty}"
                                ),
                            ));
                        }
                        Ok(Type::Int)
                    }
                }
            }
            ExprKind::Record { type_name, fields } => {
                self.check_record_creation(expr.span, type_name, fields)
            }
            ExprKind::Array {
                type_name,
                size,
                init,
            } => {
                let ty = self
                    .env
                    .lookup_type(type_name)
                    .cloned()
                    .ok_or_else(|| self.error(expr.span, format!("undefined type: {type_name}")))?;

                let Type::Array(array) = ty.actual() else {
                    return Err(self.error(
                        expr.span,
                        format!("type `{type_name}` is not an array type"),
                    ));
                };

                let size_ty = self.check_expr(size)?;
                if !size_ty.is_int() {
                    return Err(
                        self.error(size.span, format!("array size must be int, found {size_ty}"))
                    );
                }

                let init_ty = self.check_expr(init)?;
                if !is_assignable(&array.element, &init_ty) {
                    return Err(self.error(
                        init.span,
                        format!(
                            "array initializer must have element type {}, found {init_ty}",
                            array.element
                        ),
                    ));
                }

                Ok(ty)
            }
            ExprKind::Assign { target, value } => {
                // A loop index is read-only for its whole body
                if let ExprKind::Var(Var::Simple(name)) = &target.kind {
                    if let Some(ValueEntry::Var {
                        read_only: true, ..
                    }) = self.env.lookup_value(name)
                    {
                        return Err(self.error(
                            target.span,
                            format!("cannot assign to loop variable `{name}`"),
                        ));
                    }
                }

                let target_ty = self.check_expr(target)?;
                let value_ty = self.check_expr(value)?;

                if !is_assignable(&target_ty, &value_ty) {
                    return Err(self.error(
                        expr.span,
                        format!("cannot assign {value_ty} to a slot of type {target_ty}"),
                    ));
                }

                Ok(Type::Unit)
            }
            ExprKind::If {
                test,
                then_branch,
                else_branch,
            } => {
                let test_ty = self.check_expr(test)?;
                if !test_ty.is_int() {
                    return Err(self.error(
                        test.span,
                        format!("if condition must be int, found {test_ty}"),
                    ));
                }

                let then_ty = self.check_expr(then_branch)?;

                match else_branch {
                    Some(else_branch) => {
                        let else_ty = self.check_expr(else_branch)?;
                        if !equals(&then_ty, &else_ty) {
                            return Err(self.error(
                                expr.span,
                                format!(
                                    "if branches must have the same type, found {then_ty} and {else_ty}"
                                ),
                            ));
                        }

                        // A nil arm takes the record type of the other arm
                        if then_ty.is_nil() {
                            Ok(else_ty)
                        } else {
                            Ok(then_ty)
                        }
                    }
                    None => {
                        if !then_ty.is_unit() {
                            return Err(self.error(
                                then_branch.span,
                                format!(
                                    "if-then without else must produce no value, found {then_ty}"
                                ),
                            ));
                        }
                        Ok(Type::Unit)
                    }
                }
            }
            ExprKind::While { test, body } => {
                let test_ty = self.check_expr(test)?;
                if !test_ty.is_int() {
                    return Err(self.error(
                        test.span,
                        format!("while condition must be int, found {test_ty}"),
                    ));
                }

                self.env.enter_loop();
                let body_result = self.check_expr(body);
                self.env.exit_loop();

                let body_ty = body_result?;
                if !body_ty.is_unit() {
                    return Err(self.error(
                        body.span,
                        format!("while body must produce no value, found {body_ty}"),
                    ));
                }

                Ok(Type::Unit)
            }
            ExprKind::For {
                var, lo, hi, body, ..
            } => {
                let lo_ty = self.check_expr(lo)?;
                if !lo_ty.is_int() {
                    return Err(self.error(
                        lo.span,
                        format!("for loop lower bound must be int, found {lo_ty}"),
                    ));
                }

                let hi_ty = self.check_expr(hi)?;
                if !hi_ty.is_int() {
                    return Err(self.error(
                        hi.span,
                        format!("for loop upper bound must be int, found {hi_ty}"),
                    ));
                }

                self.env.begin_scope();
                self.env.enter_var(var.clone(), Type::Int, true);
                self.env.enter_loop();
                let body_result = self.check_expr(body);
                self.env.exit_loop();
                self.env.end_scope();

                body_result?;
                Ok(Type::Unit)
            }
            ExprKind::Break => {
                if !self.env.in_loop() {
                    return Err(self.error(expr.span, "break is only allowed inside a loop"));
                }
                Ok(Type::Unit)
            }
            ExprKind::Let { decls, body } => {
                self.env.begin_scope();
                let result = self.check_let(decls, body);
                self.env.end_scope();

                result
            }
            ExprKind::Seq(exprs) => {
                let mut last = Type::Unit;
                for expr in exprs {
                    last = self.check_expr(expr)?;
                }
                Ok(last)
            }
        }
    }

    fn check_var(&mut self, expr: &Expr, var: &Var) -> Result<Type, SemanticError> {
        match var {
            Var::Simple(name) => match self.env.lookup_value(name) {
                Some(ValueEntry::Var { ty, .. }) => Ok(ty.clone()),
                Some(ValueEntry::Fun { .. }) => Err(self.error(
                    expr.span,
                    format!("`{name}` is a function, not a variable"),
                )),
                None => Err(self.error(expr.span, format!("undefined variable: {name}"))),
            },
            Var::Field { base, field } => {
                let base_ty = self.check_expr(base)?;

                let Type::Record(record) = base_ty.actual() else {
                    return Err(self.error(
                        expr.span,
                        format!("field access on non-record type {base_ty}"),
                    ));
                };

                let Some(index) = record.field_index(field) else {
                    return Err(self.error(
                        expr.span,
                        format!("record {base_ty} has no field named `{field}`"),
                    ));
                };

                // The translator turns this access into `base + index * word`
                self.field_indices.insert(expr.id, index);

                Ok(record.fields[index].ty.clone())
            }
            Var::Subscript { base, index } => {
                let base_ty = self.check_expr(base)?;

                let Type::Array(array) = base_ty.actual() else {
                    return Err(
                        self.error(expr.span, format!("subscript on non-array type {base_ty}"))
                    );
                };

                let index_ty = self.check_expr(index)?;
                if !index_ty.is_int() {
                    return Err(self.error(
                        index.span,
                        format!("array index must be int, found {index_ty}"),
                    ));
                }

                Ok(array.element.clone())
            }
        }
    }

    fn check_call(
        &mut self,
        span: Span,
        func: &str,
        args: &[Expr],
    ) -> Result<Type, SemanticError> {
        let (params, result) = match self.env.lookup_value(func) {
            Some(ValueEntry::Fun { params, result }) => (params.clone(), result.clone()),
            Some(ValueEntry::Var { .. }) => {
                return Err(self.error(span, format!("`{func}` is a variable, not a function")));
            }
            None => {
                return Err(self.error(span, format!("undefined function: {func}")));
            }
        };

        if args.len() != params.len() {
            return Err(self.error(
                span,
                format!(
                    "function `{func}` expects {} argument(s), got {}",
                    params.len(),
                    args.len()
                ),
            ));
        }

        for (arg, param_ty) in args.iter().zip(&params) {
            let arg_ty = self.check_expr(arg)?;
            if !is_assignable(param_ty, &arg_ty) {
                return Err(self.error(
                    arg.span,
                    format!(
                        "argument type mismatch in call to `{func}`: expected {param_ty}, found {arg_ty}"
                    ),
                ));
            }
        }

        Ok(result)
    }

    fn check_record_creation(
        &mut self,
        span: Span,
        type_name: &str,
        fields: &[(String, Expr)],
    ) -> Result<Type, SemanticError> {
        let ty = self
            .env
            .lookup_type(type_name)
            .cloned()
            .ok_or_else(|| self.error(span, format!("undefined type: {type_name}")))?;

        let Type::Record(record) = ty.actual() else {
            return Err(self.error(span, format!("type `{type_name}` is not a record type")));
        };

        if fields.len() != record.fields.len() {
            return Err(self.error(
                span,
                format!(
                    "record `{type_name}` has {} field(s), got {}",
                    record.fields.len(),
                    fields.len()
                ),
            ));
        }

        // Fields must appear in declaration order; the translator relies on
        // the positions matching the record layout
        for ((name, value), declared) in fields.iter().zip(&record.fields) {
            if *name != declared.name {
                return Err(self.error(
                    value.span,
                    format!(
                        "field `{name}` is missing from record `{type_name}` or out of order (expected `{}`)",
                        declared.name
                    ),
                ));
            }

            let value_ty = self.check_expr(value)?;
            if !is_assignable(&declared.ty, &value_ty) {
                return Err(self.error(
                    value.span,
                    format!(
                        "field `{name}` of record `{type_name}` has type {}, found {value_ty}",
                        declared.ty
                    ),
                ));
            }
        }

        Ok(ty)
    }

    fn check_let(&mut self, decls: &[Decl], body: &[Expr]) -> Result<Type, SemanticError> {
        // Declarations are processed in maximal consecutive runs of the same
        // kind; only the members of one run may be mutually recursive
        let mut i = 0;
        while i < decls.len() {
            match &decls[i].kind {
                DeclKind::Type(_) => {
                    let start = i;
                    while i < decls.len() && matches!(decls[i].kind, DeclKind::Type(_)) {
                        i += 1;
                    }

                    let batch: Vec<(&TypeDecl, Span)> = decls[start..i]
                        .iter()
                        .map(|d| match &d.kind {
                            DeclKind::Type(t) => (t, d.span),
                            _ => unreachable!("run contains only type declarations"),
                        })
                        .collect();

                    self.process_type_batch(&batch)?;
                }
                DeclKind::Function(_) => {
                    let start = i;
                    while i < decls.len() && matches!(decls[i].kind, DeclKind::Function(_)) {
                        i += 1;
                    }

                    let batch: Vec<(&FunctionDecl, Span)> = decls[start..i]
                        .iter()
                        .map(|d| match &d.kind {
                            DeclKind::Function(f) => (f, d.span),
                            _ => unreachable!("run contains only function declarations"),
                        })
                        .collect();

                    self.process_function_batch(&batch)?;
                }
                DeclKind::Var(var_decl) => {
                    self.process_var_decl(var_decl, decls[i].span)?;
                    i += 1;
                }
            }
        }

        let mut last = Type::Unit;
        for expr in body {
            last = self.check_expr(expr)?;
        }

        Ok(last)
    }

    /// Type batches are processed in three phases so the members may refer to
    /// each other: enter unbound aliases, bind each alias to its translated
    /// type, then reject alias-only cycles.
    fn process_type_batch(&mut self, batch: &[(&TypeDecl, Span)]) -> Result<(), SemanticError> {
        let mut aliases = Vec::with_capacity(batch.len());

        for (decl, span) in batch {
            if aliases
                .iter()
                .any(|(name, _)| *name == decl.name.as_str())
            {
                return Err(self.error(
                    *span,
                    format!(
                        "type `{}` is declared more than once in a group of consecutive type declarations",
                        decl.name
                    ),
                ));
            }

            let alias = self.type_ctx.new_alias(&decl.name);
            self.env
                .enter_type(&decl.name, Type::Name(alias.clone()));
            aliases.push((decl.name.as_str(), alias));
        }

        for ((decl, span), (_, alias)) in batch.iter().zip(&aliases) {
            let ty = self.resolve_type_ast(&decl.ty, *span)?;
            alias.bind(ty);
        }

        // Cycle check: follow bindings through aliases only. A record or
        // array layer breaks the chain, which is what makes recursive records
        // legal.
        let mut checked = vec![false; aliases.len()];
        for (i, ((_, span), (_, alias))) in batch.iter().zip(&aliases).enumerate() {
            if checked[i] {
                continue;
            }
            checked[i] = true;

            let mut chain: Vec<Rc<NameAlias>> = vec![alias.clone()];
            let mut current = alias.clone();

            loop {
                let Some(Type::Name(next)) = current.binding() else {
                    break;
                };

                if chain.iter().any(|seen| Rc::ptr_eq(seen, &next)) {
                    let names = chain
                        .iter()
                        .map(|a| format!("`{}`", a.name))
                        .chain(std::iter::once(format!("`{}`", next.name)))
                        .collect::<Vec<_>>()
                        .join(" -> ");

                    return Err(
                        self.error(*span, format!("type declaration cycle: {names}"))
                    );
                }

                if let Some(position) = aliases
                    .iter()
                    .position(|(_, a)| Rc::ptr_eq(a, &next))
                {
                    checked[position] = true;
                }

                chain.push(next.clone());
                current = next;
            }
        }

        Ok(())
    }

    /// Function batches are processed in two phases: headers first so bodies
    /// may call any member of the batch.
    fn process_function_batch(
        &mut self,
        batch: &[(&FunctionDecl, Span)],
    ) -> Result<(), SemanticError> {
        let mut signatures = Vec::with_capacity(batch.len());

        for (index, (decl, span)) in batch.iter().enumerate() {
            if batch[..index].iter().any(|(d, _)| d.name == decl.name) {
                return Err(self.error(
                    *span,
                    format!(
                        "function `{}` is declared more than once in a group of consecutive function declarations",
                        decl.name
                    ),
                ));
            }

            let mut params = Vec::with_capacity(decl.params.len());
            for param in &decl.params {
                let ty = self
                    .env
                    .lookup_type(&param.type_name)
                    .cloned()
                    .ok_or_else(|| {
                        self.error(
                            param.span,
                            format!("undefined parameter type: {}", param.type_name),
                        )
                    })?;
                params.push(ty);
            }

            let result = match &decl.result_type {
                Some(name) => self
                    .env
                    .lookup_type(name)
                    .cloned()
                    .ok_or_else(|| self.error(*span, format!("undefined return type: {name}")))?,
                None => Type::Unit,
            };

            self.env
                .enter_fun(&decl.name, params.clone(), result.clone());
            signatures.push((params, result));
        }

        for ((decl, span), (params, result)) in batch.iter().zip(&signatures) {
            self.env.begin_scope();

            for (param, ty) in decl.params.iter().zip(params) {
                self.env.enter_var(param.name.clone(), ty.clone(), false);
            }

            let suspended = self.env.suspend_loops();
            let body_result = self.check_expr(&decl.body);
            self.env.restore_loops(suspended);
            self.env.end_scope();

            let body_ty = body_result?;

            // A procedure discards its body's value; a function's body must
            // produce the declared result type
            if !result.is_unit() && !equals(result, &body_ty) {
                return Err(self.error(
                    *span,
                    format!(
                        "body of function `{}` has type {body_ty}, expected {result}",
                        decl.name
                    ),
                ));
            }
        }

        Ok(())
    }

    fn process_var_decl(&mut self, decl: &VarDecl, span: Span) -> Result<(), SemanticError> {
        let init_ty = self.check_expr(&decl.init)?;

        let var_ty = match &decl.type_name {
            Some(name) => {
                let declared = self
                    .env
                    .lookup_type(name)
                    .cloned()
                    .ok_or_else(|| {
                        self.error(span, format!("undefined type in variable declaration: {name}"))
                    })?;

                if !is_assignable(&declared, &init_ty) {
                    return Err(self.error(
                        span,
                        format!(
                            "initializer of `{}` has type {init_ty}, expected {declared}",
                            decl.name
                        ),
                    ));
                }

                declared
            }
            None => {
                if init_ty.is_nil() {
                    return Err(self.error(
                        span,
                        format!(
                            "cannot infer a type for `{}` from nil; declare a record type",
                            decl.name
                        ),
                    ));
                }

                init_ty
            }
        };

        self.env.enter_var(decl.name.clone(), var_ty, false);
        Ok(())
    }

    fn resolve_type_ast(&mut self, ty: &TypeAst, span: Span) -> Result<Type, SemanticError> {
        match &ty.kind {
            TypeAstKind::Name(name) => self
                .env
                .lookup_type(name)
                .cloned()
                .ok_or_else(|| self.error(ty.span, format!("undefined type: {name}"))),
            TypeAstKind::Record(fields) => {
                let mut record_fields = Vec::with_capacity(fields.len());

                for field in fields {
                    let field_ty = self
                        .env
                        .lookup_type(&field.type_name)
                        .cloned()
                        .ok_or_else(|| {
                            self.error(
                                ty.span,
                                format!("undefined field type in record: {}", field.type_name),
                            )
                        })?;

                    record_fields.push(RecordField {
                        name: field.name.clone(),
                        ty: field_ty,
                    });
                }

                Ok(self.type_ctx.new_record(record_fields))
            }
            TypeAstKind::Array(element) => {
                let element_ty = self
                    .env
                    .lookup_type(element)
                    .cloned()
                    .ok_or_else(|| {
                        self.error(span, format!("undefined array element type: {element}"))
                    })?;

                Ok(self.type_ctx.new_array(element_ty))
            }
        }
    }
}
