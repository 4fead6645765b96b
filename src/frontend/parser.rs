use std::cell::Cell;

use super::{
    SourceFile,
    ast::{
        Decl, DeclKind, Expr, ExprKind, FieldDef, FunctionDecl, NodeId, OperatorKind, Param,
        TypeAst, TypeAstKind, TypeDecl, Var, VarDecl,
    },
    lexer::{Keyword, Span, Token, TokenKind},
};
use crate::diagnostics::SyntaxError;

#[derive(Debug)]
pub struct Parser<'source> {
    source: &'source SourceFile,
    tokens: &'source [Token],
    position: usize,
    next_node_id: u32,
}

impl<'source> Parser<'source> {
    /// Parses a whole program (a single expression). Every token must be
    /// consumed.
    pub fn parse_program(
        source: &'source SourceFile,
        tokens: &'source [Token],
    ) -> Result<Expr, SyntaxError> {
        let mut parser = Self {
            source,
            tokens,
            position: 0,
            next_node_id: 0,
        };

        let program = parser.parse_expr()?;

        if let Some(token) = parser.peek() {
            return Err(parser.error_at_span(
                token.span,
                format!(
                    "expected end of input but found `{}`",
                    source.value_of_span(token.span)
                ),
            ));
        }

        Ok(program)
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn error_at_span(&self, span: Span, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.source.line_number_for_position(span.start),
            column: self.source.column_for_position(span.start),
            message: message.into(),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        let span = self
            .peek()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::new(self.source.contents.len(), self.source.contents.len()));

        self.error_at_span(span, message)
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(TokenKind::Keyword(keyword))
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Consumes the next token if it has the given kind.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: TokenKind, expecting: &str) -> Result<Token, SyntaxError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(self.error_at_span(
                token.span,
                format!(
                    "expected {expecting} but found `{}`",
                    self.source.value_of_span(token.span)
                ),
            )),
            None => Err(self.error_here(format!(
                "expected {expecting} but reached end of input"
            ))),
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, expecting: &str) -> Result<Token, SyntaxError> {
        self.expect(TokenKind::Keyword(keyword), expecting)
    }

    fn expect_identifier(&mut self, expecting: &str) -> Result<(String, Span), SyntaxError> {
        let token = self.expect(TokenKind::Identifier, expecting)?;
        Ok((self.source.value_of_span(token.span).to_owned(), token.span))
    }

    /// Span of the most recently consumed token.
    fn previous_span(&self) -> Span {
        self.tokens[self.position - 1].span
    }

    fn make_expr(&mut self, span: Span, kind: ExprKind) -> Expr {
        Expr {
            id: self.create_node_id(),
            span,
            kind,
        }
    }

    /* Expressions, lowest precedence first: `|` < `&` < comparison < term
     * < factor < unary minus */

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and_expr()?;

        while self.eat(TokenKind::Pipe) {
            let right = self.parse_and_expr()?;
            let span = left.span.to(right.span);
            left = self.make_expr(
                span,
                ExprKind::Op {
                    op: OperatorKind::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_comparison_expr()?;

        while self.eat(TokenKind::Ampersand) {
            let right = self.parse_comparison_expr()?;
            let span = left.span.to(right.span);
            left = self.make_expr(
                span,
                ExprKind::Op {
                    op: OperatorKind::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Ok(left)
    }

    fn parse_comparison_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_term_expr()?;

        while self.peek().is_some_and(|t| t.kind.is_comparison_operator()) {
            let op = token_to_operator(self.advance().unwrap().kind);
            let right = self.parse_term_expr()?;
            let span = left.span.to(right.span);
            left = self.make_expr(
                span,
                ExprKind::Op {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Ok(left)
    }

    fn parse_term_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_factor_expr()?;

        while self.peek().is_some_and(|t| t.kind.is_term_operator()) {
            let op = token_to_operator(self.advance().unwrap().kind);
            let right = self.parse_factor_expr()?;
            let span = left.span.to(right.span);
            left = self.make_expr(
                span,
                ExprKind::Op {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Ok(left)
    }

    fn parse_factor_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary_expr()?;

        while self.peek().is_some_and(|t| t.kind.is_factor_operator()) {
            let op = token_to_operator(self.advance().unwrap().kind);
            let right = self.parse_unary_expr()?;
            let span = left.span.to(right.span);
            left = self.make_expr(
                span,
                ExprKind::Op {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Ok(left)
    }

    /// Unary minus is desugared to `0 - e`.
    fn parse_unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(TokenKind::Minus) {
            let minus_span = self.previous_span();
            let operand = self.parse_unary_expr()?;
            let span = minus_span.to(operand.span);

            let zero = self.make_expr(minus_span, ExprKind::Int(0));
            return Ok(self.make_expr(
                span,
                ExprKind::Op {
                    op: OperatorKind::Subtract,
                    left: Box::new(zero),
                    right: Box::new(operand),
                },
            ));
        }

        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, SyntaxError> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("expected expression but reached end of input"));
        };

        match token.kind {
            TokenKind::Keyword(Keyword::Nil) => {
                self.advance();
                Ok(self.make_expr(token.span, ExprKind::Nil))
            }
            TokenKind::IntegerLiteral => {
                self.advance();
                let text = self.source.value_of_span(token.span);
                let value: i64 = text.parse().map_err(|_| {
                    self.error_at_span(token.span, format!("integer literal out of range: {text}"))
                })?;
                Ok(self.make_expr(token.span, ExprKind::Int(value)))
            }
            TokenKind::StringLiteral => {
                self.advance();
                let value = decode_string_literal(self.source.value_of_span(token.span));
                Ok(self.make_expr(token.span, ExprKind::String(value)))
            }
            TokenKind::Identifier => self.parse_identifier_expr(),
            TokenKind::OpenParen => self.parse_seq_expr(),
            TokenKind::Keyword(Keyword::If) => self.parse_if_expr(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_expr(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_expr(),
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                Ok(self.make_expr(token.span, ExprKind::Break))
            }
            TokenKind::Keyword(Keyword::Let) => self.parse_let_expr(),
            _ => Err(self.error_at_span(
                token.span,
                format!(
                    "expected expression but found `{}`",
                    self.source.value_of_span(token.span)
                ),
            )),
        }
    }

    /// An expression starting with an identifier: a call, a record
    /// constructor, an array constructor, or an l-value (possibly assigned
    /// to). `id [ e ] of e` vs. the subscript l-value `id [ e ]` needs
    /// bounded backtracking.
    fn parse_identifier_expr(&mut self) -> Result<Expr, SyntaxError> {
        let (name, name_span) = self.expect_identifier("identifier")?;

        if self.check(TokenKind::OpenParen) {
            return self.parse_call_expr(name, name_span);
        }

        if self.check(TokenKind::OpenBrace) {
            return self.parse_record_expr(name, name_span);
        }

        if self.check(TokenKind::OpenBracket) {
            let saved_position = self.position;
            let saved_node_id = self.next_node_id;

            self.advance();
            let size = self.parse_expr();

            if let Ok(size) = size {
                if self.eat(TokenKind::CloseBracket) && self.eat_keyword(Keyword::Of) {
                    let init = self.parse_expr()?;
                    let span = name_span.to(init.span);
                    return Ok(self.make_expr(
                        span,
                        ExprKind::Array {
                            type_name: name,
                            size: Box::new(size),
                            init: Box::new(init),
                        },
                    ));
                }
            }

            // Not an array constructor; re-parse as a subscript l-value
            self.position = saved_position;
            self.next_node_id = saved_node_id;
        }

        self.parse_lvalue_expr(name, name_span)
    }

    /// Chained `.field` / `[index]` accesses rooted at a simple identifier,
    /// optionally followed by `:=`.
    fn parse_lvalue_expr(&mut self, name: String, name_span: Span) -> Result<Expr, SyntaxError> {
        let mut lvalue = self.make_expr(name_span, ExprKind::Var(Var::Simple(name)));

        loop {
            if self.eat(TokenKind::Dot) {
                let (field, field_span) = self.expect_identifier("field name after `.`")?;
                let span = lvalue.span.to(field_span);
                lvalue = self.make_expr(
                    span,
                    ExprKind::Var(Var::Field {
                        base: Box::new(lvalue),
                        field,
                    }),
                );
            } else if self.eat(TokenKind::OpenBracket) {
                let index = self.parse_expr()?;
                self.expect(TokenKind::CloseBracket, "`]` after subscript index")?;
                let span = lvalue.span.to(self.previous_span());
                lvalue = self.make_expr(
                    span,
                    ExprKind::Var(Var::Subscript {
                        base: Box::new(lvalue),
                        index: Box::new(index),
                    }),
                );
            } else {
                break;
            }
        }

        if self.eat(TokenKind::Assign) {
            let value = self.parse_expr()?;
            let span = lvalue.span.to(value.span);
            return Ok(self.make_expr(
                span,
                ExprKind::Assign {
                    target: Box::new(lvalue),
                    value: Box::new(value),
                },
            ));
        }

        Ok(lvalue)
    }

    fn parse_call_expr(&mut self, func: String, name_span: Span) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::OpenParen, "`(` after function name")?;

        let mut args = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::CloseParen, "`)` after call arguments")?;
        let span = name_span.to(self.previous_span());

        Ok(self.make_expr(span, ExprKind::Call { func, args }))
    }

    fn parse_record_expr(&mut self, type_name: String, name_span: Span) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::OpenBrace, "`{` in record constructor")?;

        let mut fields = Vec::new();
        if !self.check(TokenKind::CloseBrace) {
            loop {
                let (field, _) = self.expect_identifier("field name")?;
                self.expect(TokenKind::Equals, "`=` after field name")?;
                let value = self.parse_expr()?;
                fields.push((field, value));

                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::CloseBrace, "`}` after record fields")?;
        let span = name_span.to(self.previous_span());

        Ok(self.make_expr(span, ExprKind::Record { type_name, fields }))
    }

    /// `( e ; ... ; e )` — also covers the unit expression `()`
    fn parse_seq_expr(&mut self) -> Result<Expr, SyntaxError> {
        let open = self.expect(TokenKind::OpenParen, "`(`")?;

        let mut exprs = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                exprs.push(self.parse_expr()?);
                if !self.eat(TokenKind::Semicolon) {
                    break;
                }
            }
        }

        self.expect(TokenKind::CloseParen, "`)` after expression sequence")?;
        let span = open.span.to(self.previous_span());

        // A parenthesised single expression is just a grouping; the sequence
        // node is only needed for zero or several expressions
        if exprs.len() == 1 {
            return Ok(exprs.into_iter().next().unwrap());
        }

        Ok(self.make_expr(span, ExprKind::Seq(exprs)))
    }

    fn parse_if_expr(&mut self) -> Result<Expr, SyntaxError> {
        let if_token = self.expect_keyword(Keyword::If, "`if`")?;
        let test = self.parse_expr()?;
        self.expect_keyword(Keyword::Then, "`then` after if condition")?;
        let then_branch = self.parse_expr()?;

        let else_branch = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let span = if_token.span.to(
            else_branch
                .as_ref()
                .map(|e| e.span)
                .unwrap_or(then_branch.span),
        );

        Ok(self.make_expr(
            span,
            ExprKind::If {
                test: Box::new(test),
                then_branch: Box::new(then_branch),
                else_branch,
            },
        ))
    }

    fn parse_while_expr(&mut self) -> Result<Expr, SyntaxError> {
        let while_token = self.expect_keyword(Keyword::While, "`while`")?;
        let test = self.parse_expr()?;
        self.expect_keyword(Keyword::Do, "`do` after while condition")?;
        let body = self.parse_expr()?;
        let span = while_token.span.to(body.span);

        Ok(self.make_expr(
            span,
            ExprKind::While {
                test: Box::new(test),
                body: Box::new(body),
            },
        ))
    }

    fn parse_for_expr(&mut self) -> Result<Expr, SyntaxError> {
        let for_token = self.expect_keyword(Keyword::For, "`for`")?;
        let (var, _) = self.expect_identifier("loop variable after `for`")?;
        self.expect(TokenKind::Assign, "`:=` after loop variable")?;
        let lo = self.parse_expr()?;
        self.expect_keyword(Keyword::To, "`to` in for loop")?;
        let hi = self.parse_expr()?;
        self.expect_keyword(Keyword::Do, "`do` after for range")?;
        let body = self.parse_expr()?;
        let span = for_token.span.to(body.span);

        Ok(self.make_expr(
            span,
            ExprKind::For {
                var,
                escape: Cell::new(false),
                lo: Box::new(lo),
                hi: Box::new(hi),
                body: Box::new(body),
            },
        ))
    }

    fn parse_let_expr(&mut self) -> Result<Expr, SyntaxError> {
        let let_token = self.expect_keyword(Keyword::Let, "`let`")?;

        let mut decls = Vec::new();
        while self.check_keyword(Keyword::Type)
            || self.check_keyword(Keyword::Var)
            || self.check_keyword(Keyword::Function)
        {
            decls.push(self.parse_declaration()?);
        }

        self.expect_keyword(Keyword::In, "`in` after let declarations")?;

        let mut body = Vec::new();
        if !self.check_keyword(Keyword::End) {
            loop {
                body.push(self.parse_expr()?);
                if !self.eat(TokenKind::Semicolon) {
                    break;
                }
            }
        }

        self.expect_keyword(Keyword::End, "`end` to terminate let")?;
        let span = let_token.span.to(self.previous_span());

        Ok(self.make_expr(span, ExprKind::Let { decls, body }))
    }

    /* Declarations */

    fn parse_declaration(&mut self) -> Result<Decl, SyntaxError> {
        if self.check_keyword(Keyword::Type) {
            return self.parse_type_declaration();
        }
        if self.check_keyword(Keyword::Var) {
            return self.parse_var_declaration();
        }

        self.parse_function_declaration()
    }

    /// `type id = T`
    fn parse_type_declaration(&mut self) -> Result<Decl, SyntaxError> {
        let type_token = self.expect_keyword(Keyword::Type, "`type`")?;
        let (name, _) = self.expect_identifier("type name")?;
        self.expect(TokenKind::Equals, "`=` after type name")?;
        let ty = self.parse_type()?;
        let span = type_token.span.to(ty.span);

        Ok(Decl {
            span,
            kind: DeclKind::Type(TypeDecl { name, ty }),
        })
    }

    fn parse_type(&mut self) -> Result<TypeAst, SyntaxError> {
        if self.eat(TokenKind::OpenBrace) {
            let open_span = self.previous_span();

            let mut fields = Vec::new();
            if !self.check(TokenKind::CloseBrace) {
                loop {
                    fields.push(self.parse_field_def()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }

            self.expect(TokenKind::CloseBrace, "`}` after record fields")?;

            return Ok(TypeAst {
                span: open_span.to(self.previous_span()),
                kind: TypeAstKind::Record(fields),
            });
        }

        if self.eat_keyword(Keyword::Array) {
            let array_span = self.previous_span();
            self.expect_keyword(Keyword::Of, "`of` in array type")?;
            let (element, element_span) = self.expect_identifier("element type name")?;

            return Ok(TypeAst {
                span: array_span.to(element_span),
                kind: TypeAstKind::Array(element),
            });
        }

        let (name, span) = self.expect_identifier("type name")?;
        Ok(TypeAst {
            span,
            kind: TypeAstKind::Name(name),
        })
    }

    fn parse_field_def(&mut self) -> Result<FieldDef, SyntaxError> {
        let (name, _) = self.expect_identifier("field name")?;
        self.expect(TokenKind::Colon, "`:` after field name")?;
        let (type_name, _) = self.expect_identifier("field type name")?;

        Ok(FieldDef { name, type_name })
    }

    /// `var id [: type-id] := e`
    fn parse_var_declaration(&mut self) -> Result<Decl, SyntaxError> {
        let var_token = self.expect_keyword(Keyword::Var, "`var`")?;
        let (name, _) = self.expect_identifier("variable name")?;

        let type_name = if self.eat(TokenKind::Colon) {
            Some(self.expect_identifier("type name after `:`")?.0)
        } else {
            None
        };

        self.expect(TokenKind::Assign, "`:=` in variable declaration")?;
        let init = self.parse_expr()?;
        let span = var_token.span.to(init.span);

        Ok(Decl {
            span,
            kind: DeclKind::Var(VarDecl {
                name,
                type_name,
                init,
                escape: Cell::new(false),
            }),
        })
    }

    /// `function id(params) [: type-id] = e`
    fn parse_function_declaration(&mut self) -> Result<Decl, SyntaxError> {
        let function_token = self.expect_keyword(Keyword::Function, "`function`")?;
        let (name, _) = self.expect_identifier("function name")?;

        self.expect(TokenKind::OpenParen, "`(` after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen, "`)` after parameters")?;

        let result_type = if self.eat(TokenKind::Colon) {
            Some(self.expect_identifier("return type after `:`")?.0)
        } else {
            None
        };

        self.expect(TokenKind::Equals, "`=` before function body")?;
        let body = self.parse_expr()?;
        let span = function_token.span.to(body.span);

        Ok(Decl {
            span,
            kind: DeclKind::Function(FunctionDecl {
                name,
                params,
                result_type,
                body,
            }),
        })
    }

    fn parse_param(&mut self) -> Result<Param, SyntaxError> {
        let (name, name_span) = self.expect_identifier("parameter name")?;
        self.expect(TokenKind::Colon, "`:` after parameter name")?;
        let (type_name, type_span) = self.expect_identifier("parameter type name")?;

        Ok(Param {
            span: name_span.to(type_span),
            name,
            type_name,
            escape: Cell::new(false),
        })
    }
}

fn token_to_operator(kind: TokenKind) -> OperatorKind {
    match kind {
        TokenKind::Plus => OperatorKind::Add,
        TokenKind::Minus => OperatorKind::Subtract,
        TokenKind::Asterisk => OperatorKind::Multiply,
        TokenKind::Divide => OperatorKind::Divide,
        TokenKind::Equals => OperatorKind::Equals,
        TokenKind::NotEquals => OperatorKind::NotEquals,
        TokenKind::LessThan => OperatorKind::LessThan,
        TokenKind::LessThanOrEqualTo => OperatorKind::LessThanOrEqualTo,
        TokenKind::GreaterThan => OperatorKind::GreaterThan,
        TokenKind::GreaterThanOrEqualTo => OperatorKind::GreaterThanOrEqualTo,
        TokenKind::Ampersand => OperatorKind::And,
        TokenKind::Pipe => OperatorKind::Or,
        _ => unreachable!("token {kind:?} is not an operator"),
    }
}

/// Decodes a string literal's span text (including the surrounding quotes)
/// into its value. Unknown escapes keep the escaped character.
fn decode_string_literal(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some('\\') => value.push('\\'),
            Some('"') => value.push('"'),
            Some(other) => value.push(other),
            None => {}
        }
    }

    value
}
