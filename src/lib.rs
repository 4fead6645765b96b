//! The Sable compiler front end: a staged pipeline from source text to
//! machine-independent tree-IR fragments.
//!
//! The stages run strictly in order, each to completion: tokenizing, parsing,
//! escape analysis, semantic analysis, and IR translation over an abstract
//! frame dialect. Any stage error aborts the run with a positioned
//! diagnostic.

pub mod diagnostics;
pub mod frontend;
pub mod ir;
pub mod semantic;
pub mod symbol_table;
pub mod translate;

use diagnostics::Error;
use frontend::{lexer::Lexer, parser::Parser, SourceFile};
use ir::{generator::IrGenerator, Fragment};
use semantic::{Analysis, SemanticAnalyzer};
use translate::{escape::find_escapes, frame::FrameDialect};

/// Runs the front half of the pipeline: tokenize, parse, escape analysis,
/// and semantic analysis. Returns the analysis together with the program AST.
pub fn analyze_source(
    source: &SourceFile,
) -> Result<(frontend::ast::Expr, Analysis), Error> {
    let tokens = Lexer::tokenize(source)?;
    let program = Parser::parse_program(source, &tokens)?;

    find_escapes(&program);
    let analysis = SemanticAnalyzer::analyze(source, &program)?;

    Ok((program, analysis))
}

/// Runs the whole pipeline and returns the translator's fragments: one proc
/// per function declaration, string literals, and the program body last.
pub fn compile_source(
    source: &SourceFile,
    dialect: &dyn FrameDialect,
) -> Result<Vec<Fragment>, Error> {
    let (program, analysis) = analyze_source(source)?;

    Ok(IrGenerator::translate(&program, &analysis, dialect))
}
