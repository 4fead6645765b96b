use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;

use sablec::{
    compile_source,
    frontend::{lexer::Lexer, parser::Parser, SourceFile, SourceFileOrigin},
    ir::print::TreePrinter,
    translate::{escape::find_escapes, frame::FrameDialect, mips32::Mips32Dialect, x64::X64Dialect},
};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Stop after the named stage and print its output
    #[arg(short = 'e', long = "emit", value_enum)]
    emit: Option<EmitFormat>,

    /// Frame dialect to translate against
    #[arg(short = 't', long = "target", value_enum, default_value_t = Default::default())]
    target: Target,

    source_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitFormat {
    #[value(name = "tokens")]
    Tokens,
    #[value(name = "ast")]
    Ast,
    #[value(name = "ir")]
    Ir,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Target {
    #[default]
    #[value(name = "x64")]
    X64,
    #[value(name = "mips32")]
    Mips32,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let Some(path) = args.source_file else {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source file!")
            .exit();
    };

    if !path.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", path.display()),
            )
            .exit();
    }

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) => {
            eprintln!(
                "{}: cannot read '{}': {error}",
                "error".red(),
                path.display()
            );
            return ExitCode::FAILURE;
        }
    };

    let source = SourceFile {
        contents,
        origin: SourceFileOrigin::File(path),
    };

    let dialect: &dyn FrameDialect = match args.target {
        Target::X64 => &X64Dialect,
        Target::Mips32 => &Mips32Dialect,
    };

    let result = run(&source, dialect, args.emit);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}: {error} ({})", "error".red(), source.origin);
            ExitCode::FAILURE
        }
    }
}

fn run(
    source: &SourceFile,
    dialect: &dyn FrameDialect,
    emit: Option<EmitFormat>,
) -> Result<(), sablec::diagnostics::Error> {
    if emit == Some(EmitFormat::Tokens) {
        let tokens = Lexer::tokenize(source)?;
        for token in tokens {
            println!("{:?} `{}`", token.kind, source.value_of_span(token.span));
        }
        return Ok(());
    }

    if emit == Some(EmitFormat::Ast) {
        let tokens = Lexer::tokenize(source)?;
        let program = Parser::parse_program(source, &tokens)?;
        find_escapes(&program);
        println!("{program:#?}");
        return Ok(());
    }

    let fragments = compile_source(source, dialect)?;
    print!("{}", TreePrinter::render_fragments(&fragments));

    Ok(())
}
