pub mod ast;
pub mod builtins;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod object;
pub mod options;
pub mod parser;
pub mod stack;
pub mod stdio;

pub use environment::{Env, Environment};
pub use error::{format_error, LangError, LangResult, ParseError};
pub use evaluator::{Interpreter, STD_LIB};
pub use object::{ErrorObject, Object};
pub use options::Options;
pub use stdio::{BufferedStdio, StdStreams, Stdio};

use ast::Program;
use lexer::Lexer;
use parser::Parser;

/// Parses a whole source text. Syntax errors do not stop the parse: the
/// returned program holds every statement that parsed cleanly.
pub fn parse(source: &str, file_name: &str) -> (Program, Vec<ParseError>) {
    let mut parser = Parser::new(Lexer::with_file(source, file_name));
    let program = parser.parse_program();
    (program, parser.into_errors())
}

/// Evaluates `program` in `env`, first importing the standard library into
/// `env` when the options ask for it. Runtime failures are returned as
/// [`Object::Error`].
pub fn evaluate(program: &Program, env: &Env, options: &Options, stdio: &mut dyn Stdio) -> Object {
    let mut interpreter = Interpreter::new(options, stdio);
    if options.use_std_lib_automatically {
        let loaded = interpreter.import(STD_LIB, env);
        if loaded.is_error() {
            return loaded;
        }
    }
    interpreter.eval_program(program, env)
}

/// Reads, parses and evaluates a script file. Syntax errors abort before
/// evaluation; a program that ends in an error value becomes
/// [`LangError::Runtime`].
pub fn run_file(
    path: &std::path::Path,
    options: &Options,
    stdio: &mut dyn Stdio,
) -> LangResult<Object> {
    let source = std::fs::read_to_string(path)?;
    let (program, errors) = parse(&source, &path.display().to_string());
    if !errors.is_empty() {
        return Err(LangError::Parse(errors));
    }

    let mut options = options.clone();
    if options.module_dir.is_none() {
        if let Some(dir) = path.parent() {
            options.module_dir = Some(dir.to_path_buf());
        }
    }

    match evaluate(&program, &Environment::root(), &options, stdio) {
        Object::Error(error) => Err(LangError::Runtime(error)),
        value => Ok(value),
    }
}
