use std::{
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    process,
    str::FromStr,
};

use clap::{Args, Parser, Subcommand};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use tiny_lang::{
    format_error, lexer::Lexer, options::DEFAULT_MAX_CALL_DEPTH, Env, Environment, LangError,
    Object, Options, ParseError, StdStreams, Stdio,
};

const REPL_FILE: &str = "<REPL>";

#[derive(Parser, Debug)]
#[command(name = "tiny")]
#[command(about = "Interpreter for the tiny scripting language")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    flags: Flags,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
struct Flags {
    /// Let `eval` run strings as code
    #[arg(long, global = true)]
    allow_eval: bool,

    /// Let `js` hand code to the host
    #[arg(long = "allow-js", global = true)]
    allow_js: bool,

    /// Do not import @std/lib before running
    #[arg(long, global = true)]
    no_std: bool,

    /// Omit the "[Error]" prefix on error messages
    #[arg(long, global = true)]
    no_prefix: bool,

    /// Never colour error messages
    #[arg(long, global = true)]
    no_color: bool,

    /// Abort after N loop iterations and calls
    #[arg(long, value_name = "N", global = true)]
    max_steps: Option<u64>,

    /// Maximum nesting of function calls
    #[arg(long = "max-depth", value_name = "N", global = true, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a script
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Report syntax errors in scripts, recursing into directories
    Check {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Start an interactive session (the default)
    Repl,
}

impl Flags {
    fn options(&self) -> Options {
        Options::default()
            .with_allow_eval(self.allow_eval)
            .with_allow_javascript(self.allow_js)
            .with_std_lib(!self.no_std)
            .with_stderr_prefix(!self.no_prefix)
            .with_stderr_color(!self.no_color && io::stderr().is_terminal())
            .with_max_steps(self.max_steps)
            .with_max_call_depth(self.max_depth)
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let options = cli.flags.options();

    let code = match cli.command.unwrap_or(Command::Repl) {
        Command::Run { file } => run_command(&file, &options),
        Command::Check { paths } => check_command(&paths, &options),
        Command::Repl => repl_command(&options),
    };
    process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TINY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_command(file: &Path, options: &Options) -> i32 {
    let file_name = file.display().to_string();
    let mut stdio = StdStreams::new();

    match tiny_lang::run_file(file, options, &mut stdio) {
        Ok(_) => 0,
        Err(LangError::Parse(errors)) => {
            print_parse_errors(&errors, &file_name, options);
            1
        }
        Err(LangError::Runtime(error)) => {
            eprintln!("{}", error.render(&file_name, options));
            1
        }
        Err(err @ LangError::Io(_)) => {
            eprintln!("{}", format_error(&err.to_string(), None, &file_name, options));
            1
        }
    }
}

fn print_parse_errors(errors: &[ParseError], file_name: &str, options: &Options) {
    for error in errors {
        eprintln!("{}", error.render(file_name, options));
    }
}

/// Collects `.tiny` files: explicit file arguments as given, directories walked recursively.
fn collect_sources(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("tiny") {
                files.push(path.to_path_buf());
            }
        }
    }
    files
}

fn check_command(paths: &[PathBuf], options: &Options) -> i32 {
    let files = collect_sources(paths);
    if files.is_empty() {
        eprintln!("No .tiny files found");
        return 1;
    }

    let choice = if options.stderr_color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);
    let mut failed = 0;

    for file in &files {
        let file_name = file.display().to_string();
        let errors = match std::fs::read_to_string(file) {
            Ok(source) => tiny_lang::parse(&source, &file_name).1,
            Err(err) => {
                eprintln!(
                    "{}",
                    format_error(&format!("Could not read file: {}", err), None, &file_name, options)
                );
                failed += 1;
                continue;
            }
        };

        if errors.is_empty() {
            let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
            let _ = write!(stdout, "ok ");
        } else {
            failed += 1;
            let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
            let _ = write!(stdout, "{} error(s) ", errors.len());
        }
        let _ = stdout.reset();
        let _ = writeln!(stdout, "{}", file_name);
        print_parse_errors(&errors, &file_name, options);
    }

    let _ = writeln!(
        stdout,
        "checked {} file(s), {} with errors",
        files.len(),
        failed
    );
    if failed > 0 {
        1
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Evaluate and print the result.
    Repl,
    /// Print the syntax tree.
    Parser,
    /// Print the tokens.
    Lexer,
    /// Evaluate and print the root scope's bindings.
    Env,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repl" => Ok(Mode::Repl),
            "parser" => Ok(Mode::Parser),
            "lexer" => Ok(Mode::Lexer),
            "env" => Ok(Mode::Env),
            other => Err(format!(
                "Unknown mode '{}', expected repl, parser, lexer or env",
                other
            )),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// One interactive session: a root scope that persists across lines.
struct Repl<'a> {
    env: Env,
    options: Options,
    mode: Mode,
    stdio: &'a mut dyn Stdio,
}

impl<'a> Repl<'a> {
    fn new(options: &Options, stdio: &'a mut dyn Stdio) -> Self {
        Self {
            env: Environment::root(),
            options: options.clone(),
            mode: Mode::Repl,
            stdio,
        }
    }

    /// Imports the standard library once so later lines need not.
    fn load_std_lib(&mut self) {
        if !self.options.use_std_lib_automatically {
            return;
        }
        let loaded = tiny_lang::evaluate(&Default::default(), &self.env, &self.options, &mut *self.stdio);
        self.report(&loaded);
        self.options.use_std_lib_automatically = false;
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Flow::Continue;
        }
        if let Some(command) = trimmed.strip_prefix("//") {
            return self.handle_command(command.trim());
        }

        match self.mode {
            Mode::Lexer => {
                for token in Lexer::with_file(line, REPL_FILE).lex() {
                    self.out(&format!("{:?}\n", token));
                }
            }
            Mode::Parser => {
                let (program, errors) = tiny_lang::parse(line, REPL_FILE);
                if errors.is_empty() {
                    self.out(&format!("{:#?}\n", program));
                } else {
                    self.parse_errors(&errors);
                }
            }
            Mode::Repl | Mode::Env => {
                let (program, errors) = tiny_lang::parse(line, REPL_FILE);
                if !errors.is_empty() {
                    self.parse_errors(&errors);
                    return Flow::Continue;
                }
                let result =
                    tiny_lang::evaluate(&program, &self.env, &self.options, &mut *self.stdio);
                self.report(&result);
                if self.mode == Mode::Env {
                    for (name, value) in self.env.local_bindings() {
                        self.out(&format!("{} = {}\n", name, value.inspect()));
                    }
                } else if !matches!(result, Object::Null | Object::Error(_)) {
                    self.out(&format!("{}\n", result.inspect()));
                }
            }
        }
        Flow::Continue
    }

    /// `//exit` and `//mode <name>`; any other `//` line is a comment.
    fn handle_command(&mut self, command: &str) -> Flow {
        let mut words = command.split_whitespace();
        match words.next() {
            Some("exit") => return Flow::Exit,
            Some("mode") => match words.next().map(str::parse::<Mode>) {
                Some(Ok(mode)) => {
                    self.mode = mode;
                    self.out(&format!("mode: {:?}\n", mode).to_lowercase());
                }
                Some(Err(message)) => self.err(&format!("{}\n", message)),
                None => self.out(&format!("mode: {:?}\n", self.mode).to_lowercase()),
            },
            _ => {}
        }
        Flow::Continue
    }

    fn report(&mut self, result: &Object) {
        if let Object::Error(error) = result {
            let rendered = error.render(REPL_FILE, &self.options);
            self.err(&format!("{}\n", rendered));
        }
    }

    fn parse_errors(&mut self, errors: &[ParseError]) {
        for error in errors {
            let rendered = error.render(REPL_FILE, &self.options);
            self.err(&format!("{}\n", rendered));
        }
    }

    fn out(&mut self, text: &str) {
        let _ = self.stdio.write_out(text);
    }

    fn err(&mut self, text: &str) {
        let _ = self.stdio.write_err(text);
    }
}

fn repl_command(options: &Options) -> i32 {
    let mut stdio = StdStreams::new();
    let mut repl = Repl::new(options, &mut stdio);
    repl.out(&format!(
        "tiny {} (//mode repl|parser|lexer|env, //exit)\n",
        env!("CARGO_PKG_VERSION")
    ));
    repl.load_std_lib();

    loop {
        repl.out("> ");
        let line = match repl.stdio.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                eprintln!("Could not read input: {}", err);
                return 1;
            }
        };
        if repl.handle_line(&line) == Flow::Exit {
            break;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_lang::BufferedStdio;

    fn plain() -> Options {
        Options::default()
            .with_stderr_color(false)
            .with_stderr_prefix(false)
    }

    #[test]
    fn bindings_persist_between_lines() {
        let mut stdio = BufferedStdio::new();
        {
            let mut repl = Repl::new(&plain(), &mut stdio);
            repl.load_std_lib();
            repl.handle_line("let x = 20;");
            repl.handle_line("x * 2 + 2");
            repl.handle_line("println(x)");
        }
        assert_eq!(stdio.out(), "42\n20\n");
        assert_eq!(stdio.err(), "");
    }

    #[test]
    fn errors_are_reported_and_the_session_continues() {
        let mut stdio = BufferedStdio::new();
        {
            let mut repl = Repl::new(&plain().with_std_lib(false), &mut stdio);
            assert_eq!(repl.handle_line("missing + 1"), Flow::Continue);
            assert_eq!(repl.handle_line("let = 1"), Flow::Continue);
            repl.handle_line("1 + 1");
        }
        assert_eq!(stdio.out(), "2\n");
        let err = stdio.err();
        assert!(err.contains("Undefined name 'missing' (<REPL> 1:1)"), "{}", err);
        assert!(err.contains("<REPL> 1:5"), "{}", err);
    }

    #[test]
    fn mode_commands_switch_output() {
        let mut stdio = BufferedStdio::new();
        {
            let mut repl = Repl::new(&plain().with_std_lib(false), &mut stdio);
            repl.handle_line("//mode lexer");
            repl.handle_line("let");
            repl.handle_line("//mode env");
            repl.handle_line("let a = 1;");
            repl.handle_line("//mode nonsense");
        }
        let out = stdio.out();
        assert!(out.contains("mode: lexer"));
        assert!(out.contains("kind: Let"));
        assert!(out.contains("a = 1\n"));
        assert!(stdio.err().contains("Unknown mode 'nonsense'"));
    }

    #[test]
    fn exit_ends_the_session_and_other_comments_are_ignored() {
        let mut stdio = BufferedStdio::new();
        let mut repl = Repl::new(&plain().with_std_lib(false), &mut stdio);
        assert_eq!(repl.handle_line("// just a note"), Flow::Continue);
        assert_eq!(repl.handle_line("//exit"), Flow::Exit);
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!("parser".parse::<Mode>(), Ok(Mode::Parser));
        assert!("other".parse::<Mode>().is_err());
    }

    #[test]
    fn check_collects_tiny_files_from_directories() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("nested"))?;
        std::fs::write(dir.path().join("a.tiny"), "let a = 1;")?;
        std::fs::write(dir.path().join("nested/b.tiny"), "let = ;")?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut files = collect_sources(&[dir.path().to_path_buf()]);
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().and_then(|s| s.to_str()) == Some("tiny")));
        assert_eq!(check_command(&[dir.path().to_path_buf()], &plain()), 1);
        Ok(())
    }

    #[test]
    fn cli_flags_map_onto_options() {
        let cli = Cli::parse_from(["tiny", "--allow-eval", "--no-std", "--max-steps", "10", "run", "x.tiny"]);
        let options = cli.flags.options();
        assert!(options.allow_eval);
        assert!(!options.allow_javascript);
        assert!(!options.use_std_lib_automatically);
        assert_eq!(options.max_steps, Some(10));
        assert_eq!(options.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert!(matches!(cli.command, Some(Command::Run { .. })));
    }
}
