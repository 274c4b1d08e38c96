//! SimpleScript CLI

use clap::{Parser, Subcommand};
use simplescript::error::report_error;
use simplescript::interp::{Config, Environments, Interpreter, Value};
use simplescript::repl::Repl;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "simplescript", version, about = "SimpleScript interpreter")]
struct Cli {
    /// Maximum nested function calls before MaxRecursionDepth
    #[arg(long, global = true, default_value_t = simplescript::interp::DEFAULT_MAX_RECURSION_DEPTH)]
    max_depth: usize,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive session (default)
    Repl,
    /// Run a SimpleScript file
    Run {
        /// Source file to run
        file: PathBuf,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
    /// Parse and dump AST (debug)
    Parse {
        /// Source file to parse
        file: PathBuf,
        /// Print the compact S-expression form instead of JSON
        #[arg(long)]
        compact: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let config = Config {
        max_recursion_depth: cli.max_depth,
    };

    let result = match cli.command.unwrap_or(Command::Repl) {
        Command::Repl => run_repl(config),
        Command::Run { file } => run_file(&file, config),
        Command::Tokens { file } => tokenize_file(&file),
        Command::Parse { file, compact } => parse_file(&file, compact),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(error) = e.downcast_ref::<simplescript::Error>() {
                report_error(error);
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn read_source(path: &Path) -> Result<(String, String), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok((path.display().to_string(), text))
}

fn run_repl(config: Config) -> CliResult {
    let mut repl = Repl::new(Interpreter::new(Environments::new(), config))?;
    repl.run()?;
    Ok(())
}

fn run_file(path: &Path, config: Config) -> CliResult {
    let (name, text) = read_source(path)?;
    let mut interpreter = Interpreter::new(Environments::new(), config);

    let value = simplescript::run(&name, &text, &mut interpreter)?;
    if !matches!(value, Value::Nothing) {
        println!("{value}");
    }
    Ok(())
}

fn tokenize_file(path: &Path) -> CliResult {
    let (name, text) = read_source(path)?;

    let tokens = simplescript::lexer::tokenize(&text, &name).map_err(simplescript::Error::from)?;
    for token in tokens.iter() {
        println!("{:?} @ {}-{}", token.kind, token.span.start, token.span.end);
    }

    Ok(())
}

fn parse_file(path: &Path, compact: bool) -> CliResult {
    let (name, text) = read_source(path)?;

    let tokens = simplescript::lexer::tokenize(&text, &name).map_err(simplescript::Error::from)?;
    let program = simplescript::parser::parse(tokens).map_err(simplescript::Error::from)?;

    if compact {
        println!("{program}");
    } else {
        println!("{}", serde_json::to_string_pretty(&program)?);
    }
    Ok(())
}
