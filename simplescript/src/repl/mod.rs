//! REPL (Read-Eval-Print Loop) for SimpleScript

use crate::error::report_error;
use crate::interp::{Interpreter, Value};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

const PROMPT: &str = "simplescript> ";
const HISTORY_FILE: &str = ".simplescript_history";
const SOURCE_NAME: &str = "<stdin>";

/// REPL state. The interpreter, and with it the global environment, lives
/// for the whole session.
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
    history_path: Option<PathBuf>,
}

/// What to do with one line of input
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Quit,
    Help,
    Clear,
    Unknown,
}

impl Repl {
    /// Create a new REPL
    pub fn new(interpreter: Interpreter) -> RlResult<Self> {
        let editor = DefaultEditor::new()?;

        // Try to find history file in home directory
        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));

        let mut repl = Repl {
            editor,
            interpreter,
            history_path,
        };

        if let Some(path) = &repl.history_path {
            if let Err(e) = repl.editor.load_history(path) {
                log::debug!("no history loaded from {}: {e}", path.display());
            }
        }

        Ok(repl)
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("SimpleScript {}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    if let Err(e) = self.editor.add_history_entry(line) {
                        log::warn!("failed to record history: {e}");
                    }

                    // Handle commands
                    if line.starts_with(':') {
                        if self.handle_command(line) {
                            break;
                        }
                        continue;
                    }

                    if let Some(output) = self.eval_line(line) {
                        println!("{output}");
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        // Save history
        if let Some(path) = &self.history_path {
            if let Err(e) = self.editor.save_history(path) {
                log::warn!("failed to save history to {}: {e}", path.display());
            }
        }

        Ok(())
    }

    fn parse_command(cmd: &str) -> Command {
        match cmd {
            ":quit" | ":q" | ":exit" => Command::Quit,
            ":help" | ":h" | ":?" => Command::Help,
            ":clear" => Command::Clear,
            _ => Command::Unknown,
        }
    }

    /// Handle REPL commands (starting with :); true means exit
    fn handle_command(&mut self, cmd: &str) -> bool {
        match Self::parse_command(cmd) {
            Command::Quit => {
                println!("Goodbye!");
                true
            }
            Command::Help => {
                print_help();
                false
            }
            Command::Clear => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            Command::Unknown => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }

    /// Evaluate one line against the session's global environment.
    /// Returns the text to echo; errors are reported to stderr.
    fn eval_line(&mut self, line: &str) -> Option<String> {
        match crate::run(SOURCE_NAME, line, &mut self.interpreter) {
            Ok(Value::Nothing) => None,
            Ok(value) => Some(value.to_string()),
            Err(err) => {
                report_error(&err);
                None
            }
        }
    }
}

fn print_help() {
    println!("SimpleScript REPL Commands:");
    println!("  :help, :h, :?   Show this help");
    println!("  :quit, :q       Exit the REPL");
    println!("  :clear          Clear the screen");
    println!();
    println!("You can enter:");
    println!("  - Variables: VAR x = 5 + 1");
    println!("  - Functions: FUN add(a, b) -> a + b");
    println!("  - Loops: FOR i = 0 TO 3 THEN PRINT(i)");
    println!("  - Statements separated by ';'");
    println!();
    println!("Built-in functions:");
    println!("  PRINT(x) PRINT_RET(x) LEN(x)");
    println!("  IS_NUM(x) IS_STR(x) IS_LIST(x) IS_FUN(x)");
    println!("  APPEND(list, x) EXTEND(list, other) POP(list, index)");
}

/// Get home directory
fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{Config, Environments};

    fn interpreter() -> Interpreter {
        Interpreter::new(Environments::new(), Config::default())
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(Repl::parse_command(":quit"), Command::Quit);
        assert_eq!(Repl::parse_command(":q"), Command::Quit);
        assert_eq!(Repl::parse_command(":exit"), Command::Quit);
        assert_eq!(Repl::parse_command(":h"), Command::Help);
        assert_eq!(Repl::parse_command(":clear"), Command::Clear);
        assert_eq!(Repl::parse_command(":nope"), Command::Unknown);
    }

    #[test]
    fn test_constants() {
        assert_eq!(HISTORY_FILE, ".simplescript_history");
        assert_eq!(SOURCE_NAME, "<stdin>");
    }

    #[test]
    fn test_session_keeps_globals() {
        let Ok(mut repl) = Repl::new(interpreter()) else {
            // No terminal available
            return;
        };
        assert_eq!(repl.eval_line("VAR x = 5 + 1"), Some("6".to_string()));
        assert_eq!(repl.eval_line("x * 2"), Some("12".to_string()));
        assert_eq!(repl.eval_line("1 / 0"), None);
        assert_eq!(repl.eval_line("x"), Some("6".to_string()));
        assert_eq!(repl.eval_line("[x]"), Some("[6]".to_string()));
    }
}
