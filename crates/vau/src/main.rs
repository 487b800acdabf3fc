use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use vau_core::{VauError, Value};
use vau_eval::{EvalOptions, Interpreter};

#[derive(Parser)]
#[command(name = "vau", version, about = "vau: a tiny fexpr Lisp")]
struct Cli {
    /// File to execute
    file: Option<String>,

    /// Evaluate an expression and print the result
    #[arg(short, long)]
    eval: Option<String>,

    /// Abort any evaluation after this many steps (0 = no limit)
    #[arg(long, default_value_t = 0)]
    step_limit: usize,

    /// Log filter, e.g. `vau_eval=trace` (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,

    /// Do not load or save REPL history
    #[arg(long)]
    no_history: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let interpreter = Interpreter::with_options(EvalOptions {
        step_limit: cli.step_limit,
    });

    if let Some(expr) = &cli.eval {
        match interpreter.eval_str(expr) {
            Ok(results) => {
                if let Some(val) = results.last() {
                    println!("{val}");
                }
            }
            Err(e) => {
                report(&e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Some(file) = &cli.file {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                if let Err(e) = interpreter.eval_str(&content) {
                    eprintln!("error in {file}: {e}");
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("error reading {file}: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    repl(interpreter, !cli.no_history);
}

fn report(e: &VauError) {
    eprintln!("error: {e}");
    if let Some(hint) = e.hint() {
        eprintln!("  hint: {hint}");
    }
}

/// Evaluate each form of one REPL entry, printing and binding every result.
/// An error abandons the rest of the entry.
fn run_entry(interpreter: &Interpreter, input: &str) {
    let forms = match vau_reader::read(input) {
        Ok(forms) => forms,
        Err(e) => return report(&e),
    };
    for form in forms {
        match interpreter.eval(&form) {
            Ok(val) => {
                let shown = val.to_string();
                let name = interpreter.bind_result(val);
                println!("{name} = {shown}");
            }
            Err(e) => return report(&e),
        }
    }
}

fn repl(interpreter: Interpreter, use_history: bool) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("error: failed to start line editor: {e}");
            std::process::exit(1);
        }
    };
    let history_path = dirs_path().join("history.txt");
    if use_history {
        let _ = rl.load_history(&history_path);
    }

    println!("vau v{}", env!("CARGO_PKG_VERSION"));
    println!("Type ,help for help, ,quit to exit\n");

    let mut buffer = String::new();
    let mut in_multiline = false;

    loop {
        let prompt = if in_multiline { "  ... " } else { "vau> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if !in_multiline {
                    match line.trim() {
                        ",quit" | ",exit" | ",q" => break,
                        ",help" | ",h" => {
                            print_help();
                            continue;
                        }
                        ",env" => {
                            print_env(&interpreter);
                            continue;
                        }
                        _ => {}
                    }
                }

                if in_multiline {
                    buffer.push('\n');
                    buffer.push_str(&line);
                } else {
                    buffer = line;
                }

                if !is_balanced(&buffer) {
                    in_multiline = true;
                    continue;
                }

                in_multiline = false;
                let input = std::mem::take(&mut buffer);
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(input);
                run_entry(&interpreter, input);
            }
            Err(ReadlineError::Interrupted) => {
                if in_multiline {
                    buffer.clear();
                    in_multiline = false;
                    println!("^C");
                    continue;
                }
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("error: {e}");
                break;
            }
        }
    }

    if use_history {
        let _ = std::fs::create_dir_all(dirs_path());
        let _ = rl.save_history(&history_path);
    }
}

/// True once every `(` has its `)`; strings and comments don't count.
fn is_balanced(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut in_comment = false;
    let mut escape = false;
    for ch in input.chars() {
        if in_comment {
            in_comment = ch != '\n';
            continue;
        }
        if escape {
            escape = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            ';' => in_comment = true,
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0 && !in_string
}

fn print_help() {
    println!("vau REPL Commands:");
    println!("  ,quit / ,q    Exit the REPL");
    println!("  ,help / ,h    Show this help");
    println!("  ,env          Show top-level bindings");
    println!();
    println!("Builtins:");
    println!("  (vau head env body...)   operative; operands arrive unevaluated");
    println!("  wrap, unwrap             convert between operatives and applicatives");
    println!("  pair, fst, snd           pairs");
    println!("  eval, show               evaluate in a scope, render a value");
    println!();
    println!("Each result is bound as $0, $1, ... for later lines.");
}

fn print_env(interpreter: &Interpreter) {
    let mut shown = 0;
    for name in interpreter.root.names() {
        if let Ok(val) = interpreter.root.get_str(&name) {
            if matches!(val, Value::Primitive(_) | Value::Applicative(_)) && !name.starts_with('$') {
                continue;
            }
            println!("  {name} = {val}");
            shown += 1;
        }
    }
    if shown == 0 {
        println!("(no bindings besides builtins)");
    }
}

fn dirs_path() -> std::path::PathBuf {
    dirs_home().join(".vau")
}

fn dirs_home() -> std::path::PathBuf {
    std::env::var("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_balanced() {
        assert!(is_balanced("(pair 1 2)"));
        assert!(!is_balanced("(pair 1"));
        assert!(is_balanced("\"(\""));
        assert!(!is_balanced("(show \")\""));
        assert!(is_balanced("(a) ; (unclosed"));
        assert!(!is_balanced("(a ; )\n"));
        assert!(is_balanced("a)"));
    }
}
