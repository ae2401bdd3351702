use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser as ClapParser, Subcommand};
use tracing::error;

use oto::applet::LocalAppletLauncher;
use oto::ast::*;
use oto::config::RunConfig;
use oto::lexer::Lexer;
use oto::parser::Parser;
use oto::runtime::value::set_path;
use oto::runtime::{ExecutionContext, Interpreter, Map, RuntimeError, Status, User, Value};
use oto::stdlib::{command_registry, pipe_registry};
use oto::verify::{validate_labels, LabelIssue, ValidationMode};

#[derive(ClapParser)]
#[command(name = "oto", version, about = "Run OTO instruction programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the token stream (debug)
    Tokenize {
        /// Path to .oto file
        file: PathBuf,
    },
    /// Parse and display the statement tree
    Parse {
        /// Path to .oto file
        file: PathBuf,
    },
    /// Validate labels and goto targets
    Check {
        /// Path to .oto file
        file: PathBuf,
    },
    /// Execute a program
    Run {
        /// Path to .oto file
        file: PathBuf,
        /// Initial data as key=value pairs (dotted keys nest)
        #[arg(short, long, value_parser = parse_data)]
        data: Vec<(String, String)>,
        /// User id for the run
        #[arg(short, long)]
        user: Option<String>,
        /// Seconds to wait for each human response
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_data(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid data format '{}', expected key=value", s)),
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Tokenize { file } => cmd_tokenize(&file),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Check { file } => cmd_check(&file),
        Commands::Run {
            file,
            data,
            user,
            timeout,
            json,
        } => cmd_run(&file, &data, user.as_deref(), timeout, json),
    };
    process::exit(exit_code);
}

const MAX_SOURCE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

fn read_source(path: &PathBuf) -> Result<(String, String), i32> {
    let filename = path.to_string_lossy().to_string();

    match std::fs::metadata(path) {
        Ok(meta) => {
            if meta.len() > MAX_SOURCE_SIZE {
                eprintln!(
                    "Error: file {} is too large ({} bytes, max {} bytes)",
                    filename,
                    meta.len(),
                    MAX_SOURCE_SIZE
                );
                return Err(1);
            }
        }
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            return Err(1);
        }
    }

    match std::fs::read_to_string(path) {
        Ok(source) => Ok((source, filename)),
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            Err(1)
        }
    }
}

fn lex_and_parse(path: &PathBuf) -> Result<(Program, String), i32> {
    let (source, filename) = read_source(path)?;

    let tokens = match Lexer::new(&source, &filename).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            return Err(1);
        }
    };

    let program = match Parser::new(tokens, &filename).parse() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            return Err(1);
        }
    };

    Ok((program, filename))
}

fn cmd_tokenize(path: &PathBuf) -> i32 {
    let (source, filename) = match read_source(path) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let tokens = match Lexer::new(&source, &filename).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            return 1;
        }
    };

    for tok in &tokens {
        println!("{}", tok);
    }
    0
}

fn cmd_parse(path: &PathBuf) -> i32 {
    let (program, _) = match lex_and_parse(path) {
        Ok(r) => r,
        Err(code) => return code,
    };

    print_statements(&program.statements, 0);
    0
}

fn print_issue(filename: &str, issue: &LabelIssue) {
    let line = issue.lines.first().copied().unwrap_or(0);
    println!("  {}:{}: ERROR {}: {}", filename, line, issue.kind.code(), issue.message);
}

fn cmd_check(path: &PathBuf) -> i32 {
    let (program, filename) = match lex_and_parse(path) {
        Ok(r) => r,
        Err(code) => {
            eprintln!("FAIL");
            return code;
        }
    };

    match validate_labels(&program, ValidationMode::CollectAll) {
        Ok(()) => {
            println!("{}: OK", filename);
            0
        }
        Err(e) => {
            for issue in &e.issues {
                print_issue(&filename, issue);
            }
            println!();
            println!("{}: FAIL ({} error(s))", filename, e.issues.len());
            1
        }
    }
}

fn cmd_run(
    path: &PathBuf,
    data: &[(String, String)],
    user: Option<&str>,
    timeout: Option<u64>,
    json: bool,
) -> i32 {
    let mut config = match RunConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Some(secs) = timeout {
        config = match config.with_timeout_secs(secs) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
    }
    oto::init_tracing(&config.log_filter);

    let (program, filename) = match lex_and_parse(path) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let mut initial = Map::new();
    for (key, value) in data {
        set_path(&mut initial, key, Value::parse_loose(value));
    }

    let (commands, pipes) = match (command_registry(), pipe_registry()) {
        (Ok(c), Ok(p)) => (c, p),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let interpreter = Interpreter::new(Arc::new(commands)).with_pipes(Arc::new(pipes));

    let mut ctx = ExecutionContext::new()
        .with_data(initial)
        .with_env(std::env::vars().filter(|(k, _)| k.starts_with("OTO_")).collect())
        .with_applet_launcher(Arc::new(LocalAppletLauncher::from_config(&config)));
    if let Some(id) = user {
        ctx = ctx.with_user(User::new(id));
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start async runtime: {}", e);
            return 1;
        }
    };

    let mut status = ctx.observe_status();
    runtime.spawn(async move {
        while status.changed().await.is_ok() {
            if *status.borrow_and_update() == Status::WaitingHumanValidation {
                eprintln!("Waiting for a human response (open the applet URL from the log)...");
            }
        }
    });

    let result = runtime.block_on(interpreter.execute_program(&program, ctx));
    match result {
        Ok(result) => {
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error: cannot serialize result: {}", e);
                        return 1;
                    }
                }
            } else {
                for action in result.actions() {
                    let mark = if action.success { "ok  " } else { "FAIL" };
                    match &action.fatal_error {
                        Some(err) => println!("  {} {} ({})", mark, action.command, err),
                        None => println!("  {} {}", mark, action.command),
                    }
                }
                if let Some(value) = &result.value {
                    println!("=> {}", value);
                }
                println!(
                    "{}: exit {} (cost {})",
                    filename, result.exit_code, result.cost
                );
            }
            i32::try_from(result.exit_code).unwrap_or(1)
        }
        Err(RuntimeError::Labels(e)) => {
            for issue in &e.issues {
                print_issue(&filename, issue);
            }
            1
        }
        Err(e) => {
            error!(error = %e, "run aborted");
            eprintln!("{}: {}", filename, e);
            1
        }
    }
}

fn print_statements(statements: &[Statement], depth: usize) {
    let pad = "  ".repeat(depth);
    for stmt in statements {
        match stmt {
            Statement::Instruction(instr) => {
                let mut line = format!("{}{}", pad, instr.action);
                for arg in &instr.args {
                    line.push_str(&format!(" {}={}", arg.name, arg.value));
                }
                if let Some(output) = &instr.output {
                    line.push_str(&format!(" output={}", output));
                }
                if let Some(condition) = &instr.condition {
                    line.push_str(&format!(" if={{{}}}", condition));
                }
                if let Some(label) = &instr.label {
                    line.push_str(&format!(" label={}", label));
                }
                println!("{}    [line {}]", line, instr.loc.line);
            }
            Statement::Block(block) => {
                match &block.kind {
                    BlockKind::Plain => println!("{}@block", pad),
                    BlockKind::Conditional(condition) => {
                        println!("{}@block if={{{}}}", pad, condition)
                    }
                    BlockKind::ForEach(spec) => {
                        println!("{}@block forEach={{{}}} as={}", pad, spec.source, spec.item)
                    }
                }
                print_statements(&block.body, depth + 1);
            }
        }
    }
}
