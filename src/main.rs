use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use zephyr::builtins::{register_builtins, set_sandbox_storage};
use zephyr::config::{FsConfig, VERSION, WELCOME_FOOTER, WELCOME_MESSAGE, WELCOME_SUBTITLE};
use zephyr::env::Environment;
use zephyr::eval::Evaluator;
use zephyr::module_loader::ModuleLoader;
use zephyr::parser::parse;
use zephyr::sandbox::Sandbox;

/// Zephyr: a class-based scripting language with cooperative async.
#[derive(Parser, Debug)]
#[command(name = "zephyr")]
#[command(version = VERSION)]
#[command(about = "A tree-walking interpreter for the Zephyr scripting language")]
struct CliArgs {
    /// Script file to execute. If omitted, starts an interactive REPL.
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Add an allowed filesystem root for read_file/write_file (repeatable).
    #[arg(long = "fs-sandbox", value_name = "PATH", action = clap::ArgAction::Append)]
    fs_paths: Vec<PathBuf>,

    /// Maximum file size in bytes accepted by write_file.
    #[arg(long = "max-file-size", value_name = "BYTES", default_value = "10485760")]
    max_file_size: usize,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let sandbox = match Sandbox::new(build_fs_config(&args)) {
        Ok(sandbox) => sandbox,
        Err(e) => {
            eprintln!("zephyr: cannot start sandbox: {}", e);
            return ExitCode::FAILURE;
        }
    };
    set_sandbox_storage(sandbox);

    let env = Environment::new();
    register_builtins(&env);
    let evaluator = Evaluator::new(ModuleLoader::from_env());

    match args.script {
        Some(path) => run_script(&evaluator, &env, &path),
        None => {
            run_repl(&evaluator, &env);
            ExitCode::SUCCESS
        }
    }
}

fn build_fs_config(args: &CliArgs) -> FsConfig {
    let allowed_paths = if args.fs_paths.is_empty() { vec![PathBuf::from(".")] } else { args.fs_paths.clone() };
    FsConfig { allowed_paths, max_file_size: args.max_file_size }
}

/// Runs one script file to completion, printing a located traceback and
/// exiting 1 on parse or runtime failure, per spec.md 6.
fn run_script(evaluator: &Evaluator, env: &Rc<Environment>, path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("zephyr: cannot read '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let file_name = path.to_string_lossy().into_owned();

    let program = match parse(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e.render_traceback(&file_name, &source));
            return ExitCode::FAILURE;
        }
    };

    match evaluator.eval_program(&program, env) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.render_traceback(&file_name, &source));
            ExitCode::FAILURE
        }
    }
}

/// Interactive REPL over rustyline: each line is parsed and evaluated
/// against the same persistent environment, echoing the resulting value.
fn run_repl(evaluator: &Evaluator, env: &Rc<Environment>) {
    let config = Config::builder().auto_add_history(true).build();
    let mut rl = match DefaultEditor::with_config(config) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("zephyr: failed to initialize REPL: {}", e);
            return;
        }
    };

    let history_file = ".zephyr_history";
    let _ = rl.load_history(history_file);

    println!("{} {}", WELCOME_MESSAGE, VERSION);
    println!("{}", WELCOME_SUBTITLE);
    println!("{}", WELCOME_FOOTER);

    loop {
        match rl.readline("zephyr> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match parse(&line) {
                    Ok(program) => match evaluator.eval_program(&program, env) {
                        Ok(value) => println!("{}", value),
                        Err(e) => eprintln!("{}", e.render_traceback("<repl>", &line)),
                    },
                    Err(e) => eprintln!("{}", e.render_traceback("<repl>", &line)),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("zephyr: {}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(history_file);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fs_config_defaults_to_current_directory() {
        let args = CliArgs { script: None, fs_paths: vec![], max_file_size: 10_485_760 };
        let config = build_fs_config(&args);
        assert_eq!(config.allowed_paths, vec![PathBuf::from(".")]);
        assert_eq!(config.max_file_size, 10_485_760);
    }

    #[test]
    fn build_fs_config_honors_explicit_paths_and_size() {
        let args = CliArgs { script: None, fs_paths: vec![PathBuf::from("/tmp/safe")], max_file_size: 1024 };
        let config = build_fs_config(&args);
        assert_eq!(config.allowed_paths, vec![PathBuf::from("/tmp/safe")]);
        assert_eq!(config.max_file_size, 1024);
    }
}
