//! CLI front-end for the lockstep engine.
//!
//! Usage:
//!   lockstep <file.js>             # run a script file
//!   lockstep -e "code"             # evaluate a one-liner
//!   lockstep                       # interactive REPL
//!   --debug anywhere enables per-step traces.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use lockstep_engine::{
    create_runtime, with_global, EngineError, ExecuteOptions, Runtime, RuntimeOptions, Scope, Value,
};

fn main() {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "--debug");
    args.retain(|a| a != "--debug");

    if debug {
        tracing_subscriber::fmt()
            .with_env_filter("lockstep=trace")
            .with_target(false)
            .without_time()
            .init();
    }

    let runtime = create_runtime(RuntimeOptions { is_debug: debug });

    match args.as_slice() {
        [] => run_repl(&runtime),
        [flag] if flag == "-h" || flag == "--help" => print_usage(),
        [path] => run_source(&runtime, &read_file(path), Some(path)),
        [flag, code] if flag == "-e" || flag == "--eval" => run_source(&runtime, code, None),
        _ => {
            print_usage();
            process::exit(2);
        }
    }
}

fn print_usage() {
    println!("usage: lockstep [--debug] [<file.js> | -e <code>]");
    println!("       with no arguments, starts a REPL");
}

fn read_file(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("lockstep: cannot read {}: {}", path, err);
            process::exit(1);
        }
    }
}

fn run_source(runtime: &Runtime, source: &str, path: Option<&str>) {
    let scope = with_global(Scope::new(), runtime);
    let options = ExecuteOptions {
        desc: path.map(|p| p.to_string()),
        root_scope: scope,
    };
    match runtime.execute(source, options).and_then(|e| e.wait()) {
        Ok(Value::Undefined) => {}
        Ok(value) => println!("{}", value),
        Err(EngineError::Aborted) => {}
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn run_repl(runtime: &Runtime) {
    println!("lockstep REPL — Ctrl-D to exit");
    let scope = with_global(Scope::new(), runtime);
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("read error: {}", err);
                break;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let options = ExecuteOptions {
            desc: Some("repl".to_string()),
            root_scope: scope.clone(),
        };
        match runtime.execute(line, options).and_then(|e| e.wait()) {
            Ok(Value::Undefined) => {}
            Ok(value) => println!("{}", value),
            Err(err) => eprintln!("{}", err),
        }
    }
}
