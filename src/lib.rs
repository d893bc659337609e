//! # lockstep-engine — a step-wise, cooperatively scheduled script interpreter
//!
//! An interpreter for a JavaScript-like language whose defining property is
//! that **every evaluation step is a discrete, host-observable transition**.
//! Instead of recursing over the AST on the host call stack, evaluation runs
//! over an explicit heap-allocated stack of frames; each frame resumes from
//! a `(index, subIndex)` position inside its node. That makes three things
//! possible that a plain tree-walker cannot do:
//!
//! - **single-stepping**: the host advances an execution one frame
//!   transition at a time and inspects the stack and scopes in between,
//! - **suspension mid-expression**: an `await` parks the execution on an
//!   observable promise without capturing the host stack,
//! - **cooperative concurrency**: multiple executions interleave at their
//!   await points on one thread, driven by a shared timer/microtask loop.
//!
//! Promises are observable and abortable: their settle state is a readable
//! field, and `abort()` cancels whatever is parked on them.
//!
//! ## Quick start
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use lockstep_engine::runner::std_lib::console;
//! use lockstep_engine::{create_runtime, with_global, ExecuteOptions, RuntimeOptions, Scope};
//!
//! // Capture console output instead of printing.
//! let lines = Rc::new(RefCell::new(Vec::new()));
//! let sink: console::ConsoleSink = {
//!     let lines = lines.clone();
//!     Rc::new(move |line: &str| lines.borrow_mut().push(line.to_string()))
//! };
//!
//! let runtime = create_runtime(RuntimeOptions::default());
//! let base = Scope::new();
//! base.declare("console", console::console_object(sink));
//! let scope = with_global(base, &runtime);
//!
//! let execution = runtime
//!     .execute(
//!         "const sleep = ms => new Promise(r => setTimeout(r, ms));\n\
//!          const main = async () => { await sleep(1); console.log('2 + 3 =', 2 + 3) };\n\
//!          await main()",
//!         ExecuteOptions { desc: None, root_scope: scope },
//!     )
//!     .unwrap();
//! execution.wait().unwrap();
//! assert_eq!(lines.borrow().as_slice(), ["2 + 3 = 5"]);
//! ```
//!
//! ## Single-stepping
//!
//! ```
//! use lockstep_engine::{create_runtime, with_global, ExecuteOptions, RuntimeOptions, Scope};
//!
//! let runtime = create_runtime(RuntimeOptions::default());
//! let scope = with_global(Scope::new(), &runtime);
//! let execution = runtime
//!     .execute("let n = 1 + 1", ExecuteOptions { desc: None, root_scope: scope })
//!     .unwrap();
//! while !execution.state().finished {
//!     execution.step().unwrap();
//! }
//! assert!(execution.steps_taken() > 5);
//! ```
//!
//! ## Architecture
//!
//! - [`parser`] — pest grammar and AST builder
//! - [`runner::ds`] — values, scope chain, frames, observable promises
//! - [`runner::eval`] — the step evaluator and the user-function builder
//! - [`runner::exec`] — executions, the driver and the runtime registry
//! - [`runner::std_lib`] — host globals (console, JSON, Math, setTimeout,
//!   Promise)

pub mod parser;
pub mod runner;

pub use parser::api::JsParser;
pub use runner::ds::error::EngineError;
pub use runner::ds::promise::{ObservablePromise, PromiseState};
pub use runner::ds::scope::Scope;
pub use runner::ds::value::Value;
pub use runner::exec::execution::{Execution, ExecutionSnapshot, FrameSnapshot};
pub use runner::exec::runtime::{create_runtime, ExecuteOptions, Runtime, RuntimeOptions};
pub use runner::std_lib::with_global;
