//! Embedded Python interpreter with restricted builtins.
//!
//! One `PySandbox` holds one interpreter and one persistent global scope:
//! assignments and imports made by an execution are visible to the next
//! one. Initialization replaces the builtin table with a vetted subset —
//! an import allowlist of pure-computation modules, no `open`, no `eval`/
//! `exec`/`compile`, no `input` — so code under execution cannot reach the
//! host filesystem, the network, or other processes.
//!
//! Output capture, the wall-clock deadline, and error classification all
//! happen inside the VM: stdout/stderr are swapped for string buffers, a
//! trace hook raises `TimeoutError` past the deadline, and a catch-all
//! runner maps the exception class to an error kind while printing the
//! traceback into the captured stderr.

use std::time::Instant;

use rustpython_vm as vm;
use rustpython_vm::builtins::PyBaseException;
use rustpython_vm::scope::Scope;
use rustpython_vm::{AsObject, Interpreter};

use rlm_core::{ExecErrorKind, ExecLimits, ExecOutputs};

/// Marker appended to a stream cut at the truncation limit.
const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Runs once per session, before the builtin table is restricted. Captures
/// the host references the runner needs (`exec`, the scope globals, the
/// traceback module), installs the import allowlist, and swaps in the
/// restricted builtins.
const LOCKDOWN: &str = r#"
__sx_builtins = __builtins__
if isinstance(__sx_builtins, dict):
    def __sx_get_builtin(name):
        return __sx_builtins.get(name)
else:
    def __sx_get_builtin(name):
        return getattr(__sx_builtins, name, None)

__sx_exec = __sx_get_builtin('exec')
__sx_globals = globals()
import traceback as __sx_traceback

__sx_import = __sx_get_builtin('__import__')
__sx_allowed_modules = {
    "json", "math", "statistics", "re", "itertools", "functools",
    "collections", "datetime", "decimal", "fractions", "io", "random",
    "string", "sys", "time", "traceback",
}

def __sx_safe_import(name, globals=None, locals=None, fromlist=(), level=0, _import=__sx_import):
    root = name.split('.')[0]
    if root not in __sx_allowed_modules:
        raise ImportError(f"import of '{root}' is blocked in this sandbox")
    return _import(name, globals, locals, fromlist, level)

__sx_safe_names = [
    "print", "len", "str", "int", "float", "list", "dict", "set", "tuple",
    "bool", "bytes", "bytearray", "complex", "frozenset", "type",
    "isinstance", "issubclass", "enumerate", "zip", "map", "filter",
    "sorted", "reversed", "min", "max", "sum", "abs", "round", "divmod",
    "pow", "chr", "ord", "hex", "bin", "oct", "repr", "ascii", "format",
    "hash", "id", "iter", "next", "range", "slice", "callable", "getattr",
    "setattr", "delattr", "hasattr", "dir", "any", "all", "object",
    "super", "property", "staticmethod", "classmethod", "BaseException",
    "Exception", "ArithmeticError", "AssertionError", "AttributeError",
    "FileNotFoundError", "ImportError", "IndexError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "NameError",
    "NotImplementedError", "OSError", "OverflowError", "RecursionError",
    "RuntimeError", "StopIteration", "SyntaxError", "SystemExit",
    "TimeoutError", "TypeError", "UnicodeError", "ValueError",
    "ZeroDivisionError", "Warning",
]
__sx_safe = {}
for __sx_name in __sx_safe_names:
    __sx_value = __sx_get_builtin(__sx_name)
    if __sx_value is not None:
        __sx_safe[__sx_name] = __sx_value
for __sx_name in ["input", "eval", "exec", "compile", "globals", "locals", "open", "vars", "breakpoint"]:
    __sx_safe[__sx_name] = None
__sx_safe['__import__'] = __sx_safe_import
__builtins__ = __sx_safe

def __sx_run(code):
    try:
        try:
            __sx_exec(code, __sx_globals)
            return ""
        except SyntaxError:
            __sx_traceback.print_exc()
            return "syntax"
        except TimeoutError:
            __sx_traceback.print_exc()
            return "timeout"
        except MemoryError:
            __sx_traceback.print_exc()
            return "memory"
        except BaseException:
            __sx_traceback.print_exc()
            return "runtime"
    finally:
        sys.settrace(None)
"#;

/// Restores the real streams and publishes the captured values after one
/// execution.
const POSTAMBLE: &str = r#"
import sys
sys.settrace(None)
sys.stdout = __sx_prev_stdout
sys.stderr = __sx_prev_stderr
__sx_stdout_value = __sx_stdout.getvalue()
__sx_stderr_value = __sx_stderr.getvalue()
"#;

pub struct PySandbox {
    interpreter: Interpreter,
    scope: Scope,
}

impl PySandbox {
    /// Build an interpreter with the frozen stdlib and run the lockdown.
    pub fn new() -> Result<Self, String> {
        let interpreter = Interpreter::with_init(Default::default(), |vm| {
            vm.add_native_modules(rustpython_stdlib::get_module_inits());
            vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
        });

        let scope = interpreter
            .enter(|vm: &vm::VirtualMachine| {
                let scope = vm.new_scope_with_builtins();
                vm.run_code_string(scope.clone(), LOCKDOWN, "<sandbox_init>".to_owned())?;
                Ok(scope)
            })
            .map_err(|err: vm::PyRef<PyBaseException>| {
                let repr = interpreter.enter(|vm| {
                    err.as_object()
                        .repr(vm)
                        .map(|s| s.as_str().to_owned())
                        .unwrap_or_else(|_| "<unreprable>".to_owned())
                });
                format!("interpreter init failed: {repr}")
            })?;

        Ok(PySandbox { interpreter, scope })
    }

    /// Execute one code string against the persistent scope.
    pub fn execute(&mut self, code: &str, limits: &ExecLimits) -> ExecOutputs {
        let scope = self.scope.clone();
        let started = Instant::now();
        let deadline_secs = limits.wall_timeout_ms as f64 / 1000.0;

        let preamble = format!(
            r#"import io, sys, time
__sx_prev_stdout = sys.stdout
__sx_prev_stderr = sys.stderr
__sx_stdout = io.StringIO()
__sx_stderr = io.StringIO()
sys.stdout = __sx_stdout
sys.stderr = __sx_stderr
__sx_deadline = time.time() + {deadline_secs}
def __sx_trace(frame, event, arg):
    if time.time() > __sx_deadline:
        sys.settrace(None)
        raise TimeoutError('execution wall timeout exceeded')
    return __sx_trace
sys.settrace(__sx_trace)
"#
        );

        let run = self
            .interpreter
            .enter(|vm: &vm::VirtualMachine| -> vm::PyResult<(String, String, String)> {
                vm.run_code_string(scope.clone(), &preamble, "<sandbox_preamble>".to_owned())?;
                scope
                    .globals
                    .set_item("__sx_code", vm.ctx.new_str(code).into(), vm)?;
                if let Err(exc) = vm.run_code_string(
                    scope.clone(),
                    "__sx_error_kind = __sx_run(__sx_code)\n",
                    "<sandbox_exec>".to_owned(),
                ) {
                    // The runner catches everything user code can raise;
                    // landing here means the harness itself broke. Surface
                    // the traceback through the captured stderr.
                    vm.print_exception(exc);
                    scope.globals.set_item(
                        "__sx_error_kind",
                        vm.ctx.new_str("runtime").into(),
                        vm,
                    )?;
                }
                vm.run_code_string(scope.clone(), POSTAMBLE, "<sandbox_postamble>".to_owned())?;

                let stdout = read_global_str(vm, &scope, "__sx_stdout_value");
                let stderr = read_global_str(vm, &scope, "__sx_stderr_value");
                let kind = read_global_str(vm, &scope, "__sx_error_kind");
                Ok((stdout, stderr, kind))
            });

        let duration_ms = started.elapsed().as_millis() as u64;
        match run {
            Ok((stdout, stderr, kind)) => {
                let mut error_kind = classify(&kind);
                let (stdout, out_cut) = truncate(stdout, limits.output_truncate_bytes);
                let (stderr, err_cut) = truncate(stderr, limits.output_truncate_bytes);
                if error_kind.is_none() && (out_cut || err_cut) {
                    error_kind = Some(ExecErrorKind::OutputOverflow);
                }
                ExecOutputs { stdout, stderr, duration_ms, error_kind }
            }
            Err(err) => ExecOutputs {
                stdout: String::new(),
                stderr: format!("sandbox harness failure: {err:?}"),
                duration_ms,
                error_kind: Some(ExecErrorKind::Runtime),
            },
        }
    }
}

fn classify(kind: &str) -> Option<ExecErrorKind> {
    match kind {
        "" => None,
        "syntax" => Some(ExecErrorKind::Syntax),
        "timeout" => Some(ExecErrorKind::Timeout),
        "memory" => Some(ExecErrorKind::Memory),
        _ => Some(ExecErrorKind::Runtime),
    }
}

fn truncate(mut text: String, cap: usize) -> (String, bool) {
    if text.len() <= cap {
        return (text, false);
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    (text, true)
}

fn read_global_str(vm: &vm::VirtualMachine, scope: &Scope, name: &str) -> String {
    scope
        .globals
        .get_item(name, vm)
        .ok()
        .and_then(|value| value.try_to_value::<String>(vm).ok())
        .unwrap_or_default()
}
