//! The Code Evaluator operation module (§4.6): compile-then-run, with
//! compile failures and run failures reported as distinct error tags.

use hostjs_core::{EngineContext, EngineError};
use hostjs_sys::JSContextGroupClearExecutionTimeLimit;

use crate::factory::Factory;
use crate::memory::MemoryMonitor;
use crate::value::{TypeTag, Value};

/// Run `script`, returning a tagged [`Value`] in every case — parse
/// failures, thrown exceptions, and terminated/timed-out scripts all come
/// back as error-tagged values, never as a Rust `Err` (§7).
///
/// # Safety
/// Must run on the isolate's owner thread.
pub unsafe fn run(ctx: &EngineContext, script: &str, source_url: &str, memory: &MemoryMonitor) -> Value {
    if let Err(e) = ctx.check_syntax(script, source_url) {
        return Value::exception(TypeTag::ParseException, &exception_summary(&e, script));
    }

    // Clear any abort armed by a prior `terminate_running` call so it can't
    // leak into this, unrelated, evaluation.
    // SAFETY: ctx.group() is valid for the isolate's lifetime; we're on the
    // owner thread.
    unsafe { JSContextGroupClearExecutionTimeLimit(ctx.group()) };

    match ctx.eval_with_source(script, source_url) {
        Ok(result) => unsafe { Factory::from_any(ctx.raw(), result.raw()) },
        Err(e) => classify_run_failure(&e, memory, script),
    }
}

/// On run failure, inspect causes in the order §4.6 mandates: a hard
/// memory-limit breach outranks everything else (even a JSC message that
/// also happens to mention termination), then an explicit termination
/// request, then a plain thrown/runtime error.
fn classify_run_failure(e: &EngineError, memory: &MemoryMonitor, script: &str) -> Value {
    if memory.is_hard_reached() {
        return Value::exception(TypeTag::OomException, "");
    }
    let has_terminated = e.to_string().contains("JavaScript execution terminated")
        || e.to_string().contains("Execution terminated");
    let tag = if has_terminated {
        TypeTag::TerminatedException
    } else {
        TypeTag::ExecuteException
    };
    Value::exception(tag, &exception_summary(e, script))
}

/// Build the exception summary text §4.4 mandates:
/// `"<script-name>:<line>: <exception-string>\n<source-line>\n<caret-underline>\n\n<stack-trace>\n"`,
/// a wasm-frame variant when the topmost stack frame is a wasm frame, and a
/// bare `"<exception-string>\n"` fallback when the engine gave no location.
fn exception_summary(e: &EngineError, script: &str) -> String {
    let (error_type, message, file, line, column, stack) = match e {
        EngineError::ScriptError {
            error_type,
            message,
            file,
            line,
            column,
            stack,
        } => (
            error_type.as_str(),
            message.as_str(),
            file.clone(),
            *line,
            *column,
            stack.clone(),
        ),
        EngineError::SyntaxError {
            message,
            file,
            line,
            column,
        } => ("SyntaxError", message.as_str(), file.clone(), *line, *column, None),
        _ => return format!("{e}\n"),
    };

    let exception_string = format!("{error_type}: {message}");

    if let Some(frame) = stack.as_deref().and_then(first_wasm_frame) {
        return format!("{frame}: {exception_string}\n");
    }

    let (Some(file), Some(line)) = (file, line) else {
        return format!("{exception_string}\n");
    };

    let source_line = script
        .lines()
        .nth((line as usize).saturating_sub(1))
        .unwrap_or("");
    // Only a single column, never a range, is ever available from the
    // engine (see `hostjs_core::value::extract_error_object`), so the caret
    // is always exactly one character wide.
    let caret_col = column.map(|c| c.saturating_sub(1)).unwrap_or(0) as usize;
    let underline = format!("{}^", " ".repeat(caret_col));
    let stack_trace = stack.unwrap_or_default();

    format!("{file}:{line}: {exception_string}\n{source_line}\n{underline}\n\n{stack_trace}\n")
}

/// The topmost stack frame, if it names a wasm function (`wasm-function[N]:0xOFFSET`).
fn first_wasm_frame(stack: &str) -> Option<&str> {
    let first = stack.lines().next()?.trim();
    first.starts_with("wasm-function[").then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueData;

    #[test]
    fn syntax_error_is_tagged_parse_exception() {
        let ctx = EngineContext::new().unwrap();
        let mem = MemoryMonitor::new();
        let v = unsafe { run(&ctx, "1 +", "<anonymous>", &mem) };
        assert_eq!(v.handle.tag, TypeTag::ParseException);
        assert!(matches!(v.data, ValueData::InlineBytes(_)));
    }

    #[test]
    fn thrown_error_is_tagged_execute_exception() {
        let ctx = EngineContext::new().unwrap();
        let mem = MemoryMonitor::new();
        let v = unsafe { run(&ctx, "throw new Error('boom')", "<anonymous>", &mem) };
        assert_eq!(v.handle.tag, TypeTag::ExecuteException);
    }

    #[test]
    fn successful_eval_yields_integer() {
        let ctx = EngineContext::new().unwrap();
        let mem = MemoryMonitor::new();
        let v = unsafe { run(&ctx, "21 * 2", "<anonymous>", &mem) };
        assert_eq!(v.handle.tag, TypeTag::Integer);
    }

    fn exception_text(v: &Value) -> String {
        match &v.data {
            ValueData::InlineBytes(bytes) => {
                String::from_utf8_lossy(&bytes[..bytes.len().saturating_sub(1)]).into_owned()
            }
            _ => panic!("expected an InlineBytes exception payload"),
        }
    }

    #[test]
    fn hard_reached_outranks_message_content_and_carries_no_message() {
        let ctx = EngineContext::new().unwrap();
        let mem = MemoryMonitor::new();
        mem.set_hard_limit(1);
        mem.sample();
        let v = unsafe { run(&ctx, "throw new Error('boom')", "<anonymous>", &mem) };
        assert_eq!(v.handle.tag, TypeTag::OomException);
        assert_eq!(exception_text(&v), "");
    }

    #[test]
    fn exception_summary_includes_source_line_and_caret() {
        let ctx = EngineContext::new().unwrap();
        let mem = MemoryMonitor::new();
        let script = "const x = 1;\nthrow new Error('boom');\n";
        let v = unsafe { run(&ctx, script, "<anonymous>", &mem) };
        let text = exception_text(&v);
        assert!(text.contains("boom"));
        assert!(text.contains("throw new Error"));
        assert!(text.contains('^'));
    }
}
