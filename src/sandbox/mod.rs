// Restricted script executor
//
// Runs untrusted JavaScript snippets in a fresh `boa_engine` context per
// call. The engine exposes no filesystem, network, or process bindings;
// the only names a script sees beyond the ECMAScript builtins come from a
// fixed prelude (captured print/console plus math helpers). This is a
// capability restriction, not a security boundary: hostile code that needs
// real isolation belongs in a separate worker process with OS resource
// limits.
//
// The wall-clock timeout waits on a blocking worker and abandons it at the
// deadline. Cooperative cancellation cannot force-kill the worker thread;
// the engine's loop-iteration and recursion limits bound how long an
// abandoned worker can keep spinning. No process-global timer state is
// involved, so one timed-out call cannot corrupt the next.

use std::time::Duration;

use boa_engine::{Context, JsError, JsValue, Source};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task;
use tokio::time;
use tracing::{debug, warn};

/// Status marker for a successful execution.
pub const STATUS_DONE: &str = "Done";

/// Names pre-bound into every session, evaluated before the user code.
const PRELUDE: &str = r#"
const __out = [];
function __show(v) {
    if (typeof v === "string") return v;
    try {
        const s = JSON.stringify(v);
        if (s !== undefined) return s;
    } catch (_e) {}
    return String(v);
}
function print(...args) { __out.push(args.map(__show).join(" ")); }
const console = { log: print, info: print, warn: print, error: print };
const stats = {
    mean(xs) { return xs.reduce((a, x) => a + x, 0) / xs.length; },
    median(xs) {
        const s = [...xs].sort((a, b) => a - b);
        const m = Math.floor(s.length / 2);
        return s.length % 2 ? s[m] : (s[m - 1] + s[m]) / 2;
    },
    variance(xs) {
        const m = this.mean(xs);
        return xs.reduce((a, x) => a + (x - m) * (x - m), 0) / (xs.length - 1);
    },
    std(xs) { return Math.sqrt(this.variance(xs)); },
};
function range(n) { return Array.from({ length: n }, (_, i) => i); }
function linspace(a, b, n) {
    const step = (b - a) / (n - 1);
    return Array.from({ length: n }, (_, i) => a + step * i);
}
function zeros(n) { return new Array(n).fill(0); }
function sum(xs) { return xs.reduce((a, x) => a + x, 0); }
function factorial(n) { let r = 1; for (let i = 2; i <= n; i += 1) r *= i; return r; }
function gcd(a, b) {
    a = Math.abs(a); b = Math.abs(b);
    while (b) { [a, b] = [b, a % b]; }
    return a;
}
function binomial(n, k) {
    if (k < 0 || k > n) return 0;
    let r = 1;
    for (let i = 1; i <= k; i += 1) r = (r * (n - i + 1)) / i;
    return r;
}
"#;

/// Capabilities rejected by the static pre-scan, before anything runs.
static BLOCKED: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bprompt\s*\(", "prompt()"),
        (r"\breadline\s*\(", "readline()"),
        (r"\bopen\s*\(", "open()"),
        (r"\brequire\s*\(", "require()"),
        (r"\bimport\s*\(", "import()"),
        (r"\beval\s*\(", "eval()"),
        (r"\bFunction\s*\(", "Function()"),
        (r"\bfetch\s*\(", "fetch()"),
        (r"\bXMLHttpRequest\b", "XMLHttpRequest"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).unwrap(), name))
    .collect()
});

/// Lines starting with one of these are executed as statements rather than
/// auto-echoed as a final expression.
const STATEMENT_KEYWORDS: &[&str] = &[
    "let", "const", "var", "function", "class", "if", "for", "while", "do", "switch", "try",
    "return", "throw", "break", "continue", "import", "export", "async", "print", "console",
];

/// One-shot script executor. Every `run` call builds a fresh, isolated
/// binding namespace; nothing survives between calls.
#[derive(Debug, Clone)]
pub struct ScriptSandbox {
    timeout: Duration,
    max_output: usize,
}

impl ScriptSandbox {
    pub fn new(timeout: Duration, max_output: usize) -> Self {
        Self {
            timeout,
            max_output,
        }
    }

    /// Execute `code` and return `(output, status)`.
    ///
    /// `status` is [`STATUS_DONE`] on success, otherwise a one-line failure
    /// description. A timeout always reports failure; captured output from
    /// an interrupted run is discarded rather than returned as partial
    /// success.
    pub async fn run(&self, code: &str) -> (String, String) {
        if let Some(blocked) = scan_blocked(code) {
            debug!(%blocked, "sandbox rejected code in static scan");
            return (
                String::new(),
                format!("{} is not allowed in the sandbox", blocked),
            );
        }

        let code = code.trim().to_string();
        if code.is_empty() {
            return (String::new(), STATUS_DONE.to_string());
        }

        let max_output = self.max_output;
        let worker = task::spawn_blocking(move || execute(&code, max_output));

        match time::timeout(self.timeout, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => (
                String::new(),
                format!("sandbox worker failed: {}", join_error),
            ),
            Err(_) => {
                warn!(timeout = ?self.timeout, "sandbox execution timed out; worker abandoned");
                (
                    String::new(),
                    format!("execution timed out after {:?}", self.timeout),
                )
            }
        }
    }
}

fn scan_blocked(code: &str) -> Option<&'static str> {
    BLOCKED
        .iter()
        .find(|(pattern, _)| pattern.is_match(code))
        .map(|(_, name)| *name)
}

fn execute(code: &str, max_output: usize) -> (String, String) {
    let mut context = match fresh_context() {
        Ok(context) => context,
        Err(status) => return (String::new(), status),
    };

    let lines: Vec<&str> = code.lines().collect();
    let last = lines.last().copied().unwrap_or_default().trim();

    let mut echoed: Option<String> = None;
    let outcome: Result<(), String> = if !is_statement_line(last) {
        let head = lines[..lines.len() - 1].join("\n");
        let head_result = if head.trim().is_empty() {
            Ok(JsValue::undefined())
        } else {
            context.eval(Source::from_bytes(head.as_bytes()))
        };
        match head_result {
            Err(err) => Err(one_line(&err)),
            Ok(_) => match context.eval(Source::from_bytes(last.as_bytes())) {
                Ok(value) => {
                    echoed = render_value(&value);
                    Ok(())
                }
                Err(err) if is_syntax_error(&err) => {
                    // The final line is not an expression after all: run
                    // the whole block as statements in a clean namespace.
                    match fresh_context() {
                        Ok(mut rebuilt) => {
                            let result = rebuilt
                                .eval(Source::from_bytes(code.as_bytes()))
                                .map(|_| ())
                                .map_err(|err| one_line(&err));
                            context = rebuilt;
                            result
                        }
                        Err(status) => Err(status),
                    }
                }
                Err(err) => Err(one_line(&err)),
            },
        }
    } else {
        context
            .eval(Source::from_bytes(code.as_bytes()))
            .map(|_| ())
            .map_err(|err| one_line(&err))
    };

    if let Err(status) = outcome {
        return (String::new(), status);
    }

    let mut output = captured_output(&mut context);
    if let Some(value) = echoed {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&value);
    }

    (truncate_middle(&output, max_output), STATUS_DONE.to_string())
}

fn fresh_context() -> Result<Context, String> {
    let mut context = Context::default();
    context.runtime_limits_mut().set_loop_iteration_limit(5_000_000);
    context.runtime_limits_mut().set_recursion_limit(512);
    context
        .eval(Source::from_bytes(PRELUDE))
        .map_err(|err| format!("sandbox prelude failed: {}", one_line(&err)))?;
    Ok(context)
}

fn captured_output(context: &mut Context) -> String {
    match context.eval(Source::from_bytes("__out.join(\"\\n\")")) {
        Ok(value) => match value.to_string(context) {
            Ok(s) => s.to_std_string_escaped(),
            Err(_) => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// Render a final-expression value for the REPL-style echo. `undefined`
/// and `null` are suppressed; strings print without quotes.
fn render_value(value: &JsValue) -> Option<String> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    if let Some(s) = value.as_string() {
        return Some(s.to_std_string_escaped());
    }
    Some(value.display().to_string())
}

fn is_statement_line(line: &str) -> bool {
    if line.is_empty()
        || line.starts_with("//")
        || line.starts_with("/*")
        || line.starts_with('}')
        || line.starts_with(')')
        || line.starts_with(']')
    {
        return true;
    }
    STATEMENT_KEYWORDS.iter().any(|kw| {
        line.starts_with(kw)
            && line[kw.len()..]
                .chars()
                .next()
                .map(|c| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(true)
    })
}

fn is_syntax_error(err: &JsError) -> bool {
    err.to_string().contains("SyntaxError")
}

/// Innermost failure message, collapsed to a single line.
fn one_line(err: &JsError) -> String {
    let text = err.to_string();
    text.lines().next().unwrap_or("unknown error").to_string()
}

/// Middle truncation: keep a prefix and suffix with a visible marker, so
/// very large results stay informative without unbounded payloads.
fn truncate_middle(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let half = max / 2;
    let head_end = floor_char_boundary(s, half);
    let tail_start = ceil_char_boundary(s, s.len() - half);
    format!(
        "{}\n...[truncated]...\n{}",
        &s[..head_end],
        &s[tail_start..]
    )
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> ScriptSandbox {
        ScriptSandbox::new(Duration::from_secs(5), 2000)
    }

    #[tokio::test]
    async fn test_print_arithmetic() {
        let (output, status) = sandbox().run("print(2+3)").await;
        assert_eq!(status, STATUS_DONE);
        assert!(output.contains('5'), "output was {:?}", output);
    }

    #[tokio::test]
    async fn test_last_expression_is_echoed() {
        let (output, status) = sandbox().run("const x = 6\nx * 7").await;
        assert_eq!(status, STATUS_DONE);
        assert_eq!(output, "42");
    }

    #[tokio::test]
    async fn test_statement_final_line_is_not_echoed() {
        let (output, status) = sandbox().run("let y = 10\nprint(y)\nlet z = 1").await;
        assert_eq!(status, STATUS_DONE);
        assert_eq!(output, "10");
    }

    #[tokio::test]
    async fn test_prelude_helpers_available() {
        let (output, status) = sandbox()
            .run("print(stats.mean([1, 2, 3]), factorial(5), gcd(12, 18))")
            .await;
        assert_eq!(status, STATUS_DONE);
        assert_eq!(output, "2 120 6");
    }

    #[tokio::test]
    async fn test_prompt_is_blocked_before_execution() {
        let (output, status) = sandbox().run("const x = prompt('>')").await;
        assert_ne!(status, STATUS_DONE);
        assert!(status.contains("prompt()"));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_open_is_blocked() {
        let (_, status) = sandbox().run("open('/etc/passwd')").await;
        assert_ne!(status, STATUS_DONE);
        assert!(status.contains("open()"));
    }

    #[tokio::test]
    async fn test_runtime_error_reported_as_one_line() {
        let (output, status) = sandbox().run("missingFunction()").await;
        assert_ne!(status, STATUS_DONE);
        assert!(!status.contains('\n'));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_infinite_loop_does_not_hang() {
        let quick = ScriptSandbox::new(Duration::from_secs(1), 2000);
        let started = std::time::Instant::now();
        let (_, status) = quick.run("while (true) {}").await;
        assert_ne!(status, STATUS_DONE);
        assert!(started.elapsed() < Duration::from_secs(10));

        // A subsequent independent call works normally
        let (output, status) = quick.run("print(1 + 1)").await;
        assert_eq!(status, STATUS_DONE);
        assert!(output.contains('2'));
    }

    #[tokio::test]
    async fn test_no_state_leaks_between_calls() {
        let sandbox = sandbox();
        let (_, status) = sandbox.run("globalThis.leak = 5").await;
        assert_eq!(status, STATUS_DONE);
        let (_, status) = sandbox.run("leak + 1").await;
        assert_ne!(status, STATUS_DONE);
    }

    #[tokio::test]
    async fn test_output_truncated_in_the_middle() {
        let tight = ScriptSandbox::new(Duration::from_secs(5), 100);
        let code = "for (let i = 0; i < 50; i += 1) print(\"xxxxxxxxxx\")";
        let (output, status) = tight.run(code).await;
        assert_eq!(status, STATUS_DONE);
        assert!(output.contains("...[truncated]..."));
        assert!(output.len() < 200);
    }

    #[tokio::test]
    async fn test_empty_code_is_done() {
        let (output, status) = sandbox().run("   ").await;
        assert_eq!(status, STATUS_DONE);
        assert!(output.is_empty());
    }

    #[test]
    fn test_statement_line_detection() {
        assert!(is_statement_line("let x = 5"));
        assert!(is_statement_line("print(x)"));
        assert!(is_statement_line("// comment"));
        assert!(is_statement_line("}"));
        assert!(!is_statement_line("x * 7"));
        assert!(!is_statement_line("lettuce + 1"));
    }

    #[test]
    fn test_truncate_middle_keeps_prefix_and_suffix() {
        let s = "a".repeat(60) + &"b".repeat(60);
        let out = truncate_middle(&s, 40);
        assert!(out.starts_with("aaaa"));
        assert!(out.ends_with("bbbb"));
        assert!(out.contains("...[truncated]..."));
    }
}
