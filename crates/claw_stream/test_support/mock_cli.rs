//! Mock CLI binary for integration testing
//!
//! Accepts the same arguments as the real `claude` CLI in stream-json mode and
//! writes canned NDJSON to stdout. Behaviour is driven by environment variables,
//! which tests pass through `QueryOptions::env`:
//!
//! | Variable                  | Effect                                                     |
//! |---------------------------|------------------------------------------------------------|
//! | `MOCK_CLI_FIXTURE`        | Replay this file line by line (verbatim, noise included)   |
//! | `MOCK_CLI_DELAY_MS`       | Delay between lines (default: 5)                           |
//! | `MOCK_CLI_OVERSIZED_BYTES`| Emit one JSON line of this many bytes before the fixture   |
//! | `MOCK_CLI_ECHO`           | Emit a `system/mock_echo` message with args, env and cwd   |
//! | `MOCK_CLI_STDERR`         | Write this text to stderr                                  |
//! | `MOCK_CLI_CLOSE_STDIO`    | Close stdout and stderr after the output, before hanging   |
//! | `MOCK_CLI_HANG_MS`        | Sleep this long after the output before exiting            |
//! | `MOCK_CLI_IGNORE_SIGINT`  | Ignore SIGINT so only SIGKILL stops the process            |
//! | `MOCK_CLI_EXIT_CODE`      | Exit with this code (default: 0)                           |
//!
//! Without a fixture the mock answers the prompt with an init message, an
//! assistant echo and a success result.
//!
//! # Special Flags
//!
//! - `--version` → print version and exit
//! - `--help` → print help text and exit

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

const VERSION: &str = "2.0.0 (Mock Claude Code)";
const HELP_TEXT: &str = r#"mock_cli - Mock Claude CLI for integration testing

USAGE:
    mock_cli --output-format stream-json --verbose [FLAGS] --print <PROMPT>

See the module docs for the MOCK_CLI_* environment variables.
"#;

/// Flags the real CLI accepts with a value
const VALUE_FLAGS: &[&str] = &[
    "--system-prompt",
    "--append-system-prompt",
    "--allowedTools",
    "--max-turns",
    "--disallowedTools",
    "--model",
    "--permission-prompt-tool",
    "--permission-mode",
    "--resume",
    "--mcp-config",
];

struct CliArgs {
    raw: Vec<String>,
    prompt: String,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let raw: Vec<String> = env::args().skip(1).collect();

        if raw.iter().any(|a| a == "--version") {
            println!("{}", VERSION);
            process::exit(0);
        }
        if raw.iter().any(|a| a == "--help") {
            println!("{}", HELP_TEXT);
            process::exit(0);
        }

        let head: Vec<&str> = raw.iter().take(3).map(String::as_str).collect();
        if head != ["--output-format", "stream-json", "--verbose"] {
            return Err(format!("Expected stream-json preamble, got: {:?}", head));
        }

        let mut prompt = None;
        let mut i = 3;
        while i < raw.len() {
            let arg = raw[i].as_str();
            if arg == "--print" {
                if i + 2 != raw.len() {
                    return Err("--print <prompt> must come last".to_string());
                }
                prompt = Some(raw[i + 1].clone());
                break;
            } else if arg == "--continue" {
                i += 1;
            } else if VALUE_FLAGS.contains(&arg) {
                if i + 1 >= raw.len() {
                    return Err(format!("Missing value for {}", arg));
                }
                i += 2;
            } else {
                return Err(format!("Unknown argument: {}", arg));
            }
        }

        let prompt = prompt.ok_or_else(|| "Missing --print <prompt>".to_string())?;
        Ok(CliArgs { raw, prompt })
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, String> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid {}: {}", name, value)),
        Err(_) => Ok(None),
    }
}

fn default_conversation(prompt: &str) -> Vec<String> {
    vec![
        serde_json::json!({"type": "system", "subtype": "init", "session_id": "sess_mock"}).to_string(),
        serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": format!("You said: {prompt}")}]}
        })
        .to_string(),
        serde_json::json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 12,
            "duration_api_ms": 8,
            "is_error": false,
            "num_turns": 1,
            "session_id": "sess_mock"
        })
        .to_string(),
    ]
}

fn echo_message(args: &CliArgs) -> String {
    let env_of = |key: &str| env::var(key).ok();
    serde_json::json!({
        "type": "system",
        "subtype": "mock_echo",
        "args": args.raw,
        "prompt": args.prompt,
        "env": {
            "CLAUDE_CODE_ENTRYPOINT": env_of("CLAUDE_CODE_ENTRYPOINT"),
            "FORCE_COLOR": env_of("FORCE_COLOR"),
            "NODE_ENV": env_of("NODE_ENV"),
            "MOCK_CLI_CUSTOM": env_of("MOCK_CLI_CUSTOM"),
        },
        "cwd": env::current_dir().ok().map(|p| p.display().to_string()),
    })
    .to_string()
}

fn oversized_line(bytes: usize) -> String {
    let prefix = r#"{"type":"assistant","message":{"content":[{"type":"text","text":""#;
    let suffix = r#""}]}}"#;
    let fill = bytes.saturating_sub(prefix.len() + suffix.len());
    format!("{prefix}{}{suffix}", "x".repeat(fill))
}

/// Write lines to stdout, flushing each (NDJSON consumers read line by line)
fn replay(lines: &[String], delay_ms: u64) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    for line in lines {
        writeln!(handle, "{}", line)?;
        handle.flush()?;

        if delay_ms > 0 {
            thread::sleep(Duration::from_millis(delay_ms));
        }
    }

    Ok(())
}

#[cfg(unix)]
fn ignore_sigint() {
    use nix::sys::signal::{signal, SigHandler, Signal};

    // SAFETY: installs SIG_IGN before any other thread exists.
    if let Err(err) = unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) } {
        eprintln!("ERROR: Failed to ignore SIGINT: {}", err);
        process::exit(1);
    }
}

#[cfg(not(unix))]
fn ignore_sigint() {}

#[cfg(unix)]
fn close_stdio() {
    // Both pipes reach EOF while the process keeps running
    let _ = nix::unistd::close(1);
    let _ = nix::unistd::close(2);
}

#[cfg(not(unix))]
fn close_stdio() {}

fn run() -> Result<i32, String> {
    let args = CliArgs::parse()?;

    if env::var_os("MOCK_CLI_IGNORE_SIGINT").is_some() {
        ignore_sigint();
    }

    let delay_ms = env_u64("MOCK_CLI_DELAY_MS")?.unwrap_or(5);
    let exit_code = env_u64("MOCK_CLI_EXIT_CODE")?.unwrap_or(0) as i32;

    let mut lines = Vec::new();
    if env::var_os("MOCK_CLI_ECHO").is_some() {
        lines.push(echo_message(&args));
    }
    if let Some(bytes) = env_u64("MOCK_CLI_OVERSIZED_BYTES")? {
        lines.push(oversized_line(bytes as usize));
    }
    match env::var_os("MOCK_CLI_FIXTURE") {
        Some(path) => {
            let path = PathBuf::from(path);
            let content = fs::read_to_string(&path)
                .map_err(|e| format!("Failed to load fixture {}: {}", path.display(), e))?;
            lines.extend(content.lines().map(str::to_string));
        }
        None => lines.extend(default_conversation(&args.prompt)),
    }

    if let Ok(text) = env::var("MOCK_CLI_STDERR") {
        eprint!("{}", text);
    }

    if let Err(err) = replay(&lines, delay_ms) {
        // Broken pipe is OK (client disconnected)
        if err.kind() != io::ErrorKind::BrokenPipe {
            return Err(format!("Failed to replay output: {}", err));
        }
    }

    let hang_ms = env_u64("MOCK_CLI_HANG_MS")?;
    if env::var_os("MOCK_CLI_CLOSE_STDIO").is_some() {
        close_stdio();
    }

    if let Some(hang_ms) = hang_ms {
        thread::sleep(Duration::from_millis(hang_ms));
    }

    Ok(exit_code)
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("ERROR: {}", err);
            process::exit(2);
        }
    }
}
