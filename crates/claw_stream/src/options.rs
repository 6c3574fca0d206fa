//! Query configuration and CLI argument construction
//!
//! [`QueryOptions`] is the read-only record a caller supplies for one query.
//! The transport only borrows it: [`QueryOptions::to_cli_args`] turns it into the
//! CLI's argument vector, and `cwd`, `cli_path` and `env` shape the spawned process.
//!
//! # Example
//!
//! ```
//! use claw_stream::options::{PermissionMode, QueryOptions};
//!
//! let options = QueryOptions::builder()
//!     .allowed_tools(vec!["Read".to_string(), "Bash".to_string()])
//!     .permission_mode(PermissionMode::AcceptEdits)
//!     .max_turns(5)
//!     .model("claude-sonnet-4")
//!     .build();
//!
//! let args = options.to_cli_args("What changed?");
//! assert_eq!(&args[..3], ["--output-format", "stream-json", "--verbose"]);
//! assert_eq!(&args[args.len() - 2..], ["--print", "What changed?"]);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Permission mode for tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Standard permission prompts
    Default,
    /// Accept file edits without prompting
    AcceptEdits,
    /// Bypass all permission checks (sandboxes only)
    BypassPermissions,
}

impl PermissionMode {
    /// Convert to CLI argument format (camelCase, matching CLI's allowed choices)
    pub fn to_cli_arg(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

/// MCP server definition passed through `--mcp-config`
///
/// Stdio servers use `command`/`args`/`env`; `sse` and `http` servers use
/// `url`/`headers`. Empty fields are left out of the JSON.
///
/// # Example
///
/// ```
/// use claw_stream::options::McpServerConfig;
///
/// let server = McpServerConfig::stdio("npx", vec!["-y".into(), "@modelcontextprotocol/server-filesystem".into()]);
/// let json = serde_json::to_value(&server).unwrap();
/// assert_eq!(json["type"], "stdio");
/// assert!(json.get("url").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Connection type: `stdio`, `sse` or `http`
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub server_type: String,
    /// Executable for stdio servers
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    /// Arguments for stdio servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment for stdio servers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Endpoint for remote servers
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// HTTP headers for remote servers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl McpServerConfig {
    /// A stdio server launched with `command args...`
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            server_type: "stdio".to_string(),
            command: command.into(),
            args,
            ..Self::default()
        }
    }

    /// A remote server of the given type (`sse` or `http`)
    pub fn remote(server_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            server_type: server_type.into(),
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Configuration for a single query
///
/// Zero values mean "not set": empty strings and lists, `max_turns == 0` and
/// `None` emit no flag.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    // Prompt & behavior
    /// Replacement system prompt
    pub system_prompt: String,
    /// Additional text to append to the system prompt
    pub append_system_prompt: String,
    /// Maximum conversation turns (0 = CLI default)
    pub max_turns: u32,
    /// Model identifier (e.g., "claude-sonnet-4")
    pub model: String,

    // Tools & permissions
    /// Tools to explicitly allow
    pub allowed_tools: Vec<String>,
    /// Tools to explicitly disallow
    pub disallowed_tools: Vec<String>,
    /// MCP tool that answers permission prompts
    pub permission_prompt_tool_name: String,
    /// Permission mode for tool execution
    pub permission_mode: Option<PermissionMode>,

    // MCP
    /// MCP server definitions keyed by server name
    pub mcp_servers: HashMap<String, McpServerConfig>,

    // Session
    /// Continue the most recent conversation
    pub continue_conversation: bool,
    /// Session ID to resume
    pub resume: String,

    // Environment
    /// Working directory; must exist when the query starts
    pub cwd: Option<PathBuf>,
    /// Claude CLI executable path (discovered when unset)
    pub cli_path: Option<PathBuf>,
    /// Extra environment variables for the CLI process
    pub env: HashMap<String, String>,
}

impl QueryOptions {
    /// Create a new options builder
    pub fn builder() -> QueryOptionsBuilder {
        QueryOptionsBuilder::default()
    }

    /// Convert options to Claude CLI arguments
    ///
    /// Flag order is fixed; the prompt is always last, after `--print`.
    pub fn to_cli_args(&self, prompt: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
        ];

        if !self.system_prompt.is_empty() {
            args.push("--system-prompt".to_string());
            args.push(self.system_prompt.clone());
        }

        if !self.append_system_prompt.is_empty() {
            args.push("--append-system-prompt".to_string());
            args.push(self.append_system_prompt.clone());
        }

        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.allowed_tools.join(","));
        }

        if self.max_turns > 0 {
            args.push("--max-turns".to_string());
            args.push(self.max_turns.to_string());
        }

        if !self.disallowed_tools.is_empty() {
            args.push("--disallowedTools".to_string());
            args.push(self.disallowed_tools.join(","));
        }

        if !self.model.is_empty() {
            args.push("--model".to_string());
            args.push(self.model.clone());
        }

        if !self.permission_prompt_tool_name.is_empty() {
            args.push("--permission-prompt-tool".to_string());
            args.push(self.permission_prompt_tool_name.clone());
        }

        if let Some(mode) = self.permission_mode {
            args.push("--permission-mode".to_string());
            args.push(mode.to_cli_arg().to_string());
        }

        if self.continue_conversation {
            args.push("--continue".to_string());
        }

        if !self.resume.is_empty() {
            args.push("--resume".to_string());
            args.push(self.resume.clone());
        }

        if !self.mcp_servers.is_empty() {
            args.push("--mcp-config".to_string());
            args.push(self.mcp_config_json());
        }

        args.push("--print".to_string());
        args.push(prompt.to_string());

        args
    }

    /// The `--mcp-config` payload: `{"mcpServers": {name: config, ...}}`
    pub fn mcp_config_json(&self) -> String {
        serde_json::json!({ "mcpServers": self.mcp_servers }).to_string()
    }
}

/// Builder for [`QueryOptions`]
///
/// # Example
///
/// ```
/// use claw_stream::options::{PermissionMode, QueryOptions};
///
/// let options = QueryOptions::builder()
///     .max_turns(5)
///     .model("claude-sonnet-4")
///     .permission_mode(PermissionMode::AcceptEdits)
///     .build();
/// assert_eq!(options.max_turns, 5);
/// ```
#[derive(Debug, Default)]
pub struct QueryOptionsBuilder {
    inner: QueryOptions,
}

impl QueryOptionsBuilder {
    /// Set the replacement system prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner.system_prompt = prompt.into();
        self
    }

    /// Set text to append to the system prompt
    pub fn append_system_prompt(mut self, text: impl Into<String>) -> Self {
        self.inner.append_system_prompt = text.into();
        self
    }

    /// Set maximum conversation turns
    pub fn max_turns(mut self, turns: u32) -> Self {
        self.inner.max_turns = turns;
        self
    }

    /// Set model identifier
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.inner.model = model.into();
        self
    }

    /// Set allowed tools
    pub fn allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.inner.allowed_tools = tools;
        self
    }

    /// Set disallowed tools
    pub fn disallowed_tools(mut self, tools: Vec<String>) -> Self {
        self.inner.disallowed_tools = tools;
        self
    }

    /// Set the permission prompt tool
    pub fn permission_prompt_tool_name(mut self, tool: impl Into<String>) -> Self {
        self.inner.permission_prompt_tool_name = tool.into();
        self
    }

    /// Set permission mode
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.inner.permission_mode = Some(mode);
        self
    }

    /// Set MCP servers
    pub fn mcp_servers(mut self, servers: HashMap<String, McpServerConfig>) -> Self {
        self.inner.mcp_servers = servers;
        self
    }

    /// Add a single MCP server
    pub fn mcp_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.inner.mcp_servers.insert(name.into(), server);
        self
    }

    /// Continue the most recent conversation
    pub fn continue_conversation(mut self, enable: bool) -> Self {
        self.inner.continue_conversation = enable;
        self
    }

    /// Set session ID to resume
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.inner.resume = session_id.into();
        self
    }

    /// Set working directory
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.cwd = Some(path.into());
        self
    }

    /// Set Claude CLI executable path
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.cli_path = Some(path.into());
        self
    }

    /// Set environment variables
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.inner.env = env;
        self
    }

    /// Add a single environment variable
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.env.insert(key.into(), value.into());
        self
    }

    /// Build the options
    pub fn build(self) -> QueryOptions {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let opts = QueryOptions::builder().build();
        assert_eq!(opts.max_turns, 0);
        assert!(opts.model.is_empty());
        assert!(opts.allowed_tools.is_empty());
        assert!(opts.disallowed_tools.is_empty());
        assert!(opts.mcp_servers.is_empty());
        assert!(opts.permission_mode.is_none());
        assert!(!opts.continue_conversation);
        assert!(opts.cwd.is_none());
        assert!(opts.cli_path.is_none());
    }

    #[test]
    fn test_to_cli_args_minimal() {
        let args = QueryOptions::default().to_cli_args("test prompt");
        assert_eq!(
            args,
            vec!["--output-format", "stream-json", "--verbose", "--print", "test prompt"]
        );
    }

    #[test]
    fn test_to_cli_args_full_order() {
        let opts = QueryOptions::builder()
            .system_prompt("You are terse")
            .append_system_prompt("Answer in French")
            .allowed_tools(vec!["Read".to_string(), "Bash".to_string()])
            .max_turns(3)
            .disallowed_tools(vec!["Edit".to_string(), "Write".to_string()])
            .model("claude-opus-4")
            .permission_prompt_tool_name("mcp__auth__approve")
            .permission_mode(PermissionMode::BypassPermissions)
            .continue_conversation(true)
            .resume("sess-123")
            .build();

        let args = opts.to_cli_args("go");
        assert_eq!(
            args,
            vec![
                "--output-format",
                "stream-json",
                "--verbose",
                "--system-prompt",
                "You are terse",
                "--append-system-prompt",
                "Answer in French",
                "--allowedTools",
                "Read,Bash",
                "--max-turns",
                "3",
                "--disallowedTools",
                "Edit,Write",
                "--model",
                "claude-opus-4",
                "--permission-prompt-tool",
                "mcp__auth__approve",
                "--permission-mode",
                "bypassPermissions",
                "--continue",
                "--resume",
                "sess-123",
                "--print",
                "go",
            ]
        );
    }

    #[test]
    fn test_to_cli_args_every_flag_carries_its_value() {
        let opts = QueryOptions::builder()
            .model("claude-sonnet-4")
            .permission_mode(PermissionMode::AcceptEdits)
            .continue_conversation(true)
            .resume("sess-9")
            .mcp_server("fs", McpServerConfig::stdio("npx", Vec::new()))
            .build();

        let args = opts.to_cli_args("go");
        let tail = &args[3..args.len() - 2];
        let mut pairs = Vec::new();
        let mut i = 0;
        while i < tail.len() {
            if tail[i] == "--continue" {
                pairs.push((tail[i].as_str(), None));
                i += 1;
            } else {
                assert!(!tail[i + 1].starts_with("--"), "{} has no value", tail[i]);
                pairs.push((tail[i].as_str(), Some(tail[i + 1].as_str())));
                i += 2;
            }
        }

        let names: Vec<&str> = pairs.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["--model", "--permission-mode", "--continue", "--resume", "--mcp-config"]
        );
        assert_eq!(pairs[3].1, Some("sess-9"));
        assert_eq!(pairs[4].1, Some(opts.mcp_config_json().as_str()));
        assert_eq!(&args[args.len() - 2..], ["--print", "go"]);
    }

    #[test]
    fn test_to_cli_args_zero_values_emit_nothing() {
        let opts = QueryOptions::builder()
            .max_turns(0)
            .model("")
            .continue_conversation(false)
            .build();
        let args = opts.to_cli_args("p");
        assert!(!args.contains(&"--max-turns".to_string()));
        assert!(!args.contains(&"--model".to_string()));
        assert!(!args.contains(&"--continue".to_string()));
    }

    #[test]
    fn test_to_cli_args_mcp_config() {
        let mut env = HashMap::new();
        env.insert("ROOT".to_string(), "/srv".to_string());
        let mut fs = McpServerConfig::stdio("npx", vec!["fs-server".to_string()]);
        fs.env = env;

        let opts = QueryOptions::builder()
            .mcp_server("filesystem", fs)
            .mcp_server("remote", McpServerConfig::remote("sse", "https://mcp.example.com/sse"))
            .build();

        let args = opts.to_cli_args("p");
        let idx = args.iter().position(|a| a == "--mcp-config").unwrap();
        assert_eq!(args[idx + 2], "--print");

        let config: serde_json::Value = serde_json::from_str(&args[idx + 1]).unwrap();
        let servers = &config["mcpServers"];
        assert_eq!(servers["filesystem"]["type"], "stdio");
        assert_eq!(servers["filesystem"]["command"], "npx");
        assert_eq!(servers["filesystem"]["args"][0], "fs-server");
        assert_eq!(servers["filesystem"]["env"]["ROOT"], "/srv");
        assert!(servers["filesystem"].get("url").is_none());
        assert_eq!(servers["remote"]["url"], "https://mcp.example.com/sse");
        assert!(servers["remote"].get("command").is_none());
        assert!(servers["remote"].get("headers").is_none());
    }

    #[test]
    fn test_prompt_is_passed_verbatim() {
        let args = QueryOptions::default().to_cli_args("--model is not a flag here");
        assert_eq!(args.last().unwrap(), "--model is not a flag here");
    }

    #[test]
    fn test_permission_mode_to_cli_arg() {
        assert_eq!(PermissionMode::Default.to_cli_arg(), "default");
        assert_eq!(PermissionMode::AcceptEdits.to_cli_arg(), "acceptEdits");
        assert_eq!(PermissionMode::BypassPermissions.to_cli_arg(), "bypassPermissions");
        assert_eq!(
            serde_json::to_value(PermissionMode::AcceptEdits).unwrap(),
            "acceptEdits"
        );
    }

    #[test]
    fn test_env_and_paths() {
        let opts = QueryOptions::builder()
            .env_var("KEY", "value")
            .cwd("/tmp/test")
            .cli_path("/usr/bin/claude")
            .build();

        assert_eq!(opts.env.get("KEY").map(String::as_str), Some("value"));
        assert_eq!(opts.cwd, Some(PathBuf::from("/tmp/test")));
        assert_eq!(opts.cli_path, Some(PathBuf::from("/usr/bin/claude")));
    }
}
