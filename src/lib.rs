//! Sandboxed directory access for language-model clients, over MCP.
//!
//! dirmind is an [MCP](https://modelcontextprotocol.io/) server that a desktop
//! GUI starts over stdio. It gives the client one directory tree to work in:
//!
//! | Area | Tools |
//! |------|-------|
//! | **Files** | `list_directory`, `read_file`, `write_file`, `list_files`, `search_in_files` |
//! | **Edits** | `edit_file` (proposed for approval unless `confirm=true`) |
//! | **Git** | `git_diff`, `git_commit`, `git_log` |
//! | **Memory** | `remember`, `recall`, `get_recent_changes` |
//! | **LLM** | `llm_query` (Grok, OpenAI, Claude, Ollama; rate limited) |
//!
//! # Architecture
//!
//! - **Sandbox**: every client path goes through [`sandbox::SandboxRoot::resolve`]
//! - **Memory**: one JSON document of categorized memories plus a rolling
//!   context window, rewritten on every change
//! - **Approval**: pending edits and the GUI's decisions are exchanged as two
//!   singleton JSON files in the sandbox, polled by a background task
//! - **Watcher**: native file notifications feed the context window
//!
//! # Modules
//!
//! - [`config`]: TOML configuration and environment overrides
//! - [`sandbox`]: path sanitization
//! - [`memory`]: persistent memory and context window
//! - [`llm`]: provider adapters, rate limiting and routing
//! - [`edits`]: propose / approve / apply pipeline
//! - [`tools`]: tool dispatch and the MCP surface
//! - [`server`]: backend lifecycle and stdio serving

pub mod cli;
pub mod config;
pub mod edits;
pub mod error;
pub mod files;
pub mod git;
pub mod llm;
pub mod memory;
pub mod sandbox;
pub mod server;
pub mod tools;
pub mod watcher;
