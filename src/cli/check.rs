//! CLI `check` command: validate configuration and print what the server would use.

use anyhow::Result;

use crate::config::DirmindConfig;
use crate::llm::provider::ProviderKind;
use crate::llm::{LlmRouter, RateLimiter};
use crate::server::StateFiles;

/// Validate the sandbox and print a configuration report.
pub fn check(config: &DirmindConfig) -> Result<()> {
    let root = config.validate_sandbox()?;
    let files = StateFiles::resolve(config, &root);
    let router = LlmRouter::new(config.llm.clone(), RateLimiter::default());

    println!("dirmind Configuration Check");
    println!("===========================");
    println!();
    println!("Watch directory:   {}", root.display());
    println!("Git repository:    {}", yes_no(root.join(".git").is_dir()));
    println!();
    println!("State files:");
    println!("  Memory:          {}{}", files.memory.display(), present(&files.memory));
    println!("  Pending edit:    {}{}", files.pending_edit.display(), present(&files.pending_edit));
    println!("  Approval:        {}{}", files.approval.display(), present(&files.approval));
    println!("  Log:             {}", files.log.display());
    println!();
    println!("Limits:");
    println!("  Context window:  {} entries", config.context_limit);
    println!("  Max file size:   {} KB", config.scan.max_file_size_kb);
    println!("  Files per scan:  {}", config.scan.max_files_per_scan);
    println!(
        "  Rate limit:      {} requests / {} s",
        config.rate_limit.max_requests, config.rate_limit.window_seconds
    );
    println!();
    println!("LLM providers (default: {}):", router.default_provider());
    for (name, provider) in router.providers() {
        let key = match name.parse::<ProviderKind>() {
            Ok(kind) => match kind.api_key_env() {
                Some(var) if router.has_key(kind) => format!("{var} set"),
                Some(var) => format!("{var} MISSING"),
                None => "no key needed".to_string(),
            },
            Err(_) => "unsupported provider".to_string(),
        };
        println!("  {name:<8} {:<28} {:<32} {key}", provider.model, provider.base_url);
    }

    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn present(path: &std::path::Path) -> &'static str {
    if path.exists() {
        ""
    } else {
        " (not yet created)"
    }
}
