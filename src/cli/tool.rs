//! CLI `tool` command: run one tool call and print its text result.

use std::path::Path;

use anyhow::{bail, Result};
use serde_json::{Map, Value};

use crate::config::DirmindConfig;
use crate::server::Backend;

/// Turn `KEY=VALUE` pairs into a JSON object. Values that parse as JSON
/// (`42`, `true`, `["a"]`) keep their type; anything else is a string.
pub fn parse_tool_args(pairs: &[String]) -> Result<Value> {
    let mut args = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("argument '{pair}' is not KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("argument '{pair}' has an empty key");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        args.insert(key.to_string(), value);
    }
    Ok(Value::Object(args))
}

/// Run `name` against the sandbox without starting the watcher or monitor.
pub async fn run_tool(config: DirmindConfig, root: &Path, name: &str, pairs: &[String]) -> Result<String> {
    let args = parse_tool_args(pairs)?;
    let backend = Backend::open(config, root)?;
    Ok(backend.dispatcher().call(name, args).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_keep_their_type() {
        let args = parse_tool_args(&[
            "filepath=src/main.rs".into(),
            "confirm=true".into(),
            "limit=5".into(),
            r#"files=["a.rs","b.rs"]"#.into(),
        ])
        .unwrap();
        assert_eq!(args["filepath"], "src/main.rs");
        assert_eq!(args["confirm"], true);
        assert_eq!(args["limit"], 5);
        assert_eq!(args["files"][1], "b.rs");
    }

    #[test]
    fn value_may_contain_equals() {
        let args = parse_tool_args(&["message=a=b".into()]).unwrap();
        assert_eq!(args["message"], "a=b");
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(parse_tool_args(&["novalue".into()]).is_err());
        assert!(parse_tool_args(&["=x".into()]).is_err());
    }
}
