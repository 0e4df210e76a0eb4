pub mod check;
pub mod tool;

pub use check::check;
pub use tool::{parse_tool_args, run_tool};
