pub mod ast;
pub mod core;
pub mod lower;

pub use self::core::{load_files, load_var_file, parse_config, parse_var_file};
pub use lower::{lower_expr, parse_expr, Declaration};
