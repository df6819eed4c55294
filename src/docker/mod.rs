pub mod parser;

pub use parser::{parse_dependencies, parse_dockerfile, Instruction};
