//! Groovy front end: lexer, syntax tree, parser, symbol extraction, Gradle
//! script reading and compiled-archive scanning.

pub mod ast;
pub mod error;
pub mod external;
pub mod gradle;
pub mod lexer;
pub mod parser;
pub mod symbols;

pub use error::{GroovyError, Result};
pub use external::{ArchiveLimits, extract_archive, extract_class_dir};
pub use gradle::{GradleDependency, GradleSettings, parse_dependencies, parse_settings};
pub use lexer::{LineIndex, Pos};
pub use parser::{ParseOutput, parse, parse_with_index};
pub use symbols::extract_symbols;
