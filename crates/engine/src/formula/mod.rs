// Formula scanning, parsing, tree building and validation

pub mod scanner;
pub mod syntax;
pub mod parser;
pub mod tree;
pub mod format;
pub mod validate;
