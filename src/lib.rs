pub mod analyze;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod extract;
pub mod fields;
pub mod ir;
pub mod lexer;
pub mod normalize;
pub mod path_de;
pub mod report;
pub mod translate;
