pub mod cli;
pub mod meta;
