pub mod api;
pub mod assemble;
pub mod card;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod crud;
pub mod extract;
pub mod llm;
pub mod palette;
pub mod parser;
pub mod pipeline;
pub mod stats;
pub mod utils;
