// src/core/mod.rs

pub mod preparer;
pub mod resolver;
pub mod snapshot;
pub mod summary;
pub mod tokenizer;
