// src/system/mod.rs

pub mod escape;
pub mod shell;
