//! Reasoner implementations

pub mod openai;
