//! Sift: answers a query from searched, extracted and LLM-analysed web
//! content, under a daily spend cap.
//!
//! [`pipeline::Pipeline`] is the entry point; everything else is a stage or
//! a piece of shared infrastructure it composes.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod enhance;
pub mod error;
pub mod extract;
pub mod health;
pub mod ledger;
pub mod llm;
pub mod logger;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod timed;
pub mod types;
