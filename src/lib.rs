// lib.rs
pub mod acquisition;
pub mod blast;
pub mod bsr;
pub mod clustering;
pub mod dedup;
pub mod fasta;
pub mod membership;
pub mod minimizers;
pub mod pipeline;
pub mod predictor;
pub mod registry;
pub mod schema;
pub mod translation;
