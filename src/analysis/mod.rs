pub mod aggregate;
pub mod filter;
pub mod flatten;
pub mod stats;
