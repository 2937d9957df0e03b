//! Result file output.

pub mod export;
