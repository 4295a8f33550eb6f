//! Test modules for the queue transport layer

mod memory;
mod registry;
