mod block_source;
mod repository;

#[cfg(test)]
pub(crate) mod memory;

pub use block_source::*;
pub use repository::*;
