mod traits;
pub use traits::*;

mod pipeline;
pub use pipeline::*;

#[cfg(test)]
mod pipeline_tests;
