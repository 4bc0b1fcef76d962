mod types;
pub use types::*;

mod broker;
pub use broker::*;
