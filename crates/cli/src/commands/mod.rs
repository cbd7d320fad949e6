pub mod inspect;
pub mod query;
pub mod scan;
pub mod stats;

pub use inspect::*;
pub use query::*;
pub use scan::*;
pub use stats::*;
