pub mod recipe;
pub mod enrichment;
pub mod evaluation;
pub mod result;

pub use recipe::*;
pub use enrichment::*;
pub use evaluation::*;
pub use result::*;
