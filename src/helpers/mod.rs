//! Helper functions shared by the view layer and the hosting layer

mod date;
mod text;
mod url;

pub use date::*;
pub use text::*;
pub use url::*;
