//! Configuration module

mod site;

pub use site::CommentsConfig;
pub use site::ListingConfig;
pub use site::SiteConfig;
pub use site::SourceConfig;
pub use site::ACCESS_TOKEN_ENV;
