pub mod browser_manager;
pub mod driver;
pub mod linkedin;

pub use driver::{BrowserDriver, DriverError};
pub use linkedin::{LinkedInDriver, LinkedInSettings};
