pub mod config;
pub mod error;
pub mod logging;
pub mod sheet;
pub mod validation;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use sheet::*;
pub use validation::*;
