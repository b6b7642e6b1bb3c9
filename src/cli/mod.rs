//! CLI command implementations

pub mod error;
pub mod info_sheets;
pub mod scrape;
pub mod verify;
pub mod years;

pub use error::CliError;
pub use info_sheets::InfoSheetsCommand;
pub use scrape::{Cli, Commands, OutputFormat, ScrapeArgs, TypeSelection};
pub use verify::VerifyCommand;
pub use years::ListYearsCommand;
