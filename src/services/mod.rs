//! Service layer separating I/O and progress reporting from business logic

pub mod io;
pub mod progress;

pub use io::ImageIOService;
#[cfg(feature = "cli")]
pub use progress::{create_cli_progress_reporter, IndicatifProgressReporter};
pub use progress::{
    BatchItemUpdate, CallbackProgressReporter, ConsoleProgressReporter, DownloadProgress,
    NoOpProgressReporter, ProgressReporter,
};
