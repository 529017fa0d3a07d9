pub mod classify;
pub mod export;
pub mod fetch;
pub mod process;

pub use classify::{build_report, classify, filter_by_window, Cohort, DateWindow, Report};
pub use fetch::{DataSource, FetchConfig, Fetcher};
