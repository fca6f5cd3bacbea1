mod log_viewer;
mod service_select;

pub use log_viewer::LogViewerScreen;
pub use service_select::ServiceSelectScreen;
