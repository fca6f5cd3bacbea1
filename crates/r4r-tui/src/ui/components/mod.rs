mod help_overlay;
mod service_list;
mod status_bar;

pub use help_overlay::HelpOverlay;
pub use service_list::ServiceList;
pub use status_bar::{LOG_VIEWER_HINTS, SERVICE_LIST_HINTS, StatusBar};
