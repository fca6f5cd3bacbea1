/// Everything a key press or the event loop can ask the viewer to do
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    GoBack,
    Quit,
    ToggleHelp,

    // Service list
    ListUp,
    ListDown,
    ListSelect,
    RefreshServices,
    /// Open the log viewer for a service id
    SelectService(String),

    // Search bar, shared by both screens
    OpenSearch,
    CloseSearch,
    SearchInput(char),
    SearchBackspace,
    SearchClear,
    ApplyFilter,
    ClearFilter,

    /// none → debug → info → warn → error → fatal → none
    CycleLevelFilter,

    // Scrolling
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollToTop,
    ScrollToBottom,
    PageUp,
    PageDown,

    // Display toggles
    ToggleAutoScroll,
    ToggleTimestamps,
    ToggleLocalTime,
    ToggleSources,
    ToggleStats,

    ClearLogs,
    ExportLogs,

    // Replay window and stream control
    CycleTimeRange,
    CycleTimeRangeBack,
    Reconnect,

    DismissError,
    Render,
}
