use narrator_common::caption::CaptionBoard;
use narrator_common::frame::FrameStore;
use narrator_common::style::StyleStore;

/// State shared between the HTTP handlers and the generation loop.
pub struct AppState {
    pub frames: FrameStore,
    pub style: StyleStore,
    pub caption: CaptionBoard,
    /// Base prompt from config; never changes after startup.
    pub prompt: String,
}

impl AppState {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            frames: FrameStore::new(),
            style: StyleStore::new(),
            caption: CaptionBoard::new(),
            prompt: prompt.into(),
        }
    }
}
