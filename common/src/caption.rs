use std::sync::{Mutex, PoisonError};

/// The latest published caption. Only the generation loop writes it.
#[derive(Debug, Default)]
pub struct CaptionBoard {
    text: Mutex<String>,
}

impl CaptionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> String {
        self.text.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the caption. Empty text is ignored so one unproductive cycle
    /// doesn't wipe a good caption. Returns whether anything was published.
    pub fn publish(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
        true
    }
}
