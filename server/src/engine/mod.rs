//! The inference engine as seen by the caption generator.
//!
//! The generator drives a fixed protocol: apply the chat template, tokenize
//! text and image together, evaluate the resulting chunks, then sample and
//! feed back one token at a time until end-of-generation. Every call is
//! blocking and the engine is never shared between threads.

#[cfg(feature = "llama")]
pub mod llama;

use narrator_common::frame::Bitmap;

/// Position of the next token in the engine's sequence.
pub type Position = i32;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(not(feature = "llama"), allow(dead_code))]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

pub trait VisionEngine {
    /// Opaque result of joint text + image tokenization.
    type Chunks;
    type Token: Copy + std::fmt::Debug;

    /// Placeholder that marks where the image goes in the prompt text.
    fn media_marker(&self) -> &str;

    /// Batch capacity of the context, used as the hard cap on generated tokens.
    fn batch_size(&self) -> usize;

    /// Render messages into the literal model input, with the assistant
    /// turn opened.
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String, EngineError>;

    fn tokenize(&mut self, text: &str, bitmap: &Bitmap) -> Result<Self::Chunks, EngineError>;

    /// Prefill. Returns the position the first generated token goes to.
    fn eval_chunks(&mut self, chunks: &Self::Chunks) -> Result<Position, EngineError>;

    fn sample(&mut self) -> Self::Token;

    fn is_end_of_generation(&self, token: Self::Token) -> bool;

    /// Raw bytes of one token. A multi-byte character may be split across
    /// consecutive tokens, so pieces are not valid UTF-8 on their own.
    fn token_to_piece(&self, token: Self::Token) -> Vec<u8>;

    /// Feed a single token back at `pos`.
    fn decode(&mut self, token: Self::Token, pos: Position) -> Result<(), EngineError>;

    /// Drop all per-sequence state so the next cycle starts clean.
    fn clear(&mut self);
}

#[derive(Debug, thiserror::Error)]
#[cfg_attr(not(feature = "llama"), allow(dead_code))]
pub enum EngineError {
    #[error("failed to load engine: {0}")]
    Load(String),
    #[error("failed to apply chat template: {0}")]
    Template(String),
    #[error("failed to tokenize input: {0}")]
    Tokenize(String),
    #[error("failed to evaluate input chunks: {0}")]
    Eval(String),
    #[error("failed to decode token: {0}")]
    Decode(String),
}

/// Stand-in used when the binary is built without an inference backend.
/// It can never be constructed, so loading it always fails at startup.
#[derive(Debug)]
#[cfg_attr(feature = "llama", allow(dead_code))]
pub enum Unavailable {}

impl Unavailable {
    pub fn load() -> Result<Self, EngineError> {
        Err(EngineError::Load(
            "no inference backend compiled in; rebuild with `--features llama`".into(),
        ))
    }
}

impl VisionEngine for Unavailable {
    type Chunks = ();
    type Token = ();

    fn media_marker(&self) -> &str {
        match *self {}
    }
    fn batch_size(&self) -> usize {
        match *self {}
    }
    fn apply_chat_template(&self, _: &[ChatMessage]) -> Result<String, EngineError> {
        match *self {}
    }
    fn tokenize(&mut self, _: &str, _: &Bitmap) -> Result<(), EngineError> {
        match *self {}
    }
    fn eval_chunks(&mut self, _: &()) -> Result<Position, EngineError> {
        match *self {}
    }
    fn sample(&mut self) {
        match *self {}
    }
    fn is_end_of_generation(&self, _: ()) -> bool {
        match *self {}
    }
    fn token_to_piece(&self, _: ()) -> Vec<u8> {
        match *self {}
    }
    fn decode(&mut self, _: (), _: Position) -> Result<(), EngineError> {
        match *self {}
    }
    fn clear(&mut self) {
        match *self {}
    }
}
