use narrator_common::frame::{FrameStore, NoFrame};
use narrator_common::style::{StyleConfig, StyleStore};
use tracing::debug;

use crate::engine::{ChatMessage, EngineError, VisionEngine};

/// Why a cycle produced no caption.
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    /// No camera frame has been uploaded yet. Not a failure.
    #[error("waiting for the first camera frame")]
    NoFrame,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Runs one captioning cycle against the current frame and style.
#[derive(Debug, Clone)]
pub struct CaptionGenerator {
    prompt: String,
}

impl CaptionGenerator {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    /// Base prompt + style suffix + the engine's media marker.
    pub fn compose_prompt(&self, style: &StyleConfig, marker: &str) -> String {
        format!("{}{}{marker}", self.prompt, style.prompt_suffix())
    }

    /// Generate a caption for the latest frame.
    ///
    /// Once tokenization has succeeded the engine context is cleared exactly
    /// once before returning, whatever happens afterwards.
    pub fn next_caption<E: VisionEngine>(
        &self,
        engine: &mut E,
        frames: &FrameStore,
        style: &StyleStore,
    ) -> Result<String, CaptionError> {
        let bitmap = frames.to_bitmap().map_err(|NoFrame| CaptionError::NoFrame)?;

        let prompt = self.compose_prompt(&style.snapshot(), engine.media_marker());
        debug!(prompt, "composed prompt");

        let input = engine.apply_chat_template(&[ChatMessage::user(prompt)])?;
        let chunks = engine.tokenize(&input, &bitmap)?;
        drop(bitmap);

        let result = generate(engine, &chunks);
        engine.clear();
        Ok(result?)
    }
}

/// Prefill, then sample until end-of-generation or the batch cap.
///
/// Pieces are collected as bytes and decoded once at the end; a character
/// split across tokens only becomes valid UTF-8 when its pieces are joined.
fn generate<E: VisionEngine>(engine: &mut E, chunks: &E::Chunks) -> Result<String, EngineError> {
    let mut pos = engine.eval_chunks(chunks)?;
    let limit = engine.batch_size();
    let mut bytes = Vec::new();

    for _ in 0..limit {
        let token = engine.sample();
        if engine.is_end_of_generation(token) {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.extend_from_slice(&engine.token_to_piece(token));
        engine.decode(token, pos)?;
        pos += 1;
    }

    debug!(limit, "caption hit the token cap");
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{FakeEngine, Tok};
    use image::{DynamicImage, Rgb, RgbImage};
    use narrator_common::style::{Humor, Tone};

    fn red_frame() -> FrameStore {
        let store = FrameStore::new();
        store.set(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            10,
            10,
            Rgb([255, 0, 0]),
        )));
        store
    }

    #[test]
    fn no_frame_short_circuits_before_engine() {
        let mut engine = FakeEngine::with_script(vec![Tok::Piece("hi"), Tok::Eog]);
        let err = CaptionGenerator::new("Describe the scene.")
            .next_caption(&mut engine, &FrameStore::new(), &StyleStore::new())
            .unwrap_err();
        assert!(matches!(err, CaptionError::NoFrame));
        assert!(engine.tokenized.is_empty());
        assert_eq!(engine.clears, 0);
    }

    #[test]
    fn composes_styled_prompt_with_marker() {
        let style = StyleStore::new();
        style.set_humor(Humor::Funny);
        let mut engine = FakeEngine::with_script(vec![Tok::Eog]);
        let generator = CaptionGenerator::new("Describe the scene.");
        generator.next_caption(&mut engine, &red_frame(), &style).unwrap();

        let (input, bitmap) = &engine.tokenized[0];
        assert_eq!(
            input,
            "<|user|>Describe the scene. Be somewhat funny in your response. \
             Keep the response to 30 words or less.<__media__><|assistant|>"
        );
        assert_eq!(bitmap.data, [255u8, 0, 0].repeat(100));
    }

    #[test]
    fn accumulates_pieces_until_end_of_generation() {
        let mut engine = FakeEngine::with_script(vec![
            Tok::Piece("A"),
            Tok::Piece(" red"),
            Tok::Piece(" wall."),
            Tok::Eog,
            Tok::Piece("never"),
        ]);
        let caption = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap();
        assert_eq!(caption, "A red wall.");
        assert_eq!(engine.samples, 4);
        let positions: Vec<_> = engine.decoded.iter().map(|(_, pos)| *pos).collect();
        assert_eq!(positions, vec![10, 11, 12]);
        assert_eq!(engine.clears, 1);
    }

    #[test]
    fn joins_character_split_across_tokens() {
        // U+1F600 is F0 9F 98 80; the tokenizer hands it back in two halves.
        let mut engine = FakeEngine::with_script(vec![
            Tok::Piece("A happy dog "),
            Tok::Bytes(&[0xF0, 0x9F]),
            Tok::Bytes(&[0x98, 0x80]),
            Tok::Eog,
        ]);
        let caption = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap();
        assert_eq!(caption, "A happy dog \u{1F600}");
        assert_eq!(engine.decoded.len(), 3);
    }

    #[test]
    fn truncated_character_at_cap_is_replaced() {
        let mut engine =
            FakeEngine::with_script(vec![Tok::Piece("ok "), Tok::Bytes(&[0xF0, 0x9F])]);
        engine.batch_size = 2;
        let caption = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap();
        assert_eq!(caption, "ok \u{FFFD}");
    }

    #[test]
    fn immediate_end_of_generation_yields_empty_caption() {
        let mut engine = FakeEngine::with_script(vec![Tok::Eog]);
        let caption = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap();
        assert_eq!(caption, "");
        assert!(engine.decoded.is_empty());
        assert_eq!(engine.clears, 1);
    }

    #[test]
    fn stops_at_batch_cap_without_end_of_generation() {
        let mut engine = FakeEngine::with_script(Vec::new());
        engine.batch_size = 5;
        let caption = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap();
        assert_eq!(caption, "xxxxx");
        assert_eq!(engine.samples, 5);
        assert_eq!(engine.clears, 1);
    }

    #[test]
    fn tokenize_failure_does_not_clear() {
        let mut engine = FakeEngine::with_script(vec![Tok::Eog]);
        engine.fail_tokenize = true;
        let err = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap_err();
        assert!(matches!(err, CaptionError::Engine(EngineError::Tokenize(_))));
        assert_eq!(engine.clears, 0);
    }

    #[test]
    fn template_failure_does_not_clear() {
        let mut engine = FakeEngine::with_script(vec![Tok::Eog]);
        engine.fail_template = true;
        let err = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap_err();
        assert!(matches!(err, CaptionError::Engine(EngineError::Template(_))));
        assert!(engine.tokenized.is_empty());
        assert_eq!(engine.clears, 0);
    }

    #[test]
    fn eval_failure_still_clears_once() {
        let mut engine = FakeEngine::with_script(vec![Tok::Piece("a"), Tok::Eog]);
        engine.fail_eval = true;
        let err = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap_err();
        assert!(matches!(err, CaptionError::Engine(EngineError::Eval(_))));
        assert_eq!(engine.samples, 0);
        assert_eq!(engine.clears, 1);
    }

    #[test]
    fn decode_failure_still_clears_once() {
        let mut engine = FakeEngine::with_script(vec![Tok::Piece("a"), Tok::Piece("b")]);
        engine.fail_decode_at = Some(1);
        let err = CaptionGenerator::new("p")
            .next_caption(&mut engine, &red_frame(), &StyleStore::new())
            .unwrap_err();
        assert!(matches!(err, CaptionError::Engine(EngineError::Decode(_))));
        assert_eq!(engine.clears, 1);
    }

    #[test]
    fn style_is_read_each_cycle() {
        let style = StyleStore::new();
        let frames = red_frame();
        let generator = CaptionGenerator::new("p");
        let mut engine = FakeEngine::with_script(vec![Tok::Eog]);
        generator.next_caption(&mut engine, &frames, &style).unwrap();
        style.set_tone(Tone::Insulting);
        engine.samples = 0;
        generator.next_caption(&mut engine, &frames, &style).unwrap();

        assert!(!engine.tokenized[0].0.contains("insulting"));
        assert!(engine.tokenized[1].0.contains("Be somewhat insulting"));
        assert_eq!(engine.clears, 2);
    }
}
