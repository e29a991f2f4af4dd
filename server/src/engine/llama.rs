//! llama.cpp backend (text model + multimodal projector) via `llama-cpp-2`.

use std::num::NonZeroU32;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{LlamaChatMessage, LlamaChatTemplate, LlamaModel};
use llama_cpp_2::mtmd::{
    mtmd_default_marker, MtmdBitmap, MtmdContext, MtmdContextParams, MtmdInputChunks,
    MtmdInputText,
};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use narrator_common::config::EngineConfig;
use narrator_common::frame::Bitmap;
use tracing::info;

use super::{ChatMessage, EngineError, Position, VisionEngine};

pub struct LlamaEngine {
    model: &'static LlamaModel,
    ctx: LlamaContext<'static>,
    mtmd: MtmdContext,
    sampler: LlamaSampler,
    template: LlamaChatTemplate,
    marker: String,
}

impl LlamaEngine {
    /// Load backend, text model and projector.
    ///
    /// Backend and model live for the rest of the process, so they are leaked
    /// to give the context a `'static` borrow.
    pub fn load(config: &EngineConfig) -> Result<Self, EngineError> {
        llama_cpp_2::send_logs_to_tracing(
            llama_cpp_2::LogOptions::default().with_logs_enabled(config.verbose),
        );

        let backend = LlamaBackend::init().map_err(|e| EngineError::Load(e.to_string()))?;
        let backend: &'static LlamaBackend = Box::leak(Box::new(backend));

        let model = LlamaModel::load_from_file(
            backend,
            &config.model_path,
            &LlamaModelParams::default(),
        )
        .map_err(|e| {
            EngineError::Load(format!("text model {}: {e}", config.model_path.display()))
        })?;
        let model: &'static LlamaModel = Box::leak(Box::new(model));

        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(config.context_length))
            .with_n_batch(config.batch_size);
        let ctx = model
            .new_context(backend, ctx_params)
            .map_err(|e| EngineError::Load(format!("model context: {e}")))?;

        let template = model
            .chat_template(None)
            .map_err(|e| EngineError::Load(format!("chat template: {e}")))?;

        let sampler = LlamaSampler::chain_simple([
            LlamaSampler::top_k(40),
            LlamaSampler::top_p(0.95, 1),
            LlamaSampler::temp(0.8),
            LlamaSampler::dist(1234),
        ]);

        let projector = config.projector_path.to_string_lossy();
        let mtmd = MtmdContext::init_from_file(&projector, model, &MtmdContextParams::default())
            .map_err(|e| EngineError::Load(format!("projector {projector}: {e}")))?;
        if !mtmd.support_vision() {
            return Err(EngineError::Load(format!(
                "projector {projector} has no vision support"
            )));
        }

        info!(
            model = %config.model_path.display(),
            projector = %config.projector_path.display(),
            n_ctx = config.context_length,
            n_batch = config.batch_size,
            "vision model loaded"
        );

        Ok(Self {
            model,
            ctx,
            mtmd,
            sampler,
            template,
            marker: mtmd_default_marker().to_string(),
        })
    }
}

impl VisionEngine for LlamaEngine {
    type Chunks = MtmdInputChunks;
    type Token = LlamaToken;

    fn media_marker(&self) -> &str {
        &self.marker
    }

    fn batch_size(&self) -> usize {
        self.ctx.n_batch() as usize
    }

    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String, EngineError> {
        let messages = messages
            .iter()
            .map(|m| LlamaChatMessage::new(m.role.clone(), m.content.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::Template(e.to_string()))?;
        self.model
            .apply_chat_template(&self.template, &messages, true)
            .map_err(|e| EngineError::Template(e.to_string()))
    }

    fn tokenize(&mut self, text: &str, bitmap: &Bitmap) -> Result<MtmdInputChunks, EngineError> {
        // Native bitmap is freed on drop at the end of this call.
        let native = MtmdBitmap::from_image_data(bitmap.width, bitmap.height, &bitmap.data)
            .map_err(|e| EngineError::Tokenize(format!("bitmap: {e}")))?;
        let input = MtmdInputText {
            text: text.to_string(),
            add_special: true,
            parse_special: true,
        };
        self.mtmd
            .tokenize(input, &[&native])
            .map_err(|e| EngineError::Tokenize(e.to_string()))
    }

    fn eval_chunks(&mut self, chunks: &MtmdInputChunks) -> Result<Position, EngineError> {
        let n_batch = self.ctx.n_batch() as i32;
        chunks
            .eval_chunks(&mut self.mtmd, &mut self.ctx, 0, 0, n_batch, true)
            .map_err(|e| EngineError::Eval(e.to_string()))
    }

    fn sample(&mut self) -> LlamaToken {
        // sample() also accepts the token into the chain
        self.sampler.sample(&self.ctx, -1)
    }

    fn is_end_of_generation(&self, token: LlamaToken) -> bool {
        self.model.vocab().is_eog(token)
    }

    fn token_to_piece(&self, token: LlamaToken) -> Vec<u8> {
        self.model.vocab().token_to_piece(token, true, None)
    }

    fn decode(&mut self, token: LlamaToken, pos: Position) -> Result<(), EngineError> {
        let mut batch = LlamaBatch::new(1, 1);
        batch
            .add(token, pos, &[0], true)
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        self.ctx
            .decode(&mut batch)
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    fn clear(&mut self) {
        self.ctx.clear_kv_cache();
    }
}
