use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::engine::{EngineError, VisionEngine};
use crate::generator::{CaptionError, CaptionGenerator};
use crate::state::AppState;

/// What a single tick of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published,
    WaitingForFrame,
    /// The model stopped before producing any text.
    Empty,
    Failed,
}

/// Owns the engine and turns the latest frame into a caption on a fixed
/// cadence. Nothing else ever touches the engine.
pub struct GenerationLoop<E> {
    engine: E,
    generator: CaptionGenerator,
    state: Arc<AppState>,
    interval: Duration,
    host: String,
}

impl<E: VisionEngine> GenerationLoop<E> {
    pub fn new(
        engine: E,
        generator: CaptionGenerator,
        state: Arc<AppState>,
        interval: Duration,
        host: String,
    ) -> Self {
        Self {
            engine,
            generator,
            state,
            interval,
            host,
        }
    }

    /// Run one cycle. Failures are logged and confined to the cycle; the
    /// published caption only changes when new text was produced.
    pub fn tick(&mut self) -> CycleOutcome {
        let result =
            self.generator
                .next_caption(&mut self.engine, &self.state.frames, &self.state.style);

        match result {
            Ok(caption) if caption.is_empty() => {
                debug!("cycle produced no text");
                CycleOutcome::Empty
            }
            Ok(caption) => {
                self.state.caption.publish(&caption);
                info!(caption, "caption");
                CycleOutcome::Published
            }
            Err(CaptionError::NoFrame) => {
                info!(
                    "open your browser to http://{} and activate your camera \
                     to start generating captions",
                    self.host
                );
                CycleOutcome::WaitingForFrame
            }
            Err(e) => {
                warn!(error = %e, "caption cycle failed");
                CycleOutcome::Failed
            }
        }
    }

    /// Tick forever. Engine calls are blocking and uncancellable, so a hung
    /// engine stalls the loop.
    // TODO: run cycles under a watchdog so a hung engine call gets reported.
    pub fn run(mut self) -> ! {
        info!(interval_ms = self.interval.as_millis() as u64, "caption loop started");
        loop {
            self.tick();
            std::thread::sleep(self.interval);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to spawn caption thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("caption thread exited before the engine was ready")]
    Exited,
}

/// Load the engine on a dedicated thread and start the loop there.
///
/// Resolves once the engine is loaded, or with the load error. The engine
/// never leaves its thread.
pub async fn start<E, L>(
    load: L,
    generator: CaptionGenerator,
    state: Arc<AppState>,
    interval: Duration,
    host: String,
) -> Result<(), StartupError>
where
    E: VisionEngine + 'static,
    L: FnOnce() -> Result<E, EngineError> + Send + 'static,
{
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("caption-loop".into())
        .spawn(move || {
            let engine = match load() {
                Ok(engine) => engine,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            GenerationLoop::new(engine, generator, state, interval, host).run()
        })?;

    match ready_rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(StartupError::Exited),
    }
}
