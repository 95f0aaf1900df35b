use std::{
    marker::PhantomData,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tokio::sync::oneshot;

use crate::{
    error::ClassifierError,
    model::ClassifierModel,
    prediction::PredictionResult,
    preprocess::{self, ImageInput},
};

/// Sizing of the worker pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of worker threads running decode and scoring.
    pub workers: usize,
    /// Number of requests allowed to wait for a free worker.
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            queue_depth: 32,
        }
    }
}

/// Result of one job, with its id and the time spent in decode and scoring.
#[derive(Clone, Debug)]
pub struct InferenceOutcome {
    pub id: u64,
    pub duration: Duration,
    pub prediction: PredictionResult,
}

type Reply = oneshot::Sender<Result<InferenceOutcome, ClassifierError>>;

/// Handle to a queued job.
pub struct PendingInference {
    response: oneshot::Receiver<Result<InferenceOutcome, ClassifierError>>,
}

impl PendingInference {
    pub async fn wait(self) -> Result<InferenceOutcome, ClassifierError> {
        self.response
            .await
            .map_err(|_| ClassifierError::EngineStopped)?
    }
}

struct InferenceJob {
    id: u64,
    input: ImageInput,
    reply: Reply,
}

/// Runs preprocessing and model scoring on a fixed set of worker threads.
///
/// Jobs wait in a bounded queue. When the queue is full, [`submit`](Self::submit)
/// fails right away with [`ClassifierError::Overloaded`] instead of piling up work.
/// The model is shared by all workers and is never locked by the engine.
pub struct InferenceEngine<M: ClassifierModel> {
    job_tx: Option<mpsc::SyncSender<InferenceJob>>,
    workers: Vec<JoinHandle<()>>,
    id_counter: AtomicU64,
    _model: PhantomData<fn() -> M>,
}

impl<M: ClassifierModel> InferenceEngine<M> {
    /// Creates the engine and spawns its workers. Zero sizes are raised to one.
    pub fn new(model: M, config: EngineConfig) -> Self {
        let config = EngineConfig {
            workers: config.workers.max(1),
            queue_depth: config.queue_depth.max(1),
        };
        let model = Arc::new(model);
        let (job_tx, job_rx) = mpsc::sync_channel::<InferenceJob>(config.queue_depth);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..config.workers)
            .map(|index| {
                let model = model.clone();
                let job_rx = job_rx.clone();
                std::thread::Builder::new()
                    .name(format!("inference-{index}"))
                    .spawn(move || worker_loop(model, job_rx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("Failed to spawn inference worker: {e}");
                    None
                }
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            workers,
            id_counter: AtomicU64::new(0),
            _model: PhantomData,
        }
    }

    /// Queues `input` for decoding and scoring without waiting for a result.
    ///
    /// Fails with [`ClassifierError::Overloaded`] when the queue is full.
    pub fn schedule_inference(
        &self,
        input: ImageInput,
    ) -> Result<PendingInference, ClassifierError> {
        let tx = self.job_tx.as_ref().ok_or(ClassifierError::EngineStopped)?;
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();

        match tx.try_send(InferenceJob { id, input, reply }) {
            Ok(()) => {
                log::debug!("Scheduled inference {id}");
                Ok(PendingInference { response })
            }
            Err(mpsc::TrySendError::Full(_)) => {
                log::warn!("Inference queue is full, rejecting request {id}");
                Err(ClassifierError::Overloaded)
            }
            Err(mpsc::TrySendError::Disconnected(_)) => Err(ClassifierError::EngineStopped),
        }
    }

    /// Queues `input` and waits for the result.
    ///
    /// If the caller is dropped while the job runs, the job still completes and its
    /// result is discarded.
    pub async fn submit(&self, input: ImageInput) -> Result<InferenceOutcome, ClassifierError> {
        self.schedule_inference(input)?.wait().await
    }

    /// Stops the engine: closes the queue and waits for the workers to finish
    /// the jobs already queued.
    pub fn stop(&mut self) {
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<M: ClassifierModel> Drop for InferenceEngine<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<M: ClassifierModel>(
    model: Arc<M>,
    job_rx: Arc<Mutex<mpsc::Receiver<InferenceJob>>>,
) {
    loop {
        let job = {
            let Ok(rx) = job_rx.lock() else {
                log::error!("Inference queue lock poisoned, stopping worker");
                return;
            };
            rx.recv()
        };
        let Ok(job) = job else {
            // queue closed
            return;
        };

        let start_time = Instant::now();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| run_job(&*model, job.input)))
            .unwrap_or_else(|_| {
                Err(ClassifierError::ModelInference(
                    "inference panicked".to_string(),
                ))
            })
            .map(|prediction| InferenceOutcome {
                id: job.id,
                duration: start_time.elapsed(),
                prediction,
            });

        log::debug!("Inference {} completed", job.id);
        if job.reply.send(result).is_err() {
            log::debug!("Requester for inference {} went away", job.id);
        }
    }
}

fn run_job<M: ClassifierModel>(
    model: &M,
    input: ImageInput,
) -> Result<PredictionResult, ClassifierError> {
    let tensor = preprocess::normalize(input)?;
    let probabilities = model
        .predict(&tensor)
        .map_err(|e| ClassifierError::ModelInference(e.to_string()))?;
    Ok(probabilities.into())
}
