//! Queued evaluator: server threads that batch requests from many submitters.
//!
//! Each server thread owns one [`ComputeHandle`] and its [`InputBuffers`],
//! both created on that thread. [`NeuralEvaluator::submit`] checks each
//! request against the model and queues it on one shared channel; whichever server thread is idle drains it into a batch and runs
//! the batch once it is full or has waited long enough.

use crate::batch::BatchCollector;
use crate::config::EvaluatorConfig;
use crate::context::ComputeContext;
use crate::error::{Error, Result};
use crate::handle::ComputeHandle;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use hoshi_core::{BoardExtent, EvalOutput, EvalRequest, ModelDescriptor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Poll interval for idle server threads.
const IDLE_POLL: Duration = Duration::from_millis(10);

const JOB_QUEUE_LEN: usize = 1024;

pub type EvalResponse = Result<EvalOutput>;

/// One checked request and the channel its result goes back on.
struct EvalJob {
    request: EvalRequest,
    response: Sender<EvalResponse>,
}

pub struct NeuralEvaluator {
    job_tx: Sender<EvalJob>,
    job_rx: Receiver<EvalJob>,
    running: Arc<AtomicBool>,
    threads: Vec<std::thread::JoinHandle<()>>,
    extent: BoardExtent,
    spatial_len: usize,
    global_len: usize,
}

impl NeuralEvaluator {
    /// Starts one server thread per routing index in `config`.
    ///
    /// Blocks until every thread has built its handle; the first failure is
    /// returned and the threads already started are stopped.
    pub fn start(
        context: &ComputeContext,
        descriptor: &ModelDescriptor,
        config: &EvaluatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        if config.context.extent != context.extent() {
            return Err(Error::InvalidConfig(format!(
                "evaluator extent {} differs from context extent {}",
                config.context.extent,
                context.extent()
            )));
        }
        descriptor.validate()?;

        let (job_tx, job_rx) = crossbeam_channel::bounded::<EvalJob>(JOB_QUEUE_LEN);
        let running = Arc::new(AtomicBool::new(true));
        let extent = context.extent();

        let mut evaluator = Self {
            job_tx,
            job_rx: job_rx.clone(),
            running: running.clone(),
            threads: Vec::with_capacity(config.routing_indices.len()),
            extent,
            spatial_len: descriptor.num_input_channels * extent.cells(),
            global_len: descriptor.num_input_global_channels,
        };

        for (thread_idx, &routing_index) in config.routing_indices.iter().enumerate() {
            let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<()>>(1);
            let server = ServerThread {
                context: context.clone(),
                descriptor: descriptor.clone(),
                max_batch_size: config.max_batch_size,
                inputs_use_nhwc: config.inputs_use_nhwc,
                batch_wait_ms: config.batch_wait_ms,
                routing_index,
                thread_idx,
            };
            let job_rx = job_rx.clone();
            let running = running.clone();

            let thread = std::thread::Builder::new()
                .name(format!("hoshi-eval-{}", thread_idx))
                .spawn(move || server.run(job_rx, init_tx, &running))
                .map_err(|e| Error::ThreadSpawn(e.to_string()))?;
            evaluator.threads.push(thread);

            match init_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(Error::EvaluatorInit(e.to_string())),
                Err(_) => {
                    return Err(Error::EvaluatorInit(format!(
                        "server thread {} exited before init",
                        thread_idx
                    )))
                }
            }
        }

        Ok(evaluator)
    }

    /// Queues `request` and returns the channel its result arrives on.
    pub fn submit(&self, request: EvalRequest) -> Result<Receiver<EvalResponse>> {
        self.check_request(&request)?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.job_tx
            .send(EvalJob {
                request,
                response: tx,
            })
            .map_err(|_| Error::EvaluatorSend)?;
        Ok(rx)
    }

    /// Evaluates one request, blocking until its batch has run.
    pub fn evaluate(&self, request: EvalRequest) -> Result<EvalOutput> {
        let rx = self.submit(request)?;
        rx.recv().map_err(|_| Error::EvaluatorRecv)?
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Stops every server thread and waits for them.
    ///
    /// Queued jobs are dropped, so their submitters see
    /// [`Error::EvaluatorRecv`].
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
        while self.job_rx.try_recv().is_ok() {}
    }

    /// Rejects requests a server thread would assert on.
    fn check_request(&self, request: &EvalRequest) -> Result<()> {
        if request.extent != self.extent {
            return Err(Error::InvalidConfig(format!(
                "request extent {} differs from evaluator extent {}",
                request.extent, self.extent
            )));
        }
        if request.spatial.len() != self.spatial_len || request.global.len() != self.global_len {
            return Err(Error::InvalidConfig(format!(
                "request tensors are {}+{} values, model expects {}+{}",
                request.spatial.len(),
                request.global.len(),
                self.spatial_len,
                self.global_len
            )));
        }
        Ok(())
    }
}

impl Drop for NeuralEvaluator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ServerThread {
    context: ComputeContext,
    descriptor: ModelDescriptor,
    max_batch_size: usize,
    inputs_use_nhwc: bool,
    batch_wait_ms: u64,
    routing_index: i32,
    thread_idx: usize,
}

impl ServerThread {
    fn run(self, job_rx: Receiver<EvalJob>, init_tx: Sender<Result<()>>, running: &AtomicBool) {
        let init = ComputeHandle::new(
            &self.context,
            &self.descriptor,
            self.max_batch_size,
            self.inputs_use_nhwc,
            self.routing_index,
            self.thread_idx,
        )
        .and_then(|handle| {
            let buffers = handle.create_buffers()?;
            Ok((handle, buffers))
        });

        let (handle, mut buffers) = match init {
            Ok(pair) => {
                let _ = init_tx.send(Ok(()));
                pair
            }
            Err(e) => {
                tracing::error!("Evaluator thread {} failed to start: {}", self.thread_idx, e);
                let _ = init_tx.send(Err(e));
                return;
            }
        };
        drop(init_tx);

        tracing::info!(
            "Evaluator thread {} started ({} engine, routing index {})",
            self.thread_idx,
            handle.kind(),
            self.routing_index
        );

        let mut collector = BatchCollector::new(self.max_batch_size, self.batch_wait_ms);
        let mut pending: Vec<EvalJob> = Vec::with_capacity(self.max_batch_size);

        while running.load(Ordering::Acquire) {
            match job_rx.recv_timeout(collector.next_wait(IDLE_POLL)) {
                Ok(job) => pending.push(job),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            pending.extend(job_rx.try_iter().take(collector.room(pending.len())));
            collector.observe(pending.len());

            if collector.is_ready(pending.len()) {
                run_batch(&handle, &mut buffers, &mut pending);
                collector.close();
            }
        }

        tracing::info!("Evaluator thread {} stopped", self.thread_idx);
    }
}

fn run_batch(
    handle: &ComputeHandle,
    buffers: &mut hoshi_core::InputBuffers,
    pending: &mut Vec<EvalJob>,
) {
    let (requests, responders): (Vec<EvalRequest>, Vec<Sender<EvalResponse>>) = pending
        .drain(..)
        .map(|job| (job.request, job.response))
        .unzip();
    let mut outputs: Vec<EvalOutput> = requests.iter().map(EvalOutput::for_request).collect();

    match handle.execute(buffers, &requests, &mut outputs) {
        Ok(()) => {
            for (tx, output) in responders.into_iter().zip(outputs) {
                let _ = tx.send(Ok(output));
            }
        }
        Err(e) => {
            tracing::error!("Batch of {} failed: {}", requests.len(), e);
            let message = e.to_string();
            for tx in responders {
                let _ = tx.send(Err(Error::BatchFailed(message.clone())));
            }
        }
    }
}
