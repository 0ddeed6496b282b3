//! Processor Worker
//!
//! Runs a `ProcessorState` on a dedicated thread and talks to it over
//! channels, so requests are processed strictly one at a time and in the
//! order they were submitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::{AudioProcessingConfig, ProcessorOptions};
use crate::error::{ProcessError, ProcessResult};
use crate::message::{Response, WireRequest};
use crate::state::{Diagnostics, ProcessorState};

/// Maximum number of requests waiting for the worker
pub const REQUEST_QUEUE_DEPTH: usize = 64;

/// How often an idle worker checks the shutdown flag
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Commands sent to the worker thread
#[derive(Debug)]
enum WorkerCommand {
    /// Process a request. With `reply` set, the response goes there instead
    /// of the shared response channel.
    Process {
        request: WireRequest,
        reply: Option<Sender<Response>>,
    },
    /// Snapshot the lifetime counters
    Diagnostics(Sender<Diagnostics>),
    Shutdown,
}

/// Handle to a processor running on its own thread
pub struct ProcessorWorker {
    command_sender: Sender<WorkerCommand>,
    response_receiver: Receiver<Response>,
    worker_thread: Option<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
    options: ProcessorOptions,
}

impl ProcessorWorker {
    /// Spawn a worker with the default configuration
    pub fn spawn(options: ProcessorOptions) -> ProcessResult<Self> {
        Self::with_config(options, AudioProcessingConfig::default())
    }

    /// Spawn a worker with a custom configuration
    pub fn with_config(
        options: ProcessorOptions,
        config: AudioProcessingConfig,
    ) -> ProcessResult<Self> {
        // Fail here rather than on the worker thread
        let state = ProcessorState::with_config(options, config)?;

        let (command_sender, command_receiver) = bounded::<WorkerCommand>(REQUEST_QUEUE_DEPTH);
        let (response_sender, response_receiver) = unbounded::<Response>();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown_flag);

        let worker_thread = thread::Builder::new()
            .name("murmur-dsp".into())
            .spawn(move || {
                Self::worker_main(state, command_receiver, response_sender, shutdown_clone);
            })
            .map_err(|e| ProcessError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            command_sender,
            response_receiver,
            worker_thread: Some(worker_thread),
            shutdown_flag,
            options,
        })
    }

    pub fn options(&self) -> ProcessorOptions {
        self.options
    }

    /// Queue a request; its response arrives on the shared response channel
    pub fn submit(&self, request: WireRequest) -> ProcessResult<()> {
        self.send_command(WorkerCommand::Process {
            request,
            reply: None,
        })
    }

    /// Get the next response (non-blocking)
    pub fn poll_response(&self) -> Option<Response> {
        self.response_receiver.try_recv().ok()
    }

    /// Get the next response (blocking)
    pub fn wait_response(&self) -> ProcessResult<Response> {
        self.response_receiver
            .recv()
            .map_err(|_| ProcessError::ChannelRecv)
    }

    /// Submit a request and block until its own response comes back
    pub fn call(&self, request: WireRequest) -> ProcessResult<Response> {
        let (reply_sender, reply_receiver) = bounded(1);
        self.send_command(WorkerCommand::Process {
            request,
            reply: Some(reply_sender),
        })?;
        reply_receiver.recv().map_err(|_| ProcessError::ChannelRecv)
    }

    /// Fetch the worker's lifetime counters
    pub fn diagnostics(&self) -> ProcessResult<Diagnostics> {
        let (reply_sender, reply_receiver) = bounded(1);
        self.send_command(WorkerCommand::Diagnostics(reply_sender))?;
        reply_receiver.recv().map_err(|_| ProcessError::ChannelRecv)
    }

    /// Stop the worker after it drains already-queued requests
    pub fn shutdown(mut self) {
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.worker_thread
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    fn send_command(&self, command: WorkerCommand) -> ProcessResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| ProcessError::ChannelSend)
    }

    fn stop(&mut self) {
        let Some(handle) = self.worker_thread.take() else {
            return;
        };

        // Queued requests are ahead of this in the channel
        if self.command_sender.send(WorkerCommand::Shutdown).is_err() {
            self.shutdown_flag.store(true, Ordering::SeqCst);
        }

        if handle.join().is_err() {
            warn!("Processor worker terminated abnormally");
        }
    }

    /// Worker thread main loop
    fn worker_main(
        mut state: ProcessorState,
        command_receiver: Receiver<WorkerCommand>,
        response_sender: Sender<Response>,
        shutdown_flag: Arc<AtomicBool>,
    ) {
        info!(
            sample_rate = state.sample_rate(),
            "Processor worker started"
        );

        while !shutdown_flag.load(Ordering::SeqCst) {
            match command_receiver.recv_timeout(IDLE_POLL_INTERVAL) {
                Ok(WorkerCommand::Process { request, reply }) => {
                    let response = state.handle_wire(request);
                    let delivered = match reply {
                        Some(reply) => reply.send(response).is_ok(),
                        None => response_sender.send(response).is_ok(),
                    };
                    if !delivered {
                        debug!("Response dropped, requester went away");
                    }
                }
                Ok(WorkerCommand::Diagnostics(reply)) => {
                    let _ = reply.send(state.diagnostics());
                }
                Ok(WorkerCommand::Shutdown) => {
                    info!("Shutdown command received");
                    shutdown_flag.store(true, Ordering::SeqCst);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Command channel disconnected");
                    break;
                }
            }
        }

        let diagnostics = state.diagnostics();
        info!(
            frames = diagnostics.frames_processed,
            busy_ms = diagnostics.total_processing_time.as_secs_f64() * 1000.0,
            "Processor worker stopped"
        );
    }
}

impl Drop for ProcessorWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
