//! Generic load-test client: opens one connection, one session, and one
//! link of the workload's kind, fans out concurrent operation loops, and
//! tallies the outcome.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Options;
use crate::stats::RunState;
use crate::transport::{Link, Session, Transport, TransportBuilder};
use crate::workload::Workload;

/// Lifecycle of a client instance. `init` is only valid from `Created`,
/// `run` only from `Ready`; cleanup is valid from any state so a partially
/// failed init can still release its connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Created,
    Initializing,
    Ready,
    Running,
    CleaningUp,
    Closed,
}

pub struct Client<W: Workload> {
    options: Options,
    workload: Arc<W>,
    state: ClientState,
    run_state: Arc<RunState>,
    transport: Option<Box<dyn Transport>>,
    session: Option<Arc<dyn Session>>,
    link: Option<Arc<dyn Link>>,
    workers: Vec<JoinHandle<()>>,
    event_logger: Option<JoinHandle<()>>,
}

impl<W: Workload + 'static> Client<W> {
    pub fn new(options: Options, workload: W) -> Self {
        let run_state = Arc::new(RunState::new(options.count, options.progress));
        Self {
            options,
            workload: Arc::new(workload),
            state: ClientState::Created,
            run_state,
            transport: None,
            session: None,
            link: None,
            workers: Vec::new(),
            event_logger: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Shared counters for this run. Never reset.
    pub fn run_state(&self) -> &Arc<RunState> {
        &self.run_state
    }

    /// Current status line, e.g. `success 10 failure 0`. Safe to read while
    /// operations are in flight.
    pub fn status(&self) -> String {
        self.run_state.status()
    }

    /// Open the connection, session, and link. Session and link open in
    /// parallel; both must report opened before `run` may be called. Any
    /// open failure or timeout propagates and leaves the client in
    /// `Initializing` (cleanup still releases the connection).
    pub async fn init(&mut self) -> Result<()> {
        if self.state != ClientState::Created {
            bail!("init called in state {:?}", self.state);
        }
        self.state = ClientState::Initializing;

        let transport = TransportBuilder::connect(self.options.engine, &self.options)
            .await
            .context("transport connect failed")?;

        // Lifecycle notifications are advisory: drain them into the log.
        let events = transport.lifecycle();
        self.event_logger = Some(tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                info!(entity = %event.entity, event = %event.kind, "lifecycle");
            }
        }));

        // Store the connection before anything else can fail so a partially
        // failed init still gets a timed close from cleanup.
        let session = transport.create_session();
        self.transport = Some(transport);

        let link: Arc<dyn Link> = Arc::from(
            self.workload
                .create_link(&session)
                .context("link creation failed")?,
        );

        let open_timeout = self.options.open_timeout;
        futures::future::try_join(session.open(open_timeout), link.open(open_timeout))
            .await
            .context("session/link open failed")?;

        self.session = Some(session);
        self.link = Some(link);
        self.state = ClientState::Ready;
        Ok(())
    }

    /// Launch `requests` independent operation loops. Each loop repeats the
    /// workload operation until the shared attempt counter refuses it (an
    /// unbounded run never self-terminates; the driver is responsible for
    /// stopping it). Per-operation failures are recorded and swallowed so
    /// the other loops continue; a panicked loop surfaces as an error.
    /// Dropping the returned future mid-run leaves the loops to `cleanup`,
    /// which stops them before closing the connection.
    pub async fn run(&mut self) -> Result<()> {
        if self.state != ClientState::Ready {
            bail!("run called in state {:?}", self.state);
        }
        self.state = ClientState::Running;

        let link = self.link.clone().context("link not initialized")?;
        self.workers.reserve(self.options.requests as usize);
        for worker in 0..self.options.requests {
            let workload = Arc::clone(&self.workload);
            let link = Arc::clone(&link);
            let run_state = Arc::clone(&self.run_state);
            self.workers.push(tokio::spawn(async move {
                while run_state.attempt() {
                    let started = Instant::now();
                    match workload.execute(link.as_ref()).await {
                        Ok(()) => {
                            run_state.record_success();
                            run_state.record_latency(started.elapsed());
                        }
                        Err(e) => {
                            warn!(worker, error = %e, "operation failed");
                            run_state.record_failure();
                        }
                    }
                }
            }));
        }

        // Handles stay in self.workers so cleanup can abort loops if this
        // future is dropped mid-run (driver interrupt).
        let results = futures::future::join_all(self.workers.iter_mut()).await;
        self.workers.clear();
        let mut first_panic = None;
        for result in results {
            if let Err(e) = result {
                first_panic.get_or_insert(anyhow!("operation loop failed: {e}"));
            }
        }
        match first_panic {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close the connection with the configured timeout. A no-op when no
    /// connection was ever opened. Idempotent.
    pub async fn cleanup(&mut self) -> Result<()> {
        self.state = ClientState::CleaningUp;

        // Loops left over from an interrupted run must stop before the
        // connection goes away; an aborted loop halts at its next await.
        for handle in self.workers.drain(..) {
            handle.abort();
        }

        if let Some(link) = self.link.take() {
            let _ = link.close().await;
        }
        self.session = None;
        if let Some(transport) = self.transport.take() {
            transport
                .close(self.options.close_timeout)
                .await
                .context("transport close failed")?;
        }
        // Dropping the transport objects ends the event stream; give the
        // logger a bounded window to drain.
        if let Some(mut logger) = self.event_logger.take() {
            if tokio::time::timeout(self.options.close_timeout, &mut logger)
                .await
                .is_err()
            {
                logger.abort();
            }
        }

        self.state = ClientState::Closed;
        Ok(())
    }
}
