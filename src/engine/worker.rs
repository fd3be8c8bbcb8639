// Worker pool for parallel transcoding and the process registry used to cancel jobs

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, warn};
use uuid::Uuid;

use super::core::{Supervisor, TranscodeParams};
use super::error::EngineError;

#[derive(Debug, Default)]
struct RegistryState {
    running: HashMap<String, u32>,
    cancelled: HashSet<String>,
}

/// Child PIDs of running jobs, keyed by job id
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, job_id: &str, pid: u32) {
        let mut state = self.state();
        state.cancelled.remove(job_id);
        state.running.insert(job_id.to_string(), pid);
    }

    /// Forget a finished job. Returns true if it was cancelled while running.
    pub fn unregister(&self, job_id: &str) -> bool {
        let mut state = self.state();
        state.running.remove(job_id);
        state.cancelled.remove(job_id)
    }

    /// Wait for a registered child to exit, then forget its job.
    /// Returns the exit status and whether the job was cancelled.
    #[cfg(unix)]
    pub fn wait_and_unregister(
        &self,
        job_id: &str,
        child: &mut Child,
    ) -> (io::Result<ExitStatus>, bool) {
        // The exited child stays a zombie until reaped, so its pid cannot be
        // reused while cancel() may still signal it
        wait_exited(child.id());
        let cancelled = self.unregister(job_id);
        (child.wait(), cancelled)
    }

    /// Wait for a registered child to exit, then forget its job.
    /// Returns the exit status and whether the job was cancelled.
    #[cfg(not(unix))]
    pub fn wait_and_unregister(
        &self,
        job_id: &str,
        child: &mut Child,
    ) -> (io::Result<ExitStatus>, bool) {
        // The open process handle keeps the pid reserved until `child` drops
        let status = child.wait();
        (status, self.unregister(job_id))
    }

    /// Terminate a running job. Returns false if the job is not running.
    pub fn cancel(&self, job_id: &str) -> bool {
        let pid = {
            let mut state = self.state();
            let Some(pid) = state.running.get(job_id).copied() else {
                return false;
            };
            state.cancelled.insert(job_id.to_string());
            pid
        };
        debug!(job = job_id, pid, "cancelling job");
        terminate(pid);
        true
    }

    /// Terminate every running job, returning how many were signalled
    pub fn cancel_all(&self) -> usize {
        let pids: Vec<(String, u32)> = {
            let mut state = self.state();
            let running: Vec<_> = state
                .running
                .iter()
                .map(|(id, pid)| (id.clone(), *pid))
                .collect();
            for (id, _) in &running {
                state.cancelled.insert(id.clone());
            }
            running
        };

        for (id, pid) in &pids {
            debug!(job = %id, pid, "cancelling job");
            terminate(*pid);
        }
        pids.len()
    }

    pub fn running_count(&self) -> usize {
        self.state().running.len()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.state().running.contains_key(job_id)
    }
}

/// Block until `pid` has exited, without reaping it
#[cfg(unix)]
fn wait_exited(pid: u32) {
    loop {
        // SAFETY: siginfo_t is plain data filled in by waitid; WNOWAIT leaves
        // the child waitable for Child::wait
        let rc = unsafe {
            let mut info: libc::siginfo_t = std::mem::zeroed();
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 || io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
            return;
        }
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill only sends a signal; a stale pid at worst yields ESRCH
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        warn!("failed to signal process {}: {}", pid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) {
    let result = crate::engine::tools::command_for(std::path::Path::new("taskkill"))
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
    if let Err(e) = result {
        warn!("failed to terminate process {}: {}", pid, e);
    }
}

/// Message from worker to main thread
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Job started transcoding
    JobStarted { job_id: String },

    /// Job completed successfully
    JobCompleted { job_id: String, output: PathBuf },

    /// Job failed with error
    JobFailed { job_id: String, error: String },

    /// Worker is idle (waiting for work)
    WorkerIdle { worker_id: usize },
}

/// One input file and the parameters to apply to it
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub id: String,
    pub input: PathBuf,
    pub params: TranscodeParams,
}

impl TranscodeJob {
    pub fn new(input: impl Into<PathBuf>, params: TranscodeParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input: input.into(),
            params,
        }
    }
}

/// Outcome of one job in a batch
pub type JobOutcome = (String, Result<PathBuf, String>);

/// Worker pool for managing parallel transcode jobs
pub struct WorkerPool {
    supervisor: Supervisor,
    max_workers: Arc<Mutex<usize>>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    active_workers: Arc<Mutex<usize>>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(supervisor: Supervisor, max_workers: usize) -> Self {
        let (tx, rx) = mpsc::channel();

        Self {
            supervisor,
            max_workers: Arc::new(Mutex::new(max_workers.max(1))),
            tx,
            rx,
            active_workers: Arc::new(Mutex::new(0)),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Spawn a worker thread that runs one job to completion
    pub fn spawn_worker(&self, worker_id: usize, job: TranscodeJob) {
        let tx = self.tx.clone();
        let active = self.active_workers.clone();
        let supervisor = self.supervisor.clone();

        // Counted before the thread starts so can_spawn() is accurate immediately
        *lock(&active) += 1;

        thread::spawn(move || {
            let _ = tx.send(WorkerMessage::JobStarted {
                job_id: job.id.clone(),
            });

            let message = match supervisor.transcode(&job.id, &job.input, &job.params) {
                Ok(output) => WorkerMessage::JobCompleted {
                    job_id: job.id,
                    output,
                },
                Err(e) => WorkerMessage::JobFailed {
                    job_id: job.id,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(message);

            *lock(&active) -= 1;

            let _ = tx.send(WorkerMessage::WorkerIdle { worker_id });
        });
    }

    /// Get the number of active workers
    pub fn active_count(&self) -> usize {
        *lock(&self.active_workers)
    }

    /// Get the maximum number of workers
    pub fn max_workers(&self) -> usize {
        *lock(&self.max_workers)
    }

    /// Set the maximum number of workers
    pub fn set_max_workers(&self, max: usize) {
        *lock(&self.max_workers) = max.max(1);
    }

    /// Check if we can spawn more workers
    pub fn can_spawn(&self) -> bool {
        self.active_count() < self.max_workers()
    }

    pub fn cancel(&self, job_id: &str) -> bool {
        self.supervisor.cancel(job_id)
    }

    pub fn cancel_all(&self) -> usize {
        self.supervisor.registry().cancel_all()
    }

    /// Run a batch, keeping at most `max_workers` jobs in flight.
    ///
    /// Every worker message is passed to `on_message`. Outcomes are returned
    /// in completion order. A job whose output file another job in the batch
    /// already writes fails without running.
    pub fn run_all<F>(&self, jobs: Vec<TranscodeJob>, mut on_message: F) -> Vec<JobOutcome>
    where
        F: FnMut(&WorkerMessage),
    {
        let total = jobs.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut queue = VecDeque::with_capacity(total);
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();

        for job in jobs {
            // Unresolvable outputs are left for the supervisor to report
            let Ok(output) = self.supervisor.output_path(&job.input) else {
                queue.push_back(job);
                continue;
            };
            match claimed.get(&output) {
                Some(owner) => {
                    let error = EngineError::OutputConflict {
                        path: output,
                        job: owner.clone(),
                    };
                    warn!(job = %job.id, "{}", error);
                    let message = WorkerMessage::JobFailed {
                        job_id: job.id,
                        error: error.to_string(),
                    };
                    on_message(&message);
                    outcomes.extend(outcome(message));
                }
                None => {
                    claimed.insert(output, job.id.clone());
                    queue.push_back(job);
                }
            }
        }

        let mut next_worker = 0;

        while outcomes.len() < total {
            while self.can_spawn() {
                let Some(job) = queue.pop_front() else {
                    break;
                };
                self.spawn_worker(next_worker, job);
                next_worker += 1;
            }

            // Never disconnected while the pool owns a sender
            let Ok(message) = self.rx.recv() else {
                break;
            };
            on_message(&message);
            outcomes.extend(outcome(message));
        }

        outcomes
    }
}

fn outcome(message: WorkerMessage) -> Option<JobOutcome> {
    match message {
        WorkerMessage::JobCompleted { job_id, output } => Some((job_id, Ok(output))),
        WorkerMessage::JobFailed { job_id, error } => Some((job_id, Err(error))),
        WorkerMessage::JobStarted { .. } | WorkerMessage::WorkerIdle { .. } => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
