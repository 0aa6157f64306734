use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "db";

use crate::{log_error, log_info, log_warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Close,
}

struct Worker {
    jobs: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if self.jobs.send(Message::Close).is_err() {
            log_warn!("database worker already gone at shutdown");
        }
        if let Err(err) = handle.join() {
            log_error!("database worker panicked: {err:?}");
        }
    }
}

/// Handle to the SQLite connection. The connection lives on its own
/// thread; every statement runs there and async callers await the reply.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        log_warn!("WAL journal unavailable, using default: {err}");
    }
    Ok(conn)
}

impl Database {
    /// Open (creating if needed) the database at `path` and bring its schema
    /// up to date before returning.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("deeplie-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path)
                    .and_then(|mut conn| run_migrations(&mut conn).map(|_| conn))
                {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for message in jobs_rx {
                    match message {
                        Message::Run(job) => job(&mut conn),
                        Message::Close => break,
                    }
                }
                log_info!("database worker stopped");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before it was ready")??;
        log_info!("database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: jobs_tx,
                thread: Mutex::new(Some(thread)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `task` on the database thread.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .send(Message::Run(job))
            .map_err(|_| anyhow!("database worker is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}
