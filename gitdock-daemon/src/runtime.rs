use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use gitdock_core::types::RepoName;

use crate::error::{io_err, DaemonError};
use crate::intake;
use crate::orchestrator::{SyncOrchestrator, SyncResult};
use crate::paths::{logs_dir, pid_path, run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

pub const LOG_FORMAT_ENV: &str = "GITDOCK_LOG_FORMAT";

#[derive(Debug, Clone)]
enum JobKind {
    Update(RepoName),
    SyncAll,
    Discover,
}

impl JobKind {
    fn label(&self) -> String {
        match self {
            JobKind::Update(name) => name.0.clone(),
            JobKind::SyncAll => "all".to_string(),
            JobKind::Discover => "discover".to_string(),
        }
    }
}

struct Job {
    kind: JobKind,
    source: &'static str,
    respond_to: oneshot::Sender<JobOutcome>,
}

/// What the queue processor hands back to the requester.
#[derive(Debug)]
enum JobOutcome {
    Update(SyncResult),
    SyncAll(Vec<SyncResult>),
    Discover(Value),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncAllSummary {
    pub source: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u128,
    pub results: Vec<SyncResult>,
}

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon with engines built from `settings.yaml`.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let orchestrator = SyncOrchestrator::from_home(&home)?;
    run_with(home, Arc::new(orchestrator)).await
}

/// Run the daemon around an already-built orchestrator.
pub async fn run_with(home: PathBuf, orchestrator: Arc<SyncOrchestrator>) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    write_pid_file(&home)?;
    let started_at_unix = unix_seconds_now();

    let (job_tx, job_rx) = mpsc::channel::<Job>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let result = job_processor_task(orchestrator, job_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let job_tx = job_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                job_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(home = %home.display(), "daemon started");
    let (processor_result, socket_result, rotation_result, signal_result) =
        tokio::join!(processor_handle, socket_handle, rotation_handle, signal_handle);

    remove_pid_file(&home);
    handle_join("job_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

/// Single consumer: every sync, notification and discovery runs here in
/// arrival order.
async fn job_processor_task(
    orchestrator: Arc<SyncOrchestrator>,
    mut job_rx: mpsc::Receiver<Job>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                tracing::info!(target_name = %job.kind.label(), source = job.source, "job started");

                let outcome = match &job.kind {
                    JobKind::Update(name) => JobOutcome::Update(orchestrator.process_update(name).await),
                    JobKind::SyncAll => match orchestrator.sync_all().await {
                        Ok(results) => JobOutcome::SyncAll(results),
                        Err(err) => JobOutcome::Failed(err.to_string()),
                    },
                    JobKind::Discover => match orchestrator.discover_containers().await {
                        Ok(report) => match serde_json::to_value(&report) {
                            Ok(value) => JobOutcome::Discover(value),
                            Err(err) => JobOutcome::Failed(err.to_string()),
                        },
                        Err(err) => JobOutcome::Failed(err.to_string()),
                    },
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    job_tx: mpsc::Sender<Job>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let job_tx = job_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, home, job_tx, shutdown_tx, started_at_unix).await
                    {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    job_tx: mpsc::Sender<Job>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = dispatch(&home, &job_tx, &shutdown_tx, request.clone(), started_at_unix).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    home: &Path,
    job_tx: &mpsc::Sender<Job>,
    shutdown_tx: &broadcast::Sender<()>,
    request: DaemonRequest,
    started_at_unix: u64,
) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => match build_status_payload(home, started_at_unix) {
            Ok(payload) => DaemonResponse::ok(payload),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        "notify" => {
            let event = request.event.unwrap_or(Value::Null);
            match intake::accept(home, &event) {
                Ok(notification) => {
                    tracing::info!(
                        repository = %notification.repository,
                        git_ref = ?notification.git_ref,
                        "notification accepted"
                    );
                    enqueue(job_tx, JobKind::Update(notification.repository), "notify").await
                }
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        "sync" => match request.repository.filter(|r| !r.trim().is_empty()) {
            Some(repository) => {
                enqueue(job_tx, JobKind::Update(RepoName::from(repository.trim())), "socket").await
            }
            None => enqueue(job_tx, JobKind::SyncAll, "socket").await,
        },
        "sync_all" => enqueue(job_tx, JobKind::SyncAll, "socket").await,
        "discover" => enqueue(job_tx, JobKind::Discover, "socket").await,
        "stop" => {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

/// Queue a job and wait for its outcome.
async fn enqueue(job_tx: &mpsc::Sender<Job>, kind: JobKind, source: &'static str) -> DaemonResponse {
    let started = Instant::now();
    let (tx, rx) = oneshot::channel();
    if job_tx
        .send(Job {
            kind,
            source,
            respond_to: tx,
        })
        .await
        .is_err()
    {
        return DaemonResponse::error(DaemonError::ChannelClosed("job queue").to_string());
    }
    let Ok(outcome) = rx.await else {
        return DaemonResponse::error(DaemonError::ChannelClosed("job response").to_string());
    };

    match outcome {
        JobOutcome::Update(result) => update_response(&result),
        JobOutcome::SyncAll(results) => {
            let succeeded = results.iter().filter(|r| r.success()).count();
            let summary = SyncAllSummary {
                source: source.to_string(),
                total: results.len(),
                succeeded,
                failed: results.len() - succeeded,
                duration_ms: started.elapsed().as_millis(),
                results,
            };
            DaemonResponse::ok(json!(summary))
        }
        JobOutcome::Discover(report) => DaemonResponse::ok(report),
        JobOutcome::Failed(message) => DaemonResponse::error(message),
    }
}

fn update_response(result: &SyncResult) -> DaemonResponse {
    let data = json!(result);
    if result.success() {
        DaemonResponse::ok(data)
    } else {
        DaemonResponse::failed(result.errors.join("; "), data)
    }
}

fn build_status_payload(home: &Path, started_at_unix: u64) -> Result<Value, DaemonError> {
    let view = crate::status::status_at(home)?;
    Ok(json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": started_at_unix,
        "socket": socket_path(home).display().to_string(),
        "repositories": view.repositories,
        "containers": view.containers,
        "labelled_containers": view.labelled_containers,
    }))
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // rotate_logs logs its own failures
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok();
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    if StdUnixStream::connect(socket).is_ok() {
        return Err(DaemonError::Protocol(format!(
            "daemon socket already in use: {}",
            socket.display()
        )));
    }
    tracing::warn!(socket = %socket.display(), "removing stale daemon socket before bind");

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn write_pid_file(home: &Path) -> Result<(), DaemonError> {
    let path = pid_path(home);
    fs::write(&path, format!("{}\n", std::process::id())).map_err(|e| io_err(&path, e))
}

fn remove_pid_file(home: &Path) {
    let path = pid_path(home);
    if let Err(err) = fs::remove_file(&path) {
        if err.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "could not remove pid file");
        }
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `RUST_LOG` filter, default `info`; `GITDOCK_LOG_FORMAT=json` switches to
/// one JSON object per line.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
