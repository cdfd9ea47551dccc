//! Single-channel audio playback.
//!
//! A [`PlaybackController`] plays a queue of files one after another through
//! an external player on a background thread. Starting a new queue always
//! interrupts the previous one.
//!
//! All shared state sits behind one mutex. Each queue is run by a worker
//! with its own [`WorkerId`]; a worker only touches shared state while it is
//! still the registered one, so a superseded worker finishing late can never
//! clear the state of its successor.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::backend::{find_executable, AudioBackend, BackendCache};
use crate::error::AudioError;

/// Receives playback errors; called from whichever thread hit the error
pub type ErrorSink = Arc<dyn Fn(&AudioError) + Send + Sync>;

/// How long a player gets to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_millis(200);
/// How long `stop` waits for the worker thread to wind down
const JOIN_TIMEOUT: Duration = Duration::from_millis(200);
/// Interval between checks on a running player
const POLL_INTERVAL: Duration = Duration::from_millis(25);

const WORKER_THREAD_NAME: &str = "clanki-audio";

/// Identity of one playback worker; later workers have larger ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

/// Stop signal shared between a worker and whoever may interrupt it
#[derive(Clone, Debug, Default)]
struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    fn new() -> Self {
        Self::default()
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The player process currently running
#[derive(Clone)]
struct RunningClip {
    worker: WorkerId,
    pid: u32,
    process: Arc<Mutex<Child>>,
}

impl RunningClip {
    fn is_same(&self, other: &RunningClip) -> bool {
        Arc::ptr_eq(&self.process, &other.process)
    }
}

struct ActiveWorker {
    id: WorkerId,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SessionState {
    running: Option<RunningClip>,
    worker: Option<ActiveWorker>,
}

impl SessionState {
    fn is_current(&self, id: WorkerId) -> bool {
        self.worker.as_ref().map_or(false, |w| w.id == id)
    }
}

struct Inner {
    state: Mutex<SessionState>,
    backends: BackendCache,
    next_worker: AtomicU64,
}

/// Lock a mutex, carrying on with the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Hand an error to the caller's sink without letting the sink unwind into us
pub(crate) fn emit(on_error: Option<&ErrorSink>, error: AudioError) {
    log::debug!("Audio error: {error}");
    let Some(sink) = on_error else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| sink(&error))).is_err() {
        log::warn!("Audio error callback panicked while reporting: {error}");
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    /// Make a new worker the registered one, cancelling any it displaces
    fn register_worker(&self, state: &mut SessionState, cancel: CancellationToken) -> WorkerId {
        let id = WorkerId(self.next_worker.fetch_add(1, Ordering::Relaxed) + 1);
        if let Some(previous) = state.worker.take() {
            previous.cancel.cancel();
        }
        if let Some(clip) = state.running.take() {
            let mut child = lock(&clip.process);
            if let Err(e) = child.kill() {
                log::debug!("Failed to kill superseded player {}: {}", clip.pid, e);
            }
        }
        state.worker = Some(ActiveWorker {
            id,
            cancel,
            handle: None,
        });
        id
    }

    /// Clear shared state on behalf of a finishing worker, if it is still
    /// the registered one
    fn finish_worker(&self, id: WorkerId) {
        let mut state = self.state();
        if !state.is_current(id) {
            log::debug!("Superseded audio worker {:?} finished", id);
            return;
        }
        state.worker = None;
        if state.running.as_ref().map_or(false, |r| r.worker == id) {
            state.running = None;
        }
    }

    fn run_worker(
        &self,
        id: WorkerId,
        cancel: CancellationToken,
        backend: AudioBackend,
        files: Vec<PathBuf>,
        on_error: Option<ErrorSink>,
    ) {
        let program =
            find_executable(&backend.binary).unwrap_or_else(|| PathBuf::from(&backend.binary));

        for file in &files {
            let launched = {
                let mut state = self.state();
                if cancel.is_cancelled() || !state.is_current(id) {
                    break;
                }
                let spawned = Command::new(&program)
                    .args(backend.command_args(file))
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn();
                spawned.map(|child| {
                    let clip = RunningClip {
                        worker: id,
                        pid: child.id(),
                        process: Arc::new(Mutex::new(child)),
                    };
                    state.running = Some(clip.clone());
                    clip
                })
            };

            let clip = match launched {
                Ok(clip) => clip,
                Err(e) => {
                    emit(
                        on_error.as_ref(),
                        AudioError::Launch {
                            backend: backend.binary.clone(),
                            message: e.to_string(),
                        },
                    );
                    break;
                }
            };
            log::debug!("Playing {} (pid {})", file.display(), clip.pid);

            let outcome = wait_for_exit(&clip);
            {
                let mut state = self.state();
                if state.running.as_ref().map_or(false, |r| r.is_same(&clip)) {
                    state.running = None;
                }
            }

            match outcome {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    if !cancel.is_cancelled() {
                        emit(
                            on_error.as_ref(),
                            AudioError::Exit {
                                backend: backend.binary.clone(),
                                status: describe_status(status),
                            },
                        );
                    }
                    break;
                }
                Err(e) => {
                    emit(
                        on_error.as_ref(),
                        AudioError::Wait {
                            backend: backend.binary.clone(),
                            message: e.to_string(),
                        },
                    );
                    break;
                }
            }
        }

        self.finish_worker(id);
    }
}

/// Poll the player until it exits, holding its lock only per check
fn wait_for_exit(clip: &RunningClip) -> std::io::Result<ExitStatus> {
    loop {
        if let Some(status) = lock(&clip.process).try_wait()? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Exit code, or the negated signal number for a killed player
fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return code.to_string();
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("-{signal}");
        }
    }
    status.to_string()
}

/// Ask the player to exit, then kill it if it has not within the grace period
fn terminate(clip: &RunningClip) {
    {
        let mut child = lock(&clip.process);
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        request_exit(&mut child, clip.pid);
    }

    let deadline = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < deadline {
        match lock(&clip.process).try_wait() {
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Ok(Some(_)) | Err(_) => return,
        }
    }

    let mut child = lock(&clip.process);
    if matches!(child.try_wait(), Ok(None)) {
        log::debug!("Player {} ignored SIGTERM, killing", clip.pid);
        if let Err(e) = child.kill() {
            log::warn!("Failed to kill audio player {}: {}", clip.pid, e);
        }
    }
}

#[cfg(unix)]
fn request_exit(_child: &mut Child, pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: the child has not been reaped (checked under the same lock),
    // so the pid still names our process.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        log::debug!(
            "SIGTERM to player {} failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child, pid: u32) {
    if let Err(e) = child.kill() {
        log::debug!("Failed to stop player {}: {}", pid, e);
    }
}

/// Plays audio files through an external player, one queue at a time
///
/// Cloning gives another handle to the same channel.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackController {
    /// Controller using the platform's usual players
    pub fn new() -> Self {
        Self::with_backend_cache(BackendCache::new())
    }

    pub fn with_backend_cache(backends: BackendCache) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::default()),
                backends,
                next_worker: AtomicU64::new(0),
            }),
        }
    }

    /// The player detection cache this controller uses
    pub fn backends(&self) -> &BackendCache {
        &self.inner.backends
    }

    /// Start playing `files` in order, interrupting anything already playing
    ///
    /// Returns as soon as the queue is launched. Missing files are skipped;
    /// an empty queue is a successful no-op. Returns `false` only when
    /// playback could not be started, after reporting why to `on_error`.
    pub fn play(&self, files: &[PathBuf], on_error: Option<ErrorSink>) -> bool {
        if files.is_empty() {
            return true;
        }

        let Some(backend) = self.inner.backends.detect() else {
            emit(
                on_error.as_ref(),
                AudioError::NoBackend(self.inner.backends.unavailable_message()),
            );
            return false;
        };

        self.stop();

        let files: Vec<PathBuf> = files.iter().filter(|f| f.is_file()).cloned().collect();
        if files.is_empty() {
            return true;
        }

        let cancel = CancellationToken::new();
        let mut state = self.inner.state();
        let id = self.inner.register_worker(&mut state, cancel.clone());

        let inner = Arc::clone(&self.inner);
        let worker_errors = on_error.clone();
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || inner.run_worker(id, cancel, backend, files, worker_errors));

        match spawned {
            Ok(handle) => {
                if let Some(worker) = state.worker.as_mut().filter(|w| w.id == id) {
                    worker.handle = Some(handle);
                }
                log::debug!("Started audio worker {:?}", id);
                true
            }
            Err(e) => {
                if state.is_current(id) {
                    state.worker = None;
                }
                drop(state);
                emit(on_error.as_ref(), AudioError::Spawn(e.to_string()));
                false
            }
        }
    }

    /// Stop whatever is playing
    ///
    /// The worker is told to stop, the running player is terminated (killed
    /// after a short grace period) and the worker is joined if it winds down
    /// promptly.
    pub fn stop(&self) {
        let (clip, worker_id, handle) = {
            let mut state = self.inner.state();
            let Some(worker) = state.worker.as_mut() else {
                return;
            };
            worker.cancel.cancel();
            let id = worker.id;
            let handle = worker.handle.take();
            (state.running.clone(), id, handle)
        };

        if let Some(clip) = &clip {
            terminate(clip);
        }

        let mut unfinished = None;
        if let Some(handle) = handle {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::warn!("Audio worker {:?} panicked", worker_id);
                }
            } else {
                unfinished = Some(handle);
            }
        }

        let mut state = self.inner.state();
        if let (Some(clip), Some(running)) = (&clip, &state.running) {
            if running.is_same(clip) {
                state.running = None;
            }
        }
        if state.is_current(worker_id) {
            match unfinished {
                None => state.worker = None,
                Some(handle) => {
                    if let Some(worker) = state.worker.as_mut() {
                        worker.handle = Some(handle);
                    }
                }
            }
        }
    }

    /// Worker currently registered to play, if any
    pub fn active_worker(&self) -> Option<WorkerId> {
        self.inner.state().worker.as_ref().map(|w| w.id)
    }

    pub fn is_playing(&self) -> bool {
        self.active_worker().is_some()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn controller_with(backend: AudioBackend) -> PlaybackController {
        PlaybackController::with_backend_cache(BackendCache::with_candidates(vec![backend]))
    }

    fn sleeper() -> AudioBackend {
        AudioBackend::new("sleeper", "sh", &["-c", "sleep 5"])
    }

    fn collecting_sink() -> (ErrorSink, Arc<Mutex<Vec<AudioError>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink_errors = Arc::clone(&errors);
        let sink: ErrorSink = Arc::new(move |e: &AudioError| {
            sink_errors.lock().unwrap().push(e.clone());
        });
        (sink, errors)
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    fn media_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"audio").unwrap();
        path
    }

    #[test]
    fn test_empty_queue_is_noop() {
        let controller = controller_with(sleeper());
        let (sink, errors) = collecting_sink();
        assert!(controller.play(&[], Some(sink)));
        assert!(!controller.is_playing());
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_backend_reports_message() {
        let controller = controller_with(AudioBackend::new(
            "missing",
            "definitely-not-an-audio-player-7f3a",
            &[],
        ));
        let (sink, errors) = collecting_sink();
        assert!(!controller.play(&[PathBuf::from("/tmp/a.mp3")], Some(sink)));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            AudioError::NoBackend(msg) if msg.starts_with("No supported audio player")
        ));
    }

    #[test]
    fn test_missing_files_skipped() {
        let dir = TempDir::new().unwrap();
        let controller = controller_with(sleeper());
        assert!(controller.play(&[dir.path().join("gone.mp3")], None));
        assert!(!controller.is_playing());
    }

    #[test]
    fn test_plays_files_in_order() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("played.log");
        let script = format!("printf '%s\\n' \"$0\" >> '{}'", log.display());
        let controller = controller_with(AudioBackend::new("logger", "sh", &["-c", &script]));

        let a = media_file(&dir, "a.mp3");
        let b = media_file(&dir, "b.mp3");
        let (sink, errors) = collecting_sink();
        assert!(controller.play(&[a.clone(), b.clone()], Some(sink)));

        assert!(wait_until(Duration::from_secs(5), || !controller.is_playing()));
        let played = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = played.lines().collect();
        assert_eq!(lines, vec![a.to_str().unwrap(), b.to_str().unwrap()]);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_nonzero_exit_reported_and_queue_aborted() {
        let dir = TempDir::new().unwrap();
        let controller = controller_with(AudioBackend::new("failing", "sh", &["-c", "exit 3"]));
        let files = vec![media_file(&dir, "a.mp3"), media_file(&dir, "b.mp3")];
        let (sink, errors) = collecting_sink();

        assert!(controller.play(&files, Some(sink)));
        assert!(wait_until(Duration::from_secs(5), || !controller.is_playing()));

        let errors = errors.lock().unwrap();
        assert_eq!(
            *errors,
            vec![AudioError::Exit {
                backend: "sh".to_string(),
                status: "3".to_string(),
            }]
        );
    }

    #[test]
    fn test_launch_failure_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let player = dir.path().join("player");
        fs::write(&player, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&player, fs::Permissions::from_mode(0o755)).unwrap();

        let controller = controller_with(AudioBackend::new(
            "player",
            player.to_str().unwrap(),
            &[],
        ));
        assert!(controller.backends().is_available());
        fs::remove_file(&player).unwrap();

        let (sink, errors) = collecting_sink();
        assert!(controller.play(&[media_file(&dir, "a.mp3")], Some(sink)));
        assert!(wait_until(Duration::from_secs(5), || !controller.is_playing()));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], AudioError::Launch { .. }));
    }

    #[test]
    fn test_stop_interrupts_without_error() {
        let dir = TempDir::new().unwrap();
        let controller = controller_with(sleeper());
        let (sink, errors) = collecting_sink();

        assert!(controller.play(&[media_file(&dir, "a.mp3")], Some(sink)));
        assert!(wait_until(Duration::from_secs(5), || {
            controller.inner.state().running.is_some()
        }));

        let started = Instant::now();
        controller.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(wait_until(Duration::from_secs(2), || !controller.is_playing()));
        assert!(controller.inner.state().running.is_none());
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_kills_player_ignoring_sigterm() {
        let dir = TempDir::new().unwrap();
        // The file path arrives as $0; the marker shows the trap is in place
        let stubborn = AudioBackend::new(
            "stubborn",
            "sh",
            &["-c", "trap '' TERM; : > \"$0.ready\"; while :; do sleep 0.05; done"],
        );
        let controller = controller_with(stubborn);
        let (sink, errors) = collecting_sink();
        let file = media_file(&dir, "a.mp3");

        assert!(controller.play(&[file], Some(sink)));
        let ready = dir.path().join("a.mp3.ready");
        assert!(wait_until(Duration::from_secs(5), || ready.exists()));

        let started = Instant::now();
        controller.stop();
        let elapsed = started.elapsed();
        assert!(elapsed >= TERMINATE_GRACE, "stopped after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "stopped after {elapsed:?}");

        assert!(wait_until(Duration::from_secs(2), || !controller.is_playing()));
        assert!(controller.inner.state().running.is_none());
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_new_play_supersedes_previous() {
        let dir = TempDir::new().unwrap();
        let controller = controller_with(sleeper());
        let file = media_file(&dir, "a.mp3");

        assert!(controller.play(&[file.clone()], None));
        let first = controller.active_worker().unwrap();
        assert!(controller.play(&[file], None));
        let second = controller.active_worker().unwrap();
        assert!(second > first);

        controller.stop();
        assert!(wait_until(Duration::from_secs(2), || !controller.is_playing()));
    }

    #[test]
    fn test_stale_worker_finish_keeps_successor() {
        let controller = controller_with(sleeper());
        let inner = &controller.inner;

        let first = {
            let mut state = inner.state();
            inner.register_worker(&mut state, CancellationToken::new())
        };
        let first_cancel = inner.state().worker.as_ref().unwrap().cancel.clone();
        let second = {
            let mut state = inner.state();
            inner.register_worker(&mut state, CancellationToken::new())
        };

        assert!(first_cancel.is_cancelled());
        inner.finish_worker(first);
        assert_eq!(controller.active_worker(), Some(second));

        inner.finish_worker(second);
        assert_eq!(controller.active_worker(), None);
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let controller = controller_with(AudioBackend::new(
            "missing",
            "definitely-not-an-audio-player-7f3a",
            &[],
        ));
        let sink: ErrorSink = Arc::new(|_: &AudioError| panic!("sink failure"));
        assert!(!controller.play(&[PathBuf::from("/tmp/a.mp3")], Some(sink)));
        assert!(!controller.is_playing());
        assert!(!controller.play(&[PathBuf::from("/tmp/a.mp3")], None));
    }
}
