use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub label: &'static str,
    pub python_exe: PathBuf,
    pub script: PathBuf,
    pub env: Vec<(String, String)>,
}

/// A long-lived Python process speaking one JSON object per line in each
/// direction. A request that times out or hits a dead process kills the
/// child; the next call starts a fresh one.
pub struct JsonLineWorker {
    spec: WorkerSpec,
    proc: Option<Running>,
}

struct Running {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<std::io::Result<String>>,
}

#[derive(Deserialize)]
struct Reply<O> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    result: Option<O>,
}

impl JsonLineWorker {
    pub fn new(spec: WorkerSpec) -> Self {
        Self { spec, proc: None }
    }

    pub fn call<I: Serialize, O: DeserializeOwned>(&mut self, req: &I, timeout: Duration) -> Result<O> {
        let mut line = serde_json::to_string(req)?;
        line.push('\n');

        let label = self.spec.label;
        let running = self.ensure_running()?;
        let sent = running
            .stdin
            .write_all(line.as_bytes())
            .and_then(|_| running.stdin.flush());
        if let Err(err) = sent {
            self.kill();
            return Err(anyhow!("{label} worker stdin closed: {err}"));
        }

        let raw = match running.replies.recv_timeout(timeout) {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                self.kill();
                return Err(anyhow!("{label} worker read failed: {err}"));
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("{label} worker timed out after {:?}; restarting", timeout);
                self.kill();
                return Err(anyhow!("{label} worker exceeded timeout ({timeout:?})"));
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.kill();
                return Err(anyhow!("{label} worker exited unexpectedly"));
            }
        };

        let reply: Reply<O> = match serde_json::from_str(&raw) {
            Ok(reply) => reply,
            Err(err) => {
                // Request/reply pairing is lost once a stray line shows up.
                self.kill();
                return Err(err).with_context(|| format!("parsing {label} worker reply"));
            }
        };
        if !reply.ok {
            return Err(anyhow!(
                "{label}: {}",
                reply.error.unwrap_or_else(|| "worker reported failure".to_string())
            ));
        }
        reply
            .result
            .ok_or_else(|| anyhow!("{label} worker reply has no result"))
    }

    fn ensure_running(&mut self) -> Result<&mut Running> {
        let alive = match self.proc.as_mut() {
            Some(running) => matches!(running.child.try_wait(), Ok(None)),
            None => false,
        };
        if !alive {
            self.kill();
            self.proc = Some(self.spawn()?);
        }
        let label = self.spec.label;
        self.proc
            .as_mut()
            .ok_or_else(|| anyhow!("{label} worker not running"))
    }

    fn spawn(&self) -> Result<Running> {
        let spec = &self.spec;
        debug!("spawning {} worker {}", spec.label, spec.script.display());

        let mut cmd = Command::new(&spec.python_exe);
        cmd.arg("-u").arg(&spec.script);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning python: {}", spec.script.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("no stderr"))?;

        // Pump stdout on its own thread so a hung worker can be timed out.
        let (tx, replies) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let stop = line.is_err();
                if tx.send(line).is_err() || stop {
                    break;
                }
            }
        });

        // Drain stderr so chatty libraries cannot block the child on a full pipe.
        let label = spec.label;
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                debug!("{label} stderr: {}", line.trim_end());
            }
        });

        Ok(Running {
            child,
            stdin,
            replies,
        })
    }

    fn kill(&mut self) {
        if let Some(mut running) = self.proc.take() {
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}

impl Drop for JsonLineWorker {
    fn drop(&mut self) {
        self.kill();
    }
}
