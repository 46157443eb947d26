use std::sync::Arc;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use lord_model::WorkerId;

/// How child output is re-emitted through the supervisor log.
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    /// Longer lines are cut at this many bytes (on a char boundary).
    pub max_line_length: usize,
    /// Log stdout at INFO (otherwise DEBUG).
    pub stdout_info: bool,
    /// Log stderr at WARN (otherwise DEBUG).
    pub stderr_warn: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
            stdout_info: true,
            stderr_warn: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Tag attached to every line a tenant child writes.
#[derive(Debug, Clone)]
pub(crate) struct TenantOutput {
    pub tenant: Arc<str>,
    pub worker: Option<WorkerId>,
}

pub(crate) fn truncate(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

fn trim_newline(mut buf: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = buf {
        buf = rest;
    }
    if let [rest @ .., b'\r'] = buf {
        buf = rest;
    }
    buf
}

/// Forward `reader` line by line into `tracing` until EOF.
///
/// Lines are read as raw bytes and decoded lossily: the pipe must stay open
/// until the child closes it, otherwise its next write dies on SIGPIPE.
pub(crate) fn pump<R>(reader: R, stream: Stream, tag: TenantOutput, cfg: OutputConfig) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(tenant = %tag.tenant, stream = stream.as_str(), error = %e, "child output closed");
                    break;
                }
            }
            let line = String::from_utf8_lossy(trim_newline(&buf));
            let line = truncate(&line, cfg.max_line_length);
            let worker = tag.worker.map(i64::from).unwrap_or(-1);
            match stream {
                Stream::Stdout if cfg.stdout_info => {
                    info!(tenant = %tag.tenant, worker, stream = "stdout", "{line}")
                }
                Stream::Stderr if cfg.stderr_warn => {
                    warn!(tenant = %tag.tenant, worker, stream = "stderr", "{line}")
                }
                _ => debug!(tenant = %tag.tenant, worker, stream = stream.as_str(), "{line}"),
            }
        }
    })
}
