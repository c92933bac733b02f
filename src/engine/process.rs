use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::debug;

use crate::error::{EngineError, Result};

/// Output of a finished runtime process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined output on success; a [`EngineError::ContainedProcess`] otherwise.
    pub fn into_output(self, image: &str, command: &[String]) -> Result<String> {
        if !self.success() {
            return Err(EngineError::ContainedProcess {
                image: image.to_string(),
                command: shell_words::join(command),
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            });
        }
        let mut out = self.stdout;
        out.push_str(&self.stderr);
        Ok(out)
    }
}

/// Run `program` with `args` to completion, capturing both streams.
///
/// Blocks the calling thread. Lines are echoed at debug level as they arrive.
/// A missing program is reported as a configuration error.
pub fn run(program: &str, args: &[String]) -> Result<Captured> {
    debug!(program, args = %shell_words::join(args), "spawning runtime");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                EngineError::config(format!("`{program}` was not found on PATH"))
            } else {
                EngineError::RuntimeSpawn {
                    program: program.to_string(),
                    source,
                }
            }
        })?;

    let stdout = child.stdout.take().map(|s| collect(s, "stdout"));
    let stderr = child.stderr.take().map(|s| collect(s, "stderr"));

    let status = child
        .wait()
        .map_err(|e| EngineError::io(format!("failed to wait for `{program}`"), e))?;

    Ok(Captured {
        exit_code: status.code(),
        stdout: stdout.map(finish).unwrap_or_default(),
        stderr: stderr.map(finish).unwrap_or_default(),
    })
}

type Collector = (JoinHandle<()>, Arc<Mutex<String>>);

// Each stream gets its own reader thread so a full pipe never stalls the child.
fn collect<R: Read + Send + 'static>(stream: R, label: &'static str) -> Collector {
    let buf = Arc::new(Mutex::new(String::new()));
    let sink = buf.clone();
    let handle = std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    debug!(stream = label, "{l}");
                    if let Ok(mut buf) = sink.lock() {
                        buf.push_str(&l);
                        buf.push('\n');
                    }
                }
                Err(_) => break,
            }
        }
    });
    (handle, buf)
}

fn finish((handle, buf): Collector) -> String {
    let _ = handle.join();
    buf.lock().map(|b| b.clone()).unwrap_or_default()
}
