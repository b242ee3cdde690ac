//! JSON-lines spectrum stream.
//!
//! The acquisition process writes one JSON object per line on stdout:
//!
//! ```text
//! {"type":"meta","device_index":0,"num_pixels":3648,"wavelengths":[...]}
//! {"type":"frame","timestamp":1718000000.12,"device_index":0,"counts":[...]}
//! ```
//!
//! `wavelengths` may be `null`. Blank lines, non-JSON lines and unknown
//! message types are skipped.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use phasectl_traits::{BoxError, Interrupt, SpectrumSource, StreamFrame, StreamMeta};
use serde::Deserialize;

use crate::error::{HwError, Result};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireMessage {
    Meta {
        device_index: u32,
        num_pixels: usize,
        #[serde(default)]
        wavelengths: Option<Vec<f64>>,
    },
    Frame {
        timestamp: f64,
        device_index: u32,
        counts: Vec<f64>,
    },
    #[serde(other)]
    Other,
}

type SharedChild = Arc<Mutex<Option<Child>>>;

/// [`SpectrumSource`] over any line reader speaking the JSON-lines protocol.
pub struct JsonLineSource<R> {
    reader: R,
    line: String,
    child: Option<SharedChild>,
}

impl<R: BufRead> JsonLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            child: None,
        }
    }

    /// Next well-formed message, or `None` at end of input.
    fn next_message(&mut self) -> Result<Option<WireMessage>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str::<WireMessage>(text) {
                Ok(WireMessage::Other) => continue,
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed stream line");
                }
            }
        }
    }
}

impl JsonLineSource<BufReader<ChildStdout>> {
    /// Launch `command` (program followed by arguments) and read its stdout.
    pub fn spawn_process(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| HwError::Protocol("empty acquisition command".into()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HwError::Protocol("child stdout unavailable".into()))?;
        tracing::info!(program = %program, pid = child.id(), "acquisition process started");
        let mut source = Self::new(BufReader::new(stdout));
        source.child = Some(Arc::new(Mutex::new(Some(child))));
        Ok(source)
    }
}

fn kill_child(child: &SharedChild) {
    let Ok(mut guard) = child.lock() else {
        return;
    };
    if let Some(mut c) = guard.take() {
        if let Err(e) = c.kill() {
            tracing::debug!(error = %e, "acquisition process already exited");
        }
        let _ = c.wait();
    }
}

impl<R: BufRead> SpectrumSource for JsonLineSource<R> {
    fn start(&mut self) -> std::result::Result<StreamMeta, BoxError> {
        loop {
            match self.next_message()? {
                Some(WireMessage::Meta {
                    device_index,
                    num_pixels,
                    wavelengths,
                }) => {
                    if let Some(wl) = &wavelengths
                        && wl.len() != num_pixels
                    {
                        return Err(Box::new(HwError::Protocol(format!(
                            "meta announces {num_pixels} pixels but carries {} wavelengths",
                            wl.len()
                        ))));
                    }
                    return Ok(StreamMeta {
                        device_index,
                        num_pixels,
                        wavelengths,
                    });
                }
                Some(_) => continue,
                None => {
                    return Err(Box::new(HwError::Protocol(
                        "stream ended before meta".into(),
                    )));
                }
            }
        }
    }

    fn next_frame(&mut self) -> std::result::Result<Option<StreamFrame>, BoxError> {
        loop {
            match self.next_message()? {
                Some(WireMessage::Frame {
                    timestamp,
                    device_index,
                    counts,
                }) => {
                    return Ok(Some(StreamFrame {
                        timestamp,
                        device_index,
                        counts,
                    }));
                }
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    fn stop(&mut self) -> std::result::Result<(), BoxError> {
        if let Some(child) = &self.child {
            kill_child(child);
        }
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupt> {
        let child = self.child.clone()?;
        Some(Box::new(move || kill_child(&child)))
    }
}
