//! Thorlabs Elliptec ELL14 rotation mount.
//!
//! ASCII protocol, one request per line: `{addr}{cmd}{data}`. Replies end with
//! CR LF and start with the address, e.g. `0PO00002000` or `0GS09`.
//!
//! Relative moves encode pulses as 32-bit two's complement in eight
//! upper-case hex digits. Status codes: `00` ok, `09` moving, anything else
//! is a device error.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use phasectl_traits::{Actuator, BoxError, DeviceStatus};

use crate::error::{HwError, Result};
use crate::util::poll_until;

pub const DEFAULT_PULSES_PER_DEGREE: f64 = 398.2222;
const STATUS_MOVING: u8 = 0x09;

type Connector<P> = Box<dyn FnMut() -> Result<P> + Send>;

/// Reply parsed from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Status(u8),
    Position(i32),
}

pub struct Ell14<P> {
    address: char,
    pulses_per_degree: f64,
    reply_timeout: Duration,
    motion_timeout: Duration,
    connect: Connector<P>,
    port: Option<P>,
}

impl<P: Read + Write> Ell14<P> {
    /// Driver that obtains its port from `connect` on every `open()`.
    pub fn new(address: char, connect: impl FnMut() -> Result<P> + Send + 'static) -> Self {
        Self {
            address,
            pulses_per_degree: DEFAULT_PULSES_PER_DEGREE,
            reply_timeout: Duration::from_millis(500),
            motion_timeout: Duration::from_secs(10),
            connect: Box::new(connect),
            port: None,
        }
    }

    pub fn with_pulses_per_degree(mut self, ppd: f64) -> Self {
        self.pulses_per_degree = ppd;
        self
    }

    pub fn with_motion_timeout(mut self, d: Duration) -> Self {
        self.motion_timeout = d;
        self
    }

    pub fn degrees_to_pulses(&self, degrees: f64) -> i32 {
        (degrees * self.pulses_per_degree).round() as i32
    }

    fn port(&mut self) -> Result<&mut P> {
        self.port.as_mut().ok_or(HwError::NotOpen)
    }

    fn send(&mut self, cmd: &str) -> Result<()> {
        let payload = format!("{}{}", self.address, cmd);
        tracing::trace!(payload = %payload, "ell14 tx");
        let port = self.port()?;
        port.write_all(payload.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let port = self.port()?;
        let mut buf = Vec::with_capacity(32);
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(1) if byte[0] == b'\n' => break,
                Ok(1) => buf.push(byte[0]),
                Ok(_) => {
                    if Instant::now() >= deadline {
                        return Err(HwError::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(HwError::Timeout);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        let text = String::from_utf8(buf)
            .map_err(|_| HwError::Protocol("non-ASCII reply".into()))?;
        tracing::trace!(reply = %text.trim(), "ell14 rx");
        Ok(text.trim().to_string())
    }

    fn transaction(&mut self, cmd: &str, timeout: Duration) -> Result<Reply> {
        self.send(cmd)?;
        let line = self.read_line(timeout)?;
        let reply = parse_reply(self.address, &line)?;
        match reply {
            Reply::Status(code) if code != 0 && code != STATUS_MOVING => {
                Err(HwError::Device(code))
            }
            other => Ok(other),
        }
    }

    /// Current absolute position in degrees.
    pub fn position_deg(&mut self) -> Result<f64> {
        match self.transaction("gp", self.reply_timeout)? {
            Reply::Position(p) => Ok(f64::from(p) / self.pulses_per_degree),
            Reply::Status(code) => Err(HwError::Protocol(format!(
                "expected position reply, got status {code:02X}"
            ))),
        }
    }

    /// Block until the mount reports it is no longer moving.
    pub fn wait_settled(&mut self) -> Result<()> {
        let timeout = self.motion_timeout;
        poll_until(
            || Ok(self.device_status()? != DeviceStatus::Moving),
            timeout,
            Duration::from_millis(50),
        )
    }

    fn device_status(&mut self) -> Result<DeviceStatus> {
        self.send("gs")?;
        let line = self.read_line(self.reply_timeout)?;
        Ok(match parse_reply(self.address, &line)? {
            Reply::Status(0) | Reply::Position(_) => DeviceStatus::Idle,
            Reply::Status(STATUS_MOVING) => DeviceStatus::Moving,
            Reply::Status(code) => DeviceStatus::Error(code),
        })
    }
}

/// Parse `{addr}GS{hex}` or `{addr}PO{hex}`.
pub fn parse_reply(address: char, line: &str) -> Result<Reply> {
    let rest = line
        .strip_prefix(address)
        .ok_or_else(|| HwError::Protocol(format!("reply for another address: {line:?}")))?;
    if let Some(hex) = rest.strip_prefix("GS") {
        let hex = hex.get(..2.min(hex.len())).unwrap_or_default();
        if hex.is_empty() {
            return Ok(Reply::Status(0));
        }
        let code = u8::from_str_radix(hex, 16)
            .map_err(|_| HwError::Protocol(format!("bad status hex: {hex:?}")))?;
        return Ok(Reply::Status(code));
    }
    if let Some(hex) = rest.strip_prefix("PO") {
        let hex = hex.get(..8.min(hex.len())).unwrap_or_default();
        if hex.is_empty() {
            return Ok(Reply::Position(0));
        }
        let raw = u32::from_str_radix(hex, 16)
            .map_err(|_| HwError::Protocol(format!("bad position hex: {hex:?}")))?;
        // 32-bit two's complement on the wire.
        return Ok(Reply::Position(raw as i32));
    }
    Err(HwError::Protocol(format!("unexpected reply: {line:?}")))
}

impl<P: Read + Write> Actuator for Ell14<P> {
    fn open(&mut self) -> std::result::Result<(), BoxError> {
        if self.port.is_none() {
            self.port = Some((self.connect)()?);
            tracing::debug!(address = %self.address, "ell14 opened");
        }
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), BoxError> {
        self.port = None;
        Ok(())
    }

    fn home(&mut self) -> std::result::Result<(), BoxError> {
        // Direction byte 0 = clockwise.
        self.transaction("ho0", self.motion_timeout)?;
        Ok(())
    }

    fn rotate(&mut self, degrees: f64) -> std::result::Result<(), BoxError> {
        let pulses = self.degrees_to_pulses(degrees);
        if pulses == 0 {
            return Ok(());
        }
        let cmd = format!("mr{:08X}", pulses as u32);
        self.transaction(&cmd, self.motion_timeout)?;
        Ok(())
    }

    fn set_speed(&mut self, percent: u8) -> std::result::Result<(), BoxError> {
        let cmd = format!("sv{:02X}", percent.min(100));
        self.transaction(&cmd, self.reply_timeout)?;
        Ok(())
    }

    fn status(&mut self) -> std::result::Result<DeviceStatus, BoxError> {
        Ok(self.device_status()?)
    }
}

#[cfg(feature = "hardware")]
impl Ell14<Box<dyn serialport::SerialPort>> {
    /// Driver on a serial port (9600 8N1, the Elliptec bus settings).
    pub fn open_serial(path: &str, address: char) -> Self {
        let path = path.to_string();
        Self::new(address, move || {
            serialport::new(&path, 9600)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .timeout(Duration::from_millis(50))
                .open()
                .map_err(|e| HwError::Serial(format!("{path}: {e}")))
        })
    }
}
