//! # Bluetooth RFCOMM Driver
//!
//! Drives receipt printers over the Bluetooth Serial Port Profile (SPP) via
//! RFCOMM device nodes.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The driver looks for an existing `/dev/rfcommN` bound to the printer's
//! address and binds one itself when none exists (binding needs root):
//!
//! ```bash
//! $ bluetoothctl pair 00:11:62:XX:XX:XX
//! $ sudo rfcomm bind 0 00:11:62:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! ## TTY Configuration
//!
//! The RFCOMM device is opened in raw mode so binary data is transmitted
//! without modification:
//!
//! - **No input processing**: Disable IGNBRK, BRKINT, PARMRK, ISTRIP, etc.
//! - **No output processing**: Disable OPOST (no CR/LF translation)
//! - **8-bit characters**: CS8 (8 data bits, no parity)
//! - **No echo**: Disable ECHO, ECHONL
//! - **Non-canonical mode**: Disable ICANON (no line buffering)
//!
//! ## Brand Detection
//!
//! Star Micronics radios carry the `00:11:62` OUI. Anything else is driven as
//! a generic ESC/POS printer.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{DriverError, PrintJob, PrinterDriver};
use crate::model::PrinterBrand;

/// Default RFCOMM channel used when binding a new device node
pub const DEFAULT_CHANNEL: u8 = 0;

/// Star Micronics organizationally unique identifier
const STAR_OUI: &str = "00:11:62";

/// Default chunk size for writes (bytes)
const CHUNK_SIZE: usize = 4096;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 2;

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

/// # Bluetooth Printer Transport
///
/// A raw, chunked byte pipe to an RFCOMM device node.
pub struct BluetoothTransport {
    file: File,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl BluetoothTransport {
    /// Open an RFCOMM device node in raw mode.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The device doesn't exist
    /// - Permission denied (may need root or dialout group)
    /// - TTY configuration fails
    pub fn open<P: AsRef<Path>>(device: P) -> io::Result<Self> {
        let path = device.as_ref();
        let file = OpenOptions::new().write(true).open(path)?;
        configure_tty_raw(file.as_raw_fd())?;

        Ok(Self {
            file,
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        })
    }

    /// Write data, chunking large writes to avoid overflowing the
    /// Bluetooth buffer.
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() <= self.chunk_size {
            self.file.write_all(data)?;
        } else {
            for chunk in data.chunks(self.chunk_size) {
                self.file.write_all(chunk)?;
                if !self.chunk_delay.is_zero() {
                    thread::sleep(self.chunk_delay);
                }
            }
        }
        self.file.flush()
    }
}

/// Configure a file descriptor for raw TTY mode.
///
/// IXON/IXOFF/IXANY are cleared as well: 0x11 and 0x13 can appear in command
/// data and must not be taken as flow control.
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> io::Result<()> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_fd: i32) -> io::Result<()> {
    Ok(())
}

// ============================================================================
// RFCOMM SETUP HELPERS
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Brand implied by a MAC address.
pub fn brand_for_address(mac: &str) -> PrinterBrand {
    if mac.to_uppercase().starts_with(STAR_OUI) {
        PrinterBrand::Star
    } else {
        PrinterBrand::EscPos
    }
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm`, then falls back to `rfcomm -a`.
fn find_rfcomm_for_mac(mac: &str) -> Option<String> {
    let mac_upper = mac.to_uppercase();

    let from_proc = std::fs::read_to_string("/proc/net/rfcomm").ok();
    let from_tool = || {
        Command::new("rfcomm")
            .arg("-a")
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
    };

    from_proc
        .and_then(|listing| device_in_listing(&listing, &mac_upper))
        .or_else(|| from_tool().and_then(|listing| device_in_listing(&listing, &mac_upper)))
}

/// Find `rfcommN: <MAC> ...` in a listing and return its existing node.
fn device_in_listing(listing: &str, mac_upper: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|name| format!("/dev/{}", name.trim()))
        .find(|path| Path::new(path).exists())
}

/// Bind an RFCOMM device node for a MAC address and return its path.
///
/// Runs `bluetoothctl connect`, `l2ping -c 1` and `rfcomm bind`.
/// **Requires root privileges** for the bind.
fn setup_rfcomm(mac: &str, channel: u8) -> Result<String, String> {
    let mac_upper = mac.to_uppercase();
    let device_path = format!("/dev/rfcomm{}", channel);

    info!(address = %mac_upper, "Connecting via bluetoothctl");
    let output = Command::new("bluetoothctl")
        .arg("connect")
        .arg(&mac_upper)
        .output()
        .map_err(|e| format!("Failed to run bluetoothctl: {}", e))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.contains("Connection successful") && !stdout.contains("already connected") {
        // l2ping below decides whether the device is reachable
        debug!(output = %stdout.trim(), "bluetoothctl connect did not confirm");
    }

    thread::sleep(Duration::from_millis(500));

    let output = Command::new("l2ping")
        .args(["-c", "1", &mac_upper])
        .output()
        .map_err(|e| format!("Failed to run l2ping: {}", e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("Device not reachable: {}", stderr.trim()));
    }

    info!(address = %mac_upper, channel, "Binding rfcomm device");
    let output = Command::new("rfcomm")
        .arg("bind")
        .arg(channel.to_string())
        .arg(&mac_upper)
        .arg("1") // SPP channel
        .output()
        .map_err(|e| format!("Failed to run rfcomm bind: {}", e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("rfcomm bind failed: {}", stderr.trim()));
    }

    thread::sleep(Duration::from_millis(500));

    if !Path::new(&device_path).exists() {
        return Err(format!("Device {} was not created", device_path));
    }

    Ok(device_path)
}

// ============================================================================
// JOB ENCODING
// ============================================================================

/// Encode a text job for a brand's command set.
///
/// Non-ASCII characters are replaced with `?`; code-page handling is left to
/// richer renderers.
pub fn encode_job(brand: PrinterBrand, job: &PrintJob) -> Vec<u8> {
    let mut body = Vec::new();
    for line in &job.lines {
        body.extend(line.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
        body.push(b'\n');
    }

    let mut data = Vec::new();
    for _ in 0..job.copies.max(1) {
        data.extend([ESC, b'@']);
        data.extend(&body);
        match (job.cut, brand) {
            // ESC d 3: feed to cutter, partial cut
            (true, PrinterBrand::Star) => data.extend([ESC, b'd', 3]),
            // GS V 66 n: feed n lines, partial cut
            (true, _) => data.extend([GS, b'V', 66, 3]),
            (false, _) => data.extend(b"\n\n\n"),
        }
    }
    data
}

// ============================================================================
// DRIVER
// ============================================================================

struct OpenPort {
    address: String,
    brand: PrinterBrand,
    transport: BluetoothTransport,
}

/// [`PrinterDriver`] over RFCOMM device nodes.
pub struct RfcommDriver {
    channel: u8,
    port: Arc<Mutex<Option<OpenPort>>>,
}

impl RfcommDriver {
    /// Create a driver that binds new device nodes on `channel`.
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            port: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for RfcommDriver {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL)
    }
}

fn unreachable(address: &str, reason: impl Into<String>) -> DriverError {
    DriverError::Unreachable {
        address: address.to_string(),
        reason: reason.into(),
    }
}

#[async_trait]
impl PrinterDriver for RfcommDriver {
    async fn open(&self, address: &str) -> Result<PrinterBrand, DriverError> {
        if !is_valid_mac(address) {
            return Err(unreachable(address, "not a Bluetooth address"));
        }

        let address = address.to_string();
        let channel = self.channel;
        let port = self.port.clone();

        tokio::task::spawn_blocking(move || -> Result<PrinterBrand, DriverError> {
            let device = match find_rfcomm_for_mac(&address) {
                Some(device) => device,
                None => setup_rfcomm(&address, channel).map_err(|e| unreachable(&address, e))?,
            };
            let transport = BluetoothTransport::open(&device)
                .map_err(|e| unreachable(&address, format!("{}: {}", device, e)))?;
            let brand = brand_for_address(&address);

            let mut slot = port.lock().map_err(|_| DriverError::NotOpen)?;
            *slot = Some(OpenPort {
                address: address.clone(),
                brand,
                transport,
            });
            info!(address = %address, device = %device, brand = %brand, "RFCOMM port open");
            Ok(brand)
        })
        .await
        .map_err(|e| DriverError::Write(format!("driver task failed: {}", e)))?
    }

    async fn close(&self) {
        if let Ok(mut slot) = self.port.lock() {
            if let Some(port) = slot.take() {
                debug!(address = %port.address, "RFCOMM port closed");
            }
        }
    }

    async fn print(&self, job: &PrintJob) -> Result<(), DriverError> {
        let job = job.clone();
        let port = self.port.clone();

        tokio::task::spawn_blocking(move || -> Result<(), DriverError> {
            let mut slot = port.lock().map_err(|_| DriverError::NotOpen)?;
            let open = slot.as_mut().ok_or(DriverError::NotOpen)?;
            let data = encode_job(open.brand, &job);
            open.transport
                .write_all(&data)
                .map_err(|e| DriverError::Write(e.to_string()))?;
            debug!(address = %open.address, bytes = data.len(), "Job written");
            Ok(())
        })
        .await
        .map_err(|e| DriverError::Write(format!("driver task failed: {}", e)))?
    }
}

// ============================================================================
// TESTS
// ============================================================================
