//! NØNOS Early Serial Logger
//!
//! Backend for the `log` facade while no console exists: records go out on
//! COM1 (16550A, 115200 8N1, polled, no interrupts). Output format is
//!
//! ```text
//! [INFO ] stack: [✓] stack 0x7fe00000..0x7fe20000 (32 pages), top 0x7fe1fff0
//! ```
//!
//! The port sits behind a spin lock; the handoff runs on one processor with
//! interrupts masked, so the lock is never contended.

use core::fmt::{self, Write};

use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;
use x86_64::instructions::port::Port;

pub const COM1: u16 = 0x3F8;

pub struct SerialPort {
    data: Port<u8>,
    int_enable: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_status: Port<u8>,
}

impl SerialPort {
    /// # Safety
    /// `base` must be the I/O base of a 16550-compatible UART.
    pub unsafe fn new(base: u16) -> Self {
        SerialPort {
            data: Port::new(base),
            int_enable: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_status: Port::new(base + 5),
        }
    }

    pub fn init(&mut self) {
        unsafe {
            self.int_enable.write(0x00);
            // DLAB on, divisor 1 (115200 baud)
            self.line_ctrl.write(0x80);
            self.data.write(0x01);
            self.int_enable.write(0x00);
            // 8N1, DLAB off
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            // DTR | RTS, no OUT2: stays polled
            self.modem_ctrl.write(0x03);
        }
    }

    fn transmit_empty(&mut self) -> bool {
        unsafe { self.line_status.read() & 0x20 != 0 }
    }

    pub fn send(&mut self, byte: u8) {
        while !self.transmit_empty() {
            core::hint::spin_loop();
        }
        unsafe { self.data.write(byte) }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(|b| self.send(b));
        Ok(())
    }
}

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1) });
}

pub struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = write_record(&mut *SERIAL1.lock(), record);
        }
    }

    fn flush(&self) {}
}

/// Program COM1 and route the `log` facade to it.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    SERIAL1.lock().init();
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

pub fn write_record(out: &mut dyn Write, record: &Record<'_>) -> fmt::Result {
    write!(out, "[{:<5}] {}: {}\r\n", record.level(), record.target(), record.args())
}
