//! Cellular transport: a blocking socket over an AT-command modem and the
//! event loop that multiplexes the engine's sockets.
//!
//! ```text
//!   engine ──▶ CellularSocket ──▶ ModemPort (DNS, open, send, recv, AT)
//!                  │
//!                  └── check_modem_buffer: AT+QIRD poll, request-id correlated
//! ```

pub mod event_loop;
pub mod modem;
pub mod socket;
