// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) protocol engine
//! based on [tokio](https://tokio.rs).
//!
//! Modbus is based on a [master/slave](https://en.wikipedia.org/wiki/Master/slave_(technology))
//! model.
//! To avoid confusions with the tokio terminology the master is called *client*
//! and the slave is called *server* in this library.
//!
//! ## Features
//!
//! - Rich-text addresses like `s=2;x=4;100` or `100.3`, see [`address`]
//! - Modbus TCP, RTU and ASCII framing
//! - Reads that exceed the per-request limit are split automatically
//! - Asynchronous and synchronous clients, plus a connection pool
//! - A virtual PLC server with change subscriptions and snapshots
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! fieldbus-modbus = "*"
//! ```
//!
//! Optional transports and runtimes are selected through the
//! Cargo features `tcp`, `serial`, `sync` and `server`.
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "tcp")]
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     use fieldbus_modbus::prelude::*;
//!
//!     let socket_addr = "192.168.0.222:502".parse()?;
//!     let mut ctx = tcp::connect(socket_addr).await?;
//!
//!     // 300 registers are fetched with three requests
//!     let words = ctx.read_words("s=1;100", 300).await?;
//!     println!("{words:?}");
//!     ctx.write_bool("100.3", true).await?;
//!
//!     Ok(())
//! }
//! # #[cfg(not(feature = "tcp"))]
//! # fn main() {}
//! ```

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::all)]
#![warn(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod prelude;

pub mod address;
pub mod capability;
pub mod client;
pub mod codec;
pub mod command;
pub mod extract;
pub mod frame;

#[cfg(feature = "server")]
pub mod server;

mod error;
pub use self::error::{Error, FramingError, ProtocolError};

mod service;

mod slave;
pub use self::slave::{Slave, SlaveContext, SlaveId};

pub use self::frame::{
    Address, Coil, ExceptionCode, ExceptionResponse, FunctionCode, Quantity, Request, Response,
    Word,
};

/// Specialized [`std::result::Result`] type for fallible operations.
///
/// The error defaults to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
