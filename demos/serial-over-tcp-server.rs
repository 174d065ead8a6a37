// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line server reached through TCP, e.g. behind a serial device server.
//!
//! The server only answers station 12 and accepts both RTU and ASCII frames.

use std::{sync::Arc, time::Duration};

use fieldbus_modbus::{
    prelude::*,
    server::{tcp::Server, ServerOptions},
};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let station = Slave(12);
    let server = Server::bind("127.0.0.1:0".parse()?)?.with_options(ServerOptions {
        station: Some(station),
        serial_over_tcp: true,
        idle_timeout: Some(Duration::from_secs(60)),
        ..Default::default()
    });
    let socket_addr = server.local_addr()?;
    let plc = Arc::new(VirtualPlc::default());
    plc.write("x=4;2", &[0x77])?;
    tokio::spawn(server.serve(plc));

    println!("CLIENT: Reading input registers over RTU...");
    let mut ctx = rtu::attach_slave(TcpStream::connect(socket_addr).await?, station);
    let rsp = ctx.read_words("x=4;0", 7).await?;
    println!("CLIENT: The result is '{rsp:#x?}'");

    println!("CLIENT: Reading input registers over ASCII...");
    let mut ctx = ascii::attach_slave(TcpStream::connect(socket_addr).await?, station);
    let rsp = ctx.read_words("x=4;2", 1).await?;
    println!("CLIENT: The result is '{rsp:#x?}'");

    Ok(())
}
