// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TCP server example
//!
//! This example starts a virtual PLC, watches one of its holding registers
//! and talks to it with a client using rich-text addresses.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use fieldbus_modbus::{prelude::*, server::tcp::Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let socket_addr = "127.0.0.1:5502".parse()?;
    let plc = Arc::new(VirtualPlc::default());
    plc.write("x=4;0", &[1234, 5678])?;
    plc.add_subscription("1", |change| {
        println!(
            "SERVER: Register {} changed from {} to {}",
            change.address, change.old_value, change.new_value
        );
    })?;

    tokio::select! {
        res = server_context(socket_addr, Arc::clone(&plc)) => res?,
        res = client_context(socket_addr) => res?,
    }
    println!("Exiting");

    Ok(())
}

async fn server_context(socket_addr: SocketAddr, plc: Arc<VirtualPlc>) -> anyhow::Result<()> {
    println!("Starting up server on {socket_addr}");
    let server = Server::bind(socket_addr)?;
    server.serve(plc).await?;
    Ok(())
}

async fn client_context(socket_addr: SocketAddr) -> anyhow::Result<()> {
    // Give the server some time for starting up
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("CLIENT: Connecting client...");
    let mut ctx = tcp::connect(socket_addr).await?;

    println!("CLIENT: Reading 2 input registers...");
    let response = ctx.read_words("x=4;0", 2).await?;
    println!("CLIENT: The result is '{response:?}'");
    assert_eq!(response, [1234, 5678]);

    println!("CLIENT: Writing 2 holding registers...");
    ctx.write_words("1", &[7777, 8888]).await?;

    println!("CLIENT: Setting bit 3 of holding register 3...");
    ctx.write_bool("3.3", true).await?;

    println!("CLIENT: Reading 4 holding registers...");
    let response = ctx.read_words("0", 4).await?;
    println!("CLIENT: The result is '{response:?}'");
    assert_eq!(response, [0, 7777, 8888, 8]);

    println!("CLIENT: Reading beyond the address space... (should fail)");
    let response = ctx.call(Request::ReadHoldingRegisters(0xFFFF, 2)).await;
    println!("CLIENT: The result is '{response:?}'");
    assert_eq!(
        response.unwrap_err().exception_code(),
        Some(ExceptionCode::IllegalDataAddress)
    );

    println!("CLIENT: Done.");
    Ok(())
}
