// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking client reading more registers than fit into one request.

use std::{sync::Arc, time::Duration};

use fieldbus_modbus::{prelude::*, server::tcp::Server};

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let runtime = tokio::runtime::Runtime::new()?;
    let server = {
        let _guard = runtime.enter();
        Server::bind("127.0.0.1:0".parse()?)?
    };
    let socket_addr = server.local_addr()?;
    let plc = Arc::new(VirtualPlc::default());
    let words: Vec<u16> = (0..300).collect();
    plc.write("100", &words)?;
    std::thread::spawn(move || runtime.block_on(server.serve(plc)));

    let mut ctx = sync::tcp::connect_with_timeout(socket_addr, Some(Duration::from_secs(1)))?;
    let response = ctx.read_words("100", 300)?;
    println!("Response has {} registers", response.len());
    assert_eq!(response, words);

    Ok(())
}
