// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking clients talking to a virtual PLC that runs on its own thread.

#![cfg(all(feature = "tcp", feature = "server", feature = "sync"))]

use std::{
    io,
    net::{SocketAddr, TcpListener},
    sync::Arc,
    time::Duration,
};

use fieldbus_modbus::{
    prelude::{sync, SyncReader as _, SyncWriter as _, VirtualPlc},
    server::tcp::Server,
    Error, Slave,
};

fn spawn_plc() -> anyhow::Result<(SocketAddr, Arc<VirtualPlc>)> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let server = {
        let _guard = runtime.enter();
        Server::bind("127.0.0.1:0".parse()?)?
    };
    let socket_addr = server.local_addr()?;
    let plc = Arc::new(VirtualPlc::default());
    let service = Arc::clone(&plc);
    std::thread::spawn(move || runtime.block_on(server.serve(service)));
    Ok((socket_addr, plc))
}

#[test]
fn read_and_write() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let (socket_addr, plc) = spawn_plc()?;

    let mut ctx = sync::tcp::connect_slave(socket_addr, Slave(1))?;
    ctx.write_words("0", &[1, 2, 3])?;
    assert_eq!(plc.read("0", 3)?, vec![1, 2, 3]);
    assert_eq!(ctx.read_words("1", 2)?, vec![2, 3]);

    ctx.write_bool("7.15", true)?;
    assert!(ctx.read_bool("7.15")?);
    assert_eq!(plc.read("7", 1)?, vec![0x8000]);

    ctx.write_bools("x=15;3", &[true, true])?;
    assert_eq!(ctx.read_bools("x=1;2", 3)?, vec![false, true, true]);

    let words: Vec<u16> = (1000..1300).collect();
    plc.write("x=4;500", &words)?;
    assert_eq!(ctx.read_words("x=4;500", 300)?, words);

    ctx.disconnect()?;
    Ok(())
}

#[test]
fn timeout_without_response() -> anyhow::Result<()> {
    // Connections are accepted by the kernel but never served
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let socket_addr = listener.local_addr()?;

    let mut ctx = sync::tcp::connect_with_timeout(socket_addr, Some(Duration::from_millis(50)))?;
    let err = ctx.read_words("0", 1).unwrap_err();
    assert!(matches!(err, Error::Transport(err) if err.kind() == io::ErrorKind::TimedOut));

    drop(listener);
    Ok(())
}
