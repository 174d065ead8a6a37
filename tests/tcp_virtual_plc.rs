// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP clients talking to a virtual PLC.

#![cfg(all(feature = "tcp", feature = "server"))]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use fieldbus_modbus::{
    capability::{Capability, CapabilityCheck},
    prelude::*,
    server::tcp::Server,
};

async fn spawn_plc(options: PlcOptions) -> anyhow::Result<(SocketAddr, Arc<VirtualPlc>)> {
    let server = Server::bind("127.0.0.1:0".parse()?)?;
    let socket_addr = server.local_addr()?;
    let plc = Arc::new(VirtualPlc::new(options));
    tokio::spawn(server.serve(Arc::clone(&plc)));
    Ok((socket_addr, plc))
}

#[tokio::test]
async fn read_and_write_all_tables() -> anyhow::Result<()> {
    let (socket_addr, plc) = spawn_plc(PlcOptions::default()).await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    ctx.write_words("10", &[0x0102, 0x0304]).await?;
    assert_eq!(ctx.read_words("10", 2).await?, vec![0x0102, 0x0304]);
    assert_eq!(ctx.read("10", 2).await?, vec![0x01, 0x02, 0x03, 0x04]);
    ctx.write("12", &[0xAB, 0xCD]).await?;
    assert_eq!(plc.read("12", 1)?, vec![0xABCD]);

    ctx.write_bools("x=15;20", &[true, false, true]).await?;
    assert_eq!(
        ctx.read_bools("x=1;20", 3).await?,
        vec![true, false, true]
    );
    ctx.write_bool("21", true).await?;
    assert!(plc.read_coil("21")?);

    plc.write_discretes("30", &[false, true])?;
    assert_eq!(ctx.read_bools("x=2;30", 2).await?, vec![false, true]);

    plc.write("x=4;40", &[7, 8, 9])?;
    assert_eq!(ctx.read_words("x=4;40", 3).await?, vec![7, 8, 9]);

    Ok(())
}

#[tokio::test]
async fn register_bits_and_mask_write() -> anyhow::Result<()> {
    let (socket_addr, plc) = spawn_plc(PlcOptions::default()).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_word("4", 0x0012).await?;
    ctx.mask_write("4", 0x00F2, 0x0025).await?;
    assert_eq!(plc.read("4", 1)?, vec![0x0037]);

    ctx.write_bool("100.3", true).await?;
    assert!(ctx.read_bool("100.3").await?);
    assert!(!ctx.read_bool("100.2").await?);
    assert_eq!(
        ctx.read_bools("100.2", 3).await?,
        vec![false, true, false]
    );
    assert_eq!(plc.read("100", 1)?, vec![0x0008]);

    Ok(())
}

#[tokio::test]
async fn split_oversized_reads() -> anyhow::Result<()> {
    let (socket_addr, plc) = spawn_plc(PlcOptions::default()).await?;
    let words: Vec<u16> = (0..300).collect();
    plc.write("100", &words)?;

    let mut ctx = tcp::connect(socket_addr).await?;
    assert_eq!(ctx.read_words("100", 300).await?, words);
    assert_eq!(ctx.read("100", 300).await?.len(), 600);

    plc.write_coils("0", &[true; 2500])?;
    let bits = ctx.read_bools("0", 2500).await?;
    assert_eq!(bits.len(), 2500);
    assert!(bits.iter().all(|bit| *bit));

    Ok(())
}

#[tokio::test]
async fn capacity_error_without_batching() -> anyhow::Result<()> {
    let (socket_addr, _plc) = spawn_plc(PlcOptions::default()).await?;

    let mut ctx = tcp::connect(socket_addr).await?.with_options(ContextOptions {
        capabilities: CapabilityCheck::new(|capability| capability != Capability::ExtendedBatching),
        ..Default::default()
    });
    let err = ctx.read_words("0", 300).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Capacity {
            requested: 300,
            ..
        }
    ));

    // Within the server limit a single request succeeds
    assert_eq!(ctx.read_words("0", 125).await?.len(), 125);

    Ok(())
}

#[tokio::test]
async fn exceptions_from_plc() -> anyhow::Result<()> {
    let (socket_addr, _plc) = spawn_plc(PlcOptions {
        write_enabled: false,
        ..Default::default()
    })
    .await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let err = ctx.write_word("0", 1).await.unwrap_err();
    assert_eq!(err.exception_code(), Some(ExceptionCode::IllegalFunction));

    let err = ctx.read_words("65535", 2).await.unwrap_err();
    assert!(matches!(err, Error::Address(_)));

    let err = ctx
        .call(Request::ReadHoldingRegisters(65_535, 2))
        .await
        .unwrap_err();
    assert_eq!(
        err.exception_code(),
        Some(ExceptionCode::IllegalDataAddress)
    );

    // The session survives exceptions
    assert_eq!(ctx.read_words("0", 1).await?, vec![0]);

    Ok(())
}

#[tokio::test]
async fn notify_host_about_client_writes() -> anyhow::Result<()> {
    let (socket_addr, plc) = spawn_plc(PlcOptions::default()).await?;
    plc.write("50", &[1, 2, 3, 4, 5])?;

    let changes = Arc::new(Mutex::new(Vec::new()));
    for address in ["50", "51", "52", "53", "54"] {
        let changes = Arc::clone(&changes);
        plc.add_subscription(address, move |change| changes.lock().unwrap().push(change))?;
    }

    let mut ctx = tcp::connect(socket_addr).await?;
    ctx.write_words("50", &[1, 2, 30, 4, 50]).await?;

    let changes = changes.lock().unwrap();
    assert_eq!(
        *changes,
        vec![
            Change {
                address: 52,
                old_value: 3,
                new_value: 30
            },
            Change {
                address: 54,
                old_value: 5,
                new_value: 50
            },
        ]
    );

    Ok(())
}

#[tokio::test]
async fn one_based_addressing() -> anyhow::Result<()> {
    let (socket_addr, plc) = spawn_plc(PlcOptions::default()).await?;
    plc.write("x=4;0", &[0x4242])?;

    let mut ctx = tcp::connect(socket_addr).await?.with_options(ContextOptions {
        one_based_addressing: true,
        ..Default::default()
    });
    assert_eq!(ctx.read_words("s=2;x=4;1", 1).await?, vec![0x4242]);

    Ok(())
}
