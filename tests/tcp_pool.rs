// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent tasks sharing pooled TCP connections.

#![cfg(all(feature = "tcp", feature = "server"))]

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use fieldbus_modbus::{
    client::pool::{NewContext, Pool},
    prelude::*,
    server::tcp::Server,
    Result,
};

struct TcpFactory(SocketAddr);

#[async_trait]
impl NewContext for TcpFactory {
    async fn new_context(&self) -> Result<Context> {
        Ok(tcp::connect(self.0).await?)
    }
}

#[tokio::test]
async fn share_connections_between_tasks() -> anyhow::Result<()> {
    let server = Server::bind("127.0.0.1:0".parse()?)?;
    let socket_addr = server.local_addr()?;
    let sessions = server.sessions();
    let plc = Arc::new(VirtualPlc::default());
    tokio::spawn(server.serve(Arc::clone(&plc)));

    let pool = Pool::new(TcpFactory(socket_addr), Some(2));
    let mut tasks = Vec::new();
    for i in 0..8u16 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let mut ctx = pool.acquire().await?;
            ctx.write_word(&i.to_string(), i * 10).await?;
            ctx.read_words(&i.to_string(), 1).await
        }));
    }
    for (i, task) in (0..8u16).zip(tasks) {
        assert_eq!(task.await??, vec![i * 10]);
    }

    assert_eq!(pool.size(), 2);
    assert_eq!(pool.idle_count(), 2);
    assert_eq!(sessions.count(), 2);
    assert_eq!(plc.read("0", 8)?, (0..8).map(|i| i * 10).collect::<Vec<u16>>());

    Ok(())
}
