// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execute this test only if `tcp` and `server` features are selected.

#![cfg(all(feature = "tcp", feature = "server"))]

mod exception;

use std::net::SocketAddr;

use fieldbus_modbus::{client, server::tcp::Server};

use crate::exception::{check_client_context, TestService};

#[tokio::test]
async fn all_exceptions() -> anyhow::Result<()> {
    let server = Server::bind("127.0.0.1:0".parse()?)?;
    let socket_addr = server.local_addr()?;

    tokio::select! {
        res = server.serve(TestService {}) => panic!("server terminated: {res:?}"),
        res = client_context(socket_addr) => res?,
    }

    Ok(())
}

async fn client_context(socket_addr: SocketAddr) -> anyhow::Result<()> {
    let ctx = client::tcp::connect(socket_addr).await?;
    check_client_context(ctx).await;
    Ok(())
}
