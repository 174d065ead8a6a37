// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{borrow::Cow, future};

use fieldbus_modbus::{
    client::{Context, Reader as _, Writer as _},
    server::Service,
    Error, ExceptionCode, Request, Response,
};

#[derive(Clone)]
pub struct TestService {}

impl TestService {
    fn handle(&self, req: Request<'static>) -> Result<Response, ExceptionCode> {
        use Request::*;

        match req {
            ReadCoils(_, _) => Err(ExceptionCode::Acknowledge),
            ReadDiscreteInputs(_, _) => Err(ExceptionCode::GatewayPathUnavailable),
            WriteSingleCoil(_, _) => Err(ExceptionCode::GatewayTargetDevice),
            WriteMultipleCoils(_, _) => Err(ExceptionCode::IllegalDataAddress),
            ReadInputRegisters(_, _) => Err(ExceptionCode::IllegalDataValue),
            ReadHoldingRegisters(_, _) => Err(ExceptionCode::IllegalFunction),
            WriteSingleRegister(_, _) => Err(ExceptionCode::MemoryParityError),
            WriteMultipleRegisters(_, _) => Err(ExceptionCode::ServerDeviceBusy),
            MaskWriteRegister(_, _, _) => Err(ExceptionCode::ServerDeviceFailure),
            _ => Err(ExceptionCode::IllegalFunction),
        }
    }
}

impl Service for TestService {
    type Request = Request<'static>;

    type Response = Response;

    type Exception = ExceptionCode;

    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.handle(req))
    }
}

fn exception_code<T: std::fmt::Debug>(res: Result<T, Error>) -> ExceptionCode {
    res.expect_err("exception response")
        .exception_code()
        .expect("exception code")
}

pub async fn check_client_context(mut ctx: Context) {
    assert_eq!(
        exception_code(ctx.read_bools("x=1;0", 2).await),
        ExceptionCode::Acknowledge
    );
    assert_eq!(
        exception_code(ctx.read_bools("x=2;0", 2).await),
        ExceptionCode::GatewayPathUnavailable
    );
    assert_eq!(
        exception_code(ctx.write_bool("0", true).await),
        ExceptionCode::GatewayTargetDevice
    );
    assert_eq!(
        exception_code(ctx.write_bools("0", &[true]).await),
        ExceptionCode::IllegalDataAddress
    );
    assert_eq!(
        exception_code(ctx.read_words("x=4;0", 2).await),
        ExceptionCode::IllegalDataValue
    );
    assert_eq!(
        exception_code(ctx.read_words("0", 2).await),
        ExceptionCode::IllegalFunction
    );
    assert_eq!(
        exception_code(ctx.write_word("0", 42).await),
        ExceptionCode::MemoryParityError
    );
    assert_eq!(
        exception_code(ctx.write_words("0", &[42]).await),
        ExceptionCode::ServerDeviceBusy
    );
    assert_eq!(
        exception_code(ctx.mask_write("0", 0, 0).await),
        ExceptionCode::ServerDeviceFailure
    );
    assert_eq!(
        exception_code(ctx.call(Request::Custom(70, Cow::Owned(vec![42]))).await),
        ExceptionCode::IllegalFunction
    );
}
