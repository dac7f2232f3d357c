// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Backend-agnostic stateless AV1 decoder driver.
//!
//! This crate contains the decode state machine for AV1: it walks the OBUs of
//! each coded access unit, tracks the active sequence header, the reference
//! frame store and the picture currently being decoded, and emits finished
//! pictures in output order. It performs no pixel reconstruction and no
//! bit-level syntax parsing itself; both are supplied by the caller.
//!
//! The two seams are:
//!
//! * [`ObuParser`](codec::av1::parser::ObuParser), the bitstream parser that
//!   identifies and decodes individual syntax units, and
//! * [`StatelessAV1DecoderBackend`](decoder::stateless::av1::StatelessAV1DecoderBackend),
//!   the decode backend (typically a hardware accelerator) that reconstructs
//!   pixels and receives the pictures to output.
//!
//! A decoder is created by pairing implementations of both with an
//! [`Av1Decoder`](decoder::stateless::av1::Av1Decoder), after which coded
//! access units can be submitted through
//! [`handle_frame`](decoder::stateless::av1::Av1Decoder::handle_frame).

pub mod codec;
pub mod decoder;

/// A frame resolution in pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}
