// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stateless decoders.
//!
//! Stateless here refers to the backend API targeted by these decoders. The
//! decoders themselves hold the decoding state so the backend doesn't need
//! to.

pub mod av1;

use thiserror::Error;

use crate::codec::av1::parser::ParseError;

/// Error returned by stateless backend methods.
#[derive(Error, Debug)]
pub enum StatelessBackendError {
    #[error("not enough resources to proceed with the operation now")]
    OutOfResources,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type returned by stateless backend methods.
pub type StatelessBackendResult<T> = Result<T, StatelessBackendError>;

/// Error returned by the decoding methods of the driver.
///
/// All variants abort the current access unit only: the in-flight picture and
/// the access unit are released and the decoder remains usable for the next
/// call. A rejected `new_sequence` additionally leaves no active sequence, so
/// frames are skipped until a sequence header is accepted.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    ParseError(#[from] ParseError),
    #[error("no reference picture in slot {0} to display")]
    ReferenceNotFound(usize),
    #[error("picture belongs to spatial layer {spatial_id} but the highest negotiated layer is {highest_layer}")]
    SpatialLayerViolation { spatial_id: u32, highest_layer: u32 },
    #[error(transparent)]
    BackendError(#[from] StatelessBackendError),
    #[error(transparent)]
    DecoderError(#[from] anyhow::Error),
}
