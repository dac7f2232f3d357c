// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::codec::av1::parser::FrameHeaderObu;

/// Data attached to every picture tracked by the driver. Most fields are
/// extracted from the frame header and kept for the reference update and
/// output steps.
#[derive(Clone, Debug, Default)]
pub struct PictureData {
    /// Maps the picture back to the access unit that produced it. A
    /// show-existing picture carries the number of the source it duplicates.
    pub system_frame_number: u32,
    /// Copy of the frame header the picture was created from.
    pub frame_header: FrameHeaderObu,
    /// Same as show_frame in the frame header.
    pub show_frame: bool,
    /// Same as showable_frame in the frame header.
    pub showable_frame: bool,
    /// Set when the frame exists solely to update references and will never
    /// be displayed.
    pub decode_only: bool,
    /// The temporal layer this picture belongs to.
    pub temporal_id: u32,
    /// The spatial layer this picture belongs to.
    pub spatial_id: u32,
    /// Presentation timestamp of the originating access unit.
    pub timestamp: u64,
}

impl PictureData {
    /// Instantiates a new `PictureData` from a frame header.
    pub fn from_header(frame_header: FrameHeaderObu, system_frame_number: u32, timestamp: u64) -> Self {
        let show_frame = frame_header.show_frame;
        let showable_frame = frame_header.showable_frame;

        Self {
            system_frame_number,
            show_frame,
            showable_frame,
            decode_only: !show_frame && !showable_frame && !frame_header.show_existing_frame,
            temporal_id: frame_header.obu_header.temporal_id,
            spatial_id: frame_header.obu_header.spatial_id,
            timestamp,
            frame_header,
        }
    }
}

/// One decoded-or-pending AV1 frame.
///
/// The picture is exclusively owned, and mutable, while it is being decoded.
/// Once finished it is shared (reference-counted) between the reference frame
/// store and the output queue, and destroyed when neither holds it anymore.
/// It never points back at either structure, so the shared ownership cannot
/// form a cycle.
pub struct Av1Picture<P> {
    /// Driver-side bookkeeping for this picture.
    pub data: PictureData,
    /// Backend-specific data for this picture, attached at creation or
    /// duplication time and owned by the backend from then on.
    pub backend_picture: P,
}
