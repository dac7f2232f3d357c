// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Data types for the AV1 low-overhead bitstream, plus the interface to the
//! bitstream parser the decoder driver is paired with.
//!
//! Only the syntax the driver and its backends consume is modeled here. The
//! bit-level decoding of these structures happens behind [`ObuParser`].

use std::rc::Rc;

use enumn::N;
use thiserror::Error;

use crate::codec::av1::helpers;

pub const TOTAL_REFS_PER_FRAME: usize = 8;
pub const NUM_REF_FRAMES: usize = 8;
pub const REFS_PER_FRAME: usize = 7;
pub const PRIMARY_REF_NONE: u32 = 7;
pub const MAX_NUM_SPATIAL_LAYERS: usize = 4;
pub const MAX_NUM_TEMPORAL_LAYERS: usize = 8;
pub const MAX_NUM_OPERATING_POINTS: usize = MAX_NUM_SPATIAL_LAYERS * MAX_NUM_TEMPORAL_LAYERS;

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObuType {
    #[default]
    Reserved = 0,
    SequenceHeader = 1,
    TemporalDelimiter = 2,
    FrameHeader = 3,
    TileGroup = 4,
    Metadata = 5,
    Frame = 6,
    RedundantFrameHeader = 7,
    TileList = 8,
    Reserved2 = 9,
    Reserved3 = 10,
    Reserved4 = 11,
    Reserved5 = 12,
    Reserved6 = 13,
    Reserved7 = 14,
    Padding = 15,
}

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Profile {
    #[default]
    Profile0 = 0,
    Profile1 = 1,
    Profile2 = 2,
}

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameType {
    #[default]
    KeyFrame = 0,
    InterFrame = 1,
    IntraOnlyFrame = 2,
    SwitchFrame = 3,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    pub extension_flag: bool,
    pub has_size_field: bool,
    pub temporal_id: u32,
    pub spatial_id: u32,
}

/// One identified syntax unit within an access unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Obu<'a> {
    /// The OBU header.
    pub header: ObuHeader,
    /// The payload bytes, past the header and size field.
    pub data: &'a [u8],
    /// Total number of bytes this OBU spans in the access unit, header and
    /// size field included.
    pub bytes_used: usize,
}

/// Outcome of identifying the syntax unit at the front of an access unit.
pub enum ObuAction<'a> {
    /// The OBU should be processed normally.
    Process(Obu<'a>),
    /// The OBU is not part of the selected operating point and should be
    /// skipped. The value is the number of bytes to advance.
    Drop(u32),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatingPoint {
    /// Specifies the value of operating_point_idc for this operating point:
    /// which spatial and temporal layers should be decoded. Bits 0..=7 select
    /// temporal layers, bits 8..=11 select spatial layers.
    pub idc: u32,
    /// Specifies the level that the coded video sequence conforms to when
    /// this operating point is selected.
    pub seq_level_idx: u32,
    /// Specifies the tier that the coded video sequence conforms to when this
    /// operating point is selected.
    pub seq_tier: u32,
    /// Plus 1 specifies the number of decoded frames that should be present
    /// in the buffer pool before the first presentable frame is displayed.
    pub initial_display_delay_minus_1: u32,
}

/// A SequenceHeaderOBU.
///
/// At most one sequence header is active at a time; a materially different
/// one supersedes it (it is never mutated in place). Field-wise equality is
/// the change predicate used by the driver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceHeaderObu {
    /// The OBU header from the OBU that generated this sequence.
    pub obu_header: ObuHeader,
    /// Specifies the features that can be used in the coded video sequence.
    pub seq_profile: Profile,
    /// If set, specifies that the coded video sequence contains only one
    /// coded frame.
    pub still_picture: bool,
    /// Indicates the number of operating points minus 1 present in the coded
    /// video sequence.
    pub operating_points_cnt_minus_1: u32,
    /// The set of operating points.
    pub operating_points: [OperatingPoint; MAX_NUM_OPERATING_POINTS],
    /// Specifies the maximum frame width minus 1 for the frames represented
    /// by this sequence header.
    pub max_frame_width_minus_1: u32,
    /// Specifies the maximum frame height minus 1 for the frames represented
    /// by this sequence header.
    pub max_frame_height_minus_1: u32,
    /// The bit depth used by the frames of this sequence.
    pub bit_depth: u32,
    /// Specifies whether film grain parameters are present in the coded video
    /// sequence.
    pub film_grain_params_present: bool,
}

impl SequenceHeaderObu {
    /// Returns the highest spatial layer id in use, as signalled by the
    /// selected operating point, or 0 if the stream carries no scalability
    /// information.
    pub fn highest_spatial_layer(&self) -> u32 {
        let operating_point_idc = self.operating_points[0].idc;
        if operating_point_idc >> 8 == 0 {
            0
        } else {
            helpers::floor_log2(operating_point_idc >> 8)
        }
    }
}

/// A FrameHeaderOBU.
///
/// Parsed fresh for every picture and consumed by picture creation; its
/// effects persist only through the picture and the reference update step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameHeaderObu {
    /// The original OBU header. This may be from a FrameOBU or a
    /// FrameHeaderOBU directly.
    pub obu_header: ObuHeader,
    /// If set, indicates the frame indexed by frame_to_show_map_idx is to be
    /// output; If not set, indicates that further processing is required.
    pub show_existing_frame: bool,
    /// Specifies the frame to be output. It is only available if
    /// show_existing_frame is set.
    pub frame_to_show_map_idx: u32,
    /// Specifies the type of the frame.
    pub frame_type: FrameType,
    /// If set, specifies that this frame should be immediately output once
    /// decoded. If not set, specifies that this frame may be output later
    /// through the show_existing_frame mechanism.
    pub show_frame: bool,
    /// When set, specifies that the frame may be output using the
    /// show_existing_frame mechanism.
    pub showable_frame: bool,
    /// If set, indicates that error resilient mode is enabled.
    pub error_resilient_mode: bool,
    /// Specifies OrderHintBits least significant bits of the expected output
    /// order for this frame.
    pub order_hint: u32,
    /// Specifies which reference frame contains the CDF values and other
    /// state that should be loaded at the start of the frame.
    pub primary_ref_frame: u32,
    /// Contains a bitmask that specifies which reference frame slots will be
    /// updated with the current frame after it is decoded.
    pub refresh_frame_flags: u32,
    /// Specifies which reference frames are used by inter frames.
    pub ref_frame_idx: [u8; REFS_PER_FRAME],
    /// The width of the frame in pixels.
    pub frame_width: u32,
    /// The height of the frame in pixels.
    pub frame_height: u32,
    /// The render width of the frame in pixels.
    pub render_width: u32,
    /// The render height of the frame in pixels.
    pub render_height: u32,
}

/// A TileGroupOBU.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TileGroupObu<'a> {
    /// The OBU backing this tile group. The raw tile payload forwarded to the
    /// backend lives in its data.
    pub obu: Obu<'a>,
    /// Specifies whether tg_start and tg_end are present. If they are not
    /// present, this tile group covers the entire frame.
    pub tile_start_and_end_present_flag: bool,
    /// Specifies the zero-based index of the first tile in the current tile
    /// group.
    pub tg_start: u32,
    /// Specifies the zero-based index of the last tile in the current tile
    /// group.
    pub tg_end: u32,
}

/// A FrameOBU: a frame header and a tile group fused into a single unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameObu<'a> {
    pub header: FrameHeaderObu,
    pub tile_group: TileGroupObu<'a>,
}

/// Error returned by [`ObuParser`] methods.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not enough data to parse a complete OBU")]
    NotEnoughData,
    #[error("malformed bitstream: {0}")]
    Malformed(String),
}

/// Interface to the bitstream parser the decoder driver is paired with.
///
/// The driver owns no bit-level parsing: it identifies and decodes syntax
/// units exclusively through this trait. Implementations keep whatever
/// internal state the AV1 syntax requires (active sequence context,
/// reference information, operating point choice) and discard it on
/// [`reset`](ObuParser::reset).
pub trait ObuParser {
    /// Identifies the syntax unit at the front of `data` and reports how many
    /// bytes it spans. Never takes ownership of `data`.
    ///
    /// A [`ObuAction::Drop`] return means the unit is not part of the
    /// selected operating point; the caller advances past it without touching
    /// decode state.
    fn identify_unit<'a>(&mut self, data: &'a [u8]) -> Result<ObuAction<'a>, ParseError>;

    /// Parses a sequence header OBU.
    fn parse_sequence_header(&mut self, obu: &Obu) -> Result<Rc<SequenceHeaderObu>, ParseError>;

    /// Parses a frame header OBU.
    fn parse_frame_header(&mut self, obu: &Obu) -> Result<FrameHeaderObu, ParseError>;

    /// Parses a tile group OBU.
    fn parse_tile_group<'a>(&mut self, obu: Obu<'a>) -> Result<TileGroupObu<'a>, ParseError>;

    /// Parses a frame OBU, i.e. a frame header and a tile group in a single
    /// unit.
    fn parse_frame<'a>(&mut self, obu: Obu<'a>) -> Result<FrameObu<'a>, ParseError>;

    /// Updates the parser's reference information from `frame_header` once
    /// the corresponding picture is fully decoded. Implements section 7.20 of
    /// the AV1 specification.
    fn reference_update(&mut self, frame_header: &FrameHeaderObu) -> Result<(), ParseError>;

    /// Discards the parser state. When `keep_sequence` is set, the active
    /// sequence header survives the reset so that parsing can resume before
    /// one is re-transmitted.
    fn reset(&mut self, keep_sequence: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obu_type_from_coded_value() {
        assert_eq!(ObuType::n(1), Some(ObuType::SequenceHeader));
        assert_eq!(ObuType::n(6), Some(ObuType::Frame));
        assert_eq!(ObuType::n(15), Some(ObuType::Padding));
        assert_eq!(ObuType::n(16), None);
        assert_eq!(FrameType::n(0), Some(FrameType::KeyFrame));
        assert_eq!(Profile::n(3), None);
    }

    #[test]
    fn highest_spatial_layer_from_operating_point() {
        let mut seq = SequenceHeaderObu::default();
        // No scalability information.
        assert_eq!(seq.highest_spatial_layer(), 0);

        // Temporal scalability only.
        seq.operating_points[0].idc = 0b0000_0011;
        assert_eq!(seq.highest_spatial_layer(), 0);

        // Two spatial layers (L2T1): bits 8 and 9 set.
        seq.operating_points[0].idc = 0b0011_0000_0001;
        assert_eq!(seq.highest_spatial_layer(), 1);

        // Four spatial layers.
        seq.operating_points[0].idc = 0b1111_0000_0001;
        assert_eq!(seq.highest_spatial_layer(), 3);
    }
}
