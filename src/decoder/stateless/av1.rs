// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! AV1 stateless decoder driver.
//!
//! [`Av1Decoder`] walks the OBUs of each access unit, tracks the active
//! sequence, the reference frame store and the picture being decoded, and
//! hands pixel reconstruction to a [`StatelessAV1DecoderBackend`]. Finished
//! pictures are delivered through the backend's `output_picture` in the order
//! they were finished, delayed by the backend's preferred output delay.

use std::rc::Rc;

use anyhow::anyhow;

use crate::codec::av1::dpb::Dpb;
use crate::codec::av1::parser::FrameHeaderObu;
use crate::codec::av1::parser::FrameObu;
use crate::codec::av1::parser::FrameType;
use crate::codec::av1::parser::Obu;
use crate::codec::av1::parser::ObuAction;
use crate::codec::av1::parser::ObuParser;
use crate::codec::av1::parser::ObuType;
use crate::codec::av1::parser::SequenceHeaderObu;
use crate::codec::av1::parser::TileGroupObu;
use crate::codec::av1::parser::TOTAL_REFS_PER_FRAME;
use crate::codec::av1::picture::Av1Picture;
use crate::codec::av1::picture::PictureData;
use crate::decoder::stateless::DecodeError;
use crate::decoder::stateless::StatelessBackendResult;
use crate::decoder::AccessUnit;
use crate::decoder::CodedFrame;
use crate::decoder::InputFormat;
use crate::decoder::OutputQueue;
use crate::Resolution;

#[cfg(test)]
mod dummy;

/// Stateless backend methods specific to AV1.
///
/// Methods with a provided body are the optional part of the interface and
/// default to doing nothing; the required methods are the mandatory part a
/// backend cannot decode without.
pub trait StatelessAV1DecoderBackend {
    /// Backend-specific state for a frame being decoded. Attached to the
    /// picture at creation time and owned by the backend from then on.
    /// Backends that don't need any can set it to `()`.
    type Picture;

    /// Called when a new sequence header is activated. `max_dpb_size` is the
    /// number of frame storages the backend must provision: the maximum
    /// number of concurrent references, plus the picture being decoded, plus
    /// the reorder window.
    fn new_sequence(
        &mut self,
        sequence: &Rc<SequenceHeaderObu>,
        max_dpb_size: usize,
    ) -> StatelessBackendResult<()>;

    /// Called when the decoder found a new frame. The backend allocates
    /// whatever resources it needs to decode it and returns the per-picture
    /// state.
    fn new_picture(
        &mut self,
        frame: &CodedFrame,
        hdr: &FrameHeaderObu,
    ) -> StatelessBackendResult<Self::Picture>;

    /// Called for a show-existing frame. The returned state must be bound to
    /// the same underlying decoded data as `source`, so that the duplicate
    /// can re-enter the reference frame store on its own.
    fn duplicate_picture(
        &mut self,
        frame: &CodedFrame,
        source: &Rc<Av1Picture<Self::Picture>>,
    ) -> StatelessBackendResult<Self::Picture>;

    /// Called to set the global parameters of a picture. `reference_frames`
    /// is the read context for inter prediction.
    fn start_picture(
        &mut self,
        _picture: &mut Av1Picture<Self::Picture>,
        _reference_frames: &Dpb<Self::Picture>,
    ) -> StatelessBackendResult<()> {
        Ok(())
    }

    /// Called to dispatch the decode of one tile group to the backend.
    fn decode_tile_group(
        &mut self,
        picture: &mut Av1Picture<Self::Picture>,
        tile_group: TileGroupObu,
    ) -> StatelessBackendResult<()>;

    /// Called when all the tile groups of `picture` have been submitted.
    fn end_picture(
        &mut self,
        _picture: &mut Av1Picture<Self::Picture>,
    ) -> StatelessBackendResult<()> {
        Ok(())
    }

    /// Called to deliver a finished picture, in output order. Consumes the
    /// access unit token and the picture.
    fn output_picture(
        &mut self,
        frame: CodedFrame,
        picture: Rc<Av1Picture<Self::Picture>>,
    ) -> StatelessBackendResult<()>;

    /// Number of pictures the backend wants queued before output starts.
    /// Live sources are expected to prefer no reordering buffer.
    fn preferred_output_delay(&self, _is_live: bool) -> u32 {
        0
    }
}

/// State of the picture being currently decoded.
///
/// Kept between the frame header and the end of the access unit, while tile
/// groups come in.
enum CurrentPicState<P> {
    /// A regular frame, decoded tile group by tile group.
    RegularFrame(Av1Picture<P>),
    /// A frame with show_existing_frame set. No tile decode follows; the
    /// picture is a lightweight duplicate of a stored reference.
    ShowExistingFrame(Av1Picture<P>),
}

/// Parameters of the currently active sequence, fixed at activation time.
struct ActiveSequence {
    /// The activated sequence header. A differing incoming header triggers
    /// renegotiation; an identical one is a no-op.
    header: Rc<SequenceHeaderObu>,
    /// Highest spatial layer in use, derived from the operating point
    /// descriptor. Only pictures of this layer are surfaced.
    highest_spatial_layer: u32,
    /// The output delay negotiated with the backend for this sequence.
    preferred_output_delay: u32,
}

/// An entry of the output queue: a finished picture together with the token
/// of the access unit that produced it.
struct OutputFrame<P> {
    frame: CodedFrame,
    picture: Rc<Av1Picture<P>>,
}

/// AV1 decoder driver, pairing an [`ObuParser`] with a
/// [`StatelessAV1DecoderBackend`].
///
/// Single-threaded and synchronous: [`handle_frame`](Self::handle_frame)
/// fully processes one access unit, including any output delivery, before
/// returning. The caller is responsible for serializing calls. All decode
/// state is owned by this value; resets replace state wholesale instead of
/// mutating it field by field.
pub struct Av1Decoder<P, B: StatelessAV1DecoderBackend> {
    /// The bitstream parser in use.
    parser: P,
    /// The backend performing pixel reconstruction.
    backend: B,
    /// Input parameters declared through [`set_format`](Self::set_format).
    input_format: InputFormat,
    /// Set by `set_format`; makes the next coded frame token carry a
    /// discontinuity marker.
    pending_discont: bool,
    /// Parameters of the active sequence. `None` until the first sequence
    /// header is seen, and after a reset.
    sequence: Option<ActiveSequence>,
    /// The reference frame store.
    dpb: Dpb<B::Picture>,
    /// Finished pictures waiting to be delivered.
    output_queue: OutputQueue<OutputFrame<B::Picture>>,
    /// The picture currently being decoded, if any.
    current_pic: Option<CurrentPicState<B::Picture>>,
    /// Number of access units submitted since the last reset. Also the source
    /// of system frame numbers.
    frame_count: u32,
}

impl<P, B> Av1Decoder<P, B>
where
    P: ObuParser,
    B: StatelessAV1DecoderBackend,
{
    /// Creates a new decoder pairing `parser` and `backend`.
    pub fn new(parser: P, backend: B) -> Self {
        Self {
            parser,
            backend,
            input_format: Default::default(),
            pending_discont: false,
            sequence: None,
            dpb: Default::default(),
            output_queue: Default::default(),
            current_pic: None,
            frame_count: 0,
        }
    }

    /// Records the caller's declared input parameters.
    ///
    /// Sequence and reference state are left alone: they are renegotiated
    /// lazily when the next sequence header arrives. The next delivered
    /// picture carries a discontinuity marker.
    pub fn set_format(&mut self, format: InputFormat) {
        log::debug!("new input format: {:?}", format);
        self.input_format = format;
        self.pending_discont = true;
    }

    /// Decodes every OBU of `access_unit`, then delivers as many pictures as
    /// the preferred output delay allows.
    ///
    /// An error aborts the current access unit only: the in-flight picture is
    /// dropped, the access unit is released, and the decoder remains usable
    /// for the next call.
    pub fn handle_frame(&mut self, access_unit: AccessUnit) -> Result<(), DecodeError> {
        let frame = CodedFrame {
            system_frame_number: self.frame_count,
            timestamp: access_unit.timestamp,
            keyframe: access_unit.keyframe,
            discont: std::mem::take(&mut self.pending_discont),
        };
        self.frame_count += 1;

        log::debug!(
            "processing access unit {} with timestamp {}",
            frame.system_frame_number,
            frame.timestamp
        );

        if let Err(err) = self.decode_access_unit(&access_unit, &frame) {
            self.current_pic = None;
            /* the marker was never delivered, re-arm it for the next unit */
            self.pending_discont |= frame.discont;
            return Err(err);
        }

        let preferred_output_delay = self
            .sequence
            .as_ref()
            .map_or(0, |sequence| sequence.preferred_output_delay);
        self.drain_output_queue(preferred_output_delay as usize)
    }

    /// Delivers every queued picture in FIFO order, then resets the decoder
    /// to a fresh state with the declared input parameters kept.
    pub fn drain(&mut self) -> Result<(), DecodeError> {
        log::debug!("draining the decoder");
        self.drain_output_queue(0)?;
        self.reset_decode_state(false);
        Ok(())
    }

    /// Discards all decode state, including queued pictures that were never
    /// delivered. Used on upstream discontinuities; safe to call in any
    /// state.
    ///
    /// The parser keeps its sequence knowledge so unit identification keeps
    /// working if the stream resumes before a sequence header is repeated.
    pub fn flush(&mut self) {
        log::debug!("flushing the decoder");
        self.output_queue.clear();
        self.reset_decode_state(true);
    }

    /// Ends the stream, delivering every queued picture.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        self.drain()
    }

    /// Number of pictures currently waiting in the output queue.
    pub fn pending_outputs(&self) -> usize {
        self.output_queue.len()
    }

    /// The sequence header of the active sequence, if any.
    pub fn active_sequence(&self) -> Option<&Rc<SequenceHeaderObu>> {
        self.sequence.as_ref().map(|sequence| &sequence.header)
    }

    /// Replaces all decode state with that of a fresh decoder.
    fn reset_decode_state(&mut self, keep_sequence: bool) {
        self.current_pic = None;
        self.dpb = Default::default();
        self.output_queue = Default::default();
        self.sequence = None;
        self.frame_count = 0;
        self.parser.reset(keep_sequence);
    }

    fn decode_access_unit(
        &mut self,
        access_unit: &AccessUnit,
        frame: &CodedFrame,
    ) -> Result<(), DecodeError> {
        let data = access_unit.data;
        let mut consumed = 0;

        while consumed < data.len() {
            let bytes_used = match self.parser.identify_unit(&data[consumed..])? {
                ObuAction::Drop(length) => {
                    log::debug!("dropping {} bytes of OBU outside the operating point", length);
                    length as usize
                }
                ObuAction::Process(obu) => {
                    let bytes_used = obu.bytes_used;
                    self.decode_one_obu(obu, frame)?;
                    bytes_used
                }
            };

            if bytes_used == 0 {
                return Err(DecodeError::DecoderError(anyhow!(
                    "parser did not consume any bytes"
                )));
            }
            consumed += bytes_used;
        }

        if self.current_pic.is_some() {
            self.finish_current_picture(frame)?;
        } else {
            log::debug!(
                "access unit {} produced no picture",
                frame.system_frame_number
            );
        }

        Ok(())
    }

    fn decode_one_obu(&mut self, obu: Obu, frame: &CodedFrame) -> Result<(), DecodeError> {
        match obu.header.obu_type {
            ObuType::SequenceHeader => {
                let sequence = self.parser.parse_sequence_header(&obu)?;
                self.process_sequence(sequence)
            }
            ObuType::FrameHeader => {
                let frame_header = self.parser.parse_frame_header(&obu)?;
                self.decode_frame_header(frame_header, frame)
            }
            ObuType::TileGroup => {
                let tile_group = self.parser.parse_tile_group(obu)?;
                self.decode_tile_group(tile_group)
            }
            ObuType::Frame => {
                let frame_obu = self.parser.parse_frame(obu)?;
                self.decode_frame(frame_obu, frame)
            }
            ObuType::TileList => Err(DecodeError::DecoderError(anyhow!(
                "large scale tile decoding mode is not supported"
            ))),
            other => {
                log::debug!("skipping OBU of type {:?}", other);
                Ok(())
            }
        }
    }

    /// Activates `sequence` if it differs from the active one.
    ///
    /// An identical header is the fast path and leaves all state alone. A
    /// differing header first drains the pending output, which is still
    /// sized for the old sequence, then clears the reference frame store and
    /// renegotiates the output delay and frame storage with the backend.
    fn process_sequence(&mut self, sequence: Rc<SequenceHeaderObu>) -> Result<(), DecodeError> {
        if let Some(active) = &self.sequence {
            if *active.header == *sequence {
                return Ok(());
            }
        }

        if self.current_pic.is_some() {
            return Err(DecodeError::DecoderError(anyhow!(
                "broken stream: a picture is being decoded while a new sequence header is encountered"
            )));
        }

        self.drain_output_queue(0)?;
        self.dpb.clear();
        self.sequence = None;

        let preferred_output_delay = self
            .backend
            .preferred_output_delay(self.input_format.is_live);
        let max_dpb_size = TOTAL_REFS_PER_FRAME + 1 + preferred_output_delay as usize;
        self.backend.new_sequence(&sequence, max_dpb_size)?;

        let highest_spatial_layer = sequence.highest_spatial_layer();
        log::debug!(
            "activated new sequence, resolution: {:?}, profile: {:?}, highest spatial layer: {}, output delay: {}",
            Resolution::from((
                sequence.max_frame_width_minus_1 + 1,
                sequence.max_frame_height_minus_1 + 1
            )),
            sequence.seq_profile,
            highest_spatial_layer,
            preferred_output_delay,
        );

        self.sequence = Some(ActiveSequence {
            header: sequence,
            highest_spatial_layer,
            preferred_output_delay,
        });

        Ok(())
    }

    fn decode_frame_header(
        &mut self,
        frame_header: FrameHeaderObu,
        frame: &CodedFrame,
    ) -> Result<(), DecodeError> {
        /* a temporal unit carries one frame per spatial layer */
        if self.current_pic.is_some() {
            self.finish_current_picture(frame)?;
        }

        let highest_spatial_layer = match &self.sequence {
            Some(sequence) => sequence.highest_spatial_layer,
            None => {
                log::warn!("invalid stream: frame header received while no sequence is active");
                return Ok(());
            }
        };

        if frame_header.show_existing_frame {
            let slot = frame_header.frame_to_show_map_idx as usize;
            let source = self
                .dpb
                .get(slot)
                .cloned()
                .ok_or(DecodeError::ReferenceNotFound(slot))?;

            let backend_picture = self.backend.duplicate_picture(frame, &source)?;
            let picture = Av1Picture {
                data: PictureData::from_header(
                    frame_header,
                    source.data.system_frame_number,
                    frame.timestamp,
                ),
                backend_picture,
            };

            self.current_pic = Some(CurrentPicState::ShowExistingFrame(picture));
        } else {
            let spatial_id = frame_header.obu_header.spatial_id;
            if spatial_id > highest_spatial_layer {
                return Err(DecodeError::SpatialLayerViolation {
                    spatial_id,
                    highest_layer: highest_spatial_layer,
                });
            }

            let backend_picture = self.backend.new_picture(frame, &frame_header)?;
            let mut picture = Av1Picture {
                data: PictureData::from_header(
                    frame_header,
                    frame.system_frame_number,
                    frame.timestamp,
                ),
                backend_picture,
            };

            self.backend.start_picture(&mut picture, &self.dpb)?;

            self.current_pic = Some(CurrentPicState::RegularFrame(picture));
        }

        Ok(())
    }

    fn decode_tile_group(&mut self, tile_group: TileGroupObu) -> Result<(), DecodeError> {
        match self.current_pic.as_mut() {
            Some(CurrentPicState::RegularFrame(picture)) => {
                self.backend.decode_tile_group(picture, tile_group)?;
                Ok(())
            }
            Some(CurrentPicState::ShowExistingFrame(_)) => Err(DecodeError::DecoderError(anyhow!(
                "broken stream: cannot decode a tile group for a frame with show_existing_frame set"
            ))),
            None => Err(DecodeError::DecoderError(anyhow!(
                "broken stream: cannot decode a tile group without first decoding a frame header"
            ))),
        }
    }

    fn decode_frame(&mut self, frame_obu: FrameObu, frame: &CodedFrame) -> Result<(), DecodeError> {
        let FrameObu { header, tile_group } = frame_obu;
        self.decode_frame_header(header, frame)?;

        /* the header was skipped because no sequence is active yet */
        if self.current_pic.is_none() {
            return Ok(());
        }

        self.decode_tile_group(tile_group)
    }

    /// Completes the picture in flight: closes the backend decode, runs the
    /// reference update, and queues the picture for output if it is shown.
    fn finish_current_picture(&mut self, frame: &CodedFrame) -> Result<(), DecodeError> {
        let state = match self.current_pic.take() {
            Some(state) => state,
            None => {
                return Err(DecodeError::DecoderError(anyhow!(
                    "broken stream: no picture to finish"
                )))
            }
        };

        let (picture, is_duplicate) = match state {
            CurrentPicState::RegularFrame(mut picture) => {
                self.backend.end_picture(&mut picture)?;
                (picture, false)
            }
            CurrentPicState::ShowExistingFrame(picture) => (picture, true),
        };

        log::debug!(
            "finishing frame {} with timestamp {}",
            picture.data.system_frame_number,
            picture.data.timestamp
        );

        let picture = Rc::new(picture);

        /* a duplicated key frame re-enters the store like the original did;
         * duplicates of other frame types leave it untouched */
        let update_refs = if is_duplicate {
            picture.data.frame_header.frame_type == FrameType::KeyFrame
        } else {
            true
        };
        if update_refs {
            self.dpb.add(Rc::clone(&picture));
        }

        self.parser.reference_update(&picture.data.frame_header)?;

        if picture.data.show_frame || picture.data.frame_header.show_existing_frame {
            let highest_spatial_layer = self
                .sequence
                .as_ref()
                .map_or(0, |sequence| sequence.highest_spatial_layer);

            if picture.data.spatial_id < highest_spatial_layer {
                log::debug!(
                    "dropping picture with spatial id {}",
                    picture.data.spatial_id
                );
            } else {
                self.output_queue.push(OutputFrame {
                    frame: frame.clone(),
                    picture,
                });
            }
        } else if picture.data.decode_only {
            log::debug!(
                "frame {} is decode-only, not queued for output",
                picture.data.system_frame_number
            );
        }

        Ok(())
    }

    /// Delivers queued pictures, oldest first, until at most `keep` remain.
    fn drain_output_queue(&mut self, keep: usize) -> Result<(), DecodeError> {
        while self.output_queue.len() > keep {
            let entry = match self.output_queue.pop() {
                Some(entry) => entry,
                None => break,
            };
            self.backend.output_picture(entry.frame, entry.picture)?;
        }

        Ok(())
    }
}
