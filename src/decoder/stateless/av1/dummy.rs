// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains test doubles that let the driver run in isolation: a
//! scripted parser standing in for a real bitstream parser, and a backend
//! that performs no decoding but records every call the driver makes.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::anyhow;

use crate::codec::av1::dpb::Dpb;
use crate::codec::av1::parser::FrameHeaderObu;
use crate::codec::av1::parser::FrameObu;
use crate::codec::av1::parser::Obu;
use crate::codec::av1::parser::ObuAction;
use crate::codec::av1::parser::ObuHeader;
use crate::codec::av1::parser::ObuParser;
use crate::codec::av1::parser::ObuType;
use crate::codec::av1::parser::ParseError;
use crate::codec::av1::parser::SequenceHeaderObu;
use crate::codec::av1::parser::TileGroupObu;
use crate::codec::av1::picture::Av1Picture;
use crate::decoder::stateless::av1::StatelessAV1DecoderBackend;
use crate::decoder::stateless::StatelessBackendError;
use crate::decoder::stateless::StatelessBackendResult;
use crate::decoder::CodedFrame;

/// One backend invocation, as recorded by [`RecordingBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    NewSequence {
        max_dpb_size: usize,
    },
    NewPicture {
        frame: u32,
    },
    DuplicatePicture {
        source: u32,
    },
    StartPicture {
        frame: u32,
    },
    DecodeTileGroup {
        frame: u32,
    },
    EndPicture {
        frame: u32,
    },
    OutputPicture {
        frame: u32,
        timestamp: u64,
        spatial_id: u32,
        discont: bool,
    },
}

/// A backend that records the calls the driver makes so tests can assert on
/// their number and order.
pub struct RecordingBackend {
    pub events: Rc<RefCell<Vec<BackendEvent>>>,
    /// Delay reported to the driver for non-live sources.
    pub output_delay: u32,
    /// Delay reported to the driver for live sources.
    pub live_output_delay: u32,
    /// Makes the next `new_sequence` call fail.
    pub reject_new_sequence: Rc<Cell<bool>>,
}

impl RecordingBackend {
    pub fn new(output_delay: u32) -> Self {
        Self {
            events: Default::default(),
            output_delay,
            live_output_delay: 0,
            reject_new_sequence: Default::default(),
        }
    }

    fn record(&self, event: BackendEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl StatelessAV1DecoderBackend for RecordingBackend {
    type Picture = ();

    fn new_sequence(
        &mut self,
        _: &Rc<SequenceHeaderObu>,
        max_dpb_size: usize,
    ) -> StatelessBackendResult<()> {
        if self.reject_new_sequence.get() {
            return Err(StatelessBackendError::Other(anyhow!(
                "cannot provision frame storage for this sequence"
            )));
        }

        self.record(BackendEvent::NewSequence { max_dpb_size });
        Ok(())
    }

    fn new_picture(
        &mut self,
        frame: &CodedFrame,
        _: &FrameHeaderObu,
    ) -> StatelessBackendResult<Self::Picture> {
        self.record(BackendEvent::NewPicture {
            frame: frame.system_frame_number,
        });
        Ok(())
    }

    fn duplicate_picture(
        &mut self,
        _: &CodedFrame,
        source: &Rc<Av1Picture<Self::Picture>>,
    ) -> StatelessBackendResult<Self::Picture> {
        self.record(BackendEvent::DuplicatePicture {
            source: source.data.system_frame_number,
        });
        Ok(())
    }

    fn start_picture(
        &mut self,
        picture: &mut Av1Picture<Self::Picture>,
        _: &Dpb<Self::Picture>,
    ) -> StatelessBackendResult<()> {
        self.record(BackendEvent::StartPicture {
            frame: picture.data.system_frame_number,
        });
        Ok(())
    }

    fn decode_tile_group(
        &mut self,
        picture: &mut Av1Picture<Self::Picture>,
        _: TileGroupObu,
    ) -> StatelessBackendResult<()> {
        self.record(BackendEvent::DecodeTileGroup {
            frame: picture.data.system_frame_number,
        });
        Ok(())
    }

    fn end_picture(&mut self, picture: &mut Av1Picture<Self::Picture>) -> StatelessBackendResult<()> {
        self.record(BackendEvent::EndPicture {
            frame: picture.data.system_frame_number,
        });
        Ok(())
    }

    fn output_picture(
        &mut self,
        frame: CodedFrame,
        picture: Rc<Av1Picture<Self::Picture>>,
    ) -> StatelessBackendResult<()> {
        self.record(BackendEvent::OutputPicture {
            frame: picture.data.system_frame_number,
            timestamp: frame.timestamp,
            spatial_id: picture.data.spatial_id,
            discont: frame.discont,
        });
        Ok(())
    }

    fn preferred_output_delay(&self, is_live: bool) -> u32 {
        if is_live {
            self.live_output_delay
        } else {
            self.output_delay
        }
    }
}

/// One pre-parsed syntax unit that [`ScriptedParser`] will report. Every unit
/// spans exactly one byte of access unit data.
#[derive(Clone, Debug)]
pub enum ScriptedObu {
    SequenceHeader(SequenceHeaderObu),
    FrameHeader(FrameHeaderObu),
    TileGroup,
    Frame(FrameHeaderObu),
    /// A unit of a type the driver has no handler for.
    Other(ObuType),
    /// A unit outside the selected operating point.
    Drop,
}

impl ScriptedObu {
    fn obu_header(&self) -> ObuHeader {
        match self {
            ScriptedObu::SequenceHeader(seq) => ObuHeader {
                obu_type: ObuType::SequenceHeader,
                ..seq.obu_header.clone()
            },
            ScriptedObu::FrameHeader(hdr) => ObuHeader {
                obu_type: ObuType::FrameHeader,
                ..hdr.obu_header.clone()
            },
            ScriptedObu::Frame(hdr) => ObuHeader {
                obu_type: ObuType::Frame,
                ..hdr.obu_header.clone()
            },
            ScriptedObu::TileGroup => ObuHeader {
                obu_type: ObuType::TileGroup,
                ..Default::default()
            },
            ScriptedObu::Other(obu_type) => ObuHeader {
                obu_type: *obu_type,
                ..Default::default()
            },
            ScriptedObu::Drop => Default::default(),
        }
    }
}

/// A parser double that replays a pre-scripted unit sequence instead of
/// reading bits. `identify_unit` consumes one byte of input per call and
/// reports the next scripted unit; the parse calls then hand out its
/// pre-parsed form.
#[derive(Default)]
pub struct ScriptedParser {
    pub script: VecDeque<ScriptedObu>,
    /// The unit identified by the last `identify_unit` call, waiting for its
    /// parse call.
    pending: Option<ScriptedObu>,
    /// refresh_frame_flags of every `reference_update` call, in order.
    pub reference_updates: Vec<u32>,
    /// The keep_sequence argument of every `reset` call, in order.
    pub resets: Vec<bool>,
}

impl ObuParser for ScriptedParser {
    fn identify_unit<'a>(&mut self, data: &'a [u8]) -> Result<ObuAction<'a>, ParseError> {
        if data.is_empty() {
            return Err(ParseError::NotEnoughData);
        }

        let unit = self
            .script
            .pop_front()
            .ok_or_else(|| ParseError::Malformed("no scripted unit for input byte".into()))?;

        if matches!(unit, ScriptedObu::Drop) {
            return Ok(ObuAction::Drop(1));
        }

        let obu = Obu {
            header: unit.obu_header(),
            data: &data[..1],
            bytes_used: 1,
        };
        self.pending = Some(unit);

        Ok(ObuAction::Process(obu))
    }

    fn parse_sequence_header(&mut self, _: &Obu) -> Result<Rc<SequenceHeaderObu>, ParseError> {
        match self.pending.take() {
            Some(ScriptedObu::SequenceHeader(seq)) => Ok(Rc::new(seq)),
            _ => Err(ParseError::Malformed("expected a sequence header".into())),
        }
    }

    fn parse_frame_header(&mut self, _: &Obu) -> Result<FrameHeaderObu, ParseError> {
        match self.pending.take() {
            Some(ScriptedObu::FrameHeader(hdr)) => Ok(hdr),
            _ => Err(ParseError::Malformed("expected a frame header".into())),
        }
    }

    fn parse_tile_group<'a>(&mut self, obu: Obu<'a>) -> Result<TileGroupObu<'a>, ParseError> {
        match self.pending.take() {
            Some(ScriptedObu::TileGroup) => Ok(TileGroupObu {
                obu,
                ..Default::default()
            }),
            _ => Err(ParseError::Malformed("expected a tile group".into())),
        }
    }

    fn parse_frame<'a>(&mut self, obu: Obu<'a>) -> Result<FrameObu<'a>, ParseError> {
        match self.pending.take() {
            Some(ScriptedObu::Frame(header)) => Ok(FrameObu {
                header,
                tile_group: TileGroupObu {
                    obu,
                    ..Default::default()
                },
            }),
            _ => Err(ParseError::Malformed("expected a frame".into())),
        }
    }

    fn reference_update(&mut self, frame_header: &FrameHeaderObu) -> Result<(), ParseError> {
        self.reference_updates.push(frame_header.refresh_frame_flags);
        Ok(())
    }

    fn reset(&mut self, keep_sequence: bool) {
        self.pending = None;
        self.resets.push(keep_sequence);
    }
}
