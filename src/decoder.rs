// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Common decoder types: coded access units in, ordered pictures out.

pub mod stateless;

use std::collections::VecDeque;

use crate::Resolution;

/// One coded access unit as submitted by the caller.
///
/// The caller owns it; the driver borrows it for the duration of a single
/// [`handle_frame`](crate::decoder::stateless::av1::Av1Decoder::handle_frame)
/// call and releases it before returning.
#[derive(Debug)]
pub struct AccessUnit<'a> {
    /// The coded bytes for one temporal unit.
    pub data: &'a [u8],
    /// Presentation timestamp, carried through to the decoded picture.
    pub timestamp: u64,
    /// Caller hint that this unit starts at a sync point. Informational: the
    /// driver attaches it to the output token untouched.
    pub keyframe: bool,
}

/// Per-access-unit bookkeeping that outlives the borrowed input bytes and is
/// handed back to the caller together with the decoded picture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedFrame {
    /// Monotonic counter identifying the access unit within the stream.
    pub system_frame_number: u32,
    /// Presentation timestamp of the access unit.
    pub timestamp: u64,
    /// Sync point hint copied from the access unit.
    pub keyframe: bool,
    /// Set on the first output following a
    /// [`set_format`](crate::decoder::stateless::av1::Av1Decoder::set_format)
    /// call.
    pub discont: bool,
}

/// Input stream properties declared by the caller.
#[derive(Clone, Debug, Default)]
pub struct InputFormat {
    /// Coded size hint. Advisory; the sequence header overrides it once
    /// parsed.
    pub coded_resolution: Option<Resolution>,
    /// Whether the source is live. A live source wants no reordering buffer,
    /// which the backend factors into its preferred output delay.
    pub is_live: bool,
}

/// A queue where finished pictures wait until they are delivered to the
/// caller.
///
/// Entries leave in the order they were pushed. The queue itself does not
/// enforce a bound; the driver drains it down to the preferred output delay
/// after every access unit.
pub struct OutputQueue<T> {
    queue: VecDeque<T>,
}

impl<T> Default for OutputQueue<T> {
    fn default() -> Self {
        Self {
            queue: Default::default(),
        }
    }
}

impl<T> OutputQueue<T> {
    /// Pushes `entry` to the back of the queue.
    pub fn push(&mut self, entry: T) {
        self.queue.push_back(entry)
    }

    /// Removes and returns the oldest entry, if any.
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Returns the number of entries waiting to be delivered.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all entries without delivering them.
    pub fn clear(&mut self) {
        self.queue.clear()
    }
}
