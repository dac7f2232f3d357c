// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::rc::Rc;

use log::debug;

use crate::codec::av1::parser::NUM_REF_FRAMES;
use crate::codec::av1::picture::Av1Picture;

/// The AV1 reference frame store.
///
/// A fixed table of [`NUM_REF_FRAMES`] slots, each either empty or holding
/// one live picture, addressable by reference frame index independently of
/// decode order. Slots are only ever replaced whole by [`Dpb::add`], never
/// partially mutated.
pub struct Dpb<P> {
    entries: [Option<Rc<Av1Picture<P>>>; NUM_REF_FRAMES],
}

impl<P> Default for Dpb<P> {
    fn default() -> Self {
        Self {
            entries: Default::default(),
        }
    }
}

impl<P> Dpb<P> {
    /// Returns the picture stored in `slot`, if any.
    pub fn get(&self, slot: usize) -> Option<&Rc<Av1Picture<P>>> {
        self.entries.get(slot).and_then(|entry| entry.as_ref())
    }

    /// All slots in reference-frame-index order. This is the read context
    /// handed to the backend at start-of-picture for inter prediction.
    pub fn entries(&self) -> &[Option<Rc<Av1Picture<P>>>; NUM_REF_FRAMES] {
        &self.entries
    }

    /// Stores `picture` into every slot selected by its refresh_frame_flags,
    /// evicting the previous occupants.
    pub fn add(&mut self, picture: Rc<Av1Picture<P>>) {
        let mut refresh_frame_flags = picture.data.frame_header.refresh_frame_flags;

        for (i, entry) in self.entries.iter_mut().enumerate() {
            if (refresh_frame_flags & 1) == 1 {
                debug!(
                    "replacing reference frame {} with frame {}",
                    i, picture.data.system_frame_number
                );
                *entry = Some(Rc::clone(&picture));
            }

            refresh_frame_flags >>= 1;
        }
    }

    /// Empties every slot.
    pub fn clear(&mut self) {
        self.entries = Default::default();
    }
}
