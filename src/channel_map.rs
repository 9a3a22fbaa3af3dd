// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

//! Single-owner channel registry for the Message Director: each channel
//! has at most one owning participant at a time.
//!
//! Registering a fresh channel or re-registering one's own channel both
//! succeed; registering a channel a different participant already owns
//! is rejected outright rather than silently handed over.

use crate::globals::Channel;
use crate::results::{MdError, MdResult};
use std::collections::HashMap;

pub struct ChannelRegistry {
    owner: HashMap<Channel, u64>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry {
            owner: HashMap::new(),
        }
    }

    /// Registers `channel` to `participant`. A no-op if already owned by
    /// `participant`; rejected if owned by anyone else.
    pub fn register(&mut self, participant: u64, channel: Channel) -> MdResult {
        match self.owner.get(&channel) {
            None => {
                self.owner.insert(channel, participant);
                Ok(())
            }
            Some(owner) if *owner == participant => Ok(()),
            Some(_) => Err(MdError::ChannelOwnedByAnother(channel)),
        }
    }

    /// Releases `channel`, but only if `participant` is its current
    /// owner; otherwise a no-op, tolerating a stale `REMOVE_CHANNEL`
    /// racing a reassignment.
    pub fn unregister(&mut self, participant: u64, channel: Channel) {
        if self.owner.get(&channel) == Some(&participant) {
            self.owner.remove(&channel);
        }
    }

    pub fn owner_of(&self, channel: Channel) -> Option<u64> {
        self.owner.get(&channel).copied()
    }

    /// Releases every channel owned by `participant`, returning them so
    /// the caller can flush that participant's post-remove queue.
    pub fn release_all(&mut self, participant: u64) -> Vec<Channel> {
        let released: Vec<Channel> = self
            .owner
            .iter()
            .filter(|(_, owner)| **owner == participant)
            .map(|(channel, _)| *channel)
            .collect();
        for channel in &released {
            self.owner.remove(channel);
        }
        released
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_channel_registers_to_first_claimant() {
        let mut reg = ChannelRegistry::new();
        assert!(reg.register(1, 100).is_ok());
        assert_eq!(reg.owner_of(100), Some(1));
    }

    #[test]
    fn re_registering_the_same_owner_is_a_no_op() {
        let mut reg = ChannelRegistry::new();
        reg.register(1, 100).unwrap();
        assert!(reg.register(1, 100).is_ok());
        assert_eq!(reg.owner_of(100), Some(1));
    }

    #[test]
    fn a_different_participant_cannot_steal_an_owned_channel() {
        let mut reg = ChannelRegistry::new();
        reg.register(1, 100).unwrap();
        assert_eq!(
            reg.register(2, 100),
            Err(MdError::ChannelOwnedByAnother(100))
        );
        assert_eq!(reg.owner_of(100), Some(1));
    }

    #[test]
    fn release_all_only_touches_that_participants_channels() {
        let mut reg = ChannelRegistry::new();
        reg.register(1, 100).unwrap();
        reg.register(2, 200).unwrap();
        let mut released = reg.release_all(1);
        released.sort();
        assert_eq!(released, vec![100]);
        assert_eq!(reg.owner_of(100), None);
        assert_eq!(reg.owner_of(200), Some(2));
    }
}
