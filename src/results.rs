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

//! Typed error enums shared by the codec, allocator, KV store, and
//! database interface. Kept distinct from `std::io::Result`.

use crate::globals::{Channel, DgSize};
use thiserror::Error;

/// Errors produced by the `Datagram`/`DatagramIterator` codec.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum DgError {
    #[error("datagram would overflow the maximum size of {0} bytes")]
    Overflow(DgSize),
    #[error("reached end of datagram buffer mid-field (truncated)")]
    Truncated,
}

pub type DgResult<T = ()> = Result<T, DgError>;

/// Errors produced by the channel allocator.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum AllocatorError {
    #[error("channel allocator exhausted its configured range")]
    Exhausted,
}

pub type AllocatorResult<T> = Result<T, AllocatorError>;

/// Errors produced by the Message Director's channel registration
/// handshake.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum MdError {
    #[error("channel {0} is already registered to another participant")]
    ChannelOwnedByAnother(Channel),
}

pub type MdResult<T = ()> = Result<T, MdError>;

/// Errors produced by the embedded play-token KV store.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv store I/O error: {0}")]
    Storage(#[from] redb::Error),
    #[error("kv store transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("kv store table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("kv store commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("kv store storage error: {0}")]
    StorageBackend(#[from] redb::StorageError),
}

pub type KvResult<T> = Result<T, KvError>;

/// Errors surfaced by the database interface.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database request timed out awaiting context {0}")]
    Timeout(u32),
    #[error("database returned an empty response for context {0}")]
    EmptyResponse(u32),
}

pub type DbResult<T> = Result<T, DbError>;
