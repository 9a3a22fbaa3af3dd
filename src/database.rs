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

//! Database interface: a thin correlator sitting on
//! top of the Message Director. Every request gets a fresh context id;
//! the matching response (or a timeout) resolves exactly one pending
//! call. Never leaves a caller waiting forever.

use crate::datagram::{Datagram, DatagramIterator};
use crate::globals::{Channel, Context, DClassId, DoId, FieldId};
use crate::message_types::dbserver;
use crate::results::{DbError, DbResult};
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

/// A dclass field value as it travels on the wire: already packed by
/// the caller (or `dc_schema`), never interpreted here.
pub type FieldValue = Vec<u8>;
pub type FieldSet = HashMap<FieldId, FieldValue>;

enum PendingResponse {
    CreateObject(oneshot::Sender<Option<DoId>>),
    GetAll(oneshot::Sender<FieldSet>),
}

pub struct DatabaseInterface {
    own_channel: Channel,
    db_channel: Channel,
    timeout: Duration,
    next_context: AtomicU32,
    pending: Mutex<HashMap<Context, PendingResponse>>,
    to_md: mpsc::UnboundedSender<Vec<u8>>,
}

impl DatabaseInterface {
    pub fn new(
        own_channel: Channel,
        db_channel: Channel,
        timeout: Duration,
        to_md: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Arc<Self> {
        Arc::new(DatabaseInterface {
            own_channel,
            db_channel,
            timeout,
            next_context: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            to_md,
        })
    }

    fn fresh_context(&self) -> Context {
        self.next_context.fetch_add(1, Ordering::Relaxed)
    }

    /// Dispatches a `DBSERVER_*_RESP` datagram read off the MD link to
    /// the call awaiting its context, if any.
    pub async fn handle_response(&self, msg_type: u16, dgi: &mut DatagramIterator) {
        let context = match dgi.read_u32() {
            Ok(c) => c,
            Err(_) => return,
        };
        let waiter = { self.pending.lock().await.remove(&context) };
        let Some(waiter) = waiter else {
            return;
        };
        match (msg_type, waiter) {
            (dbserver::CREATE_OBJECT_RESP, PendingResponse::CreateObject(tx)) => {
                let doid = dgi.read_doid().ok();
                let _ = tx.send(doid);
            }
            (dbserver::OBJECT_GET_ALL_RESP, PendingResponse::GetAll(tx)) => {
                let fields = read_field_set(dgi).unwrap_or_default();
                let _ = tx.send(fields);
            }
            _ => {}
        }
    }

    /// Creates a new database object of `dclass`, returning its
    /// assigned object id. Errors if the server never answers.
    pub async fn create_object(&self, dclass: DClassId, fields: FieldSet) -> DbResult<DoId> {
        let context = self.fresh_context();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(context, PendingResponse::CreateObject(tx));

        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], self.own_channel, dbserver::CREATE_OBJECT)
            .ok();
        dg.add_u32(context).ok();
        dg.add_u16(dclass).ok();
        dg.add_u16(fields.len() as u16).ok();
        for (field_id, value) in &fields {
            dg.add_u16(*field_id).ok();
            dg.add_blob(value.clone()).ok();
        }
        let _ = self.to_md.send(dg.into_bytes());

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Some(doid))) => Ok(doid),
            Ok(Ok(None)) | Ok(Err(_)) => Err(DbError::EmptyResponse(context)),
            Err(_) => {
                warn!("database: CREATE_OBJECT context {} timed out.", context);
                self.pending.lock().await.remove(&context);
                Err(DbError::Timeout(context))
            }
        }
    }

    /// Fetches every field currently stored for `doid`. Times out to an
    /// empty field set rather than leaving the caller hanging.
    pub async fn get_all(&self, doid: DoId) -> FieldSet {
        let context = self.fresh_context();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(context, PendingResponse::GetAll(tx));

        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], self.own_channel, dbserver::OBJECT_GET_ALL)
            .ok();
        dg.add_u32(context).ok();
        dg.add_doid(doid).ok();
        let _ = self.to_md.send(dg.into_bytes());

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(fields)) => fields,
            Ok(Err(_)) => FieldSet::new(),
            Err(_) => {
                warn!("database: OBJECT_GET_ALL context {} timed out.", context);
                self.pending.lock().await.remove(&context);
                FieldSet::new()
            }
        }
    }

    /// Sets one or more fields on `doid`. Fire-and-forget: the Database
    /// Server doesn't acknowledge field writes.
    pub fn set_fields(&self, doid: DoId, fields: FieldSet) {
        let mut dg = Datagram::new();
        dg.add_server_header(&[self.db_channel], self.own_channel, dbserver::OBJECT_SET_FIELDS)
            .ok();
        dg.add_doid(doid).ok();
        dg.add_u16(fields.len() as u16).ok();
        for (field_id, value) in &fields {
            dg.add_u16(*field_id).ok();
            dg.add_blob(value.clone()).ok();
        }
        let _ = self.to_md.send(dg.into_bytes());
    }
}

fn read_field_set(dgi: &mut DatagramIterator) -> DbResult<FieldSet> {
    let count = dgi.read_u16().map_err(|_| DbError::EmptyResponse(0))?;
    let mut fields = FieldSet::new();
    for _ in 0..count {
        let field_id = dgi.read_u16().map_err(|_| DbError::EmptyResponse(0))?;
        let value = dgi.read_blob().map_err(|_| DbError::EmptyResponse(0))?;
        fields.insert(field_id, value);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_object_times_out_to_an_error_instead_of_hanging() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let db = DatabaseInterface::new(5000, 1002, Duration::from_millis(20), tx);
        let result = db.create_object(1, FieldSet::new()).await;
        assert!(matches!(result, Err(DbError::Timeout(_))));
    }

    #[tokio::test]
    async fn get_all_times_out_to_an_empty_field_set() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let db = DatabaseInterface::new(5000, 1002, Duration::from_millis(20), tx);
        let fields = db.get_all(42).await;
        assert!(fields.is_empty());
    }
}
