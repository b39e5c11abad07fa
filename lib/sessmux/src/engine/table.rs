// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The session table.
//!
//! Records are kept in a `BTreeMap` keyed by [`SessionId`]. Ids are
//! allocated in increasing order, so key order is insertion order and
//! a traversal always visits records oldest first. Deleting a record
//! mid-traversal never disturbs the visits that follow it, which is
//! what lets the reactor expire sessions in a single pass.

use super::error::SessionError;
use super::session::Session;
use super::session::SessionId;
use crate::api::SessionDump;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use crate::time::Moment;
use std::collections::BTreeMap;
use std::os::fd::RawFd;
use std::sync::Arc;

/// What a [`SessionTable::retain_with`] visitor wants done with the
/// record it was just shown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visit {
    Keep,
    Delete,
}

pub struct SessionTable {
    next_id: u64,
    map: BTreeMap<SessionId, Session>,
    log: Arc<dyn LogProvider>,
}

impl SessionTable {
    pub fn new(log: Arc<dyn LogProvider>) -> Self {
        Self { next_id: 1, map: BTreeMap::new(), log }
    }

    /// Add a new record to the table.
    ///
    /// # Errors
    ///
    /// If the record's socket is already owned by another record an
    /// error is returned and the new record is dropped. That should be
    /// impossible for descriptors handled through `OwnedFd`; seeing it
    /// means a handler fabricated a descriptor from a raw number.
    pub fn insert(
        &mut self,
        mut session: Session,
    ) -> Result<SessionId, SessionError> {
        if let Some(fd) = session.raw_fd() {
            if let Some(owner) = self.find_by_fd(fd) {
                // The descriptor belongs to `owner`; don't let dropping
                // the duplicate close it.
                session.disown_socket();
                return Err(SessionError::DescriptorInUse { fd, owner });
            }
        }

        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        self.map.insert(id, session);
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.map.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.map.get_mut(&id)
    }

    /// Find the record which owns `fd`.
    pub fn find_by_fd(&self, fd: RawFd) -> Option<SessionId> {
        self.map
            .iter()
            .find(|(_, s)| s.raw_fd() == Some(fd))
            .map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &Session)> {
        self.map.iter().map(|(id, s)| (*id, s))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SessionId, &mut Session)> {
        self.map.iter_mut().map(|(id, s)| (*id, s))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Visit every record once, in insertion order, deleting those for
    /// which `visit` answers [`Visit::Delete`].
    ///
    /// A deleted record is released (socket closed, TCP state torn
    /// down) before the next record is visited. Returns the number of
    /// records deleted.
    pub fn retain_with<F>(&mut self, mut visit: F) -> usize
    where
        F: FnMut(SessionId, &mut Session) -> Visit,
    {
        let log = &self.log;
        let mut deleted = 0;

        self.map.retain(|id, session| match visit(*id, session) {
            Visit::Keep => true,
            Visit::Delete => {
                release(log.as_ref(), *id, session);
                deleted += 1;
                false
            }
        });

        deleted
    }

    /// Release and remove every record.
    ///
    /// Calling this on an empty table does nothing.
    pub fn clear_all(&mut self) -> usize {
        let n = self.map.len();
        let log = &self.log;

        for (id, session) in self.map.iter_mut() {
            release(log.as_ref(), *id, session);
        }
        self.map.clear();
        n
    }

    pub fn dump(&self, now: Moment) -> Vec<SessionDump> {
        self.map.iter().map(|(id, s)| s.dump(*id, now)).collect()
    }
}

impl Drop for SessionTable {
    fn drop(&mut self) {
        self.clear_all();
    }
}

fn release(log: &dyn LogProvider, id: SessionId, session: &mut Session) {
    let proto = session.protocol();
    match session.release() {
        Ok(Some(fd)) => {
            log.log(
                LogLevel::Debug,
                &format!("session {id} {proto} closed socket {fd}"),
            );
        }
        Ok(None) => {}
        Err((fd, e)) => {
            log.log(
                LogLevel::Error,
                &format!(
                    "session {id} {proto} close {fd} error {}: {}",
                    e as i32,
                    e.desc()
                ),
            );
        }
    }
}
