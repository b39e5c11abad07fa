// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use sessmux::engine::error::ReactorError;
use sessmux::service::ServiceHooks;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

#[derive(Debug, Default)]
pub struct HookLog {
    pub attached: usize,
    pub detached: usize,
    /// The display form of every reported exit.
    pub reports: Vec<String>,
    /// Make `attach` fail with this message.
    pub fail_attach: Option<String>,
}

/// [`ServiceHooks`] which record every call. Clones share the same
/// log.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    pub log: Arc<Mutex<HookLog>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_attach(msg: &str) -> Self {
        let hooks = Self::default();
        hooks.log().fail_attach = Some(msg.to_string());
        hooks
    }

    pub fn log(&self) -> MutexGuard<'_, HookLog> {
        self.log.lock().unwrap()
    }

    pub fn boxed(&self) -> Box<dyn ServiceHooks> {
        Box::new(self.clone())
    }
}

impl ServiceHooks for RecordingHooks {
    fn attach(&mut self) -> Result<(), String> {
        let mut log = self.log();
        log.attached += 1;
        match &log.fail_attach {
            Some(msg) => Err(msg.clone()),
            None => Ok(()),
        }
    }

    fn detach(&mut self) {
        self.log().detached += 1;
    }

    fn report_exit(&mut self, err: &ReactorError) {
        self.log().reports.push(err.to_string());
    }
}
