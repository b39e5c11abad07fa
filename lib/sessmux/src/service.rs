// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The lifecycle surface used by the outer VPN service.
//!
//! A [`SessionMux`] owns the session table across VPN start/stop
//! cycles. Each start spawns a single worker thread which runs the
//! reactor until [`SessionMux::stop`] signals the control channel or a
//! fatal error ends the run.

use crate::api::SessionDump;
use crate::cfg::ReactorCfg;
use crate::engine::control::StopSignal;
use crate::engine::control::control_channel;
use crate::engine::error::ReactorError;
use crate::engine::handler::SessionHandler;
use crate::engine::reactor::RunContext;
use crate::engine::reactor::run_reactor;
use crate::engine::table::SessionTable;
use crate::provider::LogLevel;
use crate::provider::Providers;
use crate::time::Moment;
use nix::errno::Errno;
use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use thiserror::Error;

/// The embedding runtime, as seen by the reactor.
///
/// `attach` is called on the worker before anything else and `detach`
/// after everything else. Between the two, `report_exit` is called at
/// most once, with the error that ended the run.
pub trait ServiceHooks: Send {
    fn attach(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn detach(&mut self) {}

    fn report_exit(&mut self, err: &ReactorError);
}

/// Hooks for an embedding with no runtime of its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl ServiceHooks for NoHooks {
    fn report_exit(&mut self, _err: &ReactorError) {}
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("reactor already running")]
    AlreadyRunning,

    #[error("reactor not running")]
    NotRunning,

    #[error("control channel error {}: {}", *.0 as i32, .0.desc())]
    ControlChannel(Errno),

    #[error("failed to signal reactor: {0}")]
    Signal(#[source] io::Error),

    #[error("failed to spawn reactor thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("reactor thread panicked")]
    WorkerPanicked,
}

struct Worker {
    stop: StopSignal,
    join: JoinHandle<Result<(), ReactorError>>,
}

pub struct SessionMux {
    table: Arc<Mutex<SessionTable>>,
    cfg: ReactorCfg,
    providers: Providers,
    worker: Option<Worker>,
}

impl SessionMux {
    pub fn new(cfg: ReactorCfg, providers: Providers) -> Self {
        let table = SessionTable::new(providers.log.clone());
        Self {
            table: Arc::new(Mutex::new(table)),
            cfg,
            providers,
            worker: None,
        }
    }

    pub fn cfg(&self) -> &ReactorCfg {
        &self.cfg
    }

    /// Lock the session table.
    ///
    /// While the reactor runs, this contends with the reactor's
    /// iterations.
    pub fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start with an empty table. Leftover sessions from an earlier run
    /// are released rather than leaked.
    pub fn initialize_table(&self) {
        let n = self.table().clear_all();
        if n > 0 {
            self.providers.log.log(
                LogLevel::Warn,
                &format!("released {n} leftover sessions"),
            );
        }
    }

    /// Close every session socket and free every record. Safe to call
    /// on an empty table, and safe to call repeatedly.
    pub fn reset_and_release_all(&self) -> usize {
        let n = self.table().clear_all();
        self.providers
            .log
            .log(LogLevel::Note, &format!("released {n} sessions"));
        n
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.join.is_finished())
    }

    /// Spawn the reactor worker on `tun`.
    ///
    /// A worker which already exited on its own is reaped first.
    pub fn start<H>(
        &mut self,
        tun: Arc<OwnedFd>,
        handler: H,
        hooks: Box<dyn ServiceHooks>,
    ) -> Result<(), ServiceError>
    where
        H: SessionHandler + 'static,
    {
        if self.is_running() {
            return Err(ServiceError::AlreadyRunning);
        }
        if let Some(old) = self.worker.take() {
            let _ = old.join.join();
        }

        let (stop, control) =
            control_channel().map_err(ServiceError::ControlChannel)?;
        let ctx = RunContext {
            tun,
            control: Arc::new(control),
            hooks,
            cfg: self.cfg.clone(),
            log: self.providers.log.clone(),
        };

        let table = self.table.clone();
        let join = thread::Builder::new()
            .name("sessmux-reactor".to_string())
            .spawn(move || {
                let mut handler = handler;
                run_reactor(ctx, &table, &mut handler)
            })
            .map_err(ServiceError::Spawn)?;

        self.worker = Some(Worker { stop, join });
        Ok(())
    }

    /// Signal the worker to stop and wait for it.
    ///
    /// The outer result is about the lifecycle, the inner one is what
    /// the run itself returned. The table is left untouched; follow
    /// with [`Self::reset_and_release_all`] to release the sessions.
    pub fn stop(&mut self) -> Result<Result<(), ReactorError>, ServiceError> {
        let Some(worker) = self.worker.take() else {
            return Err(ServiceError::NotRunning);
        };

        // The worker may already be gone after a fatal error, in which
        // case the pipe is closed and there is nobody to signal.
        if !worker.join.is_finished() {
            if let Err(e) = worker.stop.signal() {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    self.worker = Some(worker);
                    return Err(ServiceError::Signal(e));
                }
            }
        }

        worker.join.join().map_err(|_| ServiceError::WorkerPanicked)
    }

    pub fn dump_sessions(&self) -> Vec<SessionDump> {
        self.table().dump(Moment::now())
    }

    #[cfg(any(feature = "test-help", test))]
    pub fn session_count(&self) -> usize {
        self.table().len()
    }
}

impl Drop for SessionMux {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                self.providers
                    .log
                    .log(LogLevel::Error, &format!("stop on drop: {e}"));
            }
        }
    }
}
