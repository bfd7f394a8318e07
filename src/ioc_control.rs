//! IOC lifecycle on top of a [`ProcessSupervisor`].
//!
//! Deny-listed IOCs (see [`is_protected_ioc`]) are never stopped or restarted
//! unless forced. Supervisor failures are logged and do not abort a batch.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::{Arc, Mutex};

use config_types::constants::is_protected_ioc;
use config_types::{Ioc, NamedList};
use tracing::{debug, error, info};

use crate::error::{ConfigError, Result};
use crate::holder::IocChanges;
use crate::ports::{IocState, ProcessSupervisor};

pub struct IocControl {
    supervisor: Arc<dyn ProcessSupervisor>,
}

impl IocControl {
    pub fn new(supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        Self { supervisor }
    }

    pub fn status(&self, ioc: &str) -> Result<IocState> {
        self.supervisor.status(ioc)
    }

    pub fn start_ioc(&self, ioc: &str) {
        if let Err(e) = self.supervisor.start(ioc) {
            error!(ioc = %ioc, error = %e, "could not start IOC");
        }
    }

    pub fn restart_ioc(&self, ioc: &str, force: bool) {
        if !force && is_protected_ioc(ioc) {
            debug!(ioc = %ioc, "protected IOC not restarted");
            return;
        }
        if let Err(e) = self.supervisor.restart(ioc) {
            error!(ioc = %ioc, error = %e, "could not restart IOC");
        }
    }

    pub fn stop_ioc(&self, ioc: &str, force: bool) {
        if !force && is_protected_ioc(ioc) {
            debug!(ioc = %ioc, "protected IOC not stopped");
            return;
        }
        if let Err(e) = self.supervisor.stop(ioc) {
            error!(ioc = %ioc, error = %e, "could not stop IOC");
        }
    }

    pub fn start_iocs<S: AsRef<str>>(&self, iocs: &[S]) {
        for ioc in iocs {
            self.start_ioc(ioc.as_ref());
        }
    }

    pub fn restart_iocs<S: AsRef<str>>(&self, iocs: &[S], force: bool) {
        for ioc in iocs {
            self.restart_ioc(ioc.as_ref(), force);
        }
    }

    pub fn stop_iocs<S: AsRef<str>>(&self, iocs: &[S], force: bool) {
        for ioc in iocs {
            self.stop_ioc(ioc.as_ref(), force);
        }
    }

    /// Start `ioc`, or restart it if it is already running.
    pub fn start_or_restart(&self, ioc: &str) {
        match self.supervisor.status(ioc) {
            Ok(IocState::Running) => self.restart_ioc(ioc, false),
            Ok(IocState::Shutdown) => self.start_ioc(ioc),
            Err(e) => error!(ioc = %ioc, error = %e, "could not (re)start IOC"),
        }
    }

    /// Start every IOC in `composed` flagged for autostart.
    pub fn start_config_iocs(&self, composed: &NamedList<Ioc>) {
        for ioc in composed.iter().filter(|ioc| ioc.autostart) {
            self.start_or_restart(&ioc.name);
        }
    }

    /// Apply a diff: stop, then restart, then start.
    ///
    /// IOCs to start that are not flagged for autostart in `composed` are
    /// left alone.
    pub fn apply_changes(&self, changes: &IocChanges, composed: &NamedList<Ioc>) {
        info!(
            start = ?changes.start,
            restart = ?changes.restart,
            stop = ?changes.stop,
            "applying IOC changes"
        );
        for ioc in &changes.stop {
            self.stop_ioc(ioc, false);
        }
        for ioc in &changes.restart {
            self.restart_ioc(ioc, false);
        }
        for name in &changes.start {
            match composed.get(name) {
                Some(ioc) if !ioc.autostart => {
                    debug!(ioc = %name, "not flagged for autostart");
                }
                _ => self.start_or_restart(name),
            }
        }
    }
}

// ── CommandSupervisor ──

/// Runs `<program> <action> <ioc>` for each request, with action one of
/// `start`, `stop`, `restart`, `status`. `status` must print `RUNNING` for a
/// running IOC.
#[derive(Debug, Clone)]
pub struct CommandSupervisor {
    program: String,
}

impl CommandSupervisor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, action: &str, ioc: &str) -> Result<String> {
        debug!(program = %self.program, action, ioc = %ioc, "ioc command");
        let output = Command::new(&self.program)
            .arg(action)
            .arg(ioc)
            .output()?;
        if !output.status.success() {
            return Err(ConfigError::InvalidOperation(format!(
                "{} {} {} failed: {}",
                self.program,
                action,
                ioc,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ProcessSupervisor for CommandSupervisor {
    fn start(&self, name: &str) -> Result<()> {
        self.run("start", name).map(|_| ())
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.run("stop", name).map(|_| ())
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.run("restart", name).map(|_| ())
    }

    fn status(&self, name: &str) -> Result<IocState> {
        let out = self.run("status", name)?;
        Ok(if out.trim().eq_ignore_ascii_case("RUNNING") {
            IocState::Running
        } else {
            IocState::Shutdown
        })
    }
}

// ── RecordingSupervisor ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IocOp {
    Start(String),
    Stop(String),
    Restart(String),
}

/// Keeps IOC states in memory and records every request.
///
/// Also used when no supervisor command is configured.
#[derive(Debug, Default)]
pub struct RecordingSupervisor {
    states: Mutex<BTreeMap<String, IocState>>,
    ops: Mutex<Vec<IocOp>>,
}

impl RecordingSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running<S: AsRef<str>>(iocs: &[S]) -> Self {
        let supervisor = Self::default();
        if let Ok(mut states) = supervisor.states.lock() {
            for ioc in iocs {
                states.insert(ioc.as_ref().to_ascii_uppercase(), IocState::Running);
            }
        }
        supervisor
    }

    pub fn ops(&self) -> Vec<IocOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn clear_ops(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.clear();
        }
    }

    fn record(&self, op: IocOp, name: &str, state: IocState) -> Result<()> {
        info!(?op, "ioc request");
        self.states
            .lock()
            .map_err(ConfigError::lock)?
            .insert(name.to_ascii_uppercase(), state);
        self.ops.lock().map_err(ConfigError::lock)?.push(op);
        Ok(())
    }
}

impl ProcessSupervisor for RecordingSupervisor {
    fn start(&self, name: &str) -> Result<()> {
        self.record(IocOp::Start(name.to_string()), name, IocState::Running)
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.record(IocOp::Stop(name.to_string()), name, IocState::Shutdown)
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.record(IocOp::Restart(name.to_string()), name, IocState::Running)
    }

    fn status(&self, name: &str) -> Result<IocState> {
        let states = self.states.lock().map_err(ConfigError::lock)?;
        Ok(states
            .get(&name.to_ascii_uppercase())
            .copied()
            .unwrap_or(IocState::Shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn control(running: &[&str]) -> (IocControl, Arc<RecordingSupervisor>) {
        let supervisor = Arc::new(RecordingSupervisor::with_running(running));
        (IocControl::new(supervisor.clone()), supervisor)
    }

    #[test]
    fn protected_iocs_need_force() {
        let (control, supervisor) = control(&["INSTETC_01", "SIMPLE"]);
        control.stop_iocs(&["INSTETC_01", "SIMPLE"], false);
        control.restart_ioc("RUNCTRL_01", false);
        assert_eq!(supervisor.ops(), vec![IocOp::Stop("SIMPLE".to_string())]);

        control.stop_ioc("INSTETC_01", true);
        assert_eq!(
            supervisor.ops().last(),
            Some(&IocOp::Stop("INSTETC_01".to_string()))
        );
    }

    #[test]
    fn start_restarts_running_iocs() {
        let (control, supervisor) = control(&["RUNNING_ONE"]);
        control.start_or_restart("RUNNING_ONE");
        control.start_or_restart("IDLE_ONE");
        assert_eq!(
            supervisor.ops(),
            vec![
                IocOp::Restart("RUNNING_ONE".to_string()),
                IocOp::Start("IDLE_ONE".to_string()),
            ]
        );
        assert_eq!(control.status("IDLE_ONE").unwrap(), IocState::Running);
    }

    #[test]
    fn apply_changes_stops_then_restarts_then_starts() {
        let (control, supervisor) = control(&["OLD", "CHANGED"]);
        let mut quiet = Ioc::new("QUIET");
        quiet.autostart = false;
        let composed: NamedList<Ioc> = vec![Ioc::new("CHANGED"), Ioc::new("NEW"), quiet]
            .into_iter()
            .collect();
        let changes = IocChanges {
            start: names(&["NEW", "QUIET"]),
            restart: names(&["CHANGED"]),
            stop: names(&["OLD", "ISISDAE_01"]),
        };

        control.apply_changes(&changes, &composed);
        assert_eq!(
            supervisor.ops(),
            vec![
                IocOp::Stop("OLD".to_string()),
                IocOp::Restart("CHANGED".to_string()),
                IocOp::Start("NEW".to_string()),
            ]
        );
    }

    #[test]
    fn start_config_iocs_honours_autostart() {
        let (control, supervisor) = control(&[]);
        let mut manual = Ioc::new("MANUAL");
        manual.autostart = false;
        let composed: NamedList<Ioc> = vec![Ioc::new("AUTO"), manual].into_iter().collect();
        control.start_config_iocs(&composed);
        assert_eq!(supervisor.ops(), vec![IocOp::Start("AUTO".to_string())]);
    }

    #[test]
    fn missing_command_is_logged_not_raised() {
        let control = IocControl::new(Arc::new(CommandSupervisor::new(
            "/nonexistent/ioc-supervisor",
        )));
        control.start_ioc("SIMPLE");
        assert!(control.status("SIMPLE").is_err());
    }
}
