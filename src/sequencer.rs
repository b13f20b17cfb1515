//! Runs the launch steps in their fixed order:
//! announce, run-first, wait-for-process, registry import, dismiss, launch.
//!
//! OS side effects go through [`Host`] so the ordering can be checked
//! without starting real processes.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use thiserror::Error;

use crate::launch_config::LaunchConfig;
use crate::launcher::{self, ProgramSpec};
use crate::registry::{self, RegistryImport};
use crate::splash::{SplashScreen, SplashSnapshot};
use crate::wait::{self, CancelToken, SystemProcessTable, WaitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validated,
    Announced,
    RanFirst,
    WaitedForProcess,
    ImportedRegistry,
    Dismissed,
    Launched,
}

pub trait Splash {
    /// Blocks until the screen is gone.
    fn dismiss(self: Box<Self>);
}

pub trait RunningProcess {
    fn id(&self) -> u32;
    fn has_exited(&mut self) -> io::Result<bool>;
}

pub trait Host {
    fn announce(&mut self, snapshot: SplashSnapshot) -> io::Result<Box<dyn Splash>>;
    fn spawn(&mut self, program: &ProgramSpec) -> io::Result<Box<dyn RunningProcess>>;
    fn is_process_running(&mut self, name: &str) -> bool;
    fn import_registry(&mut self, file: &Path) -> RegistryImport;
}

impl Splash for SplashScreen {
    fn dismiss(self: Box<Self>) {
        SplashScreen::dismiss(*self);
    }
}

impl RunningProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.try_wait()?.is_some())
    }
}

/// The real operating system.
pub struct SystemHost {
    processes: SystemProcessTable,
}

impl SystemHost {
    pub fn new() -> Self {
        Self {
            processes: SystemProcessTable::new(),
        }
    }
}

impl Host for SystemHost {
    fn announce(&mut self, snapshot: SplashSnapshot) -> io::Result<Box<dyn Splash>> {
        Ok(Box::new(SplashScreen::show(snapshot)?))
    }

    fn spawn(&mut self, program: &ProgramSpec) -> io::Result<Box<dyn RunningProcess>> {
        let child = launcher::build_command(program).spawn()?;
        Ok(Box::new(child))
    }

    fn is_process_running(&mut self, name: &str) -> bool {
        self.processes.is_running(name)
    }

    fn import_registry(&mut self, file: &Path) -> RegistryImport {
        registry::import(file)
    }
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("could not show the splash screen")]
    Splash(#[source] io::Error),

    #[error("could not start {what} {}", .path.display())]
    Spawn {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Wait(#[from] WaitError),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub stages: Vec<Stage>,
    /// Problems that did not stop the launch.
    pub warnings: Vec<String>,
    pub launched_pid: Option<u32>,
}

impl LaunchReport {
    fn enter(&mut self, stage: Stage) {
        log::info!("launch stage: {stage:?}");
        self.stages.push(stage);
    }
}

pub struct Sequencer<H> {
    host: H,
    cancel: CancelToken,
}

impl<H: Host> Sequencer<H> {
    pub fn new(host: H, cancel: CancelToken) -> Self {
        Self { host, cancel }
    }

    /// Runs every configured step. The launched application is not waited
    /// on. Steps already performed are not undone when a later one fails;
    /// the splash screen is torn down on every path.
    pub fn run(&mut self, config: &LaunchConfig) -> Result<LaunchReport, SequenceError> {
        let mut report = LaunchReport::default();
        report.enter(Stage::Validated);

        let splash = self
            .host
            .announce(SplashSnapshot {
                presentation: config.presentation.clone(),
                min_dwell: config.splash_dwell,
                cancel: self.cancel.clone(),
            })
            .map_err(SequenceError::Splash)?;
        report.enter(Stage::Announced);

        if let Some(run_first) = &config.run_first {
            let program = run_first.program();
            let mut child = self.spawn("run-first program", &program)?;
            if run_first.wait_for_exit {
                let what = format!("{} to exit", program.path.display());
                wait::poll_until(&config.wait_policy, &self.cancel, &what, || {
                    child.has_exited()
                })?;
            }
            report.enter(Stage::RanFirst);
        }

        if let Some(name) = &config.wait_for_logon_process {
            let host = &mut self.host;
            let what = format!("process {name} to exit");
            wait::poll_until(&config.wait_policy, &self.cancel, &what, || {
                Ok(!host.is_process_running(name))
            })?;
            report.enter(Stage::WaitedForProcess);
        }

        if let Some(file) = &config.import_registry_file {
            log::info!("importing registry file {}", file.display());
            let outcome = self.host.import_registry(file);
            if let Some(warning) = outcome.warning() {
                log::warn!("{warning}");
                report.warnings.push(warning);
            }
            report.enter(Stage::ImportedRegistry);
        }

        splash.dismiss();
        report.enter(Stage::Dismissed);

        let child = self.spawn("application", &config.main_program())?;
        report.launched_pid = Some(child.id());
        report.enter(Stage::Launched);
        Ok(report)
    }

    fn spawn(
        &mut self,
        what: &'static str,
        program: &ProgramSpec,
    ) -> Result<Box<dyn RunningProcess>, SequenceError> {
        log::info!("starting {what} {}", program.path.display());
        self.host
            .spawn(program)
            .map_err(|source| SequenceError::Spawn {
                what,
                path: program.path.clone(),
                source,
            })
    }
}
