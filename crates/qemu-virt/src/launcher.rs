use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use tracing::{info, warn};

use crate::command::{exit_code, run_inherited};
use crate::compose::{DEFAULT_QEMU, QemuCommand};
use crate::dtb::{self, DEFAULT_DTC};
use crate::error::LaunchResult;
use crate::image::{ImageTool, host_image_tool, provision};
use crate::params::LaunchConfig;
use crate::prerequisites::check_prerequisites;

/// Outcome of a completed launch.
#[derive(Debug)]
pub struct LaunchReport {
    /// Exit status of the emulator.
    pub status: ExitStatus,
    /// Images that did not exist and were created for this run.
    pub images_created: Vec<PathBuf>,
    /// Decompiled device tree, when a dump was requested and `dtc` succeeded.
    pub dts: Option<PathBuf>,
}

impl LaunchReport {
    pub fn exit_code(&self) -> i32 {
        exit_code(self.status)
    }
}

/// Provisions images, runs the emulator in the foreground, then decompiles
/// the dumped device tree if one was requested.
pub struct Launcher {
    qemu: OsString,
    dtc: OsString,
    image_tool: Box<dyn ImageTool>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new(DEFAULT_QEMU, DEFAULT_DTC)
    }
}

impl Launcher {
    pub fn new(qemu: impl Into<OsString>, dtc: impl Into<OsString>) -> Self {
        Self {
            qemu: qemu.into(),
            dtc: dtc.into(),
            image_tool: host_image_tool(),
        }
    }

    pub fn with_image_tool(mut self, image_tool: Box<dyn ImageTool>) -> Self {
        self.image_tool = image_tool;
        self
    }

    pub fn command(&self, config: &LaunchConfig) -> QemuCommand {
        QemuCommand::compose(&self.qemu, config)
    }

    pub async fn run(&self, config: &LaunchConfig) -> LaunchResult<LaunchReport> {
        let mut programs: Vec<(&str, &OsStr)> = vec![("emulator", self.qemu.as_os_str())];
        if config.dumpdtb.is_some() {
            programs.push(("device tree compiler", self.dtc.as_os_str()));
        }
        check_prerequisites(programs)?;

        let images_created = provision(self.image_tool.as_ref(), &config.image_paths()).await?;

        let command = self.command(config);
        info!(command = %command, "launching emulator");
        let status = run_inherited(command.program(), command.args()).await?;
        info!(%status, "emulator exited");

        let dts = match &config.dumpdtb {
            Some(dtb) => self.decompile(dtb).await,
            None => None,
        };

        Ok(LaunchReport {
            status,
            images_created,
            dts,
        })
    }

    /// Failures are logged, never fatal: the emulator's status decides the exit code.
    async fn decompile(&self, dtb: &Path) -> Option<PathBuf> {
        if !tokio::fs::try_exists(dtb).await.unwrap_or(false) {
            warn!(dtb = %dtb.display(), "device tree blob not found, skipping dtc");
            return None;
        }

        let dts = dtb::dts_path(dtb);
        match dtb::decompile(&self.dtc, dtb).await {
            Ok(status) if status.success() => {
                info!(dts = %dts.display(), "device tree decompiled");
                Some(dts)
            }
            Ok(status) => {
                warn!(%status, dtb = %dtb.display(), "dtc failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "dtc failed to start");
                None
            }
        }
    }
}
