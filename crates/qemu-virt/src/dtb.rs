use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use crate::command::{CommandError, run_inherited};

pub const DEFAULT_DTC: &str = "dtc";

/// Source-form path next to a dumped blob: `virt.dtb` -> `virt.dts`.
pub fn dts_path(dtb: &Path) -> PathBuf {
    dtb.with_extension("dts")
}

fn dtc_args(dtb: &Path, dts: &Path) -> Vec<OsString> {
    vec![
        "-I".into(),
        "dtb".into(),
        "-O".into(),
        "dts".into(),
        // Keep symbols and auto-generated fixups so overlays still apply.
        "-@".into(),
        "-A".into(),
        dtb.into(),
        "-o".into(),
        dts.into(),
    ]
}

/// Decompile `dtb` into its `.dts` sibling with `dtc`.
pub async fn decompile(dtc: &OsStr, dtb: &Path) -> Result<ExitStatus, CommandError> {
    run_inherited(dtc, &dtc_args(dtb, &dts_path(dtb))).await
}
