use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use qemu_virt::{
    DEFAULT_DTC, DEFAULT_QEMU, LaunchConfig, LaunchOptions, LaunchResult, Launcher,
};

/// Boot RT-Thread on the QEMU aarch64 `virt` board.
///
/// Board options use a single dash and follow the launcher flags:
/// -gic N, -dumpdtb PATH, -el 1|2|3, -smp N, -mem MB, -debug, -bootargs STR,
/// -initrd PATH, -graphic, -sd PATH, -tap, -flash PATH.
/// Unrecognized board options are ignored, `-h` and `-V` included.
#[derive(Parser)]
#[command(
    name = "virt-runner",
    version,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct LaunchArgs {
    /// Emulator binary
    #[arg(long, env = "VIRT_RUNNER_QEMU", default_value = DEFAULT_QEMU)]
    qemu: PathBuf,
    /// Device tree compiler used to decompile a -dumpdtb blob
    #[arg(long, env = "VIRT_RUNNER_DTC", default_value = DEFAULT_DTC)]
    dtc: PathBuf,
    /// Print the emulator command line and exit without creating images
    #[arg(long)]
    dry_run: bool,
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,
    /// Print version
    #[arg(long, action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
    /// Board options
    #[arg(
        value_name = "BOARD OPTIONS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    options: Vec<String>,
}

/// Resolve board options, then either print the command or run it.
///
/// Returns the emulator's exit code.
pub async fn run_launch(args: LaunchArgs) -> LaunchResult<ExitCode> {
    let options = LaunchOptions::resolve(args.options)?;
    let config = LaunchConfig::derive(options)?;
    tracing::debug!(?config, "launch configuration");

    let launcher = Launcher::new(args.qemu, args.dtc);

    if args.dry_run {
        println!("{}", launcher.command(&config));
        return Ok(ExitCode::SUCCESS);
    }

    let report = launcher.run(&config).await?;
    for path in &report.images_created {
        tracing::info!("[OK] created {}", path.display());
    }
    if let Some(dts) = &report.dts {
        tracing::info!("[OK] device tree source: {}", dts.display());
    }

    Ok(ExitCode::from(exit_byte(report.exit_code())))
}

/// Codes outside 0..=255 cannot be reported faithfully; saturate them.
fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(u8::MAX)
}
