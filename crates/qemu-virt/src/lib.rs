mod command;
mod compose;
mod dtb;
mod error;
mod image;
mod launcher;
mod options;
mod params;
mod prerequisites;

pub use command::{CommandError, exit_code};
pub use compose::{CONSOLE_PORTS, DEFAULT_QEMU, KERNEL_IMAGE, QemuCommand, machine_option};
pub use dtb::{DEFAULT_DTC, decompile, dts_path};
pub use error::{LaunchError, LaunchResult};
pub use image::{Dd, IMAGE_SIZE, ImageTool, QemuImg, host_image_tool, provision};
pub use launcher::{LaunchReport, Launcher};
pub use options::{GraphicsMode, LaunchOptions, NetworkMode};
pub use params::{ExceptionLevel, GICV2_MAX_CPUS, GicVersion, LaunchConfig};
pub use prerequisites::check_prerequisites;
