use std::ffi::{OsStr, OsString};
use std::fmt;

use crate::command::format_command_display;
use crate::options::{GraphicsMode, NetworkMode};
use crate::params::LaunchConfig;

pub const DEFAULT_QEMU: &str = "qemu-system-aarch64";

/// Kernel image loaded from the working directory.
pub const KERNEL_IMAGE: &str = "rtthread.bin";

/// Host TCP ports of the two telnet serial consoles.
pub const CONSOLE_PORTS: [u16; 2] = [4321, 4322];

const MACHINE_BASE: &str = "virt,acpi=on,iommu=smmuv3,its=on";
const NIC_ID: &str = "net0";
const TAP_IFNAME: &str = "tap0";

const GRAPHIC_ARGS: &[&str] = &[
    "-serial",
    "stdio",
    "-device",
    "ramfb",
    "-device",
    "virtio-gpu-device,xres=800,yres=600",
    "-device",
    "virtio-keyboard-device",
    "-device",
    "virtio-mouse-device",
    "-device",
    "virtio-tablet-device",
];

/// A fully composed emulator invocation: program plus argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl QemuCommand {
    pub fn compose(program: impl Into<OsString>, config: &LaunchConfig) -> Self {
        let mut cmd = Args::default();

        cmd.pair("-M", machine_option(config));
        cmd.pair("-cpu", "max");
        cmd.pair("-smp", config.smp.to_string());
        cmd.pair("-m", config.mem_mb.to_string());
        cmd.pair("-kernel", KERNEL_IMAGE);
        cmd.pair("-append", &config.bootargs);
        if let Some(initrd) = &config.initrd {
            cmd.pair("-initrd", initrd);
        }

        match config.graphics {
            GraphicsMode::Headless => cmd.push("-nographic"),
            GraphicsMode::Graphical => GRAPHIC_ARGS.iter().for_each(|a| cmd.push(a)),
        }
        if config.debug {
            // Freeze at reset, gdb stub on tcp::1234.
            cmd.push("-S");
            cmd.push("-s");
        }

        let mut blk = OsString::from("if=none,file=");
        blk.push(escape_option_value(&config.sd));
        blk.push(",format=raw,id=blk0");
        cmd.pair("-drive", blk);
        cmd.pair("-device", "virtio-blk-device,drive=blk0");

        cmd.pair("-netdev", netdev_option(config.network));
        cmd.pair("-device", format!("virtio-net-device,netdev={NIC_ID}"));
        cmd.pair("-device", "virtio-rng-device");
        cmd.pair("-device", "intel-hda");
        cmd.pair("-device", "hda-duplex");

        let mut pflash = OsString::from("file=");
        pflash.push(escape_option_value(&config.flash));
        pflash.push(",format=raw,if=pflash,index=1");
        cmd.pair("-drive", pflash);

        let [console0, console1] = CONSOLE_PORTS;
        cmd.pair("-device", "virtio-serial-device");
        cmd.pair("-chardev", telnet_chardev(console0, "console0"));
        cmd.pair("-device", "virtserialport,chardev=console0");
        cmd.pair("-device", "pci-serial,chardev=console1");
        cmd.pair("-chardev", telnet_chardev(console1, "console1"));

        Self {
            program: program.into(),
            args: cmd.0,
        }
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Value following the first occurrence of `flag`, if any.
    pub fn value_of(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(OsString::as_os_str)
    }
}

impl fmt::Display for QemuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_command_display(&self.program, &self.args))
    }
}

#[derive(Default)]
struct Args(Vec<OsString>);

impl Args {
    fn push(&mut self, arg: impl AsRef<OsStr>) {
        self.0.push(arg.as_ref().to_os_string());
    }

    fn pair(&mut self, flag: &str, value: impl AsRef<OsStr>) {
        self.push(flag);
        self.push(value);
    }
}

/// `-M` value: board, GIC version, optional DTB dump and exception level.
pub fn machine_option(config: &LaunchConfig) -> OsString {
    let mut machine = OsString::from(format!("{MACHINE_BASE},gic-version={}", config.gic));
    if let Some(dtb) = &config.dumpdtb {
        machine.push(",dumpdtb=");
        machine.push(escape_option_value(dtb));
    }
    machine.push(config.el.suffix());
    machine
}

/// QEMU option-value escaping: every `,` becomes `,,`.
fn escape_option_value(value: impl AsRef<OsStr>) -> OsString {
    let value = value.as_ref();
    let mut escaped = OsString::with_capacity(value.len());
    for (i, part) in value.as_encoded_bytes().split(|b| *b == b',').enumerate() {
        if i > 0 {
            escaped.push(",,");
        }
        // SAFETY: `part` comes from splitting valid encoded bytes on an ASCII
        // byte, which always lands on a boundary.
        escaped.push(unsafe { OsStr::from_encoded_bytes_unchecked(part) });
    }
    escaped
}

fn netdev_option(network: NetworkMode) -> String {
    match network {
        NetworkMode::User => format!("user,id={NIC_ID}"),
        NetworkMode::Tap => format!("tap,id={NIC_ID},ifname={TAP_IFNAME}"),
    }
}

fn telnet_chardev(port: u16, id: &str) -> String {
    format!("socket,host=127.0.0.1,port={port},server=on,wait=off,telnet=on,id={id}")
}
