//! Tolerant `-name value` option parser for the board options.
//!
//! Recognized options overlay [`LaunchOptions::default`]; anything else on the
//! command line is skipped.

use std::num::IntErrorKind;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::error::{LaunchError, LaunchResult};

pub const DEFAULT_GIC: u32 = 2;
pub const DEFAULT_EL: i64 = 1;
pub const DEFAULT_SMP: u32 = 4;
pub const DEFAULT_MEM_MB: u32 = 128;
pub const DEFAULT_BOOTARGS: &str =
    "console=ttyAMA0 earlycon root=block0 rootfstype=elm rootwait rw";
pub const DEFAULT_SD: &str = "sd.bin";
pub const DEFAULT_FLASH: &str = "flash.bin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphicsMode {
    /// `-nographic`, serial on the terminal.
    #[default]
    Headless,
    /// ramfb + virtio-gpu with virtio input devices.
    Graphical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkMode {
    /// QEMU user-mode (slirp) networking.
    #[default]
    User,
    /// Bridge through the host `tap0` interface.
    Tap,
}

/// Board options as given on the command line, before derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub gic: u32,
    /// Where QEMU should dump the generated device tree (and exit).
    pub dumpdtb: Option<PathBuf>,
    /// Raw exception level; validated by [`crate::LaunchConfig::derive`].
    pub el: i64,
    pub smp: u32,
    pub mem_mb: u32,
    pub graphics: GraphicsMode,
    /// Freeze the CPU at startup and open a gdb stub on :1234.
    pub debug: bool,
    pub bootargs: String,
    pub initrd: Option<PathBuf>,
    pub sd: PathBuf,
    pub network: NetworkMode,
    pub flash: PathBuf,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            gic: DEFAULT_GIC,
            dumpdtb: None,
            el: DEFAULT_EL,
            smp: DEFAULT_SMP,
            mem_mb: DEFAULT_MEM_MB,
            graphics: GraphicsMode::Headless,
            debug: false,
            bootargs: DEFAULT_BOOTARGS.to_string(),
            initrd: None,
            sd: PathBuf::from(DEFAULT_SD),
            network: NetworkMode::User,
            flash: PathBuf::from(DEFAULT_FLASH),
        }
    }
}

impl LaunchOptions {
    /// Resolve board options from `args` (program name excluded).
    ///
    /// Value-taking options consume the following token verbatim, even if it
    /// starts with `-`. When an option repeats, the last occurrence wins.
    pub fn resolve<I, S>(args: I) -> LaunchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut opts = Self::default();
        let mut args = args.into_iter().map(Into::<String>::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-gic" => opts.gic = parse_number("-gic", next_value(&mut args, "-gic")?)?,
                "-dumpdtb" => opts.dumpdtb = Some(next_value(&mut args, "-dumpdtb")?.into()),
                "-el" => opts.el = parse_el(next_value(&mut args, "-el")?)?,
                "-smp" => opts.smp = parse_number("-smp", next_value(&mut args, "-smp")?)?,
                "-mem" => opts.mem_mb = parse_number("-mem", next_value(&mut args, "-mem")?)?,
                "-debug" => opts.debug = true,
                "-bootargs" => opts.bootargs = next_value(&mut args, "-bootargs")?,
                "-initrd" => opts.initrd = Some(next_value(&mut args, "-initrd")?.into()),
                "-graphic" => opts.graphics = GraphicsMode::Graphical,
                "-sd" => opts.sd = next_value(&mut args, "-sd")?.into(),
                "-tap" => opts.network = NetworkMode::Tap,
                "-flash" => opts.flash = next_value(&mut args, "-flash")?.into(),
                other => debug!(arg = %other, "ignoring unrecognized argument"),
            }
        }

        Ok(opts)
    }
}

fn next_value(
    args: &mut impl Iterator<Item = String>,
    option: &'static str,
) -> LaunchResult<String> {
    args.next().ok_or(LaunchError::MissingValue { option })
}

fn parse_number<T>(option: &'static str, value: String) -> LaunchResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| LaunchError::InvalidValue {
            option,
            reason: e.to_string(),
            value,
        })
}

/// An integer too large for `i64` is still an exception level, just not a
/// valid one.
fn parse_el(value: String) -> LaunchResult<i64> {
    match value.trim().parse::<i64>() {
        Ok(el) => Ok(el),
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            Err(LaunchError::InvalidExceptionLevel(value.trim().to_string()))
        }
        Err(e) => Err(LaunchError::InvalidValue {
            option: "-el",
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(args: &[&str]) -> LaunchResult<LaunchOptions> {
        LaunchOptions::resolve(args.iter().copied())
    }

    #[test]
    fn empty_args_yield_defaults() {
        let opts = resolve(&[]).unwrap();
        assert_eq!(opts, LaunchOptions::default());
        assert_eq!(opts.gic, 2);
        assert_eq!(opts.el, 1);
        assert_eq!(opts.smp, 4);
        assert_eq!(opts.mem_mb, 128);
        assert_eq!(opts.graphics, GraphicsMode::Headless);
        assert_eq!(opts.network, NetworkMode::User);
        assert!(!opts.debug);
        assert_eq!(opts.sd, PathBuf::from("sd.bin"));
        assert_eq!(opts.flash, PathBuf::from("flash.bin"));
        assert!(opts.dumpdtb.is_none());
        assert!(opts.initrd.is_none());
    }

    #[test]
    fn every_option_is_recognized() {
        let opts = resolve(&[
            "-gic", "3", "-dumpdtb", "virt.dtb", "-el", "2", "-smp", "2", "-mem", "512",
            "-debug", "-bootargs", "console=ttyAMA0", "-initrd", "initrd.img", "-graphic",
            "-sd", "disk.img", "-tap", "-flash", "nor.img",
        ])
        .unwrap();

        assert_eq!(opts.gic, 3);
        assert_eq!(opts.dumpdtb, Some(PathBuf::from("virt.dtb")));
        assert_eq!(opts.el, 2);
        assert_eq!(opts.smp, 2);
        assert_eq!(opts.mem_mb, 512);
        assert!(opts.debug);
        assert_eq!(opts.bootargs, "console=ttyAMA0");
        assert_eq!(opts.initrd, Some(PathBuf::from("initrd.img")));
        assert_eq!(opts.graphics, GraphicsMode::Graphical);
        assert_eq!(opts.sd, PathBuf::from("disk.img"));
        assert_eq!(opts.network, NetworkMode::Tap);
        assert_eq!(opts.flash, PathBuf::from("nor.img"));
    }

    #[test]
    fn order_is_irrelevant() {
        let a = resolve(&["-smp", "8", "-tap", "-mem", "256"]).unwrap();
        let b = resolve(&["-mem", "256", "-smp", "8", "-tap"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let opts = resolve(&["--verbose", "-smp", "6", "stray", "-nographic"]).unwrap();
        assert_eq!(opts.smp, 6);
        assert_eq!(
            opts,
            LaunchOptions {
                smp: 6,
                ..LaunchOptions::default()
            }
        );
    }

    #[test]
    fn option_names_match_exactly() {
        let opts = resolve(&["-SMP", "16", "smp", "16", "--smp", "16"]).unwrap();
        assert_eq!(opts.smp, DEFAULT_SMP);
    }

    #[test]
    fn value_starting_with_dash_is_consumed() {
        let opts = resolve(&["-bootargs", "-tap"]).unwrap();
        assert_eq!(opts.bootargs, "-tap");
        assert_eq!(opts.network, NetworkMode::User);
    }

    #[test]
    fn last_occurrence_wins() {
        let opts = resolve(&["-mem", "256", "-mem", "1024"]).unwrap();
        assert_eq!(opts.mem_mb, 1024);
    }

    #[test]
    fn bootargs_with_spaces_kept_verbatim() {
        let opts = resolve(&["-bootargs", "console=ttyAMA0 root=/dev/vda rw"]).unwrap();
        assert_eq!(opts.bootargs, "console=ttyAMA0 root=/dev/vda rw");
    }

    #[test]
    fn missing_value_is_error() {
        let err = resolve(&["-smp"]).unwrap_err();
        assert!(
            matches!(err, LaunchError::MissingValue { option: "-smp" }),
            "got {err:?}"
        );
    }

    #[test]
    fn non_numeric_value_is_error() {
        let err = resolve(&["-mem", "lots"]).unwrap_err();
        match err {
            LaunchError::InvalidValue { option, value, .. } => {
                assert_eq!(option, "-mem");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_core_count_is_error() {
        assert!(resolve(&["-smp", "-1"]).is_err());
    }

    #[test]
    fn huge_el_is_an_invalid_level() {
        for el in ["99999999999999999999", "-99999999999999999999"] {
            let err = resolve(&["-el", el]).unwrap_err();
            match err {
                LaunchError::InvalidExceptionLevel(level) => assert_eq!(level, el),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn non_numeric_el_is_invalid_value() {
        let err = resolve(&["-el", "two"]).unwrap_err();
        assert!(
            matches!(err, LaunchError::InvalidValue { option: "-el", .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn out_of_range_el_still_resolves() {
        let opts = resolve(&["-el", "7"]).unwrap();
        assert_eq!(opts.el, 7);
    }
}
