use std::fmt;
use std::path::PathBuf;

use crate::error::{LaunchError, LaunchResult};
use crate::options::{GraphicsMode, LaunchOptions, NetworkMode};

/// Above this many cores GICv2 cannot address every CPU.
pub const GICV2_MAX_CPUS: u32 = 8;

/// Interrupt controller version passed as `gic-version=` on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicVersion {
    Version(u32),
    /// Let QEMU pick the newest GIC the accelerator supports.
    Max,
}

impl fmt::Display for GicVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => write!(f, "{v}"),
            Self::Max => f.write_str("max"),
        }
    }
}

/// ARM exception level the guest boots into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionLevel {
    El1,
    El2,
    El3,
}

impl ExceptionLevel {
    /// Machine-option suffix that enables the level.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::El1 => "",
            Self::El2 => ",virtualization=on",
            Self::El3 => ",secure=on",
        }
    }
}

impl TryFrom<i64> for ExceptionLevel {
    type Error = LaunchError;

    fn try_from(el: i64) -> Result<Self, Self::Error> {
        match el {
            1 => Ok(Self::El1),
            2 => Ok(Self::El2),
            3 => Ok(Self::El3),
            other => Err(LaunchError::InvalidExceptionLevel(other.to_string())),
        }
    }
}

/// Fully derived launch configuration. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub gic: GicVersion,
    pub el: ExceptionLevel,
    pub dumpdtb: Option<PathBuf>,
    pub smp: u32,
    pub mem_mb: u32,
    pub graphics: GraphicsMode,
    pub debug: bool,
    pub bootargs: String,
    pub initrd: Option<PathBuf>,
    pub sd: PathBuf,
    pub network: NetworkMode,
    pub flash: PathBuf,
}

impl LaunchConfig {
    /// Apply the cross-field rules to resolved options.
    ///
    /// More than [`GICV2_MAX_CPUS`] cores force GICv3. At EL2 a GICv3 becomes
    /// `max`. An exception level outside 1..=3 is rejected.
    pub fn derive(opts: LaunchOptions) -> LaunchResult<Self> {
        let mut gic = opts.gic;
        if opts.smp > GICV2_MAX_CPUS {
            gic = 3;
        }

        let el = ExceptionLevel::try_from(opts.el)?;
        let gic = if el == ExceptionLevel::El2 && gic == 3 {
            GicVersion::Max
        } else {
            GicVersion::Version(gic)
        };

        Ok(Self {
            gic,
            el,
            dumpdtb: opts.dumpdtb,
            smp: opts.smp,
            mem_mb: opts.mem_mb,
            graphics: opts.graphics,
            debug: opts.debug,
            bootargs: opts.bootargs,
            initrd: opts.initrd,
            sd: opts.sd,
            network: opts.network,
            flash: opts.flash,
        })
    }

    /// Image files backing the storage and flash drives, deduplicated.
    pub fn image_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.sd.clone()];
        if self.flash != self.sd {
            paths.push(self.flash.clone());
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive(args: &[&str]) -> LaunchResult<LaunchConfig> {
        LaunchConfig::derive(LaunchOptions::resolve(args.iter().copied())?)
    }

    #[test]
    fn defaults_derive_to_gicv2_el1() {
        let config = derive(&[]).unwrap();
        assert_eq!(config.gic, GicVersion::Version(2));
        assert_eq!(config.el, ExceptionLevel::El1);
        assert_eq!(config.el.suffix(), "");
    }

    #[test]
    fn many_cores_force_gicv3_over_explicit_gic() {
        for smp in [9, 10, 16, 64, 512] {
            for gic in ["2", "3", "4"] {
                let smp_arg = smp.to_string();
                let config = derive(&["-gic", gic, "-smp", &smp_arg]).unwrap();
                assert_eq!(config.gic, GicVersion::Version(3), "smp={smp} gic={gic}");
            }
        }
    }

    #[test]
    fn eight_cores_keep_requested_gic() {
        let config = derive(&["-smp", "8"]).unwrap();
        assert_eq!(config.gic, GicVersion::Version(2));
        let config = derive(&["-smp", "8", "-gic", "4"]).unwrap();
        assert_eq!(config.gic, GicVersion::Version(4));
    }

    #[test]
    fn el_suffix_mapping() {
        assert_eq!(ExceptionLevel::El1.suffix(), "");
        assert_eq!(ExceptionLevel::El2.suffix(), ",virtualization=on");
        assert_eq!(ExceptionLevel::El3.suffix(), ",secure=on");
    }

    #[test]
    fn el2_with_explicit_gicv3_becomes_max() {
        let config = derive(&["-el", "2", "-gic", "3"]).unwrap();
        assert_eq!(config.gic, GicVersion::Max);
        assert_eq!(config.gic.to_string(), "max");
    }

    #[test]
    fn el2_with_escalated_gic_becomes_max() {
        let config = derive(&["-smp", "10", "-el", "2"]).unwrap();
        assert_eq!(config.gic, GicVersion::Max);
        assert_eq!(config.el.suffix(), ",virtualization=on");
    }

    #[test]
    fn el2_with_gicv2_stays_numeric() {
        let config = derive(&["-el", "2"]).unwrap();
        assert_eq!(config.gic, GicVersion::Version(2));
    }

    #[test]
    fn el3_with_gicv3_stays_numeric() {
        let config = derive(&["-el", "3", "-smp", "12"]).unwrap();
        assert_eq!(config.gic, GicVersion::Version(3));
        assert_eq!(config.el.suffix(), ",secure=on");
    }

    #[test]
    fn invalid_el_is_rejected() {
        for el in ["0", "4", "-1", "100"] {
            let err = derive(&["-el", el]).unwrap_err();
            assert!(
                matches!(err, LaunchError::InvalidExceptionLevel(_)),
                "el={el} gave {err:?}"
            );
        }
    }

    #[test]
    fn invalid_el_message_names_level() {
        let err = derive(&["-el", "5"]).unwrap_err();
        assert_eq!(err.to_string(), "invalid -el 5 (expected 1, 2 or 3)");
    }

    #[test]
    fn image_paths_deduplicated() {
        let config = derive(&[]).unwrap();
        assert_eq!(
            config.image_paths(),
            vec![PathBuf::from("sd.bin"), PathBuf::from("flash.bin")]
        );

        let config = derive(&["-sd", "same.img", "-flash", "same.img"]).unwrap();
        assert_eq!(config.image_paths(), vec![PathBuf::from("same.img")]);
    }
}
