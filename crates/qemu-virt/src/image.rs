//! Raw disk image provisioning.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::exec;
use crate::error::{LaunchError, LaunchResult};

const MIB: u64 = 1024 * 1024;

/// Size of every provisioned image (storage and flash).
pub const IMAGE_SIZE: u64 = 64 * MIB;

/// Host tool able to create a zero-filled raw image of a given size.
#[async_trait]
pub trait ImageTool: Send + Sync {
    /// Human-readable name for logs (e.g. "dd").
    fn name(&self) -> &str;
    /// Program to execute.
    fn program(&self) -> &OsStr;
    /// Arguments that create `path` with `size` bytes.
    fn args(&self, path: &Path, size: u64) -> Vec<OsString>;

    async fn create(&self, path: &Path, size: u64) -> LaunchResult<()> {
        exec(self.program(), &self.args(path, size))
            .await
            .map(|_| ())
            .map_err(|e| LaunchError::Provision {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
    }
}

/// `qemu-img create -f raw`, used on Windows hosts.
#[derive(Debug, Clone)]
pub struct QemuImg {
    pub program: PathBuf,
}

impl Default for QemuImg {
    fn default() -> Self {
        Self {
            program: PathBuf::from("qemu-img"),
        }
    }
}

#[async_trait]
impl ImageTool for QemuImg {
    fn name(&self) -> &str {
        "qemu-img"
    }

    fn program(&self) -> &OsStr {
        self.program.as_os_str()
    }

    fn args(&self, path: &Path, size: u64) -> Vec<OsString> {
        vec![
            "create".into(),
            "-f".into(),
            "raw".into(),
            path.into(),
            format!("{}M", size.div_ceil(MIB)).into(),
        ]
    }
}

/// `dd if=/dev/zero`, used everywhere else.
#[derive(Debug, Clone)]
pub struct Dd {
    pub program: PathBuf,
}

impl Default for Dd {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dd"),
        }
    }
}

const DD_BLOCK_SIZE: u64 = 1024;

#[async_trait]
impl ImageTool for Dd {
    fn name(&self) -> &str {
        "dd"
    }

    fn program(&self) -> &OsStr {
        self.program.as_os_str()
    }

    fn args(&self, path: &Path, size: u64) -> Vec<OsString> {
        let mut of = OsString::from("of=");
        of.push(path);
        vec![
            "if=/dev/zero".into(),
            of,
            format!("bs={DD_BLOCK_SIZE}").into(),
            format!("count={}", size.div_ceil(DD_BLOCK_SIZE)).into(),
        ]
    }
}

/// Pick the image tool for the host platform.
pub fn host_image_tool() -> Box<dyn ImageTool> {
    if cfg!(windows) {
        Box::new(QemuImg::default())
    } else {
        Box::new(Dd::default())
    }
}

/// Create every image in `paths` that does not exist yet.
///
/// Existing files are left untouched, whatever their size. A failed creation
/// leaves nothing behind at the target path. Returns the paths that were
/// created.
pub async fn provision(tool: &dyn ImageTool, paths: &[PathBuf]) -> LaunchResult<Vec<PathBuf>> {
    let mut created = Vec::new();
    for path in paths {
        if tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "image exists");
            continue;
        }
        info!(path = %path.display(), tool = tool.name(), size_mib = IMAGE_SIZE / MIB, "creating image");
        create_atomic(tool, path).await?;
        created.push(path.clone());
    }
    Ok(created)
}

/// Scratch path next to `path`: `sd.bin` -> `sd.bin.tmp.<pid>`.
fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}", std::process::id()));
    PathBuf::from(tmp)
}

/// Create the image under a scratch name, then rename it into place.
/// Errors name `path`, not the scratch file.
async fn create_atomic(tool: &dyn ImageTool, path: &Path) -> LaunchResult<()> {
    let tmp = tmp_path(path);
    let result = async {
        tool.create(&tmp, IMAGE_SIZE).await?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| LaunchError::Provision {
                path: path.to_path_buf(),
                detail: format!("rename {}: {e}", tmp.display()),
            })
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result.map_err(|e| match e {
        LaunchError::Provision { detail, .. } => LaunchError::Provision {
            path: path.to_path_buf(),
            detail,
        },
        other => other,
    })
}
