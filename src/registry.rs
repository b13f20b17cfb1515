use std::path::Path;

/// Outcome of merging a `.reg` file. Never fatal to a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryImport {
    Imported,
    Failed(String),
    /// The platform has no registry.
    Unsupported,
}

impl RegistryImport {
    pub fn warning(&self) -> Option<String> {
        match self {
            RegistryImport::Imported => None,
            RegistryImport::Failed(reason) => Some(format!("registry import failed: {reason}")),
            RegistryImport::Unsupported => {
                Some("registry import skipped: no registry on this platform".to_string())
            }
        }
    }
}

#[cfg(windows)]
pub fn import(file: &Path) -> RegistryImport {
    use std::os::windows::process::CommandExt;
    use std::process::{Command, Stdio};
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    let status = Command::new("reg")
        .arg("import")
        .arg(file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status();

    match status {
        Ok(status) if status.success() => RegistryImport::Imported,
        Ok(status) => RegistryImport::Failed(format!(
            "reg import {} exited with {:?}",
            file.display(),
            status.code()
        )),
        Err(err) => RegistryImport::Failed(format!("could not run reg.exe: {err}")),
    }
}

#[cfg(not(windows))]
pub fn import(file: &Path) -> RegistryImport {
    log::debug!("not importing {}: no registry", file.display());
    RegistryImport::Unsupported
}
