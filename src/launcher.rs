use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// An executable and its argument string exactly as written in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    pub path: PathBuf,
    pub args: Option<String>,
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

fn is_runnable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && is_executable(&meta))
        .unwrap_or(false)
}

#[cfg(windows)]
fn executable_extensions() -> Vec<OsString> {
    let pathext = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    pathext
        .split(';')
        .filter(|ext| !ext.is_empty())
        .map(OsString::from)
        .collect()
}

#[cfg(not(windows))]
fn executable_extensions() -> Vec<OsString> {
    Vec::new()
}

/// Resolves `cmd` to an existing executable file. Paths are taken as-is;
/// bare names are tried in the working directory, then on `PATH`.
pub fn resolve_command(cmd: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(cmd);
    if candidate.is_absolute() || cmd.contains(['/', '\\']) {
        return is_runnable(&candidate).then_some(candidate);
    }
    if is_runnable(&candidate) {
        return Some(candidate);
    }

    let path_env = env::var_os("PATH")?;
    for dir in env::split_paths(&path_env) {
        if dir.as_os_str().is_empty() || !dir.is_absolute() {
            continue;
        }
        let path = dir.join(cmd);
        if is_runnable(&path) {
            return Some(path);
        }
        for ext in executable_extensions() {
            let mut with_ext = path.clone().into_os_string();
            with_ext.push(&ext);
            let with_ext = PathBuf::from(with_ext);
            if is_runnable(&with_ext) {
                return Some(with_ext);
            }
        }
    }
    None
}

pub fn build_command(spec: &ProgramSpec) -> Command {
    let mut cmd = Command::new(&spec.path);
    cmd.stdin(Stdio::null());
    if spec.path.is_absolute() {
        if let Some(dir) = spec.path.parent() {
            cmd.current_dir(dir);
        }
    }
    if let Some(args) = spec.args.as_deref() {
        push_args(&mut cmd, args);
    }
    cmd
}

// The argument string reaches the child untouched.
#[cfg(windows)]
fn push_args(cmd: &mut Command, args: &str) {
    use std::os::windows::process::CommandExt;
    cmd.raw_arg(args);
}

#[cfg(not(windows))]
fn push_args(cmd: &mut Command, args: &str) {
    cmd.args(split_command_line(args));
}

/// Whitespace-separated words; double quotes group words and are removed.
#[cfg_attr(windows, allow(dead_code))]
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}

#[cfg(test)]
pub(crate) fn fake_executable(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "fake").unwrap();
    #[cfg(unix)]
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
