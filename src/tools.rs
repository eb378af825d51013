use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Admin tools (ss, iptables, lvs, ...) live here but unprivileged PATHs
/// frequently leave these directories out.
const SBIN_DIRS: &[&str] = &["/usr/local/sbin", "/usr/sbin", "/sbin"];

const NIX_DIRS: &[&str] = &[
    "/nix/var/nix/profiles/default/bin",
    "/run/current-system/sw/bin",
];

/// Search the tool directories for an executable.
pub fn find(name: &str) -> Option<PathBuf> {
    search_dirs()
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

/// PATH handed to every probe child, so that a tool `find` reports as
/// present is also the one `sh -c` runs.
pub fn search_path() -> OsString {
    std::env::join_paths(search_dirs()).unwrap_or_default()
}

fn search_dirs() -> Vec<PathBuf> {
    dirs_from(std::env::var_os("PATH"), dirs::home_dir())
}

/// The process PATH first, then sbin dirs, then nix profile bin dirs.
fn dirs_from(path: Option<OsString>, home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = path
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();

    let extra = SBIN_DIRS
        .iter()
        .chain(NIX_DIRS)
        .map(PathBuf::from)
        .chain(home.map(|h| h.join(".nix-profile/bin")));
    for dir in extra {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }

    dirs.retain(|d| !d.as_os_str().is_empty());
    dirs
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
