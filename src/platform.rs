use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Other,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => write!(f, "linux"),
            Os::Other => write!(f, "{}", std::env::consts::OS),
        }
    }
}

pub fn os() -> Os {
    match std::env::consts::OS {
        "linux" => Os::Linux,
        _ => Os::Other,
    }
}

/// Whether this process already runs with an effective uid of 0.
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
