//! Child-process spawning (the "S" external collaborator, §2), plus the
//! `SIGCHLD` reaper dwm.c installs so spawned commands don't accumulate as
//! zombies. `nix`'s `signal` feature is pulled in for exactly this, the way
//! the rest of the retrieval pack uses it for the same narrow purpose.

use std::process::{Command, Stdio};

use nix::sys::signal::{self, SigHandler, Signal};

extern "C" fn reap_children(_: i32) {
    use nix::sys::wait::{waitpid, WaitPidFlag};
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(nix::sys::wait::WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}

/// Installs the `SIGCHLD` handler; call once during startup (`setup`).
pub fn install_sigchld_handler() {
    unsafe {
        let _ = signal::signal(Signal::SIGCHLD, SigHandler::Handler(reap_children));
    }
}

/// Runs a configured command detached from the manager, mirroring `spawn`:
/// stdio inherited, no shell wrapping (argv is already split in `config.rs`).
pub fn spawn(argv: &[&str]) {
    let Some((cmd, args)) = argv.split_first() else {
        return;
    };
    match Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .spawn()
    {
        Ok(_) => log::debug!("spawned {cmd}"),
        Err(e) => log::warn!("failed to spawn {cmd}: {e}"),
    }
}
