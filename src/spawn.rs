//! Detached process spawning and child reaping.
//!
//! Spawned programs (the terminal binding) run in their own session so they
//! survive if pswm exits. Exited children are collected non-blockingly once
//! per event loop iteration instead of being left as zombies.

use std::process::{Child, Command, Stdio};

/// Tracks children spawned by the WM until they exit
pub struct SpawnedChildren {
    children: Vec<Child>,
}

impl SpawnedChildren {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    /// Launch `command` through the shell, detached into its own session,
    /// with DISPLAY pointing at the managed display.
    pub fn spawn_shell(&mut self, command: &str, display: &str) {
        log::info!("Spawning '{}' on DISPLAY={}", command, display);

        // Handle shell expansion for paths like ~/bin/term
        let expanded = shellexpand::tilde(command);

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(expanded.as_ref())
            .env("DISPLAY", display)
            .stdin(Stdio::null());

        // Detach from pswm's session so the child survives if we exit
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        match cmd.spawn() {
            Ok(child) => self.children.push(child),
            Err(e) => log::error!("Failed to spawn '{}': {}", command, e),
        }
    }

    /// Collect exited children without blocking. Called once per event loop
    /// iteration so zombies never pile up.
    pub fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("Child {} exited with {}", child.id(), status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                log::warn!("Failed to poll child {}: {}", child.id(), e);
                false
            }
        });
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.children.len()
    }
}

impl Default for SpawnedChildren {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reap_with_no_children_is_noop() {
        let mut children = SpawnedChildren::new();
        children.reap();
        assert_eq!(children.len(), 0);
    }

    #[test]
    fn reap_collects_exited_children() {
        let mut children = SpawnedChildren::new();
        children.spawn_shell("true", ":0");
        assert_eq!(children.len(), 1);

        for _ in 0..100 {
            children.reap();
            if children.len() == 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("child was never reaped");
    }

    #[test]
    fn failed_spawn_tracks_nothing() {
        let mut children = SpawnedChildren::new();
        // /bin/sh itself starts fine even for a bogus command; the shell
        // exits nonzero and is reaped like any other child
        children.spawn_shell("definitely-not-a-real-command-pswm", ":0");
        for _ in 0..100 {
            children.reap();
            if children.len() == 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("child was never reaped");
    }
}
