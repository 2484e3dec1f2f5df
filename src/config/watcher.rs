//! Hot reload of the configuration file.
//!
//! Reload triggers come from two sources: filesystem writes to the config
//! file and SIGHUP. Both feed one trigger channel, so the reload path is
//! the same no matter who asked. A trigger whose load or validation fails
//! leaves the running configuration untouched.

use crate::config::{load_config, Config};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Invoked with each successfully reloaded configuration.
pub type ReloadCallback = Box<dyn Fn(Config) + Send + Sync>;

/// How long to let a burst of filesystem events settle before reloading.
const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Watches the configuration file and drives reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    on_reload: ReloadCallback,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, on_reload: ReloadCallback) -> Self {
        Self { path, on_reload }
    }

    /// Run until shutdown, reloading on file changes and SIGHUP.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let (trigger_tx, mut triggers) = mpsc::unbounded_channel();

        // The notify callback filters for writes to our file and turns
        // them into triggers. The watcher handle must stay alive for the
        // callbacks to keep coming.
        let _watcher = match watch_file(&self.path, trigger_tx.clone()) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "config watch unavailable, hot reload disabled"
                );
                let _ = shutdown.recv().await;
                return;
            }
        };

        spawn_sighup_trigger(trigger_tx);

        info!(path = %self.path.display(), "watching configuration for changes");

        loop {
            tokio::select! {
                trigger = triggers.recv() => {
                    if trigger.is_none() {
                        break;
                    }
                    // Editors fire several events per save; let the burst
                    // settle and fold it into a single reload.
                    tokio::time::sleep(SETTLE_DELAY).await;
                    while triggers.try_recv().is_ok() {}
                    self.reload();
                }

                _ = shutdown.recv() => break,
            }
        }

        info!("config watcher stopped");
    }

    fn reload(&self) {
        match load_config(&self.path) {
            Ok(config) => {
                info!(
                    services = config.services.len(),
                    "applying reloaded configuration"
                );
                (self.on_reload)(config);
            }
            Err(e) => {
                warn!(error = %e, "reload failed, keeping running configuration");
            }
        }
    }
}

/// Register a filesystem watch covering the config file.
///
/// The watch is placed on the parent directory: editors commonly replace
/// the file (rename-over) rather than writing it in place, and a watch on
/// the file itself would silently detach at the first such save.
fn watch_file(
    path: &Path,
    triggers: mpsc::UnboundedSender<()>,
) -> notify::Result<RecommendedWatcher> {
    let file_name: OsString = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let mut watcher = RecommendedWatcher::new(
        move |outcome: notify::Result<notify::Event>| {
            let Ok(event) = outcome else { return };
            if is_config_write(&event, &file_name) {
                let _ = triggers.send(());
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// True for writes and creates that touch the config file itself.
fn is_config_write(event: &notify::Event, file_name: &OsString) -> bool {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Forward SIGHUP into the trigger channel (Unix only).
fn spawn_sighup_trigger(triggers: mpsc::UnboundedSender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::hangup()) {
            Ok(mut hangups) => {
                tokio::spawn(async move {
                    while hangups.recv().await.is_some() {
                        info!("SIGHUP received, requesting config reload");
                        if triggers.send(()).is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => warn!(error = %e, "SIGHUP handler unavailable"),
        }
    }

    #[cfg(not(unix))]
    let _ = triggers;
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_write_to_config_file_triggers() {
        let name = OsString::from("config.yml");
        let e = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/etc/junction/config.yml",
        );
        assert!(is_config_write(&e, &name));
    }

    #[test]
    fn test_create_of_config_file_triggers() {
        let name = OsString::from("config.yml");
        let e = event(
            EventKind::Create(CreateKind::File),
            "/etc/junction/config.yml",
        );
        assert!(is_config_write(&e, &name));
    }

    #[test]
    fn test_sibling_file_ignored() {
        let name = OsString::from("config.yml");
        let e = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/etc/junction/other.yml",
        );
        assert!(!is_config_write(&e, &name));
    }

    #[test]
    fn test_removal_ignored() {
        let name = OsString::from("config.yml");
        let e = event(
            EventKind::Remove(RemoveKind::File),
            "/etc/junction/config.yml",
        );
        assert!(!is_config_write(&e, &name));
    }

    #[test]
    fn test_reload_hands_valid_config_to_callback() {
        let yaml = r#"
services:
  - name: api
    endpoint: /api
    urls: ["http://127.0.0.1:9001"]
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let applied = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&applied);
        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(move |config| {
                assert_eq!(config.services.len(), 1);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        watcher.reload();
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_of_broken_file_never_reaches_callback() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"services: [{ name: x, endpoint: no-slash }]")
            .unwrap();

        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(|_| panic!("broken config must not be applied")),
        );

        watcher.reload();
    }
}
