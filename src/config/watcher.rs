//! Application descriptor watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::descriptor::DESCRIPTOR_PATH;
use crate::webapp::normalize_root;

/// Watches `<root>/WEB-INF/web.xml` of each application and reports the
/// root of every application whose descriptor changed.
pub struct DescriptorWatcher {
    roots: Vec<PathBuf>,
    reload_tx: mpsc::UnboundedSender<PathBuf>,
}

impl DescriptorWatcher {
    /// Create a new DescriptorWatcher.
    ///
    /// Returns the watcher and a receiver of application roots to reload.
    pub fn new(roots: &[PathBuf]) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        let roots = roots.iter().map(|root| normalize_root(root)).collect();
        (Self { roots, reload_tx }, reload_rx)
    }

    /// Start watching in a background thread. Dropping the returned
    /// watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.reload_tx.clone();
        let roots = self.roots.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let mut changed: Vec<&PathBuf> = event
                        .paths
                        .iter()
                        .filter_map(|path| root_for_descriptor(&roots, path))
                        .collect();
                    changed.dedup();
                    for root in changed {
                        tracing::info!(root = %root.display(), "Descriptor change detected, reloading");
                        let _ = tx.send(root.clone());
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for root in &self.roots {
            let dir = root.join(DESCRIPTOR_PATH);
            let dir = dir.parent().unwrap_or(root);
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(applications = self.roots.len(), "Descriptor watcher started");
        Ok(watcher)
    }
}

/// The watched root whose descriptor is `path`, if any.
fn root_for_descriptor<'a>(roots: &'a [PathBuf], path: &Path) -> Option<&'a PathBuf> {
    let path = normalize_root(path);
    roots.iter().find(|root| root.join(DESCRIPTOR_PATH) == path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_descriptor_path_to_root() {
        let roots = vec![PathBuf::from("/srv/shop"), PathBuf::from("/srv/ROOT")];
        assert_eq!(
            root_for_descriptor(&roots, Path::new("/srv/shop/WEB-INF/web.xml")),
            Some(&roots[0])
        );
        assert_eq!(
            root_for_descriptor(&roots, Path::new("/srv/./ROOT/WEB-INF/web.xml")),
            Some(&roots[1])
        );
        assert_eq!(root_for_descriptor(&roots, Path::new("/srv/shop/WEB-INF/other.xml")), None);
        assert_eq!(root_for_descriptor(&roots, Path::new("/srv/blog/WEB-INF/web.xml")), None);
    }
}
