//! Host platform collaborators registered at session start

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of camera frames on the host
pub trait CameraFactory: Send + Sync {
    /// Re-enumerate host camera devices, e.g. after a permission change
    fn reload_devices(&self);
}

/// System applets the guest can launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AppletKind {
    MiiSelector,
    SoftwareKeyboard,
}

/// Host implementation of a system applet
pub trait AppletFactory: Send + Sync {
    /// Run the applet with the guest's request and return its answer,
    /// or `None` if the user cancelled
    fn launch(&self, request: &str) -> Option<String>;
}

#[derive(Default)]
struct Registered {
    cameras: BTreeMap<String, Arc<dyn CameraFactory>>,
    applets: BTreeMap<AppletKind, Arc<dyn AppletFactory>>,
}

/// Camera and applet factories offered by the host platform.
///
/// The host fills this in once; every session start installs the set so
/// the guest sees the same devices each boot.
#[derive(Default)]
pub struct HostHooks {
    available: Mutex<Registered>,
    installed: Mutex<Registered>,
}

impl fmt::Debug for HostHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let available = self.available.lock();
        f.debug_struct("HostHooks")
            .field("cameras", &available.cameras.keys().collect::<Vec<_>>())
            .field("applets", &available.applets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HostHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a camera source under `name` (e.g. "image", "ndk")
    pub fn add_camera(&self, name: impl Into<String>, factory: Arc<dyn CameraFactory>) {
        self.available.lock().cameras.insert(name.into(), factory);
    }

    pub fn add_applet(&self, kind: AppletKind, factory: Arc<dyn AppletFactory>) {
        self.available.lock().applets.insert(kind, factory);
    }

    /// Make every offered factory visible to the session being started
    pub fn install(&self) {
        let available = self.available.lock();
        let mut installed = self.installed.lock();
        installed.cameras = available.cameras.clone();
        installed.applets = available.applets.clone();
        debug!(
            "Installed {} camera sources and {} applets",
            installed.cameras.len(),
            installed.applets.len()
        );
    }

    /// Forget installed factories when a session ends
    pub fn uninstall(&self) {
        *self.installed.lock() = Registered::default();
    }

    pub fn installed_cameras(&self) -> Vec<String> {
        self.installed.lock().cameras.keys().cloned().collect()
    }

    /// Re-enumerate devices on every installed camera source
    pub fn reload_camera_devices(&self) {
        let cameras: Vec<_> = self.installed.lock().cameras.values().cloned().collect();
        info!("Reloading {} camera sources", cameras.len());
        for camera in cameras {
            camera.reload_devices();
        }
    }

    /// Launch an installed applet on behalf of the guest
    pub fn launch_applet(&self, kind: AppletKind, request: &str) -> Option<String> {
        let applet = self.installed.lock().applets.get(&kind).cloned()?;
        applet.launch(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Camera {
        reloads: AtomicUsize,
    }

    impl CameraFactory for Camera {
        fn reload_devices(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Keyboard;

    impl AppletFactory for Keyboard {
        fn launch(&self, request: &str) -> Option<String> {
            Some(request.to_uppercase())
        }
    }

    #[test]
    fn test_install_and_reload() {
        let hooks = HostHooks::new();
        let camera = Arc::new(Camera::default());
        hooks.add_camera("image", camera.clone());

        hooks.reload_camera_devices();
        assert_eq!(camera.reloads.load(Ordering::SeqCst), 0);

        hooks.install();
        assert_eq!(hooks.installed_cameras(), vec!["image".to_string()]);
        hooks.reload_camera_devices();
        assert_eq!(camera.reloads.load(Ordering::SeqCst), 1);

        hooks.uninstall();
        assert!(hooks.installed_cameras().is_empty());
    }

    #[test]
    fn test_launch_applet() {
        let hooks = HostHooks::new();
        hooks.add_applet(AppletKind::SoftwareKeyboard, Arc::new(Keyboard));
        assert_eq!(hooks.launch_applet(AppletKind::SoftwareKeyboard, "hi"), None);

        hooks.install();
        assert_eq!(hooks.launch_applet(AppletKind::SoftwareKeyboard, "hi"), Some("HI".to_string()));
        assert_eq!(hooks.launch_applet(AppletKind::MiiSelector, ""), None);
    }
}
