//! In-memory host driven by a package catalog.
//!
//! The catalog is a JSON document describing the installed packages and the
//! device state. Usage events are injected at runtime. Every call is
//! recorded so tests can assert on what the island asked of the OS.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{
    AppIcon, HostError, PackageInfo, PackageResolver, Platform, SettingsPage, UsageEvent,
    UsageEventKind, UsageSource, UsageStat,
};
use crate::overlay::{OverlayWindow, ViewFrame, WindowSpec};

// ============================================================================
// Catalog
// ============================================================================

fn default_host_package() -> String {
    "com.mistycrown.lumostime".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sdk_level() -> u32 {
    34
}

fn default_density() -> f32 {
    2.0
}

/// One installed package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPackage {
    /// Package identifier
    pub package_name: String,
    /// Label; a missing label makes label lookups fail
    #[serde(default)]
    pub label: Option<String>,
    /// Whether the package has a launcher entry
    #[serde(default = "default_true")]
    pub launchable: bool,
    /// Whether the package declares a home activity
    #[serde(default)]
    pub home: bool,
    /// Whether the package is an input method
    #[serde(default)]
    pub input_method: bool,
    /// System package
    #[serde(default)]
    pub system: bool,
    /// System package updated by the user
    #[serde(default)]
    pub updated_system: bool,
    /// PNG file used as the icon
    #[serde(default)]
    pub icon_png: Option<PathBuf>,
}

impl CatalogPackage {
    /// A launchable user app.
    pub fn app(package_name: &str, label: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            label: Some(label.to_string()),
            launchable: true,
            home: false,
            input_method: false,
            system: false,
            updated_system: false,
            icon_png: None,
        }
    }

    /// A launcher (home activity).
    pub fn launcher(package_name: &str, label: &str) -> Self {
        Self {
            home: true,
            system: true,
            ..Self::app(package_name, label)
        }
    }

    /// An input method that also has a launcher entry.
    pub fn input_method(package_name: &str, label: &str) -> Self {
        Self {
            input_method: true,
            ..Self::app(package_name, label)
        }
    }

    /// A background system package without launcher entry.
    pub fn system_service(package_name: &str, label: &str) -> Self {
        Self {
            launchable: false,
            system: true,
            ..Self::app(package_name, label)
        }
    }
}

/// Package catalog and device state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// The host app's package
    #[serde(default = "default_host_package")]
    pub host_package: String,
    /// Installed packages
    #[serde(default)]
    pub packages: Vec<CatalogPackage>,
    /// Default launcher package
    #[serde(default)]
    pub default_home: Option<String>,
    /// Screen on and interactive
    #[serde(default = "default_true")]
    pub interactive: bool,
    /// Accessibility service enabled
    #[serde(default = "default_true")]
    pub accessibility_enabled: bool,
    /// Overlay permission granted
    #[serde(default = "default_true")]
    pub overlay_allowed: bool,
    /// Usage access granted
    #[serde(default = "default_true")]
    pub usage_access: bool,
    /// OS API level
    #[serde(default = "default_sdk_level")]
    pub sdk_level: u32,
    /// px per dp
    #[serde(default = "default_density")]
    pub density: f32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            host_package: default_host_package(),
            packages: Vec::new(),
            default_home: None,
            interactive: true,
            accessibility_enabled: true,
            overlay_allowed: true,
            usage_access: true,
            sdk_level: default_sdk_level(),
            density: default_density(),
        }
    }
}

impl Catalog {
    /// Loads a catalog from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse catalog: {:?}", path))
    }

    fn find(&self, package: &str) -> Option<&CatalogPackage> {
        self.packages.iter().find(|p| p.package_name == package)
    }
}

// ============================================================================
// Recorded window state
// ============================================================================

#[derive(Debug, Default)]
struct WindowRecord {
    spec: Option<WindowSpec>,
    position: Option<(i32, i32)>,
    frames: Vec<ViewFrame>,
    removals: usize,
}

// ============================================================================
// CatalogHost
// ============================================================================

/// Host collaborators backed by a [`Catalog`].
#[derive(Debug)]
pub struct CatalogHost {
    catalog: RwLock<Catalog>,
    usage_events: Mutex<Vec<UsageEvent>>,
    usage_stats: Mutex<Vec<UsageStat>>,
    interactive: AtomicBool,
    accessibility_enabled: AtomicBool,
    overlay_allowed: AtomicBool,
    usage_access: AtomicBool,
    fail_lookups: AtomicBool,
    fail_window: AtomicBool,
    fail_wake_lock: AtomicBool,
    wake_lock_held: AtomicBool,
    wake_lock_acquires: AtomicUsize,
    usage_queries: AtomicUsize,
    host_launches: AtomicUsize,
    notice: Mutex<Option<String>>,
    notice_history: Mutex<Vec<String>>,
    settings_opened: Mutex<Vec<SettingsPage>>,
    window: Mutex<WindowRecord>,
}

impl CatalogHost {
    /// Creates a host from a catalog.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            interactive: AtomicBool::new(catalog.interactive),
            accessibility_enabled: AtomicBool::new(catalog.accessibility_enabled),
            overlay_allowed: AtomicBool::new(catalog.overlay_allowed),
            usage_access: AtomicBool::new(catalog.usage_access),
            catalog: RwLock::new(catalog),
            usage_events: Mutex::new(Vec::new()),
            usage_stats: Mutex::new(Vec::new()),
            fail_lookups: AtomicBool::new(false),
            fail_window: AtomicBool::new(false),
            fail_wake_lock: AtomicBool::new(false),
            wake_lock_held: AtomicBool::new(false),
            wake_lock_acquires: AtomicUsize::new(0),
            usage_queries: AtomicUsize::new(0),
            host_launches: AtomicUsize::new(0),
            notice: Mutex::new(None),
            notice_history: Mutex::new(Vec::new()),
            settings_opened: Mutex::new(Vec::new()),
            window: Mutex::new(WindowRecord::default()),
        }
    }

    /// Loads a catalog file and creates a host from it.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(Catalog::load(path)?))
    }

    fn read_catalog(&self) -> std::sync::RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds or replaces a package.
    pub fn install(&self, package: CatalogPackage) {
        let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        catalog
            .packages
            .retain(|p| p.package_name != package.package_name);
        catalog.packages.push(package);
    }

    /// Records a usage event.
    pub fn push_usage_event(&self, package: &str, kind: UsageEventKind, timestamp_ms: i64) {
        lock(&self.usage_events).push(UsageEvent {
            package_name: package.to_string(),
            kind,
            timestamp_ms,
        });
    }

    /// Records a move-to-foreground event.
    pub fn push_foreground(&self, package: &str, timestamp_ms: i64) {
        self.push_usage_event(package, UsageEventKind::MoveToForeground, timestamp_ms);
    }

    /// Records usage statistics for a package.
    pub fn push_usage_stat(&self, package: &str, last_time_used_ms: i64) {
        lock(&self.usage_stats).push(UsageStat {
            package_name: package.to_string(),
            last_time_used_ms,
        });
    }

    pub fn set_interactive(&self, value: bool) {
        self.interactive.store(value, Ordering::SeqCst);
    }

    pub fn set_accessibility_enabled(&self, value: bool) {
        self.accessibility_enabled.store(value, Ordering::SeqCst);
    }

    pub fn set_overlay_allowed(&self, value: bool) {
        self.overlay_allowed.store(value, Ordering::SeqCst);
    }

    pub fn set_usage_access(&self, value: bool) {
        self.usage_access.store(value, Ordering::SeqCst);
    }

    /// Makes every resolver call fail.
    pub fn set_fail_lookups(&self, value: bool) {
        self.fail_lookups.store(value, Ordering::SeqCst);
    }

    /// Makes every window operation fail.
    pub fn set_fail_window(&self, value: bool) {
        self.fail_window.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_wake_lock(&self, value: bool) {
        self.fail_wake_lock.store(value, Ordering::SeqCst);
    }

    #[must_use]
    pub fn wake_lock_held(&self) -> bool {
        self.wake_lock_held.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn wake_lock_acquire_count(&self) -> usize {
        self.wake_lock_acquires.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn usage_query_count(&self) -> usize {
        self.usage_queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn host_launch_count(&self) -> usize {
        self.host_launches.load(Ordering::SeqCst)
    }

    /// Current liveness notice text.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        lock(&self.notice).clone()
    }

    /// Every notice text posted so far.
    #[must_use]
    pub fn notice_history(&self) -> Vec<String> {
        lock(&self.notice_history).clone()
    }

    #[must_use]
    pub fn settings_opened(&self) -> Vec<SettingsPage> {
        lock(&self.settings_opened).clone()
    }

    /// The spec the window was added with, if it is attached.
    #[must_use]
    pub fn window_spec(&self) -> Option<WindowSpec> {
        lock(&self.window).spec.clone()
    }

    #[must_use]
    pub fn window_position(&self) -> Option<(i32, i32)> {
        lock(&self.window).position
    }

    #[must_use]
    pub fn last_frame(&self) -> Option<ViewFrame> {
        lock(&self.window).frames.last().cloned()
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        lock(&self.window).frames.len()
    }

    #[must_use]
    pub fn window_removals(&self) -> usize {
        lock(&self.window).removals
    }

    fn check_lookups(&self, package: &str) -> Result<(), HostError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(HostError::LookupFailed(package.to_string()));
        }
        Ok(())
    }

    fn check_window(&self, op: &str) -> Result<(), HostError> {
        if self.fail_window.load(Ordering::SeqCst) {
            return Err(HostError::WindowManager(format!("{} rejected", op)));
        }
        Ok(())
    }

    fn check_usage_access(&self) -> Result<(), HostError> {
        self.usage_queries.fetch_add(1, Ordering::SeqCst);
        if !self.usage_access.load(Ordering::SeqCst) {
            return Err(HostError::PermissionDenied("usage access".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Deterministic placeholder colour for packages without an icon file.
fn placeholder_color(package: &str) -> [u8; 4] {
    let hash = package
        .bytes()
        .fold(0x811C_9DC5u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    let [r, g, b, _] = hash.to_le_bytes();
    [r, g, b, 0xFF]
}

// ============================================================================
// Trait implementations
// ============================================================================

impl PackageResolver for CatalogHost {
    fn default_home_package(&self) -> Result<Option<String>, HostError> {
        self.check_lookups("default home")?;
        Ok(self.read_catalog().default_home.clone())
    }

    fn home_packages(&self) -> Result<Vec<String>, HostError> {
        self.check_lookups("home activities")?;
        Ok(self
            .read_catalog()
            .packages
            .iter()
            .filter(|p| p.home)
            .map(|p| p.package_name.clone())
            .collect())
    }

    fn input_method_packages(&self) -> Result<Vec<String>, HostError> {
        self.check_lookups("input methods")?;
        Ok(self
            .read_catalog()
            .packages
            .iter()
            .filter(|p| p.input_method)
            .map(|p| p.package_name.clone())
            .collect())
    }

    fn has_launch_intent(&self, package: &str) -> Result<bool, HostError> {
        self.check_lookups(package)?;
        Ok(self
            .read_catalog()
            .find(package)
            .map(|p| p.launchable)
            .unwrap_or(false))
    }

    fn label(&self, package: &str) -> Result<String, HostError> {
        self.check_lookups(package)?;
        self.read_catalog()
            .find(package)
            .and_then(|p| p.label.clone())
            .ok_or_else(|| HostError::LookupFailed(package.to_string()))
    }

    fn icon(&self, package: &str) -> Result<AppIcon, HostError> {
        self.check_lookups(package)?;
        let catalog = self.read_catalog();
        let entry = catalog
            .find(package)
            .ok_or_else(|| HostError::LookupFailed(package.to_string()))?;
        match &entry.icon_png {
            Some(path) => std::fs::read(path)
                .map(AppIcon::Encoded)
                .map_err(|e| HostError::LookupFailed(format!("{}: {}", package, e))),
            None => Ok(AppIcon::Vector {
                intrinsic_width: 48,
                intrinsic_height: 48,
                color: placeholder_color(package),
            }),
        }
    }

    fn installed_packages(&self) -> Result<Vec<PackageInfo>, HostError> {
        self.check_lookups("installed packages")?;
        Ok(self
            .read_catalog()
            .packages
            .iter()
            .map(|p| PackageInfo {
                package_name: p.package_name.clone(),
                is_system: p.system,
                is_updated_system: p.updated_system,
            })
            .collect())
    }

    fn host_package(&self) -> String {
        self.read_catalog().host_package.clone()
    }
}

impl UsageSource for CatalogHost {
    fn query_events(&self, start_ms: i64, end_ms: i64) -> Result<Vec<UsageEvent>, HostError> {
        self.check_usage_access()?;
        let mut events: Vec<UsageEvent> = lock(&self.usage_events)
            .iter()
            .filter(|e| e.timestamp_ms >= start_ms && e.timestamp_ms < end_ms)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp_ms);
        Ok(events)
    }

    fn query_usage_stats(&self, start_ms: i64, end_ms: i64) -> Result<Vec<UsageStat>, HostError> {
        self.check_usage_access()?;
        Ok(lock(&self.usage_stats)
            .iter()
            .filter(|s| s.last_time_used_ms >= start_ms && s.last_time_used_ms < end_ms)
            .cloned()
            .collect())
    }
}

impl Platform for CatalogHost {
    fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::SeqCst)
    }

    fn accessibility_enabled(&self) -> bool {
        self.accessibility_enabled.load(Ordering::SeqCst)
    }

    fn can_draw_overlays(&self) -> bool {
        self.overlay_allowed.load(Ordering::SeqCst)
    }

    fn open_settings(&self, page: SettingsPage) -> Result<(), HostError> {
        tracing::info!(page = ?page, "Opening settings");
        lock(&self.settings_opened).push(page);
        Ok(())
    }

    fn launch_host_app(&self) -> Result<(), HostError> {
        tracing::info!(package = %self.host_package(), "Launching host app");
        self.host_launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sdk_level(&self) -> u32 {
        self.read_catalog().sdk_level
    }

    fn density(&self) -> f32 {
        self.read_catalog().density
    }

    fn acquire_wake_lock(&self, tag: &str) -> Result<(), HostError> {
        if self.fail_wake_lock.load(Ordering::SeqCst) {
            return Err(HostError::WakeLock(format!("{} unavailable", tag)));
        }
        self.wake_lock_acquires.fetch_add(1, Ordering::SeqCst);
        self.wake_lock_held.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release_wake_lock(&self, _tag: &str) -> Result<(), HostError> {
        self.wake_lock_held.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn post_liveness_notice(&self, text: &str) {
        tracing::debug!(text = %text, "Liveness notice");
        *lock(&self.notice) = Some(text.to_string());
        lock(&self.notice_history).push(text.to_string());
    }

    fn clear_liveness_notice(&self) {
        *lock(&self.notice) = None;
    }
}

impl OverlayWindow for CatalogHost {
    fn add_view(&self, spec: &WindowSpec) -> Result<(), HostError> {
        self.check_window("addView")?;
        if !self.can_draw_overlays() {
            return Err(HostError::PermissionDenied("draw over other apps".to_string()));
        }
        let mut window = lock(&self.window);
        window.spec = Some(spec.clone());
        window.position = Some((spec.x, spec.y));
        Ok(())
    }

    fn update_position(&self, x: i32, y: i32) -> Result<(), HostError> {
        self.check_window("updateViewLayout")?;
        let mut window = lock(&self.window);
        if window.spec.is_none() {
            return Err(HostError::WindowManager("view not attached".to_string()));
        }
        window.position = Some((x, y));
        Ok(())
    }

    fn present(&self, frame: &ViewFrame) -> Result<(), HostError> {
        self.check_window("present")?;
        lock(&self.window).frames.push(frame.clone());
        Ok(())
    }

    fn remove_view(&self) -> Result<(), HostError> {
        self.check_window("removeView")?;
        let mut window = lock(&self.window);
        window.spec = None;
        window.position = None;
        window.removals += 1;
        Ok(())
    }
}
