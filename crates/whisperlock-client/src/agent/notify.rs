//! Notification display and client-window routing.

use anyhow::Result;
use parking_lot::Mutex;
use tracing::info;
use whisperlock_core::protocol::NotificationPayload;

pub const NOTIFICATION_ICON: &str = "/icons/icon-192.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Where a click on the notification leads.
    pub url: String,
}

impl From<NotificationPayload> for Notification {
    fn from(p: NotificationPayload) -> Self {
        Self {
            title: p.title,
            body: p.body,
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_ICON.to_string(),
            url: p.url,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn show(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log; the headless default.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, n: &Notification) -> Result<()> {
        info!(title = %n.title, body = %n.body, url = %n.url, "notification");
        Ok(())
    }
}

pub type WindowId = u64;

/// Open client views the agent can route a notification click to.
pub trait ClientWindows: Send + Sync {
    fn list(&self) -> Vec<WindowId>;
    fn navigate(&self, id: WindowId, url: &str) -> Result<()>;
    fn focus(&self, id: WindowId) -> Result<()>;
    fn open(&self, url: &str) -> Result<WindowId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(WindowId),
    Opened(WindowId),
}

/// Send the first open window to `url` and focus it, or open a new one.
pub fn route_click(windows: &dyn ClientWindows, url: &str) -> Result<ClickOutcome> {
    let url = if url.is_empty() { "/" } else { url };
    if let Some(id) = windows.list().first().copied() {
        windows.navigate(id, url)?;
        windows.focus(id)?;
        return Ok(ClickOutcome::Focused(id));
    }
    Ok(ClickOutcome::Opened(windows.open(url)?))
}

/// Window set kept in memory. The CLI has no real views, so opening one only
/// records the url.
#[derive(Default)]
pub struct MemoryWindows {
    windows: Mutex<Vec<(WindowId, String)>>,
    focused: Mutex<Option<WindowId>>,
}

impl MemoryWindows {
    pub fn url_of(&self, id: WindowId) -> Option<String> {
        self.windows
            .lock()
            .iter()
            .find(|(w, _)| *w == id)
            .map(|(_, u)| u.clone())
    }

    pub fn focused(&self) -> Option<WindowId> {
        *self.focused.lock()
    }
}

impl ClientWindows for MemoryWindows {
    fn list(&self) -> Vec<WindowId> {
        self.windows.lock().iter().map(|(id, _)| *id).collect()
    }

    fn navigate(&self, id: WindowId, url: &str) -> Result<()> {
        let mut windows = self.windows.lock();
        match windows.iter_mut().find(|(w, _)| *w == id) {
            Some(window) => {
                window.1 = url.to_string();
                Ok(())
            }
            None => Err(anyhow::anyhow!("window {id} is gone")),
        }
    }

    fn focus(&self, id: WindowId) -> Result<()> {
        *self.focused.lock() = Some(id);
        Ok(())
    }

    fn open(&self, url: &str) -> Result<WindowId> {
        let mut windows = self.windows.lock();
        let id = windows.iter().map(|(w, _)| *w).max().map_or(1, |m| m + 1);
        windows.push((id, url.to_string()));
        info!(id, url, "window opened");
        Ok(id)
    }
}
