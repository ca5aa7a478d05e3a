/// Opening the authorize URL in the user's browser
use tracing::debug;

/// Something that can show the authorize URL to the user
///
/// Closures with the same signature implement it, which is how tests stand
/// in for a real browser.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// The operating system's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        debug!("Launching system browser");
        webbrowser::open(url)
    }
}

impl<F> BrowserLauncher for F
where
    F: Fn(&str) -> std::io::Result<()> + Send + Sync,
{
    fn open(&self, url: &str) -> std::io::Result<()> {
        self(url)
    }
}
