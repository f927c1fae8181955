//! Headless Chromium as the shared handle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use pdfgate::{BoxError, DocumentRenderer, HandleFactory, RenderError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Flags that keep Chromium working inside small containers. The sandbox is
/// turned off through the launch config. `--single-process` is left out: CDP
/// sessions crash under it, and `--no-zygote` covers the same container case.
pub const LAUNCH_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-zygote",
    "--no-first-run",
];

const MM_PER_INCH: f64 = 25.4;

/// A running browser plus the task driving its CDP connection.
pub struct BrowserHandle {
    browser: Mutex<Browser>,
    connected: Arc<AtomicBool>,
    events: JoinHandle<()>,
}

impl BrowserHandle {
    /// `false` once the CDP connection has ended.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.events.abort();
    }
}

pub struct ChromiumFactory {
    executable: PathBuf,
    args: Vec<String>,
}

impl ChromiumFactory {
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            args: LAUNCH_ARGS.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[async_trait]
impl HandleFactory for ChromiumFactory {
    type Handle = BrowserHandle;

    async fn create(&self) -> Result<BrowserHandle, BoxError> {
        let config = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .no_sandbox()
            .args(self.args.iter().cloned())
            .build()?;

        log::info!("launching {}", self.executable.display());
        let (browser, mut handler) = Browser::launch(config).await?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    log::debug!("browser event error: {}", err);
                }
            }

            flag.store(false, Ordering::SeqCst);
            log::warn!("browser connection closed");
        });

        Ok(BrowserHandle {
            browser: Mutex::new(browser),
            connected,
            events,
        })
    }

    async fn close(&self, handle: Arc<BrowserHandle>) -> Result<(), BoxError> {
        let mut browser = handle.browser.lock().await;

        match browser.close().await {
            Ok(_) => {
                browser.wait().await?;
            }
            Err(err) => {
                log::warn!("graceful browser close failed, killing it: {}", err);
                if let Some(Err(err)) = browser.kill().await {
                    return Err(err.into());
                }
            }
        }

        handle.events.abort();
        Ok(())
    }

    fn is_alive(&self, handle: &BrowserHandle) -> bool {
        handle.is_connected()
    }
}

/// Prints pages as A4 with the margins of the paper form.
pub struct ChromiumRenderer {
    params: PrintToPdfParams,
}

impl ChromiumRenderer {
    pub fn new(params: PrintToPdfParams) -> Self {
        Self { params }
    }
}

impl Default for ChromiumRenderer {
    fn default() -> Self {
        Self::new(PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(210.0 / MM_PER_INCH),
            paper_height: Some(297.0 / MM_PER_INCH),
            margin_top: Some(18.0 / MM_PER_INCH),
            margin_bottom: Some(18.0 / MM_PER_INCH),
            margin_left: Some(12.0 / MM_PER_INCH),
            margin_right: Some(12.0 / MM_PER_INCH),
            ..Default::default()
        })
    }
}

fn render_error(handle: &BrowserHandle, err: CdpError) -> RenderError {
    RenderError::new(err.to_string()).handle_dead(!handle.is_connected())
}

#[async_trait]
impl DocumentRenderer<BrowserHandle> for ChromiumRenderer {
    async fn render(&self, handle: &BrowserHandle, html: &str) -> Result<Vec<u8>, RenderError> {
        let page = {
            let browser = handle.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|err| render_error(handle, err))?
        };

        let result: Result<Vec<u8>, CdpError> = async {
            page.set_content(html).await?;
            page.pdf(self.params.clone()).await
        }
        .await;

        if let Err(err) = page.close().await {
            log::debug!("failed to close page: {}", err);
        }

        result.map_err(|err| render_error(handle, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_suit_containers() {
        for flag in ["--disable-setuid-sandbox", "--disable-dev-shm-usage", "--disable-gpu"] {
            assert!(LAUNCH_ARGS.contains(&flag), "missing {}", flag);
        }

        assert!(LAUNCH_ARGS.contains(&"--no-zygote"));
        assert!(!LAUNCH_ARGS.contains(&"--single-process"));

        let factory = ChromiumFactory::new(PathBuf::from("/usr/bin/chromium")).arg("--lang=pt-BR");
        assert_eq!(factory.args.len(), LAUNCH_ARGS.len() + 1);
        assert_eq!(factory.args.last().map(String::as_str), Some("--lang=pt-BR"));
    }
}
