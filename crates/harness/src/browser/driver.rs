//! chromedriver process management - spawning, readiness polling, shutdown

use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Handle to a running chromedriver process
pub struct ChromeDriverService {
    child: Option<Child>,
    pub url: String,
    pub port: u16,
}

impl ChromeDriverService {
    /// Spawn chromedriver and wait until it reports ready
    pub fn start(binary: &Path, startup_timeout: Duration) -> HarnessResult<Self> {
        let port = find_free_port()?;
        let url = format!("http://127.0.0.1:{}", port);

        info!("Spawning {} on port {}", binary.display(), port);

        let child = Command::new(binary)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => HarnessError::DriverNotFound {
                    binary: binary.display().to_string(),
                },
                _ => HarnessError::DriverStartup(format!(
                    "Failed to spawn {}: {}",
                    binary.display(),
                    e
                )),
            })?;

        let mut service = ChromeDriverService {
            child: Some(child),
            url,
            port,
        };

        service.wait_for_ready(startup_timeout)?;

        debug!("chromedriver is ready at {}", service.url);
        Ok(service)
    }

    /// Use a driver that is already listening at `url`. [`stop`](Self::stop)
    /// leaves it running.
    pub fn attach(url: &str) -> Self {
        let url = url.trim_end_matches('/').to_string();
        let port = reqwest::Url::parse(&url)
            .ok()
            .and_then(|parsed| parsed.port_or_known_default())
            .unwrap_or(0);
        ChromeDriverService {
            child: None,
            url,
            port,
        }
    }

    /// Poll `/status` until the driver reports `ready`
    fn wait_for_ready(&mut self, timeout: Duration) -> HarnessResult<()> {
        let status_url = format!("{}/status", self.url);
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(HarnessError::DriverStartup(format!(
                        "chromedriver exited during startup with {}",
                        status
                    )));
                }
            }

            match client.get(&status_url).send() {
                Ok(resp) if resp.status().is_success() => {
                    let ready = resp
                        .json::<Value>()
                        .ok()
                        .and_then(|body| body["value"]["ready"].as_bool())
                        .unwrap_or(false);
                    if ready {
                        return Ok(());
                    }
                }
                Ok(resp) => {
                    warn!("chromedriver status returned {}", resp.status());
                }
                Err(e) => {
                    // Connection refused is expected while the driver is starting
                    if !e.is_connect() {
                        warn!("chromedriver status error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100));
        }

        Err(HarnessError::DriverStartup(format!(
            "chromedriver not ready after {} attempts",
            attempts
        )))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop the driver. Safe to call more than once.
    pub fn stop(&mut self) -> HarnessResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }

        debug!("Stopping chromedriver (pid: {})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                sleep(Duration::from_millis(200));
            }
        }

        if let Ok(None) = child.try_wait() {
            child.kill()?;
        }
        child.wait()?;

        Ok(())
    }
}

impl Drop for ChromeDriverService {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Find a free local port to use
fn find_free_port() -> HarnessResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[test]
    fn test_missing_binary_is_driver_not_found() {
        let err = ChromeDriverService::start(
            Path::new("/nonexistent/bin/chromedriver-evidence"),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, HarnessError::DriverNotFound { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_attach_parses_port_and_stop_is_a_no_op() {
        let mut service = ChromeDriverService::attach("http://127.0.0.1:9515/");
        assert_eq!(service.url(), "http://127.0.0.1:9515");
        assert_eq!(service.port, 9515);
        service.stop().unwrap();
        service.stop().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_driver_exiting_early_is_startup_error() {
        let err = ChromeDriverService::start(Path::new("false"), Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::DriverStartup(_)));
    }
}
