use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Entries kept before stale ones are swept
const PRUNE_THRESHOLD: usize = 1000;

/// Check a fixed window for one client. Returns true if the request is allowed
/// and records it as the client's latest accepted request.
pub fn check_rate_limit(last_accepted: &mut Option<Instant>, now: Instant, window: Duration) -> bool {
    if let Some(last) = *last_accepted {
        if now.saturating_duration_since(last) < window {
            return false;
        }
    }
    *last_accepted = Some(now);
    true
}

/// One accepted submission per client address per window
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    clients: Mutex<HashMap<IpAddr, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients.lock().await;
        if clients.len() > PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, last| now.saturating_duration_since(*last) < window);
        }

        let mut last = clients.get(&ip).copied();
        let allowed = check_rate_limit(&mut last, now, self.window);
        if let Some(last) = last {
            clients.insert(ip, last);
        }
        allowed
    }
}
