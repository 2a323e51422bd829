use crate::api::error::AppError;
use crate::config::RateLimitConfig;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Idle client entries are dropped once this many are tracked
const MAX_TRACKED_CLIENTS: usize = 4096;

/// Per-IP request budget shared by every route it is layered on
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    trust_forwarded: bool,
}

impl ClientRateLimiter {
    /// `None` when limiting is switched off (`max_requests == 0`)
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        let burst = NonZeroU32::new(config.max_requests)?;
        let window = Duration::from_secs(config.window_secs.max(1));

        // Full budget up front, one request replenished every window / burst
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Some(Self {
            limiter: RateLimiter::keyed(quota),
            trust_forwarded: config.trust_forwarded,
        })
    }

    fn client_ip(&self, req: &Request) -> IpAddr {
        if self.trust_forwarded {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse().ok());
            if let Some(ip) = forwarded {
                return ip;
            }
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    /// Spends one request from `ip`'s budget
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiter.len() > MAX_TRACKED_CLIENTS {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&ip).is_ok()
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<ClientRateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = limiter.client_ip(&req);
    if !limiter.check(ip) {
        tracing::warn!("🚦 Rate limit exceeded for {}", ip);
        return Err(AppError::TooManyRequests(
            "Too many requests, please try again later.".to_string(),
        ));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limiter(max_requests: u32, trust_forwarded: bool) -> ClientRateLimiter {
        ClientRateLimiter::from_config(&RateLimitConfig {
            max_requests,
            window_secs: 600,
            trust_forwarded,
        })
        .unwrap()
    }

    fn request(forwarded: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/admin");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_disabled_when_zero() {
        assert!(
            ClientRateLimiter::from_config(&RateLimitConfig {
                max_requests: 0,
                ..RateLimitConfig::default()
            })
            .is_none()
        );
    }

    #[test]
    fn test_budget_is_per_client() {
        let limiter = limiter(2, false);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }

    #[test]
    fn test_client_ip_sources() {
        let trusting = limiter(5, true);
        assert_eq!(
            trusting.client_ip(&request(Some("203.0.113.7, 10.0.0.1"))),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );

        let mut req = request(Some("203.0.113.7"));
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        // Forwarded headers are ignored unless the proxy is trusted
        assert_eq!(
            limiter(5, false).client_ip(&req),
            "192.0.2.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            limiter(5, false).client_ip(&request(None)),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
    }
}
