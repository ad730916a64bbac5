//! Best-effort client address extraction for the credential audit trail.

use std::net::IpAddr;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use ipnet::IpNet;

/// Client IP address taken from forwarding headers.
///
/// Checks `X-Forwarded-For` (first hop) and `X-Real-Ip`, falling back to the
/// unspecified address when neither is present. The value feeds the
/// credential ledger's audit columns only; it is never used for
/// authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpNet);

impl ClientAddr {
    fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim);

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim);

        let addr: IpAddr = forwarded
            .or(real_ip)
            .and_then(|value| value.parse().ok())
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));

        Self(IpNet::from(addr))
    }
}

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn uses_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );

        let addr = ClientAddr::from_headers(&headers);
        assert_eq!(addr.0, "203.0.113.7/32".parse::<IpNet>().unwrap());
    }

    #[test]
    fn falls_back_to_unspecified() {
        let addr = ClientAddr::from_headers(&HeaderMap::new());
        assert_eq!(addr.0, "0.0.0.0/32".parse::<IpNet>().unwrap());
    }

    #[test]
    fn garbage_header_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));

        let addr = ClientAddr::from_headers(&headers);
        assert_eq!(addr.0, "0.0.0.0/32".parse::<IpNet>().unwrap());
    }
}
