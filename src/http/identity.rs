//! Client identity extraction.

use std::net::{IpAddr, SocketAddr};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use serde::{Deserialize, Serialize};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Where the rate limit identity of a request comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// The IP address of the connected peer, port stripped
    #[default]
    PeerAddr,
    /// The first `X-Forwarded-For` hop, falling back to the peer address.
    ///
    /// Only safe behind a proxy that overwrites the header.
    ForwardedFor,
}

impl IdentitySource {
    /// Resolve the identity of a request.
    ///
    /// Requests with no usable address share the empty identity.
    pub fn identify<B>(&self, request: &Request<B>) -> String {
        let forwarded = match self {
            IdentitySource::PeerAddr => None,
            IdentitySource::ForwardedFor => forwarded_for(request.headers()),
        };

        forwarded
            .or_else(|| peer_addr(request))
            .map(|ip| ip.to_canonical().to_string())
            .unwrap_or_default()
    }
}

fn peer_addr<B>(request: &Request<B>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(X_FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
