//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plain: axum::serve on a tokio TcpListener
//!     → tls:   tls.rs (rustls acceptor) → axum_server
//!     → Transport extension on every request → scheme inference
//! ```
//!
//! # Design Decisions
//! - TLS is optional and terminated in-process
//! - The transport is recorded once per router, not per connection

pub mod tls;

/// How the listener receives traffic. Inserted into request extensions so
/// the bridge can infer the scheme when no proxy header says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Plain,
    Tls,
}

impl Transport {
    pub fn scheme(self) -> &'static str {
        match self {
            Transport::Plain => "http",
            Transport::Tls => "https",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Transport;

    #[test]
    fn scheme_follows_transport() {
        assert_eq!(Transport::default().scheme(), "http");
        assert_eq!(Transport::Tls.scheme(), "https");
    }
}
