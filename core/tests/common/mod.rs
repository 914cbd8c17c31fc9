//! Shared setup: the mock service on a random port, and configured clients.
#![allow(dead_code)]

use std::net::SocketAddr;

use magnum_core::{connect, HttpTransport, Session, TransportConfig};
use magnum_core::MagnumClient;

pub const TOKEN: &str = "integration-token";

/// Start the mock server in a background thread and return its address.
pub fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

pub fn config(addr: SocketAddr) -> TransportConfig {
    TransportConfig::new(format!("http://{addr}/v1"))
        .with_auth_token(TOKEN)
        .with_api_version("latest")
        .with_timeout(10.0)
}

/// Which transport implementation a test runs against.
#[derive(Debug, Clone, Copy)]
pub enum Kind {
    Socket,
    Session,
}

pub fn transport(kind: Kind, config: &TransportConfig) -> Box<dyn HttpTransport> {
    let session = match kind {
        Kind::Socket => None,
        Kind::Session => Some(
            Session::from_options(&config.connection_options(), config.proxy.as_deref()).unwrap(),
        ),
    };
    connect(config, session).unwrap()
}

pub fn client(kind: Kind, config: &TransportConfig) -> MagnumClient {
    MagnumClient::new(transport(kind, config))
}
