//! Skips socket-bound tests where loopback sockets are unavailable.

use std::net::TcpListener;

use wiremock::MockServer;

/// Starts a mock server, or returns `None` when this environment cannot bind
/// a loopback socket.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if let Err(error) = TcpListener::bind("127.0.0.1:0") {
        eprintln!("[socket-bound-test] cannot bind localhost socket ({error}); skipping test");
        return None;
    }
    Some(MockServer::start().await)
}
