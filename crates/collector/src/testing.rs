use std::net::SocketAddr;

use axum::Router;

/// Serve the provided router on a random local port.
pub(crate) async fn serve(router: Router) -> SocketAddr {
    let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
        .serve(router.into_make_service());

    let address = server.local_addr();
    tokio::spawn(server);

    address
}
