use tokio::io;
use tokio::net::{TcpListener, TcpStream};

/// Establish a pair of connected loopback `TcpStream`s, playing the role of
/// a client and an upstream server, without needing a real database to
/// listen on a fixed port. Used to drive inline-proxy session tests
/// end-to-end.
pub async fn loopback() -> io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let connect = TcpStream::connect(addr);
    let accept = listener.accept();

    let (client_result, accept_result) = tokio::join!(connect, accept);
    let client = client_result?;
    let (server, _) = accept_result?;

    Ok((client, server))
}
