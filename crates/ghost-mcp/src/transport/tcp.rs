//! TCP transport for MCP

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::LineTransport;

pub type TcpTransport = LineTransport<BufReader<OwnedReadHalf>, OwnedWriteHalf>;

pub fn tcp_transport(stream: TcpStream) -> TcpTransport {
    let (read_half, write_half) = stream.into_split();
    LineTransport::new(BufReader::new(read_half), write_half)
}
