//! Line-framing helpers for the [`crate::wire`] protocol over a TCP
//! socket.
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use ra_core::TransportError;

use crate::wire::{Request, Response};

/// Open a connection to `addr`, enforcing `timeout` on both connect
/// and every subsequent read/write.
pub fn dial(addr: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    let addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|_| TransportError::Protocol(format!("invalid address: {addr}")))?;
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

/// Send one request and read back one response, over an already-open
/// stream.
pub fn call(mut stream: TcpStream, request: &Request) -> Result<Response, TransportError> {
    write_line(&mut stream, request)?;
    read_line(&mut stream)
}

pub fn write_line<T: serde::Serialize>(stream: &mut TcpStream, value: &T) -> Result<(), TransportError> {
    let mut line =
        serde_json::to_string(value).map_err(|err| TransportError::Protocol(err.to_string()))?;
    line.push('\n');
    stream.write_all(line.as_bytes())?;
    Ok(())
}

pub fn read_line<T: serde::de::DeserializeOwned>(stream: &mut TcpStream) -> Result<T, TransportError> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(TransportError::Protocol("connection closed".into()));
    }
    serde_json::from_str(line.trim()).map_err(|err| TransportError::Protocol(err.to_string()))
}
