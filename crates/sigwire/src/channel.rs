use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::protocol::{encode, parse_header, parse_payload};
use crate::types::*;

/// Open a signal connection to `address` ("host:port").
pub async fn connect(address: &str, connect_timeout: Duration) -> io::Result<TcpStream> {
    let stream = timeout(connect_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "signal connection timed out"))??;
    // Frames are tiny; don't let Nagle hold a start signal back.
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Write one frame and flush it.
pub async fn write_signal<W>(writer: &mut W, value: SignalValue) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(value)).await?;
    writer.flush().await
}

/// Read exactly one frame.
///
/// Returns `Ok(None)` when the peer closes the stream cleanly between
/// frames. A stream that ends mid-frame is an `UnexpectedEof` error.
pub async fn read_signal<R>(reader: &mut R) -> io::Result<Option<SignalValue>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;
    let kind = parse_header(&header)?;

    let mut buf = [0u8; 8];
    let len = kind.payload_len();
    reader.read_exact(&mut buf[..len]).await?;
    parse_payload(kind, &buf[..len]).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_stay_ordered_on_one_stream() {
        let (mut tx, mut rx) = duplex(64);
        write_signal(&mut tx, SignalValue::Duration(5.0)).await.unwrap();
        write_signal(&mut tx, SignalValue::STOP_DURATION).await.unwrap();
        drop(tx);

        assert_eq!(
            read_signal(&mut rx).await.unwrap(),
            Some(SignalValue::Duration(5.0))
        );
        assert_eq!(
            read_signal(&mut rx).await.unwrap(),
            Some(SignalValue::Duration(-1.0))
        );
        assert_eq!(read_signal(&mut rx).await.unwrap(), None);
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_error() {
        let (mut tx, mut rx) = duplex(64);
        let msg = encode(SignalValue::Command(Command::Start));
        tx.write_all(&msg[..4]).await.unwrap();
        drop(tx);

        let err = read_signal(&mut rx).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        let (mut tx, mut rx) = duplex(64);
        tx.write_all(b"hello world").await.unwrap();

        let err = read_signal(&mut rx).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn connect_and_send_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_signal(&mut stream).await.unwrap()
        });

        let mut stream = connect(&addr, Duration::from_millis(CONNECT_TIMEOUT_MS))
            .await
            .unwrap();
        write_signal(&mut stream, SignalValue::Command(Command::Start))
            .await
            .unwrap();

        assert_eq!(
            accept.await.unwrap(),
            Some(SignalValue::Command(Command::Start))
        );
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(connect(&addr, Duration::from_secs(2)).await.is_err());
    }
}
