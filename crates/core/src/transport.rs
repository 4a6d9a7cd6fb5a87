use std::io;
use std::sync::Arc;

use srouter_proto::{HEADER_LEN, ProtoError, VnsMessage, lt::parse_header};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),
}

/// Read one framed message. Returns `Ok(None)` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<VnsMessage>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let (len, ty) = parse_header(&header)?;
    let mut body = vec![0u8; len as usize - HEADER_LEN];
    reader.read_exact(&mut body).await?;
    Ok(Some(VnsMessage::decode(ty, &body)?))
}

/// Write one framed message and flush it.
pub async fn write_message<W>(writer: &mut W, msg: &VnsMessage) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&msg.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Framed VNS connection with a background reader.
pub struct Transport<S> {
    writer: Arc<Mutex<WriteHalf<S>>>,
    rx: mpsc::UnboundedReceiver<Result<VnsMessage, TransportError>>,
    reader: JoinHandle<()>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (mut read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();

        // Reader task decodes frames until the peer goes away or sends
        // garbage; the error, if any, is delivered as the last item.
        let reader = tokio::spawn(async move {
            loop {
                match read_message(&mut read_half).await {
                    Ok(Some(msg)) => {
                        if tx.send(Ok(msg)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Self {
            writer: Arc::new(Mutex::new(write_half)),
            rx,
            reader,
        }
    }

    pub async fn send(&self, msg: &VnsMessage) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        write_message(&mut *writer, msg).await
    }

    /// Next message from the peer; `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<Result<VnsMessage, TransportError>> {
        self.rx.recv().await
    }

    /// Shut down the write side of the connection.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }
}

impl<S> Drop for Transport<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
