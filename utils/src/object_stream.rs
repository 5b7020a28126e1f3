//! Length-prefixed object framing over a byte-oriented connection. Each frame
//! is an 8-byte little-endian payload length followed by the bincode payload;
//! every read enforces a caller-supplied size cap before allocating.

use serde::{de::DeserializeOwned, Serialize};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum ObjectStreamError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("received object of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: u64, max: u64 },

    #[error("object encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

pub type ObjectStreamResult<T> = std::result::Result<T, ObjectStreamError>;

pub async fn write_object<W, T>(conn: &mut W, obj: &T) -> ObjectStreamResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = bincode::serialize(obj)?;
    conn.write_all(&(payload.len() as u64).to_le_bytes()).await?;
    conn.write_all(&payload).await?;
    conn.flush().await?;
    Ok(())
}

pub async fn read_object<R, T>(conn: &mut R, max_len: u64) -> ObjectStreamResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 8];
    conn.read_exact(&mut len_bytes).await?;
    let len = u64::from_le_bytes(len_bytes);
    if len > max_len {
        return Err(ObjectStreamError::TooLarge { len, max: max_len });
    }
    let mut payload = vec![0u8; len as usize];
    conn.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1 << 16);
        let sent = vec!["one".to_string(), "two".to_string()];
        write_object(&mut a, &sent).await.unwrap();
        let received: Vec<String> = read_object(&mut b, 1 << 10).await.unwrap();
        assert_eq!(sent, received);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_allocation() {
        let (mut a, mut b) = tokio::io::duplex(1 << 16);
        write_object(&mut a, &vec![0u8; 256]).await.unwrap();
        let err = read_object::<_, Vec<u8>>(&mut b, 16).await.unwrap_err();
        assert!(matches!(err, ObjectStreamError::TooLarge { max: 16, .. }));
    }

    #[tokio::test]
    async fn truncated_stream_surfaces_io_error() {
        let (mut a, mut b) = tokio::io::duplex(1 << 16);
        a.write_all(&8u64.to_le_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        let err = read_object::<_, u64>(&mut b, 64).await.unwrap_err();
        assert!(matches!(err, ObjectStreamError::Io(_)));
    }
}
